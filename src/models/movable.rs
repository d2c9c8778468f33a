use std::collections::VecDeque;

use tracing::trace;

use crate::models::common::{GuardId, Point, SimContext, Wall};
use crate::models::navigation::find_path;

/// 経路追従の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementState {
    /// 到着済み、または経路が見つからず停止中
    Idle,
    /// 目標へ移動中
    Active,
}

/// 移動体の共通状態
///
/// 位置・速度・経路キュー・検査ロックを保持します。検査ロックが
/// かかっている間は [`Movable::move_to`] は何もしません。
#[derive(Debug, Clone)]
pub struct Movable {
    /// 現在位置（ワールド座標）
    pub position: Point,
    /// 直近の移動方向（正規化済み）
    pub direction: Point,
    /// 1ティックあたりに進むセル数
    pub speed: f32,
    /// これから通過するタイル中心の列
    pub path: VecDeque<Point>,
    pub state: MovementState,
    checking_by: Option<GuardId>,
    progress: f32,
}

impl Movable {
    pub fn new(position: Point, speed: f32) -> Self {
        Self {
            position,
            direction: Point::default(),
            speed,
            path: VecDeque::new(),
            state: MovementState::Idle,
            checking_by: None,
            progress: 0.0,
        }
    }

    pub fn is_checking(&self) -> bool {
        self.checking_by.is_some()
    }

    /// ロックを保持しているガード
    pub fn checking_by(&self) -> Option<GuardId> {
        self.checking_by
    }

    pub fn is_idle(&self) -> bool {
        self.state == MovementState::Idle
    }

    /// 次の目標に向けて移動を再開
    pub fn activate(&mut self) {
        self.state = MovementState::Active;
    }

    pub fn clear_path(&mut self) {
        self.path.clear();
        self.progress = 0.0;
    }

    /// 経路を捨ててその場で停止
    pub fn stop(&mut self) {
        self.clear_path();
        self.state = MovementState::Idle;
    }

    /// 経路を捨てて指定位置へ瞬間移動し、停止状態にする
    pub fn teleport(&mut self, position: Point) {
        self.stop();
        self.position = position;
    }

    /// 検査ロックを取得します。先にロックしたガードが優先されます
    ///
    /// # 戻り値
    ///
    /// ロックを取得できた場合はtrue
    pub fn start_check(&mut self, guard: GuardId) -> bool {
        if self.checking_by.is_some() {
            return false;
        }
        self.checking_by = Some(guard);
        true
    }

    /// 検査ロックを解除します。ロック保持者と一致する場合のみ有効です
    ///
    /// # 戻り値
    ///
    /// 解除された場合はtrue
    pub fn stop_check(&mut self, guard: GuardId) -> bool {
        if self.checking_by != Some(guard) {
            return false;
        }
        self.checking_by = None;
        true
    }

    /// 目標地点へ向けて1ティック分移動
    ///
    /// 経路キューが空で現在セルが目標セルと異なる場合は経路探索のみを行い、
    /// 実際の移動は次のティックから始まります。経路が見つからない場合は
    /// 停止状態になり、呼び出し側が次の機会に再試行します。
    ///
    /// # 引数
    ///
    /// * `goal` - 目標地点
    /// * `ctx` - グリッド寸法
    /// * `walls` - 経路探索で考慮する壁
    pub fn move_to(&mut self, goal: Point, ctx: &SimContext, walls: &[Wall]) {
        if self.is_checking() || self.is_idle() {
            return;
        }

        if self.path.is_empty() {
            if ctx.to_grid(&self.position) == ctx.to_grid(&goal) {
                self.state = MovementState::Idle;
                self.progress = 0.0;
                return;
            }

            self.path = find_path(self.position, goal, walls, ctx).into();
            if self.path.is_empty() {
                trace!("経路なし: ({:.1}, {:.1}) -> ({:.1}, {:.1})", self.position.x, self.position.y, goal.x, goal.y);
                self.state = MovementState::Idle;
            }
            return;
        }

        self.progress += self.speed;
        let steps = (self.progress.floor().max(0.0) as usize).min(self.path.len());
        if steps == 0 {
            return;
        }
        self.progress -= steps as f32;

        let mut next = self.position;
        for _ in 0..steps {
            if let Some(point) = self.path.pop_front() {
                next = point;
            }
        }

        let delta = next - self.position;
        let length = delta.x.hypot(delta.y);
        if length > 0.0 {
            self.direction = Point::new(delta.x / length, delta.y / length);
        }
        self.position = next;

        if self.path.is_empty() {
            self.state = MovementState::Idle;
            self.progress = 0.0;
        }
    }
}
