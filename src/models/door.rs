use rand::Rng;
use tracing::trace;

use crate::models::common::{DoorStats, Point, SimContext};
use crate::models::error::ModelError;
use crate::models::randomizer::Randomizer;
use crate::scenario::DoorConfig;

/// ドアの開閉状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorState {
    Open,
    Closed,
}

/// 侵入対象のドア
///
/// 開閉の2状態をランダムな滞在時間で切り替えます。他のエージェントには
/// 依存せず、状態を変えるのは [`Door::react`] だけです。
#[derive(Debug, Clone)]
pub struct Door {
    pub index: usize,
    /// ドアタイルの中心（ワールド座標）
    pub position: Point,
    state: DoorState,
    wait_timer: u32,
    stats: DoorStats,
    /// 短時間開放の確率（パーセント）
    short_opening_percent: u32,
    closing: Randomizer,
    short_opening: Randomizer,
    long_opening: Randomizer,
}

impl Door {
    /// 設定からドアを作成します。初期状態は閉で、最初の滞在時間は閉鎖分布から引きます
    ///
    /// # 引数
    ///
    /// * `index` - ドア番号
    /// * `config` - ドア設定（位置はタイル、時間は秒）
    /// * `ctx` - シミュレーションコンテキスト
    /// * `rng` - 初期滞在時間用の乱数生成器
    pub fn new<R: Rng + ?Sized>(
        index: usize,
        config: &DoorConfig,
        ctx: &SimContext,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        let cell = ctx.to_grid(&ctx.tiles_to_world(config.x, config.y));
        if !ctx.in_bounds(&cell) {
            return Err(ModelError::DoorOutOfBounds {
                index,
                x: config.x,
                y: config.y,
            });
        }

        let ticks = |seconds: f32| SimContext::seconds_to_ticks(seconds) as f32;

        let closing = Randomizer::normal(
            ticks(config.inter_opening_time),
            ticks(config.inter_opening_deviation),
        )?;
        let short_opening = Randomizer::uniform(ticks(config.min_short_open_time), ticks(config.max_short_open_time))?;
        let long_opening = Randomizer::uniform(ticks(config.min_open_time), ticks(config.max_open_time))?;

        Ok(Self {
            index,
            position: ctx.to_world(&cell),
            state: DoorState::Closed,
            wait_timer: closing.sample_ticks(rng),
            stats: DoorStats::default(),
            short_opening_percent: (100.0 * config.short_opening_probability) as u32,
            closing,
            short_opening,
            long_opening,
        })
    }

    pub fn state(&self) -> DoorState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == DoorState::Open
    }

    /// 現在の状態に残っているティック数
    pub fn wait_timer(&self) -> u32 {
        self.wait_timer
    }

    pub fn stats(&self) -> DoorStats {
        self.stats
    }

    /// 1ティック分の状態更新
    ///
    /// 滞在時間を1減らし、0になった時点で状態を反転して次の滞在時間を引きます。
    /// 滞在時間 N を引いた状態はちょうど N ティック続きます。
    pub fn react<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.wait_timer > 0 {
            self.wait_timer -= 1;
            if self.wait_timer > 0 {
                return;
            }
        }

        match self.state {
            DoorState::Open => {
                self.wait_timer = self.closing.sample_ticks(rng);
                self.state = DoorState::Closed;
                trace!("ドア{} 閉鎖: {}ティック", self.index, self.wait_timer);
            }
            DoorState::Closed => {
                let short = rng.gen_range(1..=100) <= self.short_opening_percent;
                let opening = if short { &self.short_opening } else { &self.long_opening };
                self.wait_timer = opening.sample_ticks(rng);
                self.state = DoorState::Open;
                trace!(
                    "ドア{} 開放: {}ティック ({})",
                    self.index,
                    self.wait_timer,
                    if short { "短時間" } else { "通常" }
                );
            }
        }
    }

    /// 侵入を試みます
    ///
    /// # 戻り値
    ///
    /// ドアが開いていれば成功としてtrue
    pub fn enter(&mut self) -> bool {
        if self.is_open() {
            self.stats.successes += 1;
            true
        } else {
            self.stats.failures += 1;
            false
        }
    }
}
