use crate::models::common::{AgentRef, GuardId, Point, SimContext, Wall};
use crate::models::movable::Movable;
use crate::models::randomizer::SimRng;

/// 検査解除時にガードから渡される情報
#[derive(Debug, Clone, Copy)]
pub struct Release<'a> {
    /// 解除したガードの位置
    pub guard_position: Point,
    /// 解除したガードの検査半径（ピクセル）
    pub check_radius: f32,
    pub ctx: &'a SimContext,
    pub walls: &'a [Wall],
}

/// 移動可能なエージェントのインターフェース
///
/// 従業員・ガード・侵入者が実装します。位置・経路追従・検査ロックの
/// 共通処理は [`Movable`] が持ち、各エージェントは必要な部分だけを
/// 上書きします。
pub trait IMovable {
    /// 共通の移動状態への参照
    fn movable(&self) -> &Movable;

    /// 共通の移動状態への可変参照
    fn movable_mut(&mut self) -> &mut Movable;

    /// 現在位置の取得
    fn position(&self) -> Point {
        self.movable().position
    }

    /// 目標地点へ向けた1ティック分の移動
    fn move_to(&mut self, goal: Point, ctx: &SimContext, walls: &[Wall]) {
        self.movable_mut().move_to(goal, ctx, walls);
    }

    /// いずれかのガードに検査されているか
    fn is_checking(&self) -> bool {
        self.movable().is_checking()
    }

    /// 検査ロックの取得（既にロック済みなら何もしない）
    fn start_check(&mut self, guard: GuardId) -> bool {
        self.movable_mut().start_check(guard)
    }

    /// 検査ロックの解除（ロック保持者以外からの解除は無視）
    fn stop_check(&mut self, guard: GuardId, _release: &Release<'_>, _rng: &mut SimRng) -> bool {
        self.movable_mut().stop_check(guard)
    }
}

/// ガードが検査対象として走査する移動体の集合
///
/// 移動体はレベルが所有し、ガードは [`AgentRef`] で参照するだけです。
pub trait Population {
    /// 検査対象になりうる全ての移動体
    fn agents(&self) -> Vec<AgentRef>;

    fn get(&self, agent: AgentRef) -> Option<&dyn IMovable>;

    fn get_mut(&mut self, agent: AgentRef) -> Option<&mut dyn IMovable>;
}
