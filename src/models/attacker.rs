use std::str::FromStr;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, trace};

use crate::models::common::{Point, SimContext, Wall};
use crate::models::door::Door;
use crate::models::error::ModelError;
use crate::models::movable::Movable;
use crate::models::navigation::random_free_point;
use crate::models::randomizer::{Randomizer, SimRng};
use crate::models::traits::IMovable;
use crate::scenario::AttackerConfig;

/// 侵入者の戦略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackerStrategy {
    /// ドアを突破した時点で勝利
    Normal,
    /// 突破の成否に関わらず再出現して試行を続ける（突破率の推定用）
    PTest,
    /// ドアを試行せず、捕まるまでの時間を計測する
    QTest,
}

impl FromStr for AttackerStrategy {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(AttackerStrategy::Normal),
            "p-test" | "ptest" => Ok(AttackerStrategy::PTest),
            "q-test" | "qtest" => Ok(AttackerStrategy::QTest),
            _ => Err(ModelError::InvalidAttackerStrategy(s.to_string())),
        }
    }
}

/// ドアへの移動方法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackerBehaviour {
    /// 経路探索で歩いて向かう
    Walk,
    /// ドアのタイルへ瞬間移動する
    Jump,
}

impl FromStr for AttackerBehaviour {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "walk" => Ok(AttackerBehaviour::Walk),
            "jump" => Ok(AttackerBehaviour::Jump),
            _ => Err(ModelError::InvalidAttackerBehaviour(s.to_string())),
        }
    }
}

/// 侵入者
///
/// 滞在と待機のタイマーが切れるとドアを1枚選んで侵入を試みます。
/// ガードに検査されたかどうかはレベル側が判定します。
#[derive(Debug, Clone)]
pub struct Attacker {
    movable: Movable,
    strategy: AttackerStrategy,
    behaviour: AttackerBehaviour,
    spawn_points: Vec<Point>,
    goal: Point,

    wander_speed: f32,
    attack_speed: f32,

    staying: bool,
    can_attack: bool,
    selected_door: Option<usize>,
    stay_timer: u32,
    wait_timer: u32,
    stay_period: u32,
    attack_period: u32,

    wander_timer: u32,
    wander_wait: Randomizer,
}

impl Attacker {
    pub fn new(config: &AttackerConfig, ctx: &SimContext, rng: &mut SimRng) -> Result<Self, ModelError> {
        let strategy: AttackerStrategy = config.strategy.parse()?;
        let behaviour: AttackerBehaviour = config.behaviour.parse()?;

        let spawn_points: Vec<Point> = config
            .spawn_points
            .iter()
            .map(|point| ctx.tile_center(&ctx.tiles_to_world(point.x, point.y)))
            .collect();
        let position = *spawn_points.choose(rng).ok_or(ModelError::NoSpawnPoints)?;

        let stay_period = SimContext::seconds_to_ticks(config.stay_period);
        let attack_period = SimContext::seconds_to_ticks(config.attack_period);
        let wander_wait = Randomizer::uniform(
            SimContext::seconds_to_ticks(config.min_wander_wait) as f32,
            SimContext::seconds_to_ticks(config.max_wander_wait) as f32,
        )?;

        Ok(Self {
            movable: Movable::new(position, config.speed),
            strategy,
            behaviour,
            spawn_points,
            goal: position,
            wander_speed: config.speed,
            attack_speed: config.attack_speed.unwrap_or(config.speed),
            staying: true,
            can_attack: false,
            selected_door: None,
            stay_timer: stay_period,
            wait_timer: attack_period,
            stay_period,
            attack_period,
            wander_timer: 0,
            wander_wait,
        })
    }

    pub fn strategy(&self) -> AttackerStrategy {
        self.strategy
    }

    pub fn behaviour(&self) -> AttackerBehaviour {
        self.behaviour
    }

    pub fn is_staying(&self) -> bool {
        self.staying
    }

    pub fn can_attack(&self) -> bool {
        self.can_attack
    }

    pub fn selected_door(&self) -> Option<usize> {
        self.selected_door
    }

    pub fn stay_timer(&self) -> u32 {
        self.stay_timer
    }

    pub fn wait_timer(&self) -> u32 {
        self.wait_timer
    }

    /// 1ティック分の行動
    ///
    /// # 戻り値
    ///
    /// ドアを突破して勝利した場合はそのドア番号
    pub fn update(&mut self, doors: &mut [Door], ctx: &SimContext, walls: &[Wall], rng: &mut SimRng) -> Option<usize> {
        if self.wait_timer > 0 {
            self.wait_timer -= 1;
        }
        if self.wait_timer == 0 && self.strategy != AttackerStrategy::QTest {
            self.can_attack = true;
            self.staying = false;
        }

        if self.movable.is_checking() {
            return None;
        }

        if self.staying && self.stay_timer > 0 {
            self.stay_timer -= 1;
            return None;
        }

        if self.can_attack {
            if self.selected_door.is_none() {
                self.select_door(doors, rng);
            }
            if let Some(index) = self.selected_door {
                return self.approach(index, doors, ctx, walls, rng);
            }
        }

        self.wander(ctx, walls, rng);
        None
    }

    fn select_door(&mut self, doors: &[Door], rng: &mut SimRng) {
        if doors.is_empty() {
            return;
        }

        let index = rng.gen_range(0..doors.len());
        self.selected_door = Some(index);
        self.movable.clear_path();
        self.movable.speed = self.attack_speed;
        self.movable.activate();
        trace!("侵入者 ドア{}を選択", index);
    }

    fn approach(
        &mut self,
        index: usize,
        doors: &mut [Door],
        ctx: &SimContext,
        walls: &[Wall],
        rng: &mut SimRng,
    ) -> Option<usize> {
        let Some(door) = doors.get_mut(index) else {
            self.selected_door = None;
            return None;
        };
        let target = door.position;
        let door_cell = ctx.to_grid(&target);

        if ctx.to_grid(&self.movable.position) != door_cell {
            match self.behaviour {
                AttackerBehaviour::Jump => self.movable.teleport(target),
                AttackerBehaviour::Walk => {
                    if self.movable.is_idle() {
                        self.movable.activate();
                    }
                    self.movable.move_to(target, ctx, walls);
                }
            }

            if ctx.to_grid(&self.movable.position) != door_cell {
                return None;
            }
        }

        let entered = door.enter();
        debug!(
            "侵入者 ドア{}への侵入{}",
            index,
            if entered { "成功" } else { "失敗" }
        );
        self.resolve(index, entered, ctx, rng)
    }

    /// ドアでの試行結果を確定し、タイマーをまとめてリセットする
    fn resolve(&mut self, index: usize, entered: bool, ctx: &SimContext, rng: &mut SimRng) -> Option<usize> {
        self.selected_door = None;
        self.can_attack = false;
        self.staying = true;
        self.wait_timer = self.attack_period;
        self.stay_timer = self.stay_period;
        self.movable.speed = self.wander_speed;
        self.movable.stop();

        match self.strategy {
            AttackerStrategy::PTest => {
                self.respawn(ctx, rng);
                None
            }
            _ if entered => Some(index),
            _ => None,
        }
    }

    fn respawn(&mut self, ctx: &SimContext, rng: &mut SimRng) {
        if let Some(&point) = self.spawn_points.choose(rng) {
            self.movable.teleport(ctx.constrain(point));
            self.goal = self.movable.position;
        }
    }

    /// 従業員の巡回と同じく、目標に着くたびに一様分布の時間だけ待つ
    fn wander(&mut self, ctx: &SimContext, walls: &[Wall], rng: &mut SimRng) {
        if self.movable.is_idle() {
            if self.wander_timer > 0 {
                self.wander_timer -= 1;
                return;
            }

            let Some(goal) = random_free_point(ctx, walls, rng) else {
                return;
            };
            self.goal = goal;
            self.movable.activate();
        }

        self.movable.move_to(self.goal, ctx, walls);

        if self.movable.is_idle() {
            self.wander_timer = self.wander_wait.sample_ticks(rng);
        }
    }
}

impl IMovable for Attacker {
    fn movable(&self) -> &Movable {
        &self.movable
    }

    fn movable_mut(&mut self) -> &mut Movable {
        &mut self.movable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::common::GuardId;
    use crate::scenario::{DoorConfig, TilePoint};
    use rand::SeedableRng;

    fn context() -> SimContext {
        SimContext::new(10.0, 20, 20, 1.0)
    }

    fn config(strategy: &str, behaviour: &str) -> AttackerConfig {
        AttackerConfig {
            spawn_points: vec![TilePoint { x: 1.0, y: 1.0 }],
            behaviour: behaviour.to_string(),
            strategy: strategy.to_string(),
            speed: 1.0,
            attack_speed: Some(2.0),
            stay_period: 1.0,
            attack_period: 2.0,
            min_wander_wait: 0.0,
            max_wander_wait: 0.0,
        }
    }

    /// 常に開いている（開放時間が1日より長い）ドア
    fn open_door(ctx: &SimContext, rng: &mut SimRng) -> Door {
        let config = DoorConfig {
            x: 15.0,
            y: 15.0,
            short_opening_probability: 0.0,
            min_open_time: 100_000.0,
            max_open_time: 100_000.0,
            min_short_open_time: 0.0,
            max_short_open_time: 0.0,
            inter_opening_time: 0.0,
            inter_opening_deviation: 0.0,
        };
        let mut door = Door::new(0, &config, ctx, rng).unwrap();
        door.react(rng);
        assert!(door.is_open());
        door
    }

    #[test]
    fn test_strategy_and_behaviour_parsing() {
        assert_eq!("p-test".parse::<AttackerStrategy>().unwrap(), AttackerStrategy::PTest);
        assert_eq!("QTest".parse::<AttackerStrategy>().unwrap(), AttackerStrategy::QTest);
        assert_eq!("jump".parse::<AttackerBehaviour>().unwrap(), AttackerBehaviour::Jump);

        let ctx = context();
        let mut rng = SimRng::seed_from_u64(1);
        assert_eq!(
            Attacker::new(&config("reckless", "walk"), &ctx, &mut rng).err(),
            Some(ModelError::InvalidAttackerStrategy("reckless".to_string()))
        );
        assert_eq!(
            Attacker::new(&config("normal", "fly"), &ctx, &mut rng).err(),
            Some(ModelError::InvalidAttackerBehaviour("fly".to_string()))
        );
    }

    #[test]
    fn test_missing_spawn_points() {
        let ctx = context();
        let mut rng = SimRng::seed_from_u64(2);
        let mut bad = config("normal", "walk");
        bad.spawn_points.clear();
        assert_eq!(Attacker::new(&bad, &ctx, &mut rng).err(), Some(ModelError::NoSpawnPoints));
    }

    #[test]
    fn test_initial_state() {
        let ctx = context();
        let mut rng = SimRng::seed_from_u64(3);
        let attacker = Attacker::new(&config("normal", "walk"), &ctx, &mut rng).unwrap();
        assert!(attacker.is_staying());
        assert!(!attacker.can_attack());
        assert_eq!(attacker.stay_timer(), 60);
        assert_eq!(attacker.wait_timer(), 120);
        assert_eq!(attacker.position(), Point::new(15.0, 15.0));
    }

    #[test]
    fn test_normal_attacker_wins_through_open_door() {
        let ctx = context();
        let mut rng = SimRng::seed_from_u64(4);
        let mut attacker = Attacker::new(&config("normal", "walk"), &ctx, &mut rng).unwrap();
        let mut doors = vec![open_door(&ctx, &mut rng)];

        let mut reached = None;
        for _ in 0..1000 {
            reached = attacker.update(&mut doors, &ctx, &[], &mut rng);
            if reached.is_some() {
                break;
            }
        }

        assert_eq!(reached, Some(0));
        assert_eq!(doors[0].stats().successes, 1);
        assert_eq!(attacker.stay_timer(), 60);
        assert_eq!(attacker.wait_timer(), 120);
    }

    #[test]
    fn test_jump_teleports_onto_door() {
        let ctx = context();
        let mut rng = SimRng::seed_from_u64(5);
        let mut attacker = Attacker::new(&config("normal", "jump"), &ctx, &mut rng).unwrap();
        let mut doors = vec![open_door(&ctx, &mut rng)];

        // 待機タイマーが切れる最初のティックで突破する
        let mut ticks = 0;
        loop {
            ticks += 1;
            if attacker.update(&mut doors, &ctx, &[], &mut rng).is_some() {
                break;
            }
            assert!(ticks < 200);
        }
        assert_eq!(ticks, 120);
    }

    #[test]
    fn test_ptest_respawns_and_keeps_trying() {
        let ctx = context();
        let mut rng = SimRng::seed_from_u64(6);
        let mut attacker = Attacker::new(&config("p-test", "jump"), &ctx, &mut rng).unwrap();
        let mut doors = vec![open_door(&ctx, &mut rng)];

        for _ in 0..1000 {
            assert_eq!(attacker.update(&mut doors, &ctx, &[], &mut rng), None);
        }
        assert!(doors[0].stats().successes >= 2);
    }

    #[test]
    fn test_qtest_never_attacks() {
        let ctx = context();
        let mut rng = SimRng::seed_from_u64(7);
        let mut attacker = Attacker::new(&config("q-test", "walk"), &ctx, &mut rng).unwrap();
        let mut doors = vec![open_door(&ctx, &mut rng)];

        for _ in 0..1000 {
            assert_eq!(attacker.update(&mut doors, &ctx, &[], &mut rng), None);
        }
        assert_eq!(doors[0].stats().attempts(), 0);
        assert!(!attacker.can_attack());
    }

    #[test]
    fn test_timers_only_decrease_between_resets() {
        let ctx = context();
        let mut rng = SimRng::seed_from_u64(8);
        let mut attacker = Attacker::new(&config("p-test", "walk"), &ctx, &mut rng).unwrap();
        let mut doors = vec![open_door(&ctx, &mut rng)];

        let mut previous = (attacker.wait_timer(), attacker.stay_timer());
        let mut resets = 0;
        for _ in 0..2000 {
            attacker.update(&mut doors, &ctx, &[], &mut rng);
            let current = (attacker.wait_timer(), attacker.stay_timer());
            if current.0 > previous.0 || current.1 > previous.1 {
                // リセットは必ず両方同時
                assert_eq!(current, (120, 60));
                resets += 1;
            }
            previous = current;
        }
        assert!(resets > 0);
    }

    #[test]
    fn test_wander_waits_between_goals() {
        let ctx = context();
        let mut rng = SimRng::seed_from_u64(10);
        let mut wandering = config("q-test", "walk");
        wandering.min_wander_wait = 1.0;
        wandering.max_wander_wait = 1.0;
        let mut attacker = Attacker::new(&wandering, &ctx, &mut rng).unwrap();
        let mut doors = vec![open_door(&ctx, &mut rng)];

        // 最初の目標に到着するまで進める
        let mut arrived = false;
        for _ in 0..2000 {
            let before = attacker.position();
            attacker.update(&mut doors, &ctx, &[], &mut rng);
            if attacker.position() != before && attacker.movable().is_idle() {
                arrived = true;
                break;
            }
        }
        assert!(arrived);

        // 60ティックはその場で待つ
        let resting = attacker.position();
        for _ in 0..60 {
            attacker.update(&mut doors, &ctx, &[], &mut rng);
            assert_eq!(attacker.position(), resting);
        }

        let mut moved = false;
        for _ in 0..2000 {
            attacker.update(&mut doors, &ctx, &[], &mut rng);
            if attacker.position() != resting {
                moved = true;
                break;
            }
        }
        assert!(moved);
    }

    #[test]
    fn test_checked_attacker_is_frozen() {
        let ctx = context();
        let mut rng = SimRng::seed_from_u64(9);
        let mut attacker = Attacker::new(&config("normal", "jump"), &ctx, &mut rng).unwrap();
        let mut doors = vec![open_door(&ctx, &mut rng)];
        attacker.start_check(GuardId(0));

        let start = attacker.position();
        for _ in 0..500 {
            assert_eq!(attacker.update(&mut doors, &ctx, &[], &mut rng), None);
        }
        assert_eq!(attacker.position(), start);
    }
}
