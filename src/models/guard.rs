//! # Guard モジュール
//!
//! 施設内を巡回し、任務中は周囲の移動体を検査するガードを定義します。
//!
//! ## 状態遷移（1ティックごと）
//!
//! 1. 任務待ちタイマーを減らし、0なら任務開始（`Reset` は待機中何もしない）
//! 2. 任務タイマーを減らし、0なら任務終了（検査中の移動体を全て解放）
//! 3. 検査タイマーが残っていればその場で待機
//! 4. 検査時間が終わった移動体を解放
//! 5. 任務中なら検査を試み、検査を始めなかった場合は巡回を続ける

use std::str::FromStr;

use rand::seq::SliceRandom;
use tracing::{debug, trace};

use crate::models::common::{AgentRef, GuardId, Point, SimContext, Wall};
use crate::models::error::ModelError;
use crate::models::movable::Movable;
use crate::models::navigation::{is_visible, random_free_point, spawn_point};
use crate::models::randomizer::{Randomizer, SimRng};
use crate::models::traits::{IMovable, Population, Release};
use crate::scenario::GuardConfig;

/// 巡回先に到着した後の停止ティック数
pub const PATROL_PAUSE_TICKS: u32 = 60;

/// ガードの行動
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardBehaviour {
    /// 任務外も巡回を続ける
    Stroll,
    /// 任務外は動かず、任務終了時に初期位置へ戻る
    Reset,
}

impl FromStr for GuardBehaviour {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stroll" => Ok(GuardBehaviour::Stroll),
            "reset" => Ok(GuardBehaviour::Reset),
            _ => Err(ModelError::InvalidGuardBehaviour(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Guard {
    pub id: GuardId,
    movable: Movable,
    behaviour: GuardBehaviour,
    initial_position: Point,
    goal: Point,

    stroll_speed: f32,
    check_speed: f32,
    /// 検査半径（ピクセル）
    check_radius: f32,
    movables_per_check: usize,

    in_mission: bool,
    mission_timer: u32,
    wait_for_mission: u32,
    inter_mission_period: u32,
    check_timer: u32,
    idle_timer: u32,

    being_checked: Vec<AgentRef>,

    mission: Randomizer,
    check: Randomizer,
}

impl Guard {
    /// 設定からガードを作成
    ///
    /// 任務間隔は1日のティック数を任務回数で割った値で、最初の任務までの
    /// 待ち時間は `[0, 任務間隔]` から一様に引きます。
    pub fn new(
        id: GuardId,
        config: &GuardConfig,
        ctx: &SimContext,
        walls: &[Wall],
        rng: &mut SimRng,
    ) -> Result<Self, ModelError> {
        let behaviour: GuardBehaviour = config.behaviour.parse()?;

        let ticks = |seconds: f32| SimContext::seconds_to_ticks(seconds) as f32;
        let mission = Randomizer::uniform(ticks(config.min_mission_time), ticks(config.max_mission_time))?;
        let check = Randomizer::uniform(ticks(config.min_check_time), ticks(config.max_check_time))?;

        let inter_mission_period = (ctx.day_ticks / u64::from(config.number_of_missions.max(1))) as u32;
        let wait_for_mission = Randomizer::uniform(0.0, inter_mission_period as f32)?.sample_ticks(rng);

        let position = spawn_point(ctx, walls, rng);

        Ok(Self {
            id,
            movable: Movable::new(position, config.stroll_speed),
            behaviour,
            initial_position: position,
            goal: position,
            stroll_speed: config.stroll_speed,
            check_speed: config.check_speed,
            check_radius: config.check_radius * ctx.tile_size,
            movables_per_check: config.entities_per_check as usize,
            in_mission: false,
            mission_timer: 0,
            wait_for_mission,
            inter_mission_period,
            check_timer: 0,
            idle_timer: 0,
            being_checked: Vec::new(),
            mission,
            check,
        })
    }

    pub fn behaviour(&self) -> GuardBehaviour {
        self.behaviour
    }

    pub fn in_mission(&self) -> bool {
        self.in_mission
    }

    pub fn wait_for_mission(&self) -> u32 {
        self.wait_for_mission
    }

    pub fn check_radius(&self) -> f32 {
        self.check_radius
    }

    pub fn initial_position(&self) -> Point {
        self.initial_position
    }

    /// 現在検査中の移動体
    pub fn being_checked(&self) -> &[AgentRef] {
        &self.being_checked
    }

    /// 1ティック分の行動
    pub fn update(&mut self, crowd: &mut dyn Population, ctx: &SimContext, walls: &[Wall], rng: &mut SimRng) {
        if self.wait_for_mission > 0 {
            self.wait_for_mission -= 1;
            if self.behaviour == GuardBehaviour::Reset {
                return;
            }
        } else {
            self.start_mission(rng);
        }

        if self.mission_timer > 0 {
            self.mission_timer -= 1;
        } else {
            self.stop_mission(crowd, ctx, walls, rng);
        }

        if self.check_timer > 0 {
            self.check_timer -= 1;
            return;
        }

        let released = self.release_checks(crowd, ctx, walls, rng);

        // 解放した直後は同じティックで再検査しない
        if self.in_mission && !released && self.perform_check(crowd, walls, rng) {
            return;
        }

        self.patrol(ctx, walls, rng);
    }

    fn start_mission(&mut self, rng: &mut SimRng) {
        if self.in_mission {
            return;
        }

        self.in_mission = true;
        self.movable.speed = self.check_speed;
        self.mission_timer = self.mission.sample_ticks(rng);
        self.check_timer = 0;
        debug!("ガード{} 任務開始: {}ティック", self.id.0, self.mission_timer);
    }

    fn stop_mission(&mut self, crowd: &mut dyn Population, ctx: &SimContext, walls: &[Wall], rng: &mut SimRng) {
        if !self.in_mission {
            return;
        }

        self.in_mission = false;
        self.movable.speed = self.stroll_speed;
        self.wait_for_mission = self.inter_mission_period;
        self.release_checks(crowd, ctx, walls, rng);
        self.check_timer = 0;

        if self.behaviour == GuardBehaviour::Reset {
            self.movable.teleport(self.initial_position);
        }
        debug!("ガード{} 任務終了: 次の任務まで{}ティック", self.id.0, self.wait_for_mission);
    }

    /// 検査中の移動体と自分自身のロックを解除
    ///
    /// # 戻り値
    ///
    /// 解放した移動体があればtrue
    fn release_checks(&mut self, crowd: &mut dyn Population, ctx: &SimContext, walls: &[Wall], rng: &mut SimRng) -> bool {
        let release = Release {
            guard_position: self.movable.position,
            check_radius: self.check_radius,
            ctx,
            walls,
        };

        let released = !self.being_checked.is_empty();
        for agent in self.being_checked.drain(..) {
            if let Some(movable) = crowd.get_mut(agent) {
                movable.stop_check(self.id, &release, rng);
            }
        }
        self.movable.stop_check(self.id);

        if released {
            trace!("ガード{} 検査終了", self.id.0);
        }
        released
    }

    /// 検査半径内で見通しの通る未検査の移動体から、ランダムに検査対象を選ぶ
    ///
    /// # 戻り値
    ///
    /// 検査を開始した場合はtrue
    fn perform_check(&mut self, crowd: &mut dyn Population, walls: &[Wall], rng: &mut SimRng) -> bool {
        let position = self.movable.position;
        let radius_sq = self.check_radius * self.check_radius;

        let candidates: Vec<AgentRef> = crowd
            .agents()
            .into_iter()
            .filter(|agent| {
                crowd.get(*agent).is_some_and(|movable| {
                    let target = movable.position();
                    !movable.is_checking()
                        && position.distance_sq(&target) <= radius_sq
                        && is_visible(position, target, walls)
                })
            })
            .collect();

        if candidates.is_empty() {
            return false;
        }

        let chosen: Vec<AgentRef> = candidates
            .choose_multiple(rng, self.movables_per_check)
            .copied()
            .collect();

        for agent in chosen {
            if crowd.get_mut(agent).is_some_and(|movable| movable.start_check(self.id)) {
                self.being_checked.push(agent);
            }
        }

        if self.being_checked.is_empty() {
            return false;
        }

        self.movable.start_check(self.id);
        self.check_timer = self.check.sample_ticks(rng);
        debug!(
            "ガード{} 検査開始: {:?} ({}ティック)",
            self.id.0, self.being_checked, self.check_timer
        );
        true
    }

    /// 巡回。到着後は任務外であれば少し立ち止まる
    fn patrol(&mut self, ctx: &SimContext, walls: &[Wall], rng: &mut SimRng) {
        if self.movable.is_idle() {
            if self.idle_timer > 0 {
                self.idle_timer -= 1;
                return;
            }

            let Some(goal) = random_free_point(ctx, walls, rng) else {
                return;
            };
            self.goal = goal;
            self.movable.activate();
        }

        self.movable.move_to(self.goal, ctx, walls);

        if self.movable.is_idle() && !self.in_mission {
            self.idle_timer = PATROL_PAUSE_TICKS;
        }
    }
}

impl IMovable for Guard {
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
    use crate::models::employee::Employee;
    use crate::scenario::EmployeesConfig;
    use rand::SeedableRng;

    /// テスト用の従業員だけの集合
    struct Staff(Vec<Employee>);

    impl Population for Staff {
        fn agents(&self) -> Vec<AgentRef> {
            (0..self.0.len()).map(AgentRef::Employee).collect()
        }

        fn get(&self, agent: AgentRef) -> Option<&dyn IMovable> {
            match agent {
                AgentRef::Employee(index) => self.0.get(index).map(|e| e as &dyn IMovable),
                AgentRef::Attacker => None,
            }
        }

        fn get_mut(&mut self, agent: AgentRef) -> Option<&mut dyn IMovable> {
            match agent {
                AgentRef::Employee(index) => self.0.get_mut(index).map(|e| e as &mut dyn IMovable),
                AgentRef::Attacker => None,
            }
        }
    }

    fn context() -> SimContext {
        SimContext::new(10.0, 20, 20, 1.0)
    }

    fn guard_config(behaviour: &str) -> GuardConfig {
        GuardConfig {
            behaviour: behaviour.to_string(),
            stroll_speed: 0.5,
            check_speed: 1.0,
            check_radius: 100.0,
            min_check_time: 1.0,
            max_check_time: 2.0,
            number_of_missions: 1,
            min_mission_time: 10.0,
            max_mission_time: 10.0,
            entities_per_check: 1,
        }
    }

    fn staff(count: usize, ctx: &SimContext, rng: &mut SimRng) -> Staff {
        let config = EmployeesConfig {
            number_of_employees: count as u32,
            behaviour: "walk".to_string(),
            speed: 1.0,
            min_stay_time: 1.0,
            max_stay_time: 2.0,
        };
        Staff((0..count).map(|i| Employee::new(i, &config, ctx, &[], rng).unwrap()).collect())
    }

    fn locked(staff: &Staff) -> usize {
        staff.0.iter().filter(|e| e.is_checking()).count()
    }

    #[test]
    fn test_behaviour_parsing() {
        assert_eq!("reset".parse::<GuardBehaviour>().unwrap(), GuardBehaviour::Reset);
        assert!(matches!(
            "sleep".parse::<GuardBehaviour>(),
            Err(ModelError::InvalidGuardBehaviour(_))
        ));
    }

    #[test]
    fn test_initial_wait_within_inter_mission_period() {
        let ctx = context();
        let mut rng = SimRng::seed_from_u64(1);
        for id in 0..20 {
            let guard = Guard::new(GuardId(id), &guard_config("stroll"), &ctx, &[], &mut rng).unwrap();
            assert!(guard.wait_for_mission() <= 3600);
            assert!(!guard.in_mission());
        }
    }

    #[test]
    fn test_mission_guard_locks_employee_within_one_tick() {
        let ctx = context();
        let mut rng = SimRng::seed_from_u64(2);
        let mut guard = Guard::new(GuardId(0), &guard_config("stroll"), &ctx, &[], &mut rng).unwrap();
        let mut crowd = staff(3, &ctx, &mut rng);

        guard.wait_for_mission = 0;
        guard.update(&mut crowd, &ctx, &[], &mut rng);

        assert!(guard.in_mission());
        assert_eq!(locked(&crowd), 1);
        assert!(guard.is_checking());
        assert_eq!(guard.being_checked().len(), 1);
    }

    #[test]
    fn test_checks_respect_entities_per_check() {
        let ctx = context();
        let mut rng = SimRng::seed_from_u64(3);
        let mut config = guard_config("stroll");
        config.entities_per_check = 2;
        let mut guard = Guard::new(GuardId(0), &config, &ctx, &[], &mut rng).unwrap();
        let mut crowd = staff(5, &ctx, &mut rng);

        guard.wait_for_mission = 0;
        guard.update(&mut crowd, &ctx, &[], &mut rng);
        assert_eq!(locked(&crowd), 2);
    }

    #[test]
    fn test_second_guard_skips_locked_agents() {
        let ctx = context();
        let mut rng = SimRng::seed_from_u64(4);
        let mut first = Guard::new(GuardId(0), &guard_config("stroll"), &ctx, &[], &mut rng).unwrap();
        let mut second = Guard::new(GuardId(1), &guard_config("stroll"), &ctx, &[], &mut rng).unwrap();
        let mut crowd = staff(1, &ctx, &mut rng);

        first.wait_for_mission = 0;
        second.wait_for_mission = 0;
        first.update(&mut crowd, &ctx, &[], &mut rng);
        second.update(&mut crowd, &ctx, &[], &mut rng);

        assert_eq!(crowd.0[0].movable().checking_by(), Some(GuardId(0)));
        assert!(second.being_checked().is_empty());
    }

    #[test]
    fn test_wall_blocks_check() {
        let ctx = context();
        let mut rng = SimRng::seed_from_u64(5);
        let mut guard = Guard::new(GuardId(0), &guard_config("stroll"), &ctx, &[], &mut rng).unwrap();
        let mut crowd = staff(1, &ctx, &mut rng);

        guard.movable.teleport(Point::new(25.0, 105.0));
        crowd.0[0].movable_mut().teleport(Point::new(175.0, 105.0));
        let walls = vec![Wall::new(Point::new(100.0, 0.0), Point::new(100.0, 200.0))];

        guard.wait_for_mission = 0;
        guard.update(&mut crowd, &ctx, &walls, &mut rng);

        assert!(guard.in_mission());
        assert_eq!(locked(&crowd), 0);
    }

    #[test]
    fn test_check_expires_and_releases() {
        let ctx = context();
        let mut rng = SimRng::seed_from_u64(6);
        let mut guard = Guard::new(GuardId(0), &guard_config("stroll"), &ctx, &[], &mut rng).unwrap();
        let mut crowd = staff(1, &ctx, &mut rng);

        guard.wait_for_mission = 0;
        guard.update(&mut crowd, &ctx, &[], &mut rng);
        assert_eq!(locked(&crowd), 1);

        // 検査時間は最大2秒
        for _ in 0..=120 {
            guard.update(&mut crowd, &ctx, &[], &mut rng);
            if locked(&crowd) == 0 {
                break;
            }
        }
        assert_eq!(locked(&crowd), 0);
        assert!(!guard.is_checking());
    }

    #[test]
    fn test_mission_end_releases_and_resets_position() {
        let ctx = context();
        let mut rng = SimRng::seed_from_u64(7);
        let mut config = guard_config("reset");
        config.min_check_time = 60.0;
        config.max_check_time = 60.0;
        let mut guard = Guard::new(GuardId(0), &config, &ctx, &[], &mut rng).unwrap();
        let mut crowd = staff(2, &ctx, &mut rng);

        guard.wait_for_mission = 0;
        guard.update(&mut crowd, &ctx, &[], &mut rng);
        assert_eq!(locked(&crowd), 1);
        guard.movable.position = Point::new(5.0, 5.0);

        // 任務は10秒、検査は60秒なので任務終了で解放される
        for _ in 0..600 {
            guard.update(&mut crowd, &ctx, &[], &mut rng);
        }

        assert!(!guard.in_mission());
        assert_eq!(locked(&crowd), 0);
        assert_eq!(guard.position(), guard.initial_position());
        assert_eq!(guard.wait_for_mission(), 3600);
    }

    #[test]
    fn test_reset_guard_waits_in_place() {
        let ctx = context();
        let mut rng = SimRng::seed_from_u64(8);
        let mut guard = Guard::new(GuardId(0), &guard_config("reset"), &ctx, &[], &mut rng).unwrap();
        let mut crowd = staff(1, &ctx, &mut rng);

        guard.wait_for_mission = 1000;
        let start = guard.position();
        for _ in 0..500 {
            guard.update(&mut crowd, &ctx, &[], &mut rng);
        }
        assert_eq!(guard.position(), start);
        assert_eq!(guard.wait_for_mission(), 500);
    }
}
