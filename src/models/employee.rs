use std::str::FromStr;

use rand::Rng;
use tracing::trace;

use crate::models::common::{GuardId, Point, SimContext, Wall};
use crate::models::error::ModelError;
use crate::models::movable::Movable;
use crate::models::navigation::{random_free_point, random_point_where, spawn_point};
use crate::models::randomizer::{Randomizer, SimRng};
use crate::models::traits::{IMovable, Release};
use crate::scenario::EmployeesConfig;

/// 従業員の行動
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmployeeBehaviour {
    /// その場に留まる
    Stay,
    /// ランダムな地点を巡回する
    Walk,
}

impl FromStr for EmployeeBehaviour {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stay" => Ok(EmployeeBehaviour::Stay),
            "walk" => Ok(EmployeeBehaviour::Walk),
            _ => Err(ModelError::InvalidEmployeeBehaviour(s.to_string())),
        }
    }
}

/// 施設内を歩き回る従業員
///
/// ガードの検査対象になるだけで、侵入判定には関与しません。
#[derive(Debug, Clone)]
pub struct Employee {
    pub index: usize,
    movable: Movable,
    behaviour: EmployeeBehaviour,
    goal: Point,
    wait_timer: u32,
    waiting: Randomizer,
}

impl Employee {
    pub fn new(
        index: usize,
        config: &EmployeesConfig,
        ctx: &SimContext,
        walls: &[Wall],
        rng: &mut SimRng,
    ) -> Result<Self, ModelError> {
        let behaviour: EmployeeBehaviour = config.behaviour.parse()?;
        let waiting = Randomizer::uniform(
            SimContext::seconds_to_ticks(config.min_stay_time) as f32,
            SimContext::seconds_to_ticks(config.max_stay_time) as f32,
        )?;

        let position = spawn_point(ctx, walls, rng);

        Ok(Self {
            index,
            movable: Movable::new(position, config.speed),
            behaviour,
            goal: position,
            wait_timer: waiting.sample_ticks(rng),
            waiting,
        })
    }

    pub fn behaviour(&self) -> EmployeeBehaviour {
        self.behaviour
    }

    pub fn wait_timer(&self) -> u32 {
        self.wait_timer
    }

    pub fn goal(&self) -> Point {
        self.goal
    }

    /// 1ティック分の行動
    pub fn update(&mut self, ctx: &SimContext, walls: &[Wall], rng: &mut SimRng) {
        if self.behaviour == EmployeeBehaviour::Stay || self.movable.is_checking() {
            return;
        }

        if self.movable.is_idle() {
            if self.wait_timer > 0 {
                self.wait_timer -= 1;
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
            self.wait_timer = self.waiting.sample_ticks(rng);
        }
    }

    /// 解放したガードの検査範囲外へ向けて、待ち時間なしで移動を始める
    fn move_away<R: Rng + ?Sized>(&mut self, release: &Release<'_>, rng: &mut R) {
        let radius_sq = release.check_radius * release.check_radius;
        let guard = release.guard_position;

        let goal = random_point_where(release.ctx, release.walls, rng, |point| point.distance_sq(&guard) > radius_sq)
            .or_else(|| random_free_point(release.ctx, release.walls, rng));

        if let Some(goal) = goal {
            trace!("従業員{} 検査解除後に移動: ({:.1}, {:.1})", self.index, goal.x, goal.y);
            self.goal = goal;
            self.wait_timer = 0;
            self.movable.clear_path();
            self.movable.activate();
        }
    }
}

impl IMovable for Employee {
    fn movable(&self) -> &Movable {
        &self.movable
    }

    fn movable_mut(&mut self) -> &mut Movable {
        &mut self.movable
    }

    fn stop_check(&mut self, guard: GuardId, release: &Release<'_>, rng: &mut SimRng) -> bool {
        if !self.movable.stop_check(guard) {
            return false;
        }
        if self.behaviour == EmployeeBehaviour::Walk {
            self.move_away(release, rng);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn context() -> SimContext {
        SimContext::new(10.0, 20, 20, 1.0)
    }

    fn config(behaviour: &str) -> EmployeesConfig {
        EmployeesConfig {
            number_of_employees: 1,
            behaviour: behaviour.to_string(),
            speed: 1.0,
            min_stay_time: 0.5,
            max_stay_time: 1.0,
        }
    }

    #[test]
    fn test_behaviour_parsing() {
        assert_eq!("walk".parse::<EmployeeBehaviour>().unwrap(), EmployeeBehaviour::Walk);
        assert_eq!("Stay".parse::<EmployeeBehaviour>().unwrap(), EmployeeBehaviour::Stay);

        let ctx = context();
        let mut rng = SimRng::seed_from_u64(1);
        let result = Employee::new(0, &config("run"), &ctx, &[], &mut rng);
        assert_eq!(result.err(), Some(ModelError::InvalidEmployeeBehaviour("run".to_string())));
    }

    #[test]
    fn test_staying_employee_never_moves() {
        let ctx = context();
        let mut rng = SimRng::seed_from_u64(2);
        let mut employee = Employee::new(0, &config("stay"), &ctx, &[], &mut rng).unwrap();
        let start = employee.position();

        for _ in 0..500 {
            employee.update(&ctx, &[], &mut rng);
        }
        assert_eq!(employee.position(), start);
    }

    #[test]
    fn test_walking_employee_wanders() {
        let ctx = context();
        let mut rng = SimRng::seed_from_u64(3);
        let mut employee = Employee::new(0, &config("walk"), &ctx, &[], &mut rng).unwrap();
        let start = employee.position();

        let mut moved = false;
        for _ in 0..500 {
            employee.update(&ctx, &[], &mut rng);
            moved |= employee.position() != start;
        }
        assert!(moved);
    }

    #[test]
    fn test_release_moves_away_without_waiting() {
        let ctx = context();
        let mut rng = SimRng::seed_from_u64(4);
        let mut employee = Employee::new(0, &config("walk"), &ctx, &[], &mut rng).unwrap();

        assert!(employee.start_check(GuardId(0)));
        let release = Release {
            guard_position: employee.position(),
            check_radius: 50.0,
            ctx: &ctx,
            walls: &[],
        };

        // 別のガードからの解除は無視される
        assert!(!employee.stop_check(GuardId(1), &release, &mut rng));
        assert!(employee.is_checking());

        assert!(employee.stop_check(GuardId(0), &release, &mut rng));
        assert!(!employee.is_checking());
        assert_eq!(employee.wait_timer(), 0);
        assert!(!employee.movable().is_idle());
        assert!(employee.goal().distance(&release.guard_position) > 50.0);
    }
}
