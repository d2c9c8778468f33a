//! # Level モジュール
//!
//! 1回の実行で使う全エージェントを所有し、固定順序で1ティックずつ進めます。
//!
//! ## 処理順序
//!
//! 1. 従業員
//! 2. ドア
//! 3. ガード（従業員と侵入者を検査対象として走査）
//! 4. 侵入者
//!
//! ガードが同じティックでかけた検査ロックは、侵入者の行動より先に判定されます。

use std::iter;

use rand::SeedableRng;
use tracing::debug;

use crate::models::attacker::Attacker;
use crate::models::common::{AgentRef, DoorStats, GuardId, Point, SimContext, Wall};
use crate::models::door::Door;
use crate::models::employee::Employee;
use crate::models::error::ModelError;
use crate::models::guard::Guard;
use crate::models::randomizer::SimRng;
use crate::models::traits::{IMovable, Population};
use crate::scenario::ScenarioConfig;

/// 1ティックの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelEvent {
    Ongoing,
    /// 侵入者がドアを突破した
    ReachedDoor(usize),
    /// 侵入者がガードに検査された
    Caught(GuardId),
}

/// ガードから見た検査対象の集合（従業員と侵入者）
struct Crowd<'a> {
    employees: &'a mut [Employee],
    attacker: &'a mut Attacker,
}

impl Population for Crowd<'_> {
    fn agents(&self) -> Vec<AgentRef> {
        (0..self.employees.len())
            .map(AgentRef::Employee)
            .chain(iter::once(AgentRef::Attacker))
            .collect()
    }

    fn get(&self, agent: AgentRef) -> Option<&dyn IMovable> {
        match agent {
            AgentRef::Employee(index) => self.employees.get(index).map(|e| e as &dyn IMovable),
            AgentRef::Attacker => Some(&*self.attacker as &dyn IMovable),
        }
    }

    fn get_mut(&mut self, agent: AgentRef) -> Option<&mut dyn IMovable> {
        match agent {
            AgentRef::Employee(index) => self.employees.get_mut(index).map(|e| e as &mut dyn IMovable),
            AgentRef::Attacker => Some(&mut *self.attacker as &mut dyn IMovable),
        }
    }
}

/// 1回の実行分のシミュレーション状態
pub struct Level {
    ctx: SimContext,
    walls: Vec<Wall>,
    doors: Vec<Door>,
    employees: Vec<Employee>,
    guards: Vec<Guard>,
    attacker: Attacker,
    rng: SimRng,
    ticks: u64,
}

impl Level {
    /// シナリオからレベルを構築
    ///
    /// # 引数
    ///
    /// * `config` - 検証済みのシナリオ設定
    /// * `seed` - この実行専用の乱数シード
    ///
    /// # 戻り値
    ///
    /// 行動・戦略の指定が不正な場合などは `ModelError`
    pub fn new(config: &ScenarioConfig, seed: u64) -> Result<Self, ModelError> {
        let ctx = config.context();
        let mut rng = SimRng::seed_from_u64(seed);

        let walls = build_walls(config, &ctx)?;

        let doors = config
            .doors
            .iter()
            .enumerate()
            .map(|(index, door)| Door::new(index, door, &ctx, &mut rng))
            .collect::<Result<Vec<_>, _>>()?;

        let employees = (0..config.employees.number_of_employees as usize)
            .map(|index| Employee::new(index, &config.employees, &ctx, &walls, &mut rng))
            .collect::<Result<Vec<_>, _>>()?;

        let attacker = Attacker::new(&config.attacker, &ctx, &mut rng)?;

        let guards = (0..config.guards.number_of_guards)
            .map(|id| {
                let guard_config = config.guards.for_guard(id).ok_or(ModelError::MissingGuardConfig(id))?;
                Guard::new(GuardId(id), guard_config, &ctx, &walls, &mut rng)
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "レベル構築: 壁{} ドア{} 従業員{} ガード{} (seed={})",
            walls.len(),
            doors.len(),
            employees.len(),
            guards.len(),
            seed
        );

        Ok(Self {
            ctx,
            walls,
            doors,
            employees,
            guards,
            attacker,
            rng,
            ticks: 0,
        })
    }

    /// 1ティック進める
    pub fn tick(&mut self) -> LevelEvent {
        self.ticks += 1;

        for employee in &mut self.employees {
            employee.update(&self.ctx, &self.walls, &mut self.rng);
        }

        for door in &mut self.doors {
            door.react(&mut self.rng);
        }

        let mut crowd = Crowd {
            employees: &mut self.employees,
            attacker: &mut self.attacker,
        };
        for guard in &mut self.guards {
            guard.update(&mut crowd, &self.ctx, &self.walls, &mut self.rng);
        }

        if let Some(guard) = self.attacker.movable().checking_by() {
            return LevelEvent::Caught(guard);
        }

        match self
            .attacker
            .update(&mut self.doors, &self.ctx, &self.walls, &mut self.rng)
        {
            Some(door) => LevelEvent::ReachedDoor(door),
            None => LevelEvent::Ongoing,
        }
    }

    /// 経過ティック数
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn ctx(&self) -> &SimContext {
        &self.ctx
    }

    pub fn walls(&self) -> &[Wall] {
        &self.walls
    }

    pub fn doors(&self) -> &[Door] {
        &self.doors
    }

    pub fn employees(&self) -> &[Employee] {
        &self.employees
    }

    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    pub fn attacker(&self) -> &Attacker {
        &self.attacker
    }

    /// 全ドアの侵入成功・失敗回数の合計
    pub fn door_stats(&self) -> DoorStats {
        self.doors
            .iter()
            .map(Door::stats)
            .fold(DoorStats::default(), |total, stats| total + stats)
    }
}

fn build_walls(config: &ScenarioConfig, ctx: &SimContext) -> Result<Vec<Wall>, ModelError> {
    config
        .walls
        .iter()
        .map(|wall| {
            let start: Point = ctx.tiles_to_world(wall.start.x, wall.start.y);
            let end: Point = ctx.tiles_to_world(wall.end.x, wall.end.y);
            let line = Wall::new(start, end);
            match &wall.dead {
                Some(side) => Ok(line.with_deadzone(side.parse()?, ctx.tile_size)),
                None => Ok(line),
            }
        })
        .collect()
}
