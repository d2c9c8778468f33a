//! # Simulation モジュール
//!
//! 侵入シミュレーションのモンテカルロ実行ループを提供します。
//!
//! 1回の実行（run）は新しい `Level` を構築し、侵入者がドアを突破するか、
//! ガードに検査されるか、1日分のティックを使い切るまで進めます。
//! 実行結果は `Statistics` に記録され、全バッチ終了後にZ検定を行います。
//!
//! ## 実行順序
//!
//! 1. シナリオのシードでマスター乱数を初期化
//! 2. バッチごとに `Statistics::new_batch()`
//! 3. 各実行のシードをマスター乱数から取り出して `Level` を構築
//! 4. 終端イベントまでティックを進め、`RunResult` を記録
//! 5. バッチの集計を出力、結果ファイル保存、Z検定
//!
//! ## 使用例
//!
//! ```no_run
//! use intrusim::scenario::ScenarioConfig;
//! use intrusim::simulation::SimulationEngine;
//!
//! let config = ScenarioConfig::from_file("scenarios/basic.yaml")?;
//! let mut engine = SimulationEngine::new(config, 1)?;
//! let report = engine.run()?;
//! println!("{}", report.passed);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::path::PathBuf;

use rand::{RngCore, SeedableRng};
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::models::common::GuardId;
use crate::models::error::ModelError;
use crate::models::level::{Level, LevelEvent};
use crate::models::randomizer::SimRng;
use crate::scenario::ScenarioConfig;
use crate::statistics::{RunResult, Statistics, StatisticsError, TestStats, TestType};

/// 1回の実行の終わり方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// 侵入者がドアを突破した
    Won { door: usize },
    /// 侵入者がガードに検査された
    Caught { guard: GuardId },
    /// 1日が終わった
    DayEnded,
}

impl RunOutcome {
    /// 侵入者が捕まらなかったか
    pub fn is_success(&self) -> bool {
        !matches!(self, RunOutcome::Caught { .. })
    }
}

/// 1回分の実行
///
/// # 引数
///
/// * `config` - 検証済みのシナリオ設定
/// * `seed` - この実行の乱数シード
///
/// # 戻り値
///
/// 終わり方と、統計へ渡す実行結果
pub fn run_once(config: &ScenarioConfig, seed: u64) -> Result<(RunOutcome, RunResult), ModelError> {
    let mut level = Level::new(config, seed)?;
    let day_ticks = level.ctx().day_ticks;

    let mut outcome = RunOutcome::DayEnded;
    while level.ticks() < day_ticks {
        match level.tick() {
            LevelEvent::Ongoing => {}
            LevelEvent::ReachedDoor(door) => {
                outcome = RunOutcome::Won { door };
                break;
            }
            LevelEvent::Caught(guard) => {
                outcome = RunOutcome::Caught { guard };
                break;
            }
        }
    }

    let result = RunResult {
        success: outcome.is_success(),
        ticks_elapsed: level.ticks(),
        door_stats: level.door_stats(),
    };
    trace!("実行終了: {:?} ({}ティック)", outcome, result.ticks_elapsed);

    Ok((outcome, result))
}

/// 全バッチ終了後のまとめ
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub test_type: TestType,
    pub runs: u32,
    pub wins: u32,
    pub losses: u32,
    /// 検定に使った標本
    pub stats: TestStats,
    /// Z検定に合格したか
    pub passed: bool,
    /// 結果ファイルを保存した場合はそのパス
    pub output: Option<PathBuf>,
}

/// 実行ループのエラー
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Statistics(#[from] StatisticsError),
}

pub struct SimulationEngine {
    pub scenario_config: ScenarioConfig,
    pub verbose_level: u8,
    statistics: Statistics,
    master_rng: SimRng,
}

impl SimulationEngine {
    /// # 引数
    ///
    /// * `scenario` - 検証済みのシナリオ設定
    /// * `verbose_level` - 詳細出力レベル（0: 集計のみ、1以上: 実行ごとの結果）
    pub fn new(scenario: ScenarioConfig, verbose_level: u8) -> Result<Self, SimulationError> {
        let test_type: TestType = scenario.sim.test_type.parse()?;
        let day_ticks = scenario.context().day_ticks;
        let statistics = Statistics::new(test_type, scenario.sim.iterations, day_ticks);
        let master_rng = SimRng::seed_from_u64(scenario.sim.seed);

        Ok(Self {
            scenario_config: scenario,
            verbose_level,
            statistics,
            master_rng,
        })
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// 全バッチを実行し、集計・保存・Z検定まで行う
    pub fn run(&mut self) -> Result<SimulationReport, SimulationError> {
        let batches = self.scenario_config.sim.batches;
        let iterations = self.scenario_config.sim.iterations;

        info!("=== シミュレーション実行開始 ===");
        info!(
            "{} / {}バッチ x {}回 (seed={})",
            self.statistics.test_type(),
            batches,
            iterations,
            self.scenario_config.sim.seed
        );

        for batch in 0..batches {
            self.statistics.new_batch();
            debug!("バッチ {}/{} 開始", batch + 1, batches);

            for iteration in 0..iterations {
                let seed = self.master_rng.next_u64();
                let (outcome, result) = run_once(&self.scenario_config, seed)?;

                if self.verbose_level > 1 {
                    debug!("実行 {}: {:?} seed={}", iteration + 1, outcome, seed);
                }
                if self.verbose_level > 0 {
                    self.statistics.update_stats(iteration, &result);
                } else {
                    self.statistics.record(&result);
                }
            }

            self.statistics.dump();
        }

        let output = self.scenario_config.sim.output.clone();
        if let Some(path) = &output {
            self.statistics.save(path)?;
        }

        let passed = self
            .statistics
            .z_test(self.scenario_config.sim.confidence, self.scenario_config.sim.observed_mean);

        let (wins, losses) = self
            .statistics
            .batches()
            .iter()
            .fold((0, 0), |(wins, losses), batch| (wins + batch.wins, losses + batch.losses));

        info!("=== シミュレーション完了 ({:.3}秒) ===", self.statistics.elapsed().as_secs_f64());

        Ok(SimulationReport {
            test_type: self.statistics.test_type(),
            runs: wins + losses,
            wins,
            losses,
            stats: self.statistics.get_stats(),
            passed,
            output,
        })
    }
}
