//! # Statistics モジュール
//!
//! 実行ごとの結果を集計し、モンテカルロ推定量とZ検定を提供します。
//!
//! ## 推定量
//!
//! - **p値**: ドア侵入の成功数 / 試行数（試行なしは0）
//! - **q値**: 実行終了までの経過ティック / 1日のティック数
//!
//! ## 標本の選び方
//!
//! - バッチが1つ（長期実行法）: 実行ごとの標本をそのまま使う
//! - バッチが複数（バッチ法）: バッチごとに1つの集計値を使う
//!
//! 分散は母分散（標本数で割る）です。

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::models::common::DoorStats;

/// 信頼水準とZ臨界値の対応表
const Z_TABLE: [(&str, f64); 4] = [("0.75", 1.15), ("0.90", 1.64), ("0.95", 1.96), ("0.99", 2.57)];

/// 信頼水準に対応するZ臨界値
pub fn z_critical(confidence: f64) -> Option<f64> {
    let key = format!("{:.2}", confidence);
    Z_TABLE.iter().find(|(level, _)| *level == key).map(|(_, z)| *z)
}

/// 推定する指標
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestType {
    /// ドア突破率
    PTest,
    /// 経過時間の割合
    QTest,
}

impl FromStr for TestType {
    type Err = StatisticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "p-test" | "ptest" | "p" => Ok(TestType::PTest),
            "q-test" | "qtest" | "q" => Ok(TestType::QTest),
            _ => Err(StatisticsError::UnknownTestType(s.to_string())),
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestType::PTest => write!(f, "p-test"),
            TestType::QTest => write!(f, "q-test"),
        }
    }
}

/// 1回の実行結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunResult {
    /// 侵入者が捕まらなかった
    pub success: bool,
    pub ticks_elapsed: u64,
    pub door_stats: DoorStats,
}

impl RunResult {
    /// この実行のドア突破率（試行なしは0）
    pub fn p_value(&self) -> f64 {
        ratio(u64::from(self.door_stats.successes), u64::from(self.door_stats.failures))
    }
}

fn ratio(entered: u64, blocked: u64) -> f64 {
    if entered + blocked == 0 {
        return 0.0;
    }
    entered as f64 / (entered + blocked) as f64
}

/// バッチ単位の集計
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameStats {
    pub wins: u32,
    pub losses: u32,
    pub doors_entered: u64,
    pub doors_blocked: u64,
    pub p_samples: Vec<f64>,
    pub q_samples: Vec<f64>,
    win_ticks: u64,
    loss_ticks: u64,
}

impl GameStats {
    /// 実行結果を1件追加
    pub fn record(&mut self, result: &RunResult, day_ticks: u64) {
        if result.success {
            self.wins += 1;
            self.win_ticks += result.ticks_elapsed;
        } else {
            self.losses += 1;
            self.loss_ticks += result.ticks_elapsed;
        }

        self.doors_entered += u64::from(result.door_stats.successes);
        self.doors_blocked += u64::from(result.door_stats.failures);

        self.p_samples.push(result.p_value());
        self.q_samples.push(if day_ticks == 0 {
            0.0
        } else {
            result.ticks_elapsed as f64 / day_ticks as f64
        });
    }

    pub fn runs(&self) -> u32 {
        self.wins + self.losses
    }

    /// バッチ全体のドア突破率
    pub fn p_value(&self) -> f64 {
        ratio(self.doors_entered, self.doors_blocked)
    }

    /// バッチ内のq標本の平均
    pub fn q_value(&self) -> f64 {
        mean(&self.q_samples)
    }

    /// 勝利した実行の平均経過ティック
    pub fn avg_win_ticks(&self) -> f64 {
        average(self.win_ticks, self.wins)
    }

    /// 敗北した実行の平均経過ティック
    pub fn avg_loss_ticks(&self) -> f64 {
        average(self.loss_ticks, self.losses)
    }
}

fn average(total: u64, count: u32) -> f64 {
    if count == 0 {
        return 0.0;
    }
    total as f64 / f64::from(count)
}

/// 標本の平均（空なら0）
pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// 標本の母分散（空なら0）
pub fn variance(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let m = mean(samples);
    samples.iter().map(|s| (s - m).powi(2)).sum::<f64>() / samples.len() as f64
}

/// Z検定の結果
#[derive(Debug, Clone, PartialEq)]
pub struct ZTestReport {
    pub observed: f64,
    pub mean: f64,
    pub variance: f64,
    pub samples: usize,
    pub z_value: f64,
    pub critical: f64,
    pub passed: bool,
}

impl fmt::Display for ZTestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  観測平均: {:.6}", self.observed)?;
        writeln!(f, "  推定平均: {:.6}", self.mean)?;
        writeln!(f, "  推定分散: {:.6}", self.variance)?;
        writeln!(f, "  標本数: {}", self.samples)?;
        write!(
            f,
            "  判定: {:.4} < {:.4} => {}",
            self.z_value,
            self.critical,
            if self.passed { "合格" } else { "不合格" }
        )
    }
}

/// 検定に使う標本と、その平均・分散
#[derive(Debug, Clone, PartialEq)]
pub struct TestStats {
    pub mean: f64,
    pub variance: f64,
    pub samples: Vec<f64>,
}

impl TestStats {
    pub fn from_samples(samples: Vec<f64>) -> Self {
        Self {
            mean: mean(&samples),
            variance: variance(&samples),
            samples,
        }
    }

    /// 結果ファイル（平均、分散、以降1行1標本）を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StatisticsError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| StatisticsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut values = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value = line.parse::<f64>().map_err(|_| StatisticsError::Malformed {
                path: path.to_path_buf(),
                line: index + 1,
                content: line.to_string(),
            })?;
            values.push(value);
        }

        if values.len() < 2 {
            return Err(StatisticsError::Truncated(path.to_path_buf()));
        }

        let samples = values.split_off(2);
        Ok(Self {
            mean: values[0],
            variance: values[1],
            samples,
        })
    }

    /// 結果ファイルへ書き出し
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StatisticsError> {
        let path = path.as_ref();
        let io_error = |source| StatisticsError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let mut contents = format!("{}\n{}\n", self.mean, self.variance);
        for sample in &self.samples {
            contents.push_str(&format!("{}\n", sample));
        }
        fs::write(path, contents).map_err(io_error)
    }

    /// Z検定 `z = |observed - mean| / sqrt(variance / n)`
    ///
    /// # 戻り値
    ///
    /// 信頼水準が表にない場合、または標本がない場合は `None`
    pub fn z_test(&self, confidence: f64, observed: f64) -> Option<ZTestReport> {
        let critical = z_critical(confidence)?;
        if self.samples.is_empty() {
            return None;
        }

        let deviation = (self.variance / self.samples.len() as f64).sqrt();
        let difference = (observed - self.mean).abs();
        let z_value = if deviation > 0.0 {
            difference / deviation
        } else if difference == 0.0 {
            0.0
        } else {
            f64::INFINITY
        };

        Some(ZTestReport {
            observed,
            mean: self.mean,
            variance: self.variance,
            samples: self.samples.len(),
            z_value,
            critical,
            passed: z_value < critical,
        })
    }
}

/// 全バッチの集計
#[derive(Debug)]
pub struct Statistics {
    test_type: TestType,
    iterations: u32,
    day_ticks: u64,
    batches: Vec<GameStats>,
    started: Instant,
}

impl Statistics {
    pub fn new(test_type: TestType, iterations: u32, day_ticks: u64) -> Self {
        Self {
            test_type,
            iterations,
            day_ticks,
            batches: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn test_type(&self) -> TestType {
        self.test_type
    }

    /// 新しいバッチを開始
    pub fn new_batch(&mut self) {
        self.batches.push(GameStats::default());
    }

    pub fn batches(&self) -> &[GameStats] {
        &self.batches
    }

    pub fn current(&self) -> Option<&GameStats> {
        self.batches.last()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// 実行結果を現在のバッチへ記録（バッチ未開始なら開始する）
    pub fn record(&mut self, result: &RunResult) {
        if self.batches.is_empty() {
            self.new_batch();
        }
        let day_ticks = self.day_ticks;
        if let Some(stats) = self.batches.last_mut() {
            stats.record(result, day_ticks);
        }
    }

    /// 記録して試行ごとの進捗を出力
    pub fn update_stats(&mut self, iteration: u32, result: &RunResult) {
        self.record(result);
        let Some(stats) = self.current() else {
            return;
        };

        match self.test_type {
            TestType::PTest => info!("試行 {}/{}: p={:.6}", iteration + 1, self.iterations, result.p_value()),
            TestType::QTest => info!(
                "試行 {}/{}: q={:.6}",
                iteration + 1,
                self.iterations,
                stats.q_samples.last().copied().unwrap_or_default()
            ),
        }
    }

    /// 現在のバッチの集計をログ出力
    pub fn dump(&self) {
        let Some(stats) = self.current() else {
            return;
        };
        let seconds_per_tick = 1.0 / f64::from(crate::models::common::TICKS_PER_SECOND);

        info!("=========================================");
        info!("バッチ {}: 侵入者の勝利 {}回 / 敗北 {}回", self.batches.len(), stats.wins, stats.losses);
        info!("ドア突破 {}回 / 阻止 {}回", stats.doors_entered, stats.doors_blocked);
        info!("平均勝利時間 {:.2}秒", stats.avg_win_ticks() * seconds_per_tick);
        info!("平均敗北時間 {:.2}秒", stats.avg_loss_ticks() * seconds_per_tick);
        info!("p値 = {:.6}", stats.p_value());
        info!("q値 = {:.6}", stats.q_value());
        info!("=========================================");
    }

    /// 検定に使う標本を選び、平均と分散を計算
    pub fn get_stats(&self) -> TestStats {
        let samples: Vec<f64> = if self.batches.len() > 1 {
            self.batches
                .iter()
                .map(|batch| match self.test_type {
                    TestType::PTest => batch.p_value(),
                    TestType::QTest => batch.q_value(),
                })
                .collect()
        } else {
            self.current()
                .map(|batch| match self.test_type {
                    TestType::PTest => batch.p_samples.clone(),
                    TestType::QTest => batch.q_samples.clone(),
                })
                .unwrap_or_default()
        };

        TestStats::from_samples(samples)
    }

    /// バッチ法か長期実行法か
    pub fn method_name(&self) -> &'static str {
        if self.batches.len() > 1 { "バッチ法" } else { "長期実行法" }
    }

    /// Z検定を実行して結果をログ出力
    ///
    /// # 戻り値
    ///
    /// 合格ならtrue。信頼水準が不明な場合は警告を出してfalse
    pub fn z_test(&self, confidence: f64, observed: f64) -> bool {
        if z_critical(confidence).is_none() {
            warn!("不明な信頼水準: {:.2} (利用可能: 0.75, 0.90, 0.95, 0.99)", confidence);
            return false;
        }

        match self.get_stats().z_test(confidence, observed) {
            Some(report) => {
                info!("Z検定 ({}, {}, 信頼水準 {:.2}):\n{}", self.test_type, self.method_name(), confidence, report);
                report.passed
            }
            None => {
                warn!("標本がないためZ検定を実行できません");
                false
            }
        }
    }

    /// 検定用の標本を結果ファイルへ保存
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StatisticsError> {
        info!("シミュレーション完了: {:.3}秒", self.elapsed().as_secs_f64());
        info!("結果を保存: {}", path.as_ref().display());
        self.get_stats().save(path)
    }
}

/// 統計処理のエラー
#[derive(Debug, Error)]
pub enum StatisticsError {
    #[error("不明な検定種別: {0} (利用可能: p-test, q-test)")]
    UnknownTestType(String),

    #[error("結果ファイルの入出力エラー {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("結果ファイル {} の {line} 行目が数値ではありません: {content}", .path.display())]
    Malformed { path: PathBuf, line: usize, content: String },

    #[error("結果ファイル {} には平均と分散の2行が必要です", .0.display())]
    Truncated(PathBuf),
}
