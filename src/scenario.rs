use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::common::{SimContext, TICKS_PER_SECOND};
use crate::statistics::TestType;

/// シナリオメタデータ
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioMeta {
    pub version: String,
    pub name: String,
    pub description: String,
}

/// シミュレーション設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// タイル1枚の一辺（ピクセル）
    pub tile_size: f32,
    pub width_tiles: u32,
    pub height_tiles: u32,
    /// 1日の長さ（分）
    pub day_duration_min: f64,
    pub seed: u64,
    /// バッチあたりの実行回数
    pub iterations: u32,
    pub batches: u32,
    /// "p-test" または "q-test"
    pub test_type: String,
    /// Z検定で比較する観測平均
    pub observed_mean: f64,
    /// Z検定の信頼水準（0.75, 0.90, 0.95, 0.99）
    pub confidence: f64,
    /// 結果ファイルの出力先
    #[serde(default)]
    pub output: Option<PathBuf>,
}

/// タイル単位の座標
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TilePoint {
    pub x: f32,
    pub y: f32,
}

/// 壁設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WallConfig {
    pub start: TilePoint,
    pub end: TilePoint,
    /// デッドゾーンを張る側（up, down, left, right, both）
    #[serde(default)]
    pub dead: Option<String>,
}

/// ドア設定（時間はすべて秒）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DoorConfig {
    pub x: f32,
    pub y: f32,
    pub short_opening_probability: f32,
    pub min_open_time: f32,
    pub max_open_time: f32,
    pub min_short_open_time: f32,
    pub max_short_open_time: f32,
    pub inter_opening_time: f32,
    /// 省略時は1ティック分
    #[serde(default = "default_inter_opening_deviation")]
    pub inter_opening_deviation: f32,
}

fn default_inter_opening_deviation() -> f32 {
    1.0 / TICKS_PER_SECOND as f32
}

/// 侵入者設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AttackerConfig {
    pub spawn_points: Vec<TilePoint>,
    /// "walk" または "jump"
    pub behaviour: String,
    /// "normal", "p-test", "q-test"
    pub strategy: String,
    /// 徘徊時の速度（セル/ティック）
    pub speed: f32,
    /// ドアへ向かう速度（省略時は `speed`）
    #[serde(default)]
    pub attack_speed: Option<f32>,
    /// 侵入試行前の滞在時間（秒）
    pub stay_period: f32,
    /// 侵入試行の間隔（秒）
    pub attack_period: f32,
    /// 徘徊で目標に着いてから次の目標を決めるまでの待ち時間（秒）
    #[serde(default)]
    pub min_wander_wait: f32,
    #[serde(default)]
    pub max_wander_wait: f32,
}

/// 従業員設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmployeesConfig {
    pub number_of_employees: u32,
    /// "stay" または "walk"
    pub behaviour: String,
    pub speed: f32,
    pub min_stay_time: f32,
    pub max_stay_time: f32,
}

/// ガード1人分の設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuardConfig {
    /// "stroll" または "reset"
    pub behaviour: String,
    pub stroll_speed: f32,
    pub check_speed: f32,
    /// 検査半径（タイル）
    pub check_radius: f32,
    pub min_check_time: f32,
    pub max_check_time: f32,
    pub number_of_missions: u32,
    pub min_mission_time: f32,
    pub max_mission_time: f32,
    pub entities_per_check: u32,
}

/// ガード設定
///
/// ガード `i` は `config[i % config.len()]` を使います。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuardsConfig {
    pub number_of_guards: u32,
    #[serde(default)]
    pub config: Vec<GuardConfig>,
}

impl GuardsConfig {
    /// ガードIDに対応する設定
    pub fn for_guard(&self, id: u32) -> Option<&GuardConfig> {
        if self.config.is_empty() {
            return None;
        }
        self.config.get(id as usize % self.config.len())
    }
}

/// 完全なシナリオ設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    pub meta: ScenarioMeta,
    pub sim: SimulationConfig,
    #[serde(default)]
    pub walls: Vec<WallConfig>,
    pub doors: Vec<DoorConfig>,
    pub attacker: AttackerConfig,
    pub employees: EmployeesConfig,
    pub guards: GuardsConfig,
}

impl ScenarioConfig {
    /// YAMLファイルからシナリオ設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();

        // ファイル存在チェック
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path).map_err(|e| ScenarioError::IoError(path.to_path_buf(), e))?;

        let config: ScenarioConfig =
            serde_yaml::from_str(&contents).map_err(|e| ScenarioError::ParseError(path.to_path_buf(), e))?;

        config.validate()?;

        Ok(config)
    }

    /// YAML文字列からシナリオ設定を読み込み
    pub fn from_yaml_str(contents: &str) -> Result<Self, ScenarioError> {
        let config: ScenarioConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// 設定の基本的な検証
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let sim = &self.sim;
        if sim.tile_size <= 0.0 {
            return Err(invalid("tile_size は正の値である必要があります"));
        }
        if sim.width_tiles == 0 || sim.height_tiles == 0 {
            return Err(invalid("グリッドの幅と高さは1以上である必要があります"));
        }
        if sim.day_duration_min <= 0.0 {
            return Err(invalid("day_duration_min は正の値である必要があります"));
        }
        if sim.iterations == 0 || sim.batches == 0 {
            return Err(invalid("iterations と batches は1以上である必要があります"));
        }
        if sim.test_type.parse::<TestType>().is_err() {
            return Err(invalid(format!("不明な検定種別: {}", sim.test_type)));
        }

        for (index, door) in self.doors.iter().enumerate() {
            if !(0.0..=1.0).contains(&door.short_opening_probability) {
                return Err(invalid(format!("ドア {} の short_opening_probability が範囲外です", index)));
            }
            check_range(&format!("ドア {} の開放時間", index), door.min_open_time, door.max_open_time)?;
            check_range(
                &format!("ドア {} の短時間開放", index),
                door.min_short_open_time,
                door.max_short_open_time,
            )?;
            if door.inter_opening_deviation < 0.0 {
                return Err(invalid(format!("ドア {} の inter_opening_deviation が負です", index)));
            }
        }

        if self.attacker.spawn_points.is_empty() {
            return Err(invalid("侵入者のスポーン地点がありません"));
        }
        if self.attacker.stay_period < 0.0 || self.attacker.attack_period < 0.0 {
            return Err(invalid("侵入者の待機時間は0以上である必要があります"));
        }

        check_range("侵入者の徘徊待ち時間", self.attacker.min_wander_wait, self.attacker.max_wander_wait)?;
        check_range("従業員の滞在時間", self.employees.min_stay_time, self.employees.max_stay_time)?;

        if self.guards.number_of_guards > 0 && self.guards.config.is_empty() {
            return Err(invalid("ガードの設定がありません"));
        }
        for (index, guard) in self.guards.config.iter().enumerate() {
            check_range(&format!("ガード設定 {} の検査時間", index), guard.min_check_time, guard.max_check_time)?;
            check_range(
                &format!("ガード設定 {} の任務時間", index),
                guard.min_mission_time,
                guard.max_mission_time,
            )?;
            if guard.number_of_missions == 0 {
                return Err(invalid(format!("ガード設定 {} の number_of_missions は1以上である必要があります", index)));
            }
        }

        Ok(())
    }

    /// シミュレーションコンテキストの構築
    pub fn context(&self) -> SimContext {
        SimContext::new(
            self.sim.tile_size,
            self.sim.width_tiles,
            self.sim.height_tiles,
            self.sim.day_duration_min,
        )
    }

    /// シナリオの概要を表示
    pub fn print_summary(&self) {
        println!("=== シナリオ情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        let ctx = self.context();
        println!("=== シミュレーション設定 ===");
        println!(
            "グリッド: {}x{} タイル (タイルサイズ {:.1})",
            self.sim.width_tiles, self.sim.height_tiles, self.sim.tile_size
        );
        println!("1日の長さ: {:.1}分 ({}ティック)", self.sim.day_duration_min, ctx.day_ticks);
        println!("バッチ数: {} / 実行回数: {}", self.sim.batches, self.sim.iterations);
        println!("検定: {} (信頼水準 {:.2}, 観測平均 {:.4})", self.sim.test_type, self.sim.confidence, self.sim.observed_mean);
        println!("シード値: {}", self.sim.seed);
        println!();

        println!("=== 施設 ===");
        println!("壁: {}枚", self.walls.len());
        println!("ドア: {}枚", self.doors.len());
        for (index, door) in self.doors.iter().enumerate() {
            println!(
                "  ドア{}: ({:.1}, {:.1}) 短時間開放確率 {:.0}%",
                index,
                door.x,
                door.y,
                door.short_opening_probability * 100.0
            );
        }
        println!();

        println!("=== エージェント ===");
        println!(
            "侵入者: 戦略 {} / 行動 {} / スポーン地点 {}箇所",
            self.attacker.strategy,
            self.attacker.behaviour,
            self.attacker.spawn_points.len()
        );
        println!("従業員: {}人 ({})", self.employees.number_of_employees, self.employees.behaviour);
        println!("ガード: {}人", self.guards.number_of_guards);
        for id in 0..self.guards.number_of_guards {
            if let Some(guard) = self.guards.for_guard(id) {
                println!(
                    "  ガード{}: {} / 検査半径 {:.1}タイル / 任務 {}回",
                    id, guard.behaviour, guard.check_radius, guard.number_of_missions
                );
            }
        }
    }
}

fn invalid(message: impl Into<String>) -> ScenarioError {
    ScenarioError::ValidationError(message.into())
}

fn check_range(label: &str, min: f32, max: f32) -> Result<(), ScenarioError> {
    if min < 0.0 || min > max {
        return Err(invalid(format!("{} の範囲が不正です (min={}, max={})", label, min, max)));
    }
    Ok(())
}

/// シナリオ読み込みエラー
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("シナリオファイルが見つかりません: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("ファイル読み込みエラー {}: {}", .0.display(), .1)]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("YAML解析エラー {}: {}", .0.display(), .1)]
    ParseError(PathBuf, #[source] serde_yaml::Error),

    #[error("YAML解析エラー: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("設定検証エラー: {0}")]
    ValidationError(String),
}
