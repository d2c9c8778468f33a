use thiserror::Error;

/// エージェント・レベル構築時のエラー
///
/// 構築に失敗した場合、部分的に作られたエンティティは残りません。
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("無効な従業員の行動: {0} (利用可能: stay, walk)")]
    InvalidEmployeeBehaviour(String),

    #[error("無効なガードの行動: {0} (利用可能: stroll, reset)")]
    InvalidGuardBehaviour(String),

    #[error("無効な侵入者の行動: {0} (利用可能: walk, jump)")]
    InvalidAttackerBehaviour(String),

    #[error("無効な侵入者の戦略: {0} (利用可能: p-test, q-test, normal)")]
    InvalidAttackerStrategy(String),

    #[error("無効なデッドゾーン指定: {0} (利用可能: up, down, left, right, both)")]
    InvalidDeadSide(String),

    #[error("一様分布の範囲が不正です: min={min}, max={max}")]
    InvalidUniformBounds { min: f32, max: f32 },

    #[error("正規分布のパラメータが不正です: mean={mean}, deviation={deviation}")]
    InvalidNormalParameters { mean: f32, deviation: f32 },

    #[error("侵入者のスポーン地点が設定されていません")]
    NoSpawnPoints,

    #[error("ドア {index} の位置 ({x}, {y}) がグリッド外です")]
    DoorOutOfBounds { index: usize, x: f32, y: f32 },

    #[error("ガード {0} に対応する設定がありません")]
    MissingGuardConfig(u32),
}
