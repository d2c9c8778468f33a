use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::models::error::ModelError;

/// 1回のシミュレーション実行で共有する乱数生成器
pub type SimRng = ChaCha8Rng;

/// タイマー用の乱数分布
///
/// 一様分布または正規分布をラップし、サンプル値をティック数として
/// 取り出します。乱数生成器は呼び出し側が保持し、毎回渡します。
#[derive(Debug, Clone, Copy)]
pub enum Randomizer {
    /// `[min, max]` の一様分布
    Uniform(Uniform<f32>),
    /// 平均・標準偏差で指定する正規分布
    Normal(Normal<f32>),
}

impl Randomizer {
    /// 一様分布を作成（`min == max` の場合は常に同じ値）
    pub fn uniform(min: f32, max: f32) -> Result<Self, ModelError> {
        if !(min.is_finite() && max.is_finite()) || min > max {
            return Err(ModelError::InvalidUniformBounds { min, max });
        }
        Ok(Randomizer::Uniform(Uniform::new_inclusive(min, max)))
    }

    /// 正規分布を作成
    ///
    /// 負または有限でない標準偏差はエラー
    pub fn normal(mean: f32, deviation: f32) -> Result<Self, ModelError> {
        if !mean.is_finite() || !deviation.is_finite() || deviation < 0.0 {
            return Err(ModelError::InvalidNormalParameters { mean, deviation });
        }
        Normal::new(mean, deviation)
            .map(Randomizer::Normal)
            .map_err(|_| ModelError::InvalidNormalParameters { mean, deviation })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        match self {
            Randomizer::Uniform(dist) => dist.sample(rng),
            Randomizer::Normal(dist) => dist.sample(rng),
        }
    }

    /// サンプル値をティック数として取得（負値は0に丸める）
    pub fn sample_ticks<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        self.sample(rng).round().max(0.0) as u32
    }
}
