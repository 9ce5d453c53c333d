//! キーワード照合とスコアリング
//!
//! 予測ラベルを小文字化し、各カテゴリのキーワードを部分一致で照合する。
//! 一致があり、かつ確率が閾値を超える（`>`）場合にカテゴリを検出とし、
//! `p × (1 + 一致数 × bonus)` をスコアに加算する。

use crate::error::{Error, Result};
use crate::taxonomy::Taxonomy;
use crate::types::{CategoryScores, Prediction, RegionCategorization};
use serde::{Deserialize, Serialize};

/// スコアリングのパラメータ
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringParams {
    /// 確率の下限（この値を超えたものだけ採用）
    pub threshold: f64,
    /// キーワード1件あたりの加点係数
    pub bonus_factor: f64,
}

impl ScoringParams {
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || !(0.0..1.0).contains(&self.threshold) {
            return Err(Error::Config(format!(
                "threshold must be in [0, 1): {}",
                self.threshold
            )));
        }
        if !self.bonus_factor.is_finite() || self.bonus_factor < 0.0 {
            return Err(Error::Config(format!(
                "bonus factor must be non-negative: {}",
                self.bonus_factor
            )));
        }
        Ok(())
    }

    /// 1予測・1カテゴリの寄与
    pub fn contribution(&self, probability: f64, match_count: usize) -> f64 {
        probability * (1.0 + match_count as f64 * self.bonus_factor)
    }
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            bonus_factor: 0.2,
        }
    }
}

/// 予測リストから領域のカテゴリ判定を作る
///
/// `track_dominance` が false の場合 `dominant_category` は常に `None`。
pub fn score_region(
    predictions: &[Prediction],
    taxonomy: &Taxonomy,
    params: &ScoringParams,
    track_dominance: bool,
) -> RegionCategorization {
    let mut present = vec![false; taxonomy.len()];
    let mut scores = CategoryScores::new();
    let mut best: Option<(usize, f64)> = None;

    for prediction in predictions {
        if prediction.probability <= params.threshold {
            continue;
        }
        let label = prediction.label.to_lowercase();

        for (index, category) in taxonomy.categories().iter().enumerate() {
            let matched = category.matching_keywords(&label);
            if matched.is_empty() {
                continue;
            }

            let contribution = params.contribution(prediction.probability, matched.len());
            present[index] = true;
            *scores.entry(category.name.clone()).or_insert(0.0) += contribution;

            // 同値は先勝ち
            if best.map_or(true, |(_, score)| contribution > score) {
                best = Some((index, contribution));
            }
        }
    }

    let categories = taxonomy
        .categories()
        .iter()
        .zip(&present)
        .filter(|(_, hit)| **hit)
        .map(|(c, _)| c.name.clone())
        .collect();

    let dominant_category = if track_dominance {
        best.map(|(index, _)| taxonomy.categories()[index].name.clone())
    } else {
        None
    };

    RegionCategorization {
        categories,
        scores,
        dominant_category,
    }
}
