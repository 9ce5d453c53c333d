//! 分類結果の型定義
//!
//! - Prediction: 分類器の出力1件
//! - RegionCategorization: 1領域のカテゴリ判定
//! - ImageAggregate: 1画像の集計

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// カテゴリ名 → 累積スコア
pub type CategoryScores = BTreeMap<String, f64>;

/// 分類器の予測1件（順位はVec内の位置で表す）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub probability: f64,
}

impl Prediction {
    /// 確率が [0, 1] の有限値であることを検証して生成
    pub fn new(label: impl Into<String>, probability: f64) -> Result<Self> {
        let label = label.into();
        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(Error::InvalidPrediction(format!(
                "{}: probability {} out of range",
                label, probability
            )));
        }
        Ok(Self { label, probability })
    }

    pub fn validate(&self) -> Result<()> {
        Self::new(self.label.as_str(), self.probability).map(|_| ())
    }
}

/// 1領域のカテゴリ判定（マルチラベル）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionCategorization {
    /// 検出カテゴリ（タクソノミー定義順）
    pub categories: Vec<String>,
    pub scores: CategoryScores,
    /// 単一予測で最大の寄与を持つカテゴリ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_category: Option<String>,
}

impl RegionCategorization {
    pub fn has(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }

    pub fn is_active(&self) -> bool {
        !self.categories.is_empty()
    }
}

/// 1画像の集計結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAggregate {
    /// 全領域の和集合（タクソノミー定義順）
    pub all_categories: Vec<String>,
    pub region_count_per_category: BTreeMap<String, u32>,
    pub active_region_count: u32,
    pub total_region_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_category: Option<String>,
    #[serde(default)]
    pub dominance_percent: f64,
    /// 領域ごとの支配カテゴリの集計
    #[serde(default)]
    pub dominance_tally: BTreeMap<String, u32>,
}

impl ImageAggregate {
    pub fn region_count(&self, category: &str) -> u32 {
        self.region_count_per_category.get(category).copied().unwrap_or(0)
    }
}
