//! パイプライン設定とプリセット
//!
//! グリッドサイズ・top-k・閾値・加点係数・支配カテゴリ解析の有無を
//! 1つの設定にまとめる。旧来の4種類の解析はプリセットとして残す。

use crate::detection::DetectionConfig;
use crate::error::{Error, Result};
use crate::grid;
use crate::scorer::ScoringParams;
use crate::taxonomy::Taxonomy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 分類器の入力解像度（正方形）
pub const CLASSIFIER_INPUT_SIZE: u32 = 224;

/// 組み込みプリセット
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// 2x2 + 画像全体パス
    Quadrant,
    /// 3x3、短いキーワード + 物体検出
    Multi,
    /// 4x4、拡張キーワード
    #[default]
    Detail,
    /// 8x8、2カテゴリ + 支配カテゴリ解析
    Ultra,
}

impl Preset {
    pub const ALL: [Preset; 4] = [Preset::Quadrant, Preset::Multi, Preset::Detail, Preset::Ultra];

    pub fn config(self) -> PipelineConfig {
        match self {
            Preset::Quadrant => PipelineConfig {
                grid_size: 2,
                top_k: 10,
                scoring: ScoringParams { threshold: 0.03, bonus_factor: 0.3 },
                dominance: false,
                whole_image_top_k: Some(15),
                detection: None,
                taxonomy: Taxonomy::base_three(),
            },
            Preset::Multi => PipelineConfig {
                grid_size: 3,
                top_k: 5,
                scoring: ScoringParams { threshold: 0.05, bonus_factor: 0.0 },
                dominance: false,
                whole_image_top_k: None,
                detection: Some(DetectionConfig::traffic()),
                taxonomy: Taxonomy::short_three(),
            },
            Preset::Detail => PipelineConfig {
                grid_size: 4,
                top_k: 8,
                scoring: ScoringParams { threshold: 0.02, bonus_factor: 0.2 },
                dominance: false,
                whole_image_top_k: None,
                detection: None,
                taxonomy: Taxonomy::extended_three(),
            },
            Preset::Ultra => PipelineConfig {
                grid_size: 8,
                top_k: 10,
                scoring: ScoringParams { threshold: 0.01, bonus_factor: 0.3 },
                dominance: true,
                whole_image_top_k: None,
                detection: None,
                taxonomy: Taxonomy::vegetation_vs_concrete(),
            },
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Preset::Quadrant => "2x2 quadrants plus a whole-image pass, 3 categories",
            Preset::Multi => "3x3 grid, short keyword lists, 3 categories plus object detection",
            Preset::Detail => "4x4 grid, extended keyword lists, 3 categories",
            Preset::Ultra => "8x8 grid, vegetation vs. concrete with dominance analysis",
        }
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quadrant" | "simple" | "2x2" => Ok(Preset::Quadrant),
            "multi" | "3x3" => Ok(Preset::Multi),
            "detail" | "4x4" => Ok(Preset::Detail),
            "ultra" | "8x8" => Ok(Preset::Ultra),
            _ => Err(format!(
                "Unknown preset: {}. Use quadrant, multi, detail, or ultra",
                s
            )),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preset::Quadrant => write!(f, "quadrant"),
            Preset::Multi => write!(f, "multi"),
            Preset::Detail => write!(f, "detail"),
            Preset::Ultra => write!(f, "ultra"),
        }
    }
}

/// 1回の実行で不変のパイプライン設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    pub grid_size: u32,
    /// 領域ごとに取得する予測数
    pub top_k: usize,
    pub scoring: ScoringParams,
    /// 支配カテゴリ解析を行うか
    pub dominance: bool,
    /// 画像全体を1回分類する場合の予測数
    #[serde(default)]
    pub whole_image_top_k: Option<usize>,
    /// 画像全体の物体検出（None なら行わない）
    #[serde(default)]
    pub detection: Option<DetectionConfig>,
    pub taxonomy: Taxonomy,
}

impl PipelineConfig {
    /// 画像に依存しない設定値の検証
    pub fn validate(&self) -> Result<()> {
        if self.grid_size == 0 {
            return Err(Error::Config("grid size must be at least 1".into()));
        }
        if self.top_k == 0 {
            return Err(Error::Config("top_k must be at least 1".into()));
        }
        if self.whole_image_top_k == Some(0) {
            return Err(Error::Config("whole-image top_k must be at least 1".into()));
        }
        self.scoring.validate()?;
        if let Some(detection) = &self.detection {
            detection.validate()?;
        }
        // 組み込みタクソノミーも同じ規則で再検証
        Taxonomy::new(self.taxonomy.categories().to_vec())?;
        Ok(())
    }

    /// 画像サイズがグリッドに対して十分か検証
    pub fn validate_image(&self, width: u32, height: u32) -> Result<()> {
        grid::validate_dimensions(width, height, self.grid_size)
    }

    pub fn region_count(&self) -> u32 {
        self.grid_size * self.grid_size
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Preset::default().config()
    }
}
