//! Aerial Classify Common Library
//!
//! 航空写真のグリッド領域分類のコア: タクソノミー、グリッド分割、
//! キーワード照合・スコアリング、画像単位の集計、結果レコード。
//! 分類器やファイル入出力には依存しない。

pub mod aggregate;
pub mod detection;
pub mod error;
pub mod grid;
pub mod preset;
pub mod record;
pub mod scorer;
pub mod summary;
pub mod taxonomy;
pub mod types;

pub use aggregate::{aggregate_regions, dominance, Dominance};
pub use detection::{DetectedObject, Detection, DetectionConfig, ObjectClass};
pub use error::{Error, Result};
pub use grid::{build_grid, region_id, Region, RegionRect};
pub use preset::{PipelineConfig, Preset, CLASSIFIER_INPUT_SIZE};
pub use record::{build_result, AnalysisResult, RegionSummary, ScoredRegion};
pub use scorer::{score_region, ScoringParams};
pub use summary::{CategoryStats, FailureStage, ImageFailure, ImageOutcome, ObjectStats, RunReport, RunSummary};
pub use taxonomy::{Category, Taxonomy};
pub use types::{CategoryScores, ImageAggregate, Prediction, RegionCategorization};
