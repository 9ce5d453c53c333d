//! 画像ごとの結果レコード
//!
//! 集計結果と領域サマリーをまとめた最終出力。CSV/JSON出力と
//! オーバーレイ描画はこのレコードだけを参照する。

use crate::aggregate::aggregate_regions;
use crate::detection::DetectedObject;
use crate::grid::{Region, RegionRect};
use crate::preset::PipelineConfig;
use crate::types::{CategoryScores, ImageAggregate, Prediction, RegionCategorization};
use serde::{Deserialize, Serialize};

/// サマリーに残す上位予測の件数
pub const SUMMARY_TOP_PREDICTIONS: usize = 3;

/// 分類・スコアリング済みの1領域
#[derive(Debug, Clone)]
pub struct ScoredRegion {
    pub region: Region,
    pub predictions: Vec<Prediction>,
    pub categorization: RegionCategorization,
    /// 分類器呼び出しが失敗した領域
    pub failed: bool,
}

/// 出力用の領域サマリー
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionSummary {
    pub id: String,
    pub position: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub categories: Vec<String>,
    pub scores: CategoryScores,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_category: Option<String>,
    pub top_predictions: Vec<Prediction>,
    /// 1位の予測確率
    pub confidence: f64,
    #[serde(default)]
    pub failed: bool,
}

impl RegionSummary {
    pub fn rect(&self) -> RegionRect {
        RegionRect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

/// 1画像の解析結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub image_id: String,

    /// 画像ファイルのパス（オーバーレイ描画で使用）
    #[serde(default)]
    pub file_path: String,

    pub width: u32,
    pub height: u32,
    pub grid_size: u32,

    pub aggregate: ImageAggregate,

    /// 画像全体パスで検出したカテゴリ
    #[serde(default)]
    pub whole_image_categories: Vec<String>,

    pub regions: Vec<RegionSummary>,

    pub average_categories_per_region: f64,

    /// 物体検出で採用された物体（検出なしの設定では空）
    #[serde(default)]
    pub objects: Vec<DetectedObject>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_path: Option<String>,
}

impl AnalysisResult {
    pub fn has_category(&self, category: &str) -> bool {
        self.aggregate.all_categories.iter().any(|c| c == category)
    }

    pub fn region_count(&self, category: &str) -> u32 {
        self.aggregate.region_count(category)
    }

    /// 支配カテゴリが `category` の領域数
    pub fn dominant_region_count(&self, category: &str) -> u32 {
        self.aggregate.dominance_tally.get(category).copied().unwrap_or(0)
    }

    pub fn failed_region_count(&self) -> usize {
        self.regions.iter().filter(|r| r.failed).count()
    }

    /// 検出物のカテゴリ（出現順、重複なし）
    pub fn object_categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = Vec::new();
        for object in &self.objects {
            if !categories.contains(&object.category.as_str()) {
                categories.push(&object.category);
            }
        }
        categories
    }
}

/// 領域結果から画像レコードを組み立てる
pub fn build_result(
    image_id: &str,
    width: u32,
    height: u32,
    config: &PipelineConfig,
    scored: &[ScoredRegion],
    whole_image: Option<&RegionCategorization>,
) -> AnalysisResult {
    let categorizations: Vec<RegionCategorization> =
        scored.iter().map(|s| s.categorization.clone()).collect();
    let mut aggregate = aggregate_regions(&categorizations, &config.taxonomy, config.dominance);

    let whole_image_categories = whole_image
        .map(|w| w.categories.clone())
        .unwrap_or_default();
    merge_whole_image(&mut aggregate, &whole_image_categories, config);

    let total_categories: usize = categorizations.iter().map(|c| c.categories.len()).sum();
    let average_categories_per_region = if scored.is_empty() {
        0.0
    } else {
        total_categories as f64 / scored.len() as f64
    };

    let regions = scored
        .iter()
        .map(|s| summarize_region(s, config.grid_size))
        .collect();

    AnalysisResult {
        image_id: image_id.to_string(),
        file_path: String::new(),
        width,
        height,
        grid_size: config.grid_size,
        aggregate,
        whole_image_categories,
        regions,
        average_categories_per_region,
        objects: Vec::new(),
        overlay_path: None,
    }
}

// 画像全体パスのカテゴリは和集合にだけ加え、領域数には数えない
fn merge_whole_image(aggregate: &mut ImageAggregate, extra: &[String], config: &PipelineConfig) {
    if extra.is_empty() {
        return;
    }
    let mut merged: Vec<String> = config
        .taxonomy
        .names()
        .filter(|name| {
            aggregate.all_categories.iter().any(|c| c == name) || extra.iter().any(|c| c == name)
        })
        .map(str::to_string)
        .collect();
    for name in aggregate.all_categories.iter().chain(extra) {
        if !merged.contains(name) {
            merged.push(name.clone());
        }
    }
    aggregate.all_categories = merged;
}

fn summarize_region(scored: &ScoredRegion, grid_size: u32) -> RegionSummary {
    let region = &scored.region;
    RegionSummary {
        id: region.id.clone(),
        position: region.position_label(grid_size),
        x: region.rect.x,
        y: region.rect.y,
        width: region.rect.width,
        height: region.rect.height,
        categories: scored.categorization.categories.clone(),
        scores: scored.categorization.scores.clone(),
        dominant_category: scored.categorization.dominant_category.clone(),
        top_predictions: scored
            .predictions
            .iter()
            .take(SUMMARY_TOP_PREDICTIONS)
            .cloned()
            .collect(),
        confidence: scored.predictions.first().map(|p| p.probability).unwrap_or(0.0),
        failed: scored.failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::build_grid;
    use crate::preset::Preset;
    use crate::scorer::score_region;
    use crate::taxonomy::{BUILDINGS_CONCRETE, BUILDINGS_INFRASTRUCTURE, SOLAR_TECHNICAL, VEGETATION};

    fn pred(label: &str, probability: f64) -> Prediction {
        Prediction::new(label, probability).unwrap()
    }

    fn scored_regions(config: &PipelineConfig, predictions: &[Vec<Prediction>]) -> Vec<ScoredRegion> {
        let regions = build_grid(400, 400, config.grid_size).unwrap();
        regions
            .into_iter()
            .zip(predictions)
            .map(|(region, preds)| ScoredRegion {
                categorization: score_region(preds, &config.taxonomy, &config.scoring, config.dominance),
                predictions: preds.clone(),
                region,
                failed: false,
            })
            .collect()
    }

    #[test]
    fn test_build_result_detail() {
        let config = Preset::Detail.config();
        let mut predictions = vec![Vec::new(); 16];
        predictions[0] = vec![pred("tree", 0.9), pred("house", 0.05)];
        predictions[5] = vec![pred("solar dish, solar collector, solar furnace", 0.6)];
        predictions[15] = vec![pred("goldfish", 0.8)];

        let scored = scored_regions(&config, &predictions);
        let result = build_result("a.jpg", 400, 400, &config, &scored, None);

        assert_eq!(result.image_id, "a.jpg");
        assert_eq!(result.regions.len(), 16);
        assert_eq!(
            result.aggregate.all_categories,
            vec![VEGETATION, SOLAR_TECHNICAL, BUILDINGS_INFRASTRUCTURE]
        );
        assert_eq!(result.aggregate.active_region_count, 2);
        assert!((result.average_categories_per_region - 3.0 / 16.0).abs() < 1e-9);
        assert_eq!(result.regions[0].id, "R1C1");
        assert_eq!(result.regions[0].position, "top-left");
        assert_eq!(result.regions[0].confidence, 0.9);
        assert_eq!(result.regions[15].confidence, 0.8);
        assert!(result.regions[15].categories.is_empty());
        assert_eq!(result.aggregate.dominant_category, None);
    }

    #[test]
    fn test_build_result_ultra_dominance() {
        let config = Preset::Ultra.config();
        let mut predictions = vec![Vec::new(); 64];
        for p in predictions.iter_mut().take(10) {
            *p = vec![pred("tile roof", 0.4)];
        }
        for p in predictions.iter_mut().skip(10).take(3) {
            *p = vec![pred("tree", 0.4)];
        }

        let scored = scored_regions(&config, &predictions);
        let result = build_result("b.jpg", 400, 400, &config, &scored, None);

        assert_eq!(result.aggregate.dominant_category.as_deref(), Some(BUILDINGS_CONCRETE));
        assert!((result.aggregate.dominance_percent - 100.0 * 10.0 / 64.0).abs() < 1e-9);
        assert_eq!(result.dominant_region_count(BUILDINGS_CONCRETE), 10);
        assert_eq!(result.dominant_region_count(VEGETATION), 3);
    }

    #[test]
    fn test_top_predictions_truncated() {
        let config = Preset::Detail.config();
        let many: Vec<Prediction> = (0..8).map(|i| pred(&format!("label{}", i), 0.1)).collect();
        let mut predictions = vec![Vec::new(); 16];
        predictions[0] = many;
        let scored = scored_regions(&config, &predictions);
        let result = build_result("c.jpg", 400, 400, &config, &scored, None);
        assert_eq!(result.regions[0].top_predictions.len(), SUMMARY_TOP_PREDICTIONS);
    }

    #[test]
    fn test_whole_image_categories_not_counted_as_regions() {
        let config = Preset::Quadrant.config();
        let predictions = vec![vec![pred("tree", 0.5)], Vec::new(), Vec::new(), Vec::new()];
        let scored = scored_regions(&config, &predictions);
        let whole = score_region(&[pred("radio telescope", 0.4)], &config.taxonomy, &config.scoring, false);

        let result = build_result("d.jpg", 400, 400, &config, &scored, Some(&whole));
        assert_eq!(result.aggregate.all_categories, vec![VEGETATION, SOLAR_TECHNICAL]);
        assert_eq!(result.region_count(SOLAR_TECHNICAL), 0);
        assert_eq!(result.whole_image_categories, vec![SOLAR_TECHNICAL]);
        assert!(result.has_category(SOLAR_TECHNICAL));
    }

    #[test]
    fn test_zero_regions() {
        let config = Preset::Detail.config();
        let result = build_result("e.jpg", 0, 0, &config, &[], None);
        assert!(result.aggregate.all_categories.is_empty());
        assert_eq!(result.aggregate.active_region_count, 0);
        assert_eq!(result.average_categories_per_region, 0.0);
        assert_eq!(result.aggregate.dominant_category, None);
    }

    #[test]
    fn test_result_serialize_camel_case() {
        let config = Preset::Detail.config();
        let result = build_result("f.jpg", 0, 0, &config, &[], None);
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"imageId\":\"f.jpg\""));
        assert!(json.contains("\"averageCategoriesPerRegion\":0.0"));
        assert!(!json.contains("overlayPath"));
    }
}
