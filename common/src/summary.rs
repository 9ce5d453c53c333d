//! 実行全体のレポートと統計
//!
//! 画像ごとの成否を明示的に保持し、最後にカテゴリ別の統計を出す。

use crate::record::AnalysisResult;
use crate::taxonomy::Taxonomy;
use serde::{Deserialize, Serialize};

/// 失敗した処理段階
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureStage {
    /// 画像の読み込み・デコード
    Load,
    /// グリッド分割（画像サイズ不足など）
    Grid,
    /// 領域ループ中
    Analyze,
}

/// 除外された画像
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFailure {
    pub image_id: String,
    pub stage: FailureStage,
    pub message: String,
}

/// 画像1枚の処理結果
#[derive(Debug, Clone)]
pub enum ImageOutcome {
    Analyzed(Box<AnalysisResult>),
    Failed(ImageFailure),
}

/// 実行レポート
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub results: Vec<AnalysisResult>,
    pub failures: Vec<ImageFailure>,
}

impl RunReport {
    pub fn push(&mut self, outcome: ImageOutcome) {
        match outcome {
            ImageOutcome::Analyzed(result) => self.results.push(*result),
            ImageOutcome::Failed(failure) => self.failures.push(failure),
        }
    }

    pub fn attempted(&self) -> usize {
        self.results.len() + self.failures.len()
    }

    pub fn summarize(&self, taxonomy: &Taxonomy) -> RunSummary {
        RunSummary::from_results(&self.results, self.failures.len(), taxonomy)
    }
}

impl FromIterator<ImageOutcome> for RunReport {
    fn from_iter<I: IntoIterator<Item = ImageOutcome>>(iter: I) -> Self {
        let mut report = RunReport::default();
        for outcome in iter {
            report.push(outcome);
        }
        report
    }
}

/// カテゴリ別の統計
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub category: String,
    pub icon: String,
    /// 検出された画像数
    pub images: usize,
    pub image_percent: f64,
    pub average_regions: f64,
    /// 画像の支配カテゴリになった回数
    pub dominant_images: usize,
}

/// 検出物カテゴリ別の統計
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStats {
    pub category: String,
    /// 1つ以上検出された画像数
    pub images: usize,
    /// 全画像の検出数合計
    pub detections: usize,
}

/// 実行全体の統計
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub analyzed_images: usize,
    pub failed_images: usize,
    pub total_regions: usize,
    pub average_active_regions: f64,
    /// 全カテゴリを含む画像数
    pub images_with_all_categories: usize,
    pub categories: Vec<CategoryStats>,
    /// 物体検出の統計（初出順）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<ObjectStats>,
}

impl RunSummary {
    pub fn from_results(results: &[AnalysisResult], failed_images: usize, taxonomy: &Taxonomy) -> Self {
        let n = results.len();
        let ratio = |count: f64| if n == 0 { 0.0 } else { count / n as f64 };

        let categories = taxonomy
            .categories()
            .iter()
            .map(|category| {
                let name = category.name.as_str();
                let images = results.iter().filter(|r| r.has_category(name)).count();
                let regions: u32 = results.iter().map(|r| r.region_count(name)).sum();
                let dominant_images = results
                    .iter()
                    .filter(|r| r.aggregate.dominant_category.as_deref() == Some(name))
                    .count();
                CategoryStats {
                    category: name.to_string(),
                    icon: category.icon.clone(),
                    images,
                    image_percent: 100.0 * ratio(images as f64),
                    average_regions: ratio(regions as f64),
                    dominant_images,
                }
            })
            .collect();

        let active: u32 = results.iter().map(|r| r.aggregate.active_region_count).sum();
        let images_with_all_categories = results
            .iter()
            .filter(|r| taxonomy.names().all(|name| r.has_category(name)))
            .count();

        Self {
            analyzed_images: n,
            failed_images,
            total_regions: results.iter().map(|r| r.regions.len()).sum(),
            average_active_regions: ratio(active as f64),
            images_with_all_categories,
            categories,
            objects: object_stats(results),
        }
    }

    pub fn category(&self, name: &str) -> Option<&CategoryStats> {
        self.categories.iter().find(|c| c.category == name)
    }

    pub fn object(&self, category: &str) -> Option<&ObjectStats> {
        self.objects.iter().find(|o| o.category == category)
    }
}

fn object_stats(results: &[AnalysisResult]) -> Vec<ObjectStats> {
    let mut stats: Vec<ObjectStats> = Vec::new();
    for result in results {
        for category in result.object_categories() {
            let detections = result.objects.iter().filter(|o| o.category == category).count();
            match stats.iter_mut().find(|s| s.category == category) {
                Some(entry) => {
                    entry.images += 1;
                    entry.detections += detections;
                }
                None => stats.push(ObjectStats {
                    category: category.to_string(),
                    images: 1,
                    detections,
                }),
            }
        }
    }
    stats
}
