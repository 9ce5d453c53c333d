//! JSONレポート出力
//!
//! 実行条件・画像ごとの結果・除外画像・全体統計を1ファイルにまとめる。

use crate::error::Result;
use aerial_classify_common::{
    AnalysisResult, DetectionConfig, ImageFailure, PipelineConfig, Preset, RunReport, RunSummary,
    Taxonomy,
};
use chrono::Local;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// 実行条件
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub generated_at: String,
    /// 基にしたプリセット（個別指定で上書きされた値は下の各項目）
    pub preset: Preset,
    pub grid_size: u32,
    pub top_k: usize,
    pub threshold: f64,
    pub bonus_factor: f64,
    pub dominance: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whole_image_top_k: Option<usize>,
    /// 物体検出の閾値とクラス対応表
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection: Option<DetectionConfig>,
}

impl RunMetadata {
    pub fn new(config: &PipelineConfig, preset: Preset) -> Self {
        Self {
            generated_at: Local::now().to_rfc3339(),
            preset,
            grid_size: config.grid_size,
            top_k: config.top_k,
            threshold: config.scoring.threshold,
            bonus_factor: config.scoring.bonus_factor,
            dominance: config.dominance,
            whole_image_top_k: config.whole_image_top_k,
            detection: config.detection.clone(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    metadata: RunMetadata,
    taxonomy: &'a Taxonomy,
    summary: RunSummary,
    results: &'a [AnalysisResult],
    failures: &'a [ImageFailure],
}

pub fn write_report(
    report: &RunReport,
    config: &PipelineConfig,
    preset: Preset,
    path: &Path,
) -> Result<()> {
    let json = JsonReport {
        metadata: RunMetadata::new(config, preset),
        taxonomy: &config.taxonomy,
        summary: report.summarize(&config.taxonomy),
        results: &report.results,
        failures: &report.failures,
    };

    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, &json)?;
    Ok(())
}
