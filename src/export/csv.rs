//! CSV出力
//!
//! 1画像1行。カテゴリ別の列はタクソノミー定義順に並ぶ。
//! 物体検出が有効な場合は検出数と検出物の列を加える。

use crate::error::Result;
use aerial_classify_common::{AnalysisResult, PipelineConfig};
use std::borrow::Cow;
use std::path::Path;

/// 検出カテゴリの区切り
const CATEGORY_SEPARATOR: &str = "; ";

pub fn write_csv(results: &[AnalysisResult], config: &PipelineConfig, path: &Path) -> Result<()> {
    std::fs::write(path, render_csv(results, config))?;
    Ok(())
}

pub fn render_csv(results: &[AnalysisResult], config: &PipelineConfig) -> String {
    let mut out = String::new();
    push_row(&mut out, &header(config));
    for result in results {
        push_row(&mut out, &row(result, config));
    }
    out
}

fn header(config: &PipelineConfig) -> Vec<String> {
    let taxonomy = &config.taxonomy;
    let mut columns: Vec<String> = vec![
        "image_id".into(),
        "detected_categories".into(),
        "category_count".into(),
        "active_regions".into(),
    ];
    columns.extend(taxonomy.names().map(|name| format!("{} regions", name)));
    columns.push("avg_categories_per_region".into());

    if config.dominance {
        columns.push("dominant_category".into());
        columns.push("dominance_percent".into());
        columns.extend(taxonomy.names().map(|name| format!("{} dominant", name)));
    }

    if let Some(detection) = &config.detection {
        columns.push("object_count".into());
        columns.push("objects".into());
        columns.extend(
            detection
                .categories()
                .into_iter()
                .map(|category| format!("{} objects", category)),
        );
    }

    columns.push("overlay_path".into());
    columns
}

fn row(result: &AnalysisResult, config: &PipelineConfig) -> Vec<String> {
    let taxonomy = &config.taxonomy;
    let aggregate = &result.aggregate;
    let mut fields = vec![
        result.image_id.clone(),
        aggregate.all_categories.join(CATEGORY_SEPARATOR),
        aggregate.all_categories.len().to_string(),
        aggregate.active_region_count.to_string(),
    ];
    fields.extend(taxonomy.names().map(|name| result.region_count(name).to_string()));
    fields.push(format!("{:.2}", result.average_categories_per_region));

    if config.dominance {
        fields.push(aggregate.dominant_category.clone().unwrap_or_default());
        fields.push(format!("{:.1}", aggregate.dominance_percent));
        fields.extend(
            taxonomy
                .names()
                .map(|name| result.dominant_region_count(name).to_string()),
        );
    }

    if let Some(detection) = &config.detection {
        fields.push(result.objects.len().to_string());
        // "car 0.87; person 0.52"
        let objects: Vec<String> = result
            .objects
            .iter()
            .map(|o| format!("{} {:.2}", o.label, o.score))
            .collect();
        fields.push(objects.join(CATEGORY_SEPARATOR));
        fields.extend(detection.categories().into_iter().map(|category| {
            result
                .objects
                .iter()
                .filter(|o| o.category == category)
                .count()
                .to_string()
        }));
    }

    fields.push(result.overlay_path.clone().unwrap_or_default());
    fields
}

fn push_row(out: &mut String, fields: &[String]) {
    let line: Vec<Cow<'_, str>> = fields.iter().map(|f| escape_field(f)).collect();
    out.push_str(&line.join(","));
    out.push('\n');
}

/// カンマ・引用符・改行を含むフィールドだけ引用符で囲む
fn escape_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}
