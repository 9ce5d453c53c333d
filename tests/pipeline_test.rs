//! パイプライン結合テスト
//!
//! 色で予測を決める偽の分類器を使い、スキャン → 領域分類 → 集計 → 出力を通しで検証

use aerial_classify_common::taxonomy::{
    BUILDINGS_CONCRETE, BUILDINGS_INFRASTRUCTURE, SOLAR_TECHNICAL, VEGETATION,
};
use aerial_classify_common::{
    Detection, FailureStage, PipelineConfig, Prediction, Preset, RunReport, Taxonomy,
};
use aerial_grid_classify::analyzer::{self, AnalyzeOptions, Classifier, Detector, PredictionCache};
use aerial_grid_classify::error::{AerialError, Result};
use aerial_grid_classify::export::csv::render_csv;
use aerial_grid_classify::export::{export_report, ExportFormat};
use aerial_grid_classify::scanner::scan_folder;
use image::{Rgb, RgbImage};
use std::path::Path;

const GREEN: Rgb<u8> = Rgb([0, 200, 0]);
const RED: Rgb<u8> = Rgb([200, 0, 0]);
const BLUE: Rgb<u8> = Rgb([0, 0, 200]);
const GRAY: Rgb<u8> = Rgb([128, 128, 128]);

/// 入力の平均色で予測を返す。灰色は分類失敗
#[derive(Default)]
struct ColorClassifier {
    calls: usize,
}

impl Classifier for ColorClassifier {
    async fn classify(&mut self, input: &RgbImage, top_k: usize) -> Result<Vec<Prediction>> {
        self.calls += 1;

        let mut sum = [0u64; 3];
        for pixel in input.pixels() {
            for (s, &c) in sum.iter_mut().zip(pixel.0.iter()) {
                *s += c as u64;
            }
        }
        let [r, g, b] = sum;

        let mut predictions = if g > r && g > b {
            vec![Prediction::new("tree", 0.9)?, Prediction::new("corn", 0.01)?]
        } else if r > g && r > b {
            vec![Prediction::new("tile roof", 0.8)?]
        } else if b > r && b > g {
            vec![Prediction::new("solar dish, solar collector, solar furnace", 0.7)?]
        } else {
            return Err(AerialError::Classify("unrecognizable input".into()));
        };
        predictions.truncate(top_k);
        Ok(predictions)
    }
}

/// 決まった検出結果を返す検出器
#[derive(Default)]
struct FixedDetector {
    calls: usize,
    fail: bool,
}

impl Detector for FixedDetector {
    async fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        self.calls += 1;
        if self.fail {
            return Err(AerialError::Classify("detector crashed".into()));
        }
        let (width, height) = (image.width() as f64, image.height() as f64);
        Ok(vec![
            Detection { label: "car".into(), score: 0.9, bbox: [10.0, 10.0, width / 4.0, height / 4.0] },
            Detection { label: "person".into(), score: 0.3, bbox: [0.0, 0.0, 5.0, 5.0] },
            Detection { label: "dog".into(), score: 0.8, bbox: [0.0, 0.0, 5.0, 5.0] },
            Detection { label: "boat".into(), score: 0.41, bbox: [120.0, 120.0, 30.0, 20.0] },
        ])
    }
}

/// 左上=緑、右上=赤、左下=青、右下=灰
fn write_quadrants(path: &Path) {
    let image = RgbImage::from_fn(200, 200, |x, y| match (x < 100, y < 100) {
        (true, true) => GREEN,
        (false, true) => RED,
        (true, false) => BLUE,
        (false, false) => GRAY,
    });
    image.save(path).unwrap();
}

fn two_by_two(preset: Preset) -> PipelineConfig {
    let mut config = preset.config();
    config.grid_size = 2;
    config.whole_image_top_k = None;
    config
}

fn quiet() -> AnalyzeOptions {
    AnalyzeOptions::default()
}

#[tokio::test]
async fn test_analyze_quadrants() {
    let dir = tempfile::tempdir().unwrap();
    write_quadrants(&dir.path().join("quads.png"));

    let images = scan_folder(dir.path()).unwrap();
    let config = two_by_two(Preset::Detail);
    let mut classifier = ColorClassifier::default();

    let report = analyzer::analyze_images(&images, &config, &mut classifier, None, &quiet())
        .await
        .unwrap();

    assert_eq!(classifier.calls, 4);
    assert!(report.failures.is_empty());
    let result = &report.results[0];

    assert_eq!(result.image_id, "quads.png");
    assert_eq!(
        result.aggregate.all_categories,
        vec![VEGETATION, SOLAR_TECHNICAL, BUILDINGS_INFRASTRUCTURE]
    );
    assert_eq!(result.aggregate.active_region_count, 3);
    assert_eq!(result.aggregate.total_region_count, 4);
    assert_eq!(result.region_count(VEGETATION), 1);
    assert_eq!(result.region_count(SOLAR_TECHNICAL), 1);
    assert_eq!(result.region_count(BUILDINGS_INFRASTRUCTURE), 1);
    assert_eq!(result.aggregate.dominant_category, None);

    // 灰色の領域は分類失敗として残る
    assert_eq!(result.failed_region_count(), 1);
    let failed = &result.regions[3];
    assert!(failed.failed);
    assert!(failed.categories.is_empty());
    assert!(failed.top_predictions.is_empty());

    // 植生領域: 0.9 * (1 + 0.2)、確率 0.01 の予測は閾値以下で除外
    let vegetation = &result.regions[0];
    assert_eq!(vegetation.categories, vec![VEGETATION]);
    assert!((vegetation.scores[VEGETATION] - 1.08).abs() < 1e-9);
    assert!((vegetation.confidence - 0.9).abs() < 1e-9);
}

#[tokio::test]
async fn test_failed_images_are_reported_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.jpg"), b"not an image").unwrap();
    write_quadrants(&dir.path().join("quads.png"));
    RgbImage::from_pixel(1, 1, GREEN).save(dir.path().join("tiny.png")).unwrap();

    let images = scan_folder(dir.path()).unwrap();
    assert_eq!(images.len(), 3);

    let config = two_by_two(Preset::Detail);
    let mut classifier = ColorClassifier::default();
    let report = analyzer::analyze_images(&images, &config, &mut classifier, None, &quiet())
        .await
        .unwrap();

    assert_eq!(report.attempted(), 3);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].image_id, "quads.png");

    let stages: Vec<(&str, FailureStage)> = report
        .failures
        .iter()
        .map(|f| (f.image_id.as_str(), f.stage))
        .collect();
    assert_eq!(
        stages,
        vec![("broken.jpg", FailureStage::Load), ("tiny.png", FailureStage::Grid)]
    );

    let summary = report.summarize(&config.taxonomy);
    assert_eq!(summary.analyzed_images, 1);
    assert_eq!(summary.failed_images, 2);
}

#[tokio::test]
async fn test_dominance_tie_goes_to_first_region() {
    let dir = tempfile::tempdir().unwrap();
    write_quadrants(&dir.path().join("quads.png"));

    let images = scan_folder(dir.path()).unwrap();
    let config = two_by_two(Preset::Ultra);
    let mut classifier = ColorClassifier::default();
    let report = analyzer::analyze_images(&images, &config, &mut classifier, None, &quiet())
        .await
        .unwrap();

    let result = &report.results[0];
    assert_eq!(result.aggregate.all_categories, vec![VEGETATION, BUILDINGS_CONCRETE]);
    assert_eq!(result.dominant_region_count(VEGETATION), 1);
    assert_eq!(result.dominant_region_count(BUILDINGS_CONCRETE), 1);
    assert_eq!(result.aggregate.dominant_category.as_deref(), Some(VEGETATION));
    assert!((result.aggregate.dominance_percent - 25.0).abs() < 1e-9);

    let csv = render_csv(&report.results, &config);
    let row = csv.lines().nth(1).unwrap();
    assert_eq!(row, "quads.png,Vegetation; Buildings/Concrete,2,2,1,1,0.50,Vegetation,25.0,1,1,");
}

#[tokio::test]
async fn test_whole_image_pass_adds_categories_without_regions() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::from_pixel(120, 80, GREEN).save(dir.path().join("field.png")).unwrap();

    let images = scan_folder(dir.path()).unwrap();
    let config = Preset::Quadrant.config();
    let mut classifier = ColorClassifier::default();
    let report = analyzer::analyze_images(&images, &config, &mut classifier, None, &quiet())
        .await
        .unwrap();

    // 2x2 領域 + 画像全体
    assert_eq!(classifier.calls, 5);
    let result = &report.results[0];
    assert_eq!(result.whole_image_categories, vec![VEGETATION]);
    assert_eq!(result.region_count(VEGETATION), 4);
    assert_eq!(result.aggregate.total_region_count, 4);
}

#[tokio::test]
async fn test_cache_skips_classifier_on_rerun() {
    let dir = tempfile::tempdir().unwrap();
    write_quadrants(&dir.path().join("quads.png"));
    let images = scan_folder(dir.path()).unwrap();
    let config = two_by_two(Preset::Detail);

    let mut cache = PredictionCache::load(dir.path());
    let mut classifier = ColorClassifier::default();
    let first = analyzer::analyze_images(&images, &config, &mut classifier, Some(&mut cache), &quiet())
        .await
        .unwrap();
    assert_eq!(classifier.calls, 4);
    // 失敗した領域はキャッシュしない
    assert_eq!(cache.len(), 3);
    cache.save(dir.path()).unwrap();

    // 閾値を変えて再実行: 分類器は失敗した領域だけ呼ばれる
    let mut rescored = config.clone();
    rescored.scoring.threshold = 0.85;
    let mut cache = PredictionCache::load(dir.path());
    let mut classifier = ColorClassifier::default();
    let second = analyzer::analyze_images(&images, &rescored, &mut classifier, Some(&mut cache), &quiet())
        .await
        .unwrap();

    assert_eq!(classifier.calls, 1);
    assert_eq!(first.results[0].aggregate.active_region_count, 3);
    // 確率 0.9 の予測だけが閾値を超える
    assert_eq!(second.results[0].aggregate.all_categories, vec![VEGETATION]);
    assert_eq!(second.results[0].aggregate.active_region_count, 1);
}

#[tokio::test]
async fn test_overlay_written_for_each_image() {
    let dir = tempfile::tempdir().unwrap();
    write_quadrants(&dir.path().join("quads.png"));
    let overlay_dir = dir.path().join("annotated");

    let images = scan_folder(dir.path()).unwrap();
    let config = two_by_two(Preset::Detail);
    let options = AnalyzeOptions {
        overlay_dir: Some(overlay_dir.clone()),
        ..Default::default()
    };
    let mut classifier = ColorClassifier::default();
    let report = analyzer::analyze_images(&images, &config, &mut classifier, None, &options)
        .await
        .unwrap();

    let overlay = overlay_dir.join("quads.png.png");
    assert!(overlay.exists());
    assert_eq!(
        report.results[0].overlay_path.as_deref(),
        Some(overlay.display().to_string().as_str())
    );

    let rendered = image::open(&overlay).unwrap().to_rgb8();
    assert_eq!(rendered.dimensions(), (200, 200));
    // 失敗した灰色領域の内側はそのまま
    assert_eq!(rendered.get_pixel(150, 180), &GRAY);
}

#[tokio::test]
async fn test_overlays_for_same_stem_do_not_collide() {
    let dir = tempfile::tempdir().unwrap();
    write_quadrants(&dir.path().join("a.png"));
    write_quadrants(&dir.path().join("a.jpg"));
    let overlay_dir = dir.path().join("annotated");

    let images = scan_folder(dir.path()).unwrap();
    assert_eq!(images.len(), 2);
    let options = AnalyzeOptions {
        overlay_dir: Some(overlay_dir.clone()),
        ..Default::default()
    };
    let mut classifier = ColorClassifier::default();
    let report = analyzer::analyze_images(&images, &two_by_two(Preset::Detail), &mut classifier, None, &options)
        .await
        .unwrap();

    assert_eq!(report.results.len(), 2);
    assert!(overlay_dir.join("a.jpg.png").exists());
    assert!(overlay_dir.join("a.png.png").exists());
    let paths: Vec<Option<&str>> = report.results.iter().map(|r| r.overlay_path.as_deref()).collect();
    assert_ne!(paths[0], paths[1]);
}

#[tokio::test]
async fn test_cache_shared_between_grid_sizes() {
    // 緑は x=100..200 の縦帯だけ、残りは赤
    let dir = tempfile::tempdir().unwrap();
    RgbImage::from_fn(300, 300, |x, _| if (100..200).contains(&x) { GREEN } else { RED })
        .save(dir.path().join("strip.png"))
        .unwrap();
    let images = scan_folder(dir.path()).unwrap();

    let mut cache = PredictionCache::default();
    let mut classifier = ColorClassifier::default();
    let coarse = two_by_two(Preset::Detail);
    analyzer::analyze_images(&images, &coarse, &mut classifier, Some(&mut cache), &quiet())
        .await
        .unwrap();
    assert_eq!(classifier.calls, 4);

    // 3x3 は矩形が異なるのでキャッシュに当たらない
    let mut fine = coarse.clone();
    fine.grid_size = 3;
    let mut classifier = ColorClassifier::default();
    let cached = analyzer::analyze_images(&images, &fine, &mut classifier, Some(&mut cache), &quiet())
        .await
        .unwrap();
    assert_eq!(classifier.calls, 9);
    assert_eq!(cache.len(), 13);

    let uncached = analyzer::analyze_images(&images, &fine, &mut ColorClassifier::default(), None, &quiet())
        .await
        .unwrap();
    assert_eq!(cached, uncached);

    let result = &cached.results[0];
    assert_eq!(result.region_count(VEGETATION), 3);
    let vegetation: Vec<&str> = result
        .regions
        .iter()
        .filter(|r| r.categories.iter().any(|c| c == VEGETATION))
        .map(|r| r.id.as_str())
        .collect();
    assert_eq!(vegetation, vec!["R1C2", "R2C2", "R3C2"]);
}

#[tokio::test]
async fn test_empty_folder_exports_empty_results() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let images = scan_folder(dir.path()).unwrap();
    assert!(images.is_empty());

    let config = Preset::Detail.config();
    let mut classifier = ColorClassifier::default();
    let report = analyzer::analyze_images(&images, &config, &mut classifier, None, &quiet())
        .await
        .unwrap();
    assert_eq!(report, RunReport::default());
    assert_eq!(classifier.calls, 0);

    let written = export_report(&report, &config, Preset::Detail, &ExportFormat::Both, &out).unwrap();
    assert_eq!(written.len(), 2);

    let csv = std::fs::read_to_string(out.join("results.csv")).unwrap();
    assert_eq!(csv, render_csv(&[], &config));
    assert_eq!(csv.lines().count(), 1);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("results.json")).unwrap()).unwrap();
    assert_eq!(json["summary"]["analyzedImages"], 0);
    assert_eq!(json["results"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_detection_adds_objects() {
    let dir = tempfile::tempdir().unwrap();
    write_quadrants(&dir.path().join("quads.png"));
    let images = scan_folder(dir.path()).unwrap();
    let config = two_by_two(Preset::Multi);

    let mut classifier = ColorClassifier::default();
    let mut detector = FixedDetector::default();
    let report = analyzer::analyze_images_with_detector(
        &images,
        &config,
        &mut classifier,
        Some(&mut detector),
        None,
        &quiet(),
    )
    .await
    .unwrap();

    assert_eq!(detector.calls, 1);
    let result = &report.results[0];
    // 閾値 0.4 以下と対応表にないクラスは除外
    let labels: Vec<&str> = result.objects.iter().map(|o| o.label.as_str()).collect();
    assert_eq!(labels, vec!["car", "boat"]);
    assert_eq!(result.objects[0].category, "Vehicles");
    assert_eq!(result.objects[0].width, 50.0);
    assert_eq!(result.object_categories(), vec!["Vehicles", "Boats"]);

    // 検出物は領域カテゴリには入らない
    assert!(!result.aggregate.all_categories.iter().any(|c| c == "Vehicles" || c == "Boats"));

    let csv = render_csv(&report.results, &config);
    let row = csv.lines().nth(1).unwrap();
    assert!(row.ends_with(",2,car 0.90; boat 0.41,0,1,0,1,"));

    let summary = report.summarize(&config.taxonomy);
    assert_eq!(summary.object("Boats").map(|o| o.detections), Some(1));
}

#[tokio::test]
async fn test_detector_failure_keeps_image() {
    let dir = tempfile::tempdir().unwrap();
    write_quadrants(&dir.path().join("quads.png"));
    let images = scan_folder(dir.path()).unwrap();
    let config = two_by_two(Preset::Multi);

    let mut detector = FixedDetector { fail: true, ..Default::default() };
    let report = analyzer::analyze_images_with_detector(
        &images,
        &config,
        &mut ColorClassifier::default(),
        Some(&mut detector),
        None,
        &quiet(),
    )
    .await
    .unwrap();

    assert_eq!(detector.calls, 1);
    assert!(report.failures.is_empty());
    assert!(report.results[0].objects.is_empty());
    assert_eq!(report.results[0].regions.len(), 4);
}

#[tokio::test]
async fn test_detector_unused_without_detection_config() {
    let dir = tempfile::tempdir().unwrap();
    write_quadrants(&dir.path().join("quads.png"));
    let images = scan_folder(dir.path()).unwrap();

    let mut detector = FixedDetector::default();
    let report = analyzer::analyze_images_with_detector(
        &images,
        &two_by_two(Preset::Detail),
        &mut ColorClassifier::default(),
        Some(&mut detector),
        None,
        &quiet(),
    )
    .await
    .unwrap();

    assert_eq!(detector.calls, 0);
    assert!(report.results[0].objects.is_empty());
}

#[tokio::test]
async fn test_results_are_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    write_quadrants(&dir.path().join("quads.png"));
    let images = scan_folder(dir.path()).unwrap();
    let config = two_by_two(Preset::Multi);

    let mut classifier = ColorClassifier::default();
    let first = analyzer::analyze_images(&images, &config, &mut classifier, None, &quiet())
        .await
        .unwrap();
    let second = analyzer::analyze_images(&images, &config, &mut classifier, None, &quiet())
        .await
        .unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_invalid_config_rejected_before_classifying() {
    let dir = tempfile::tempdir().unwrap();
    write_quadrants(&dir.path().join("quads.png"));
    let images = scan_folder(dir.path()).unwrap();

    let mut config = two_by_two(Preset::Detail);
    config.top_k = 0;
    let mut classifier = ColorClassifier::default();
    let result = analyzer::analyze_images(&images, &config, &mut classifier, None, &quiet()).await;

    assert!(matches!(result, Err(AerialError::Core(_))));
    assert_eq!(classifier.calls, 0);

    assert!(Taxonomy::from_json("[]").is_err());
}
