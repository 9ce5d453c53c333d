pub mod cache;
pub mod classifier;
pub mod process;

pub use cache::PredictionCache;
pub use classifier::{prepare_input, Classifier, Detector, NoDetector};
pub use process::ProcessClassifier;

use crate::error::{AerialError, Result};
use crate::export::overlay::OverlayRenderer;
use crate::scanner::ImageInfo;
use aerial_classify_common::{
    build_grid, build_result, score_region, AnalysisResult, DetectedObject, DetectionConfig,
    FailureStage, ImageFailure, ImageOutcome, PipelineConfig, Prediction, RegionRect, RunReport,
    ScoredRegion,
};
use cache::compute_file_hash;
use image::DynamicImage;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

/// 解析オプション
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// オーバーレイ画像の出力先（None なら描画しない）
    pub overlay_dir: Option<PathBuf>,
    /// オーバーレイの文字に使うフォント（None なら既知の場所を探す）
    pub font_path: Option<PathBuf>,
    pub show_progress: bool,
    pub verbose: bool,
}

/// 予測キャッシュと対象画像のハッシュ
pub struct CacheContext<'a> {
    pub cache: &'a mut PredictionCache,
    pub image_hash: String,
}

/// 1画像を解析する
///
/// 領域は行優先で1つずつ分類する。分類器の失敗はその領域だけを
/// 予測なしとして扱い、画像の処理は続ける。
pub async fn analyze_image<C: Classifier>(
    image_id: &str,
    image: &DynamicImage,
    config: &PipelineConfig,
    classifier: &mut C,
    mut cache: Option<CacheContext<'_>>,
) -> Result<AnalysisResult> {
    let (width, height) = (image.width(), image.height());
    let regions = build_grid(width, height, config.grid_size)?;

    let mut scored = Vec::with_capacity(regions.len());
    for region in regions {
        let (predictions, failed) = classify_region(
            image_id,
            image,
            region.rect,
            &region.id,
            config.top_k,
            classifier,
            cache.as_mut(),
        )
        .await;

        let categorization = score_region(&predictions, &config.taxonomy, &config.scoring, config.dominance);
        log::debug!(
            "{} {}: {:?} (予測{}件)",
            image_id,
            region.id,
            categorization.categories,
            predictions.len()
        );

        scored.push(ScoredRegion {
            region,
            predictions,
            categorization,
            failed,
        });
    }

    let whole_image = match config.whole_image_top_k {
        Some(top_k) => {
            let rect = RegionRect { x: 0, y: 0, width, height };
            let (predictions, _) = classify_region(
                image_id,
                image,
                rect,
                "全体",
                top_k,
                classifier,
                cache.as_mut(),
            )
            .await;
            Some(score_region(&predictions, &config.taxonomy, &config.scoring, false))
        }
        None => None,
    };

    Ok(build_result(
        image_id,
        width,
        height,
        config,
        &scored,
        whole_image.as_ref(),
    ))
}

async fn classify_region<C: Classifier>(
    image_id: &str,
    image: &DynamicImage,
    rect: RegionRect,
    region_id: &str,
    top_k: usize,
    classifier: &mut C,
    cache: Option<&mut CacheContext<'_>>,
) -> (Vec<Prediction>, bool) {
    let key = cache
        .as_ref()
        .map(|c| PredictionCache::key(&c.image_hash, rect, top_k));

    if let (Some(ctx), Some(key)) = (cache.as_ref(), key.as_ref()) {
        if let Some(predictions) = ctx.cache.get(key) {
            return (predictions.to_vec(), false);
        }
    }

    let input = prepare_input(image, rect);
    match classifier.classify(&input, top_k).await {
        Ok(predictions) => {
            if let (Some(ctx), Some(key)) = (cache, key) {
                ctx.cache.insert(key, image_id, predictions.clone());
            }
            (predictions, false)
        }
        Err(e) => {
            log::warn!("{} {}: 分類に失敗、予測なしとして続行: {}", image_id, region_id, e);
            (Vec::new(), true)
        }
    }
}

/// 物体検出を画像全体に掛け、閾値と対応表で絞り込む
///
/// 検出器の失敗は警告を出して検出なしとして扱う。
pub async fn detect_objects<D: Detector>(
    image_id: &str,
    image: &DynamicImage,
    detection: &DetectionConfig,
    detector: &mut D,
) -> Vec<DetectedObject> {
    match detector.detect(&image.to_rgb8()).await {
        Ok(detections) => {
            let objects = detection.filter(&detections);
            log::debug!(
                "{}: 検出{}件のうち{}件を採用",
                image_id,
                detections.len(),
                objects.len()
            );
            objects
        }
        Err(e) => {
            log::warn!("{}: 物体検出に失敗、検出なしとして続行: {}", image_id, e);
            Vec::new()
        }
    }
}

/// 画像を順番に解析してレポートを作る（物体検出なし）
///
/// 画像単位の失敗はログに出してレポートに記録し、次の画像へ進む。
pub async fn analyze_images<C: Classifier>(
    images: &[ImageInfo],
    config: &PipelineConfig,
    classifier: &mut C,
    cache: Option<&mut PredictionCache>,
    options: &AnalyzeOptions,
) -> Result<RunReport> {
    analyze_images_with_detector::<C, NoDetector>(images, config, classifier, None, cache, options).await
}

/// 画像を順番に解析してレポートを作る
///
/// 設定に物体検出があり検出器が渡された場合だけ、画像ごとに検出する。
pub async fn analyze_images_with_detector<C: Classifier, D: Detector>(
    images: &[ImageInfo],
    config: &PipelineConfig,
    classifier: &mut C,
    mut detector: Option<&mut D>,
    mut cache: Option<&mut PredictionCache>,
    options: &AnalyzeOptions,
) -> Result<RunReport> {
    config.validate()?;

    if config.detection.is_some() && detector.is_none() {
        log::warn!("物体検出器がないため、物体検出を行いません");
    }

    let renderer = match &options.overlay_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            Some(OverlayRenderer::load(options.font_path.as_deref())?)
        }
        None => None,
    };

    let progress = if options.show_progress {
        let pb = ProgressBar::new(images.len() as u64);
        if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}") {
            pb.set_style(style);
        }
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut report = RunReport::default();

    for image_info in images {
        progress.set_message(image_info.file_name.clone());
        let outcome = analyze_one(
            image_info,
            config,
            classifier,
            detector.as_deref_mut(),
            cache.as_deref_mut(),
            renderer.as_ref(),
            options,
        )
        .await;

        match &outcome {
            ImageOutcome::Analyzed(result) => {
                if options.verbose {
                    progress.println(format!(
                        "  {}: {}カテゴリ / {}/{}領域 / 物体{}件",
                        result.image_id,
                        result.aggregate.all_categories.len(),
                        result.aggregate.active_region_count,
                        result.aggregate.total_region_count,
                        result.objects.len()
                    ));
                }
            }
            ImageOutcome::Failed(failure) => {
                log::error!("{}: {}", failure.image_id, failure.message);
            }
        }

        report.push(outcome);
        progress.inc(1);
    }

    progress.finish_and_clear();
    Ok(report)
}

async fn analyze_one<C: Classifier, D: Detector>(
    image_info: &ImageInfo,
    config: &PipelineConfig,
    classifier: &mut C,
    detector: Option<&mut D>,
    cache: Option<&mut PredictionCache>,
    renderer: Option<&OverlayRenderer>,
    options: &AnalyzeOptions,
) -> ImageOutcome {
    let image_id = image_info.file_name.as_str();
    let failed = |stage: FailureStage, message: String| {
        ImageOutcome::Failed(ImageFailure {
            image_id: image_id.to_string(),
            stage,
            message,
        })
    };

    let image = match image::open(&image_info.path) {
        Ok(image) => image,
        Err(e) => return failed(FailureStage::Load, AerialError::ImageLoad(e.to_string()).to_string()),
    };

    if let Err(e) = config.validate_image(image.width(), image.height()) {
        return failed(FailureStage::Grid, e.to_string());
    }

    let cache_context = match cache {
        Some(cache) => match compute_file_hash(&image_info.path) {
            Ok(image_hash) => Some(CacheContext { cache, image_hash }),
            Err(e) => {
                log::warn!("{}: ハッシュ計算に失敗、キャッシュを使いません: {}", image_id, e);
                None
            }
        },
        None => None,
    };

    let mut result = match analyze_image(image_id, &image, config, classifier, cache_context).await {
        Ok(result) => result,
        Err(e) => return failed(FailureStage::Analyze, e.to_string()),
    };
    result.file_path = image_info.path.display().to_string();

    if let (Some(detection), Some(detector)) = (&config.detection, detector) {
        result.objects = detect_objects(image_id, &image, detection, detector).await;
    }

    if let (Some(dir), Some(renderer)) = (&options.overlay_dir, renderer) {
        let path = dir.join(image_info.overlay_file_name());
        match renderer.save(&image, &result, config, &path) {
            Ok(()) => result.overlay_path = Some(path.display().to_string()),
            Err(e) => log::warn!("{}: オーバーレイ生成に失敗: {}", image_id, e),
        }
    }

    ImageOutcome::Analyzed(Box::new(result))
}
