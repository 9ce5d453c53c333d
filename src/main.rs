use aerial_grid_classify::{analyzer, cli, config, error, export, scanner};
use aerial_classify_common::{PipelineConfig, Preset, RunReport, RunSummary};
use analyzer::{AnalyzeOptions, PredictionCache, ProcessClassifier};
use clap::Parser;
use cli::{Cli, Commands};
use config::{Config, DETECTOR_ENV};
use error::Result;
use scanner::ImageInfo;
use std::path::PathBuf;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = Config::load()?;

    match cli.command {
        Commands::Analyze { folder, output, preset, overrides, format, use_cache, no_overlay } => {
            println!("🛰  aerial-classify - 領域分類\n");

            let preset = preset.unwrap_or(config.default_preset);
            let mut pipeline = overrides.apply(preset.config())?;

            // 検出器が未設定なら検出なしで続行（出力列も出さない）
            let detector_command = match (&pipeline.detection, config.detector_command()?) {
                (Some(_), Some(command)) => Some(command),
                (Some(_), None) => {
                    log::warn!(
                        "物体検出器が設定されていないため、物体検出を行いません（{} または config --set-detector）",
                        DETECTOR_ENV
                    );
                    pipeline.detection = None;
                    None
                }
                (None, _) => None,
            };

            println!(
                "プリセット: {} ({}x{}グリッド, top-{}, 閾値 {}, 加点 {}{}{})\n",
                preset,
                pipeline.grid_size,
                pipeline.grid_size,
                pipeline.top_k,
                pipeline.scoring.threshold,
                pipeline.scoring.bonus_factor,
                if pipeline.dominance { ", 支配カテゴリ解析" } else { "" },
                if pipeline.detection.is_some() { ", 物体検出" } else { "" }
            );

            // 1. 画像スキャン
            println!("[1/4] 画像をスキャン中...");
            let images = scanner::scan_folder(&folder)?;
            println!("✔ {}枚の画像を検出\n", images.len());

            let output = output.unwrap_or_else(|| folder.clone());
            let options = AnalyzeOptions {
                overlay_dir: (!no_overlay)
                    .then(|| export::output_base_dir(&output).join(export::OVERLAY_DIR_NAME)),
                font_path: config.overlay_font.clone(),
                show_progress: true,
                verbose: cli.verbose,
            };

            let report = if images.is_empty() {
                // 画像がなくてもヘッダーだけの結果ファイルを出す
                log::warn!("{}: 対象の画像がありません。空の結果を出力します", folder.display());
                println!("⚠ 画像がないため解析をスキップします\n");
                RunReport::default()
            } else {
                let mut cache = use_cache.then(|| PredictionCache::load(&folder));
                let report = run_analysis(
                    &config,
                    &images,
                    &pipeline,
                    detector_command.as_deref(),
                    cache.as_mut(),
                    &options,
                    use_cache,
                )
                .await;

                if let Some(cache) = &cache {
                    if let Err(e) = cache.save(&folder) {
                        log::warn!("キャッシュ保存に失敗: {}", e);
                    }
                }

                let report = report?;
                println!(
                    "✔ 解析完了 ({}/{}枚)\n",
                    report.results.len(),
                    report.attempted()
                );
                report
            };

            // 4. 出力
            println!("[4/4] 結果を保存中...");
            for path in export::export_report(&report, &pipeline, preset, &format, &output)? {
                println!("✔ {}", path.display());
            }
            if let Some(dir) = options.overlay_dir.as_ref().filter(|_| !images.is_empty()) {
                println!("✔ オーバーレイ: {}", dir.display());
            }

            print_summary(&report.summarize(&pipeline.taxonomy), &report.failures);
            println!("\n✅ 完了");
        }

        Commands::Presets => {
            println!("プリセット:");
            for preset in Preset::ALL {
                let pipeline = preset.config();
                let marker = if preset == config.default_preset { " (既定)" } else { "" };
                println!("  {}{} - {}", preset, marker, preset.description());
                println!(
                    "    グリッド {}x{}, top-{}, 閾値 {}, 加点 {}, 支配カテゴリ {}, カテゴリ: {}",
                    pipeline.grid_size,
                    pipeline.grid_size,
                    pipeline.top_k,
                    pipeline.scoring.threshold,
                    pipeline.scoring.bonus_factor,
                    if pipeline.dominance { "あり" } else { "なし" },
                    pipeline.taxonomy.names().collect::<Vec<_>>().join(", ")
                );
            }
        }

        Commands::Config { set_classifier, set_detector, set_font, set_preset, show } => {
            let mut config = config;

            if let Some(command) = set_classifier {
                config.set_classifier(&command)?;
                println!("✔ 分類器コマンドを設定しました");
            }

            if let Some(command) = set_detector {
                config.set_detector(&command)?;
                println!("✔ 物体検出器コマンドを設定しました");
            }

            if let Some(path) = set_font {
                config.set_overlay_font(path)?;
                println!("✔ オーバーレイ用フォントを設定しました");
            }

            if let Some(preset) = set_preset {
                config.set_default_preset(preset)?;
                println!("✔ 既定のプリセットを {} に設定しました", preset);
            }

            if show {
                println!("設定:");
                println!(
                    "  分類器: {}",
                    match config.classifier_command() {
                        Ok(command) => command.join(" "),
                        Err(_) => "未設定".to_string(),
                    }
                );
                println!(
                    "  物体検出器: {}",
                    match config.detector_command() {
                        Ok(Some(command)) => command.join(" "),
                        _ => "未設定".to_string(),
                    }
                );
                println!(
                    "  フォント: {}",
                    config
                        .overlay_font
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "自動検出".to_string())
                );
                println!("  既定のプリセット: {}", config.default_preset);
                println!("  起動タイムアウト: {}秒", config.init_timeout_seconds);
                println!("  分類タイムアウト: {}秒", config.classify_timeout_seconds);
            }
        }

        Commands::Cache { clear, folder, info } => {
            let target = folder.unwrap_or_else(|| PathBuf::from("."));
            let cache_path = PredictionCache::cache_path(&target);

            if info || !clear {
                // デフォルトまたは--info: 情報表示
                if cache_path.exists() {
                    let cache = PredictionCache::load(&target);
                    println!("キャッシュ情報:");
                    println!("  パス: {}", cache_path.display());
                    println!("  画像数: {}", cache.image_count());
                    println!("  領域数: {}", cache.len());
                    if let Ok(meta) = std::fs::metadata(&cache_path) {
                        println!("  サイズ: {} bytes", meta.len());
                    }
                } else {
                    println!("キャッシュファイルが存在しません: {}", cache_path.display());
                }
            }

            if clear {
                match PredictionCache::clear(&target) {
                    Ok(true) => println!("✔ キャッシュを削除しました: {}", cache_path.display()),
                    Ok(false) => println!("キャッシュファイルが存在しません"),
                    Err(e) => println!("キャッシュ削除エラー: {}", e),
                }
            }
        }
    }

    Ok(())
}

/// 分類器（と検出器）を起動して解析し、終了処理まで行う
async fn run_analysis(
    config: &Config,
    images: &[ImageInfo],
    pipeline: &PipelineConfig,
    detector_command: Option<&[String]>,
    cache: Option<&mut PredictionCache>,
    options: &AnalyzeOptions,
    use_cache: bool,
) -> Result<RunReport> {
    let init_timeout = Duration::from_secs(config.init_timeout_seconds);
    let call_timeout = Duration::from_secs(config.classify_timeout_seconds);

    // 2. 分類器の起動（失敗したら中断）
    println!("[2/4] 分類器を起動中...");
    let command = config.classifier_command()?;
    let mut classifier = ProcessClassifier::spawn(&command, init_timeout, call_timeout).await?;
    println!("✔ モデル: {}", classifier.model());

    let mut detector = match detector_command {
        Some(command) => match ProcessClassifier::spawn(command, init_timeout, call_timeout).await {
            Ok(detector) => {
                println!("✔ 物体検出モデル: {}", detector.model());
                Some(detector)
            }
            Err(e) => {
                if let Err(e) = classifier.shutdown().await {
                    log::warn!("分類器の終了処理に失敗: {}", e);
                }
                return Err(e);
            }
        },
        None => None,
    };
    println!();

    // 3. 解析
    println!("[3/4] 領域を解析中...{}", if use_cache { " (キャッシュ有効)" } else { "" });
    let report = analyzer::analyze_images_with_detector(
        images,
        pipeline,
        &mut classifier,
        detector.as_mut(),
        cache,
        options,
    )
    .await;

    if let Err(e) = classifier.shutdown().await {
        log::warn!("分類器の終了処理に失敗: {}", e);
    }
    if let Some(detector) = detector {
        if let Err(e) = detector.shutdown().await {
            log::warn!("物体検出器の終了処理に失敗: {}", e);
        }
    }

    report
}

fn print_summary(summary: &RunSummary, failures: &[aerial_classify_common::ImageFailure]) {
    println!("\n📊 集計:");
    println!(
        "  解析: {}枚 / 除外: {}枚 / 領域: {}",
        summary.analyzed_images, summary.failed_images, summary.total_regions
    );
    println!("  平均アクティブ領域: {:.1}", summary.average_active_regions);
    println!("  全カテゴリを含む画像: {}枚", summary.images_with_all_categories);

    for stats in &summary.categories {
        println!(
            "  {} {}: {}枚 ({:.1}%), 平均 {:.1}領域, 支配 {}枚",
            stats.icon,
            stats.category,
            stats.images,
            stats.image_percent,
            stats.average_regions,
            stats.dominant_images
        );
    }

    for stats in &summary.objects {
        println!(
            "  {}: {}枚で検出, 合計 {}件",
            stats.category, stats.images, stats.detections
        );
    }

    if !failures.is_empty() {
        println!("\n⚠ 除外された画像:");
        for failure in failures {
            println!("  {} ({:?}): {}", failure.image_id, failure.stage, failure.message);
        }
    }
}
