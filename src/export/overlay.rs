//! 領域オーバーレイ描画
//!
//! 各領域をカテゴリ色で半透明に塗り、枠線・グリッド線・凡例を重ねたPNGを作る。
//! 物体検出の結果はボックスとラベルで描く。
//! 文字（領域ID・凡例ラベル・見出し）はフォントが見つかった場合だけ描く。

use crate::error::{AerialError, Result};
use ab_glyph::{FontVec, PxScale};
use aerial_classify_common::taxonomy::parse_hex_color;
use aerial_classify_common::{AnalysisResult, PipelineConfig};
use image::{DynamicImage, Rgba, RgbImage, RgbaImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
    Blend,
};
use imageproc::rect::Rect;
use std::path::Path;

type Canvas = Blend<RgbaImage>;

const FILL_ALPHA: f32 = 0.15;
const GRID_ALPHA: f32 = 0.3;
const PANEL_ALPHA: f32 = 0.85;
const BAR_TRACK_ALPHA: f32 = 0.25;

const WHITE: [u8; 3] = [255, 255, 255];
const BLACK: [u8; 3] = [0, 0, 0];

// 凡例レイアウト（px）
const MARGIN: u32 = 10;
const SWATCH: u32 = 20;
const GAP: u32 = 8;
const BAR_MAX: u32 = 120;
const LABEL_WIDTH: u32 = 140;
const ROW_HEIGHT: u32 = 30;

const LEGEND_TEXT_SIZE: f32 = 14.0;
const HEADER_TEXT_SIZE: f32 = 16.0;
const OBJECT_TEXT_SIZE: f32 = 13.0;

/// フォントを探す場所（先に見つかったものを使う）
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// オーバーレイ描画器（フォントは実行中1回だけ読み込む）
pub struct OverlayRenderer {
    font: Option<FontVec>,
}

impl OverlayRenderer {
    /// 文字なしで描く
    pub fn without_text() -> Self {
        Self { font: None }
    }

    /// フォントを読み込む
    ///
    /// 指定されたフォントが読めなければエラー。指定がなければ既知の場所を探し、
    /// 見つからなければ文字なしで描く。
    pub fn load(font_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = font_path {
            let font = read_font(path)?;
            log::debug!("オーバーレイ用フォント: {}", path.display());
            return Ok(Self { font: Some(font) });
        }

        for candidate in FONT_CANDIDATES {
            let path = Path::new(candidate);
            if !path.exists() {
                continue;
            }
            match read_font(path) {
                Ok(font) => {
                    log::debug!("オーバーレイ用フォント: {}", path.display());
                    return Ok(Self { font: Some(font) });
                }
                Err(e) => log::debug!("{}", e),
            }
        }

        log::debug!("フォントが見つからないため、オーバーレイに文字を描きません");
        Ok(Self::without_text())
    }

    pub fn save(
        &self,
        image: &DynamicImage,
        result: &AnalysisResult,
        config: &PipelineConfig,
        path: &Path,
    ) -> Result<()> {
        self.render(image, result, config)
            .save(path)
            .map_err(|e| AerialError::Overlay(format!("{}: {}", path.display(), e)))
    }

    pub fn render(&self, image: &DynamicImage, result: &AnalysisResult, config: &PipelineConfig) -> RgbImage {
        let mut canvas = Blend(image.to_rgba8());

        for region in &result.regions {
            // 支配カテゴリがなければ最初のカテゴリの色
            let color = region
                .dominant_category
                .as_deref()
                .or_else(|| region.categories.first().map(String::as_str))
                .and_then(|name| config.taxonomy.get(name))
                .and_then(|category| category.rgb());

            if let (Some(color), Some(rect)) = (color, rect(region.x, region.y, region.width, region.height)) {
                draw_filled_rect_mut(&mut canvas, rect, rgba(color, FILL_ALPHA));
                draw_hollow_rect_mut(&mut canvas, rect, rgba(color, 1.0));
            }
        }

        draw_grid_lines(&mut canvas, result);

        if let Some(font) = &self.font {
            for region in &result.regions {
                let scale = PxScale::from((region.width.min(region.height) as f32 / 6.0).clamp(10.0, 20.0));
                draw_text_mut(
                    &mut canvas,
                    rgba(WHITE, 1.0),
                    (region.x + 3) as i32,
                    (region.y + 3) as i32,
                    scale,
                    font,
                    &region.id,
                );
            }
        }

        self.draw_objects(&mut canvas, result, config);
        self.draw_legend(&mut canvas, result, config);
        self.draw_header(&mut canvas, result, config);

        DynamicImage::ImageRgba8(canvas.0).to_rgb8()
    }

    /// 検出物のボックス（2px）と "car 87%" 形式のラベル
    fn draw_objects(&self, canvas: &mut Canvas, result: &AnalysisResult, config: &PipelineConfig) {
        for object in &result.objects {
            let color = config
                .detection
                .as_ref()
                .and_then(|d| d.class(&object.label))
                .and_then(|class| parse_hex_color(&class.color))
                .unwrap_or(WHITE);

            let x = object.x.max(0.0).round() as u32;
            let y = object.y.max(0.0).round() as u32;
            let width = object.width.round().max(1.0) as u32;
            let height = object.height.round().max(1.0) as u32;

            if let Some(outer) = rect(x, y, width, height) {
                draw_hollow_rect_mut(canvas, outer, rgba(color, 1.0));
            }
            if let Some(inner) = rect(x + 1, y + 1, width.saturating_sub(2), height.saturating_sub(2)) {
                draw_hollow_rect_mut(canvas, inner, rgba(color, 1.0));
            }

            if let Some(font) = &self.font {
                let label = format!("{} {:.0}%", object.label, object.score * 100.0);
                let (text_width, text_height) = text_size(PxScale::from(OBJECT_TEXT_SIZE), font, &label);
                let label_y = y.saturating_sub(text_height + 4);
                if let Some(background) = rect(x, label_y, text_width + 4, text_height + 4) {
                    draw_filled_rect_mut(canvas, background, rgba(color, 1.0));
                }
                draw_text_mut(
                    canvas,
                    rgba(WHITE, 1.0),
                    (x + 2) as i32,
                    (label_y + 2) as i32,
                    PxScale::from(OBJECT_TEXT_SIZE),
                    font,
                    &label,
                );
            }
        }
    }

    /// 右上に検出カテゴリの色見本・領域割合のバー・ラベルを描く
    fn draw_legend(&self, canvas: &mut Canvas, result: &AnalysisResult, config: &PipelineConfig) {
        let total = result.aggregate.total_region_count;
        let mut entries: Vec<LegendEntry> = config
            .taxonomy
            .categories()
            .iter()
            .filter(|c| result.has_category(&c.name))
            .filter_map(|c| {
                let regions = result.region_count(&c.name);
                let is_dominant = result.aggregate.dominant_category.as_deref() == Some(c.name.as_str());
                let mut label = format!("{} {}/{}", c.name, regions, total);
                if is_dominant {
                    label.push_str(" *");
                }
                c.rgb().map(|color| LegendEntry {
                    color,
                    bar: Some(regions),
                    is_dominant,
                    label,
                })
            })
            .collect();

        // 検出物カテゴリはバーなし
        if let Some(detection) = &config.detection {
            for category in result.object_categories() {
                let count = result.objects.iter().filter(|o| o.category == category).count();
                let color = detection
                    .classes
                    .iter()
                    .find(|c| c.category == category)
                    .and_then(|c| parse_hex_color(&c.color))
                    .unwrap_or(WHITE);
                entries.push(LegendEntry {
                    color,
                    bar: None,
                    is_dominant: false,
                    label: format!("{} x{}", category, count),
                });
            }
        }

        if entries.is_empty() {
            return;
        }

        let panel_width = MARGIN * 2 + SWATCH + GAP + BAR_MAX + GAP + LABEL_WIDTH;
        let panel_height = MARGIN * 2 + ROW_HEIGHT * entries.len() as u32 - (ROW_HEIGHT - SWATCH);
        let panel_x = canvas.0.width().saturating_sub(panel_width + MARGIN);
        let panel_y = MARGIN;

        if let Some(panel) = rect(panel_x, panel_y, panel_width, panel_height) {
            draw_filled_rect_mut(canvas, panel, rgba(BLACK, PANEL_ALPHA));
        }

        for (index, entry) in entries.iter().enumerate() {
            let row_y = panel_y + MARGIN + ROW_HEIGHT * index as u32;
            let swatch_x = panel_x + MARGIN;
            if let Some(swatch) = rect(swatch_x, row_y, SWATCH, SWATCH) {
                draw_filled_rect_mut(canvas, swatch, rgba(entry.color, 1.0));
                if entry.is_dominant {
                    draw_hollow_rect_mut(canvas, swatch, rgba(WHITE, 1.0));
                }
            }

            let bar_x = swatch_x + SWATCH + GAP;
            if let Some(regions) = entry.bar {
                if let Some(track) = rect(bar_x, row_y + 5, BAR_MAX, SWATCH - 10) {
                    draw_filled_rect_mut(canvas, track, rgba(WHITE, BAR_TRACK_ALPHA));
                }
                let bar_width = if total == 0 {
                    0
                } else {
                    (BAR_MAX as f64 * regions as f64 / total as f64).round() as u32
                };
                if let Some(bar) = rect(bar_x, row_y + 5, bar_width, SWATCH - 10) {
                    draw_filled_rect_mut(canvas, bar, rgba(entry.color, 1.0));
                }
            }

            if let Some(font) = &self.font {
                draw_text_mut(
                    canvas,
                    rgba(WHITE, 1.0),
                    (bar_x + BAR_MAX + GAP) as i32,
                    (row_y + 3) as i32,
                    PxScale::from(LEGEND_TEXT_SIZE),
                    font,
                    &entry.label,
                );
            }
        }
    }

    /// 左下に "<支配カテゴリ> NN.N% | N categories | M objects" を描く
    fn draw_header(&self, canvas: &mut Canvas, result: &AnalysisResult, config: &PipelineConfig) {
        let Some(font) = &self.font else {
            return;
        };

        let text = header_text(result, config);
        let scale = PxScale::from(HEADER_TEXT_SIZE);
        let (text_width, text_height) = text_size(scale, font, &text);
        let panel_height = text_height + GAP * 2;
        let panel_y = canvas.0.height().saturating_sub(panel_height + MARGIN);

        if let Some(panel) = rect(MARGIN, panel_y, text_width + GAP * 2, panel_height) {
            draw_filled_rect_mut(canvas, panel, rgba(BLACK, PANEL_ALPHA));
        }
        draw_text_mut(
            canvas,
            rgba(WHITE, 1.0),
            (MARGIN + GAP) as i32,
            (panel_y + GAP) as i32,
            scale,
            font,
            &text,
        );
    }
}

struct LegendEntry {
    color: [u8; 3],
    /// 領域数（検出物カテゴリは None）
    bar: Option<u32>,
    is_dominant: bool,
    label: String,
}

/// オーバーレイ見出しの文字列
pub fn header_text(result: &AnalysisResult, config: &PipelineConfig) -> String {
    let mut parts = Vec::new();
    if let Some(dominant) = &result.aggregate.dominant_category {
        parts.push(format!("{} {:.1}%", dominant, result.aggregate.dominance_percent));
    }
    parts.push(format!("{} categories", result.aggregate.all_categories.len()));
    if config.detection.is_some() {
        parts.push(format!("{} objects", result.objects.len()));
    }
    parts.join(" | ")
}

fn read_font(path: &Path) -> Result<FontVec> {
    let bytes = std::fs::read(path)
        .map_err(|e| AerialError::Overlay(format!("フォントを読めません {}: {}", path.display(), e)))?;
    FontVec::try_from_vec(bytes)
        .map_err(|e| AerialError::Overlay(format!("フォントが不正です {}: {}", path.display(), e)))
}

/// 空の矩形は描かない
fn rect(x: u32, y: u32, width: u32, height: u32) -> Option<Rect> {
    if width == 0 || height == 0 {
        return None;
    }
    Some(Rect::at(x as i32, y as i32).of_size(width, height))
}

fn rgba(color: [u8; 3], alpha: f32) -> Rgba<u8> {
    Rgba([color[0], color[1], color[2], (alpha * 255.0).round() as u8])
}

/// 領域の境界（画像の外枠を除く）に白線を引く
fn draw_grid_lines(canvas: &mut Canvas, result: &AnalysisResult) {
    let (width, height) = canvas.0.dimensions();
    let color = rgba(WHITE, GRID_ALPHA);

    let mut xs: Vec<u32> = result.regions.iter().map(|r| r.x).filter(|&x| x > 0).collect();
    xs.sort_unstable();
    xs.dedup();
    let mut ys: Vec<u32> = result.regions.iter().map(|r| r.y).filter(|&y| y > 0).collect();
    ys.sort_unstable();
    ys.dedup();

    for &x in &xs {
        draw_line_segment_mut(canvas, (x as f32, 0.0), (x as f32, (height - 1) as f32), color);
    }
    for &y in &ys {
        draw_line_segment_mut(canvas, (0.0, y as f32), ((width - 1) as f32, y as f32), color);
    }
}
