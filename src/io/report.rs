//! Shareable session report
//!
//! A fixed-size portrait canvas: a header with the overall score gauge, a 2x2
//! grid with one panel per direction (skeleton overlay, or the plain preview,
//! or a placeholder for failed views) with a score bar and a caption band
//! under each panel. Text (including each view's message or error) is drawn
//! only when a font is configured; the same text always goes to
//! `Report::lines`, which `save` writes next to the PNG.

use crate::domain::result::{DirectionalResult, SessionSummary};
use crate::domain::types::ShotDirection;
use crate::error::CompositionError;
use crate::infra::config::Config;
use crate::services::scorer::ScoreTier;
use ab_glyph::{FontArc, PxScale};
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MIN_REPORT_WIDTH: u32 = 400;
pub const MIN_REPORT_HEIGHT: u32 = 600;

const BACKGROUND: Rgba<u8> = Rgba([24, 26, 32, 255]);
const PANEL: Rgba<u8> = Rgba([44, 47, 56, 255]);
const TRACK: Rgba<u8> = Rgba([70, 74, 86, 255]);
const PLACEHOLDER: Rgba<u8> = Rgba([90, 40, 40, 255]);
const TEXT: Rgba<u8> = Rgba([235, 235, 240, 255]);

/// Gauge color for a score band
pub fn tier_color(tier: ScoreTier) -> Rgba<u8> {
    match tier {
        ScoreTier::VeryGood => Rgba([72, 199, 116, 255]),
        ScoreTier::Good => Rgba([66, 153, 225, 255]),
        ScoreTier::Fair => Rgba([237, 162, 54, 255]),
        ScoreTier::Poor => Rgba([229, 62, 62, 255]),
    }
}

/// Pixel geometry derived from the canvas size
#[derive(Debug, Clone, Copy)]
struct Layout {
    margin: u32,
    header_h: u32,
    gauge: (u32, u32, u32, u32),
    grid_top: u32,
    panel_w: u32,
    panel_h: u32,
    bar_h: u32,
    caption_h: u32,
    footer_top: u32,
}

impl Layout {
    /// `None` when the aspect ratio leaves no room for the gauge or the panels
    fn new(width: u32, height: u32) -> Option<Self> {
        let margin = width / 20;
        let header_h = height * 3 / 20;
        let gauge_w = width.checked_sub(2 * margin)?;
        let gauge_h = (header_h / 5).max(4);
        let gauge_y = header_h.checked_sub(gauge_h)?.checked_sub(margin / 2)?;
        let footer_top = height - height / 5;
        let grid_top = header_h + margin / 2;
        let bar_h = (height / 80).max(4);
        let caption_h = body_px(height) + 4;
        let panel_w = width.checked_sub(3 * margin)? / 2;
        let row_h = footer_top.checked_sub(grid_top)? / 2;
        let panel_h = row_h.checked_sub(bar_h + caption_h + margin / 2)?;
        if panel_w == 0 || panel_h == 0 {
            return None;
        }
        Some(Self {
            margin,
            header_h,
            gauge: (margin, gauge_y, gauge_w, gauge_h),
            grid_top,
            panel_w,
            panel_h,
            bar_h,
            caption_h,
            footer_top,
        })
    }

    /// Top-left corner of the panel for a direction
    fn panel_origin(&self, direction: ShotDirection) -> (u32, u32) {
        let idx = direction.index() as u32;
        let (col, row) = (idx % 2, idx / 2);
        let x = self.margin + col * (self.panel_w + self.margin);
        let y = self.grid_top + row * (self.panel_h + self.bar_h + self.caption_h + self.margin / 2);
        (x, y)
    }

    /// Top of the caption band under a panel's score bar
    fn caption_top(&self, direction: ShotDirection) -> u32 {
        let (_, y) = self.panel_origin(direction);
        y + self.panel_h + self.bar_h + 2
    }
}

/// Body text height in pixels for a canvas height
fn body_px(height: u32) -> u32 {
    (height / 60).max(10)
}

/// Composed report: the raster and its plain-text rendition
#[derive(Debug, Clone)]
pub struct Report {
    pub image: RgbaImage,
    pub lines: Vec<String>,
}

impl Report {
    /// Write `path` as PNG and the text lines to the same path with `.txt`.
    /// Returns the sidecar path.
    pub fn save(&self, path: &Path) -> Result<PathBuf, CompositionError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.image.save_with_format(path, ImageFormat::Png)?;
        let sidecar = path.with_extension("txt");
        let mut text = self.lines.join("\n");
        text.push('\n');
        std::fs::write(&sidecar, text)?;
        info!(path = %path.display(), sidecar = %sidecar.display(), "report_saved");
        Ok(sidecar)
    }
}

/// Score and message of one view, or why it has none
fn view_text(item: Option<&DirectionalResult>) -> String {
    let Some(item) = item else {
        return "not captured".to_string();
    };
    match (item.scored(), item.error()) {
        (Some(view), _) => format!("{} - {}", view.score, view.message),
        (None, Some(error)) => format!("failed - {error}"),
        (None, None) => "pending".to_string(),
    }
}

/// Text lines describing a session, in display order
pub fn report_lines(items: &[DirectionalResult], summary: &SessionSummary) -> Vec<String> {
    let mut lines = Vec::with_capacity(8 + summary.findings.len() + summary.advice.len());
    lines.push("Posture report".to_string());
    match summary.overall_score {
        Some(score) => lines.push(format!("Overall: {} ({})", score, summary.headline)),
        None => lines.push(format!("Overall: n/a ({})", summary.headline)),
    }
    lines.push(summary.message.clone());

    for direction in ShotDirection::ALL {
        let item = items.iter().find(|i| i.direction == direction);
        lines.push(format!("{direction}: {}", view_text(item)));
    }

    if !summary.findings.is_empty() {
        lines.push("Findings:".to_string());
        lines.extend(summary.findings.iter().map(|f| format!("- {}", f.label())));
    }
    lines.push("Advice:".to_string());
    lines.extend(summary.advice.iter().map(|a| format!("- {a}")));
    lines
}

/// Draws session reports
pub struct ReportComposer {
    width: u32,
    height: u32,
    font: Option<FontArc>,
}

impl ReportComposer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, font: None }
    }

    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    /// Composer sized by `[report]`, loading the configured font if any
    pub fn from_config(config: &Config) -> Result<Self, CompositionError> {
        let composer = Self::new(config.report_width(), config.report_height());
        match config.report_font_path() {
            Some(path) => {
                let data = std::fs::read(path)
                    .map_err(|e| CompositionError::Font(format!("{path}: {e}")))?;
                let font = FontArc::try_from_vec(data)
                    .map_err(|e| CompositionError::Font(format!("{path}: {e}")))?;
                Ok(composer.with_font(font))
            }
            None => Ok(composer),
        }
    }

    pub fn compose(
        &self,
        items: &[DirectionalResult],
        summary: &SessionSummary,
    ) -> Result<Report, CompositionError> {
        let too_small = CompositionError::CanvasTooSmall { width: self.width, height: self.height };
        if self.width < MIN_REPORT_WIDTH || self.height < MIN_REPORT_HEIGHT {
            return Err(too_small);
        }
        let layout = Layout::new(self.width, self.height).ok_or(too_small)?;
        let mut canvas = RgbaImage::from_pixel(self.width, self.height, BACKGROUND);

        let (gx, gy, gw, gh) = layout.gauge;
        fill(&mut canvas, gx, gy, gw, gh, TRACK);
        if let Some(score) = summary.overall_score {
            let filled = gw * u32::from(score) / 100;
            fill(&mut canvas, gx, gy, filled, gh, tier_color(ScoreTier::from_score(score)));
        }

        for direction in ShotDirection::ALL {
            let item = items.iter().find(|i| i.direction == direction);
            self.draw_panel(&mut canvas, &layout, direction, item);
        }

        let lines = report_lines(items, summary);
        if let Some(font) = &self.font {
            self.draw_text(&mut canvas, &layout, font, items, &lines);
        }

        debug!(
            width = %self.width,
            height = %self.height,
            text = %self.font.is_some(),
            "report_composed"
        );
        Ok(Report { image: canvas, lines })
    }

    fn draw_panel(
        &self,
        canvas: &mut RgbaImage,
        layout: &Layout,
        direction: ShotDirection,
        item: Option<&DirectionalResult>,
    ) {
        let (x, y) = layout.panel_origin(direction);
        let (pw, ph) = (layout.panel_w, layout.panel_h);
        let image = item.and_then(|i| i.skeleton.as_ref().or(i.preview.as_ref()));

        match image {
            Some(image) => {
                fill(canvas, x, y, pw, ph, PANEL);
                let fitted = fit(image, pw, ph);
                let ox = x + (pw - fitted.width()) / 2;
                let oy = y + (ph - fitted.height()) / 2;
                imageops::overlay(canvas, &fitted, i64::from(ox), i64::from(oy));
            }
            None => fill(canvas, x, y, pw, ph, PLACEHOLDER),
        }

        let bar_y = y + ph;
        fill(canvas, x, bar_y, pw, layout.bar_h, TRACK);
        if let Some(score) = item.and_then(|i| i.score()) {
            let filled = pw * u32::from(score) / 100;
            fill(canvas, x, bar_y, filled, layout.bar_h, tier_color(ScoreTier::from_score(score)));
        }
    }

    fn draw_text(
        &self,
        canvas: &mut RgbaImage,
        layout: &Layout,
        font: &FontArc,
        items: &[DirectionalResult],
        lines: &[String],
    ) {
        let title = PxScale::from(layout.header_h as f32 / 4.0);
        let body = PxScale::from(body_px(self.height) as f32);
        let m = layout.margin as i32;

        // Title and overall line
        draw_text_mut(canvas, TEXT, m, m / 2, title, font, &lines[0]);
        draw_text_mut(canvas, TEXT, m, m / 2 + title.y as i32, body, font, &lines[1]);

        for direction in ShotDirection::ALL {
            let (x, y) = layout.panel_origin(direction);
            let item = items.iter().find(|i| i.direction == direction);
            let label = match item.and_then(|i| i.score()) {
                Some(score) => format!("{direction} {score}"),
                None => direction.to_string(),
            };
            draw_text_mut(canvas, TEXT, x as i32 + 4, y as i32 + 4, body, font, &label);

            let caption = clip_text(&view_text(item), body, font, layout.panel_w);
            let cy = layout.caption_top(direction) as i32;
            draw_text_mut(canvas, TEXT, x as i32, cy, body, font, &caption);
        }

        // Message, findings and advice fill the footer until space runs out
        let mut y = layout.footer_top as i32;
        let step = body.y as i32 + 4;
        for line in lines.iter().skip(2).filter(|l| !is_direction_line(l)) {
            if y + step > self.height as i32 {
                break;
            }
            draw_text_mut(canvas, TEXT, m, y, body, font, line);
            y += step;
        }
    }
}

/// Shorten `text` with a trailing ellipsis until it fits `max_w` pixels
fn clip_text(text: &str, scale: PxScale, font: &FontArc, max_w: u32) -> String {
    if text_size(scale, font, text).0 <= max_w {
        return text.to_string();
    }
    let mut chars: Vec<char> = text.chars().collect();
    while !chars.is_empty() {
        chars.pop();
        let candidate: String = chars.iter().collect::<String>() + "...";
        if text_size(scale, font, &candidate).0 <= max_w {
            return candidate;
        }
    }
    String::new()
}

fn is_direction_line(line: &str) -> bool {
    ShotDirection::ALL.iter().any(|d| line.starts_with(&format!("{d}: ")))
}

/// Filled rectangle that tolerates zero sizes
fn fill(canvas: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgba<u8>) {
    if w == 0 || h == 0 {
        return;
    }
    draw_filled_rect_mut(canvas, Rect::at(x as i32, y as i32).of_size(w, h), color);
}

/// Scale an image to fit inside `max_w` x `max_h`, keeping its aspect ratio
fn fit(image: &RgbaImage, max_w: u32, max_h: u32) -> RgbaImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return RgbaImage::new(1, 1);
    }
    let scale = f64::min(f64::from(max_w) / f64::from(w), f64::from(max_h) / f64::from(h));
    let nw = ((f64::from(w) * scale).floor() as u32).clamp(1, max_w);
    let nh = ((f64::from(h) * scale).floor() as u32).clamp(1, max_h);
    imageops::resize(image, nw, nh, FilterType::Triangle)
}
