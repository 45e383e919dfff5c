//! Composite rendering of the status card
//!
//! The orchestrator only depends on the `CompositeRenderer` trait: given the
//! current render state it returns one raster of the composed card. The
//! bundled `CardRenderer` draws the whole card with `image` and `imageproc`:
//! progress bar, round profile photo, "My status" with the time label, the
//! status media, the caption and the view counter.

use std::sync::Arc;

use ab_glyph::{FontArc, PxScale};
use image::{imageops, imageops::FilterType, DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_ellipse_mut, draw_text_mut, text_size};
use tracing::{debug, warn};

use super::fonts::FontBook;
use crate::config::MAX_EXPORT_SCALE;
use crate::error::{Error, Result};
use crate::media::data_uri;
use crate::state::render::{FontChoice, RenderState};

/// How cross-origin images are treated while capturing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrossOrigin {
    /// Only draw inline (`data:`) images; anything else is left out
    #[default]
    UseCors,
    /// Draw every source, failing the capture if one cannot be read
    AllowTaint,
}

/// Capture parameters handed to the renderer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureOptions {
    /// Fill behind everything; guards against transparent edges
    pub background: Rgba<u8>,
    /// Output pixels per logical pixel, clamped to `1..=MAX_EXPORT_SCALE`
    pub scale: u32,
    pub cross_origin: CrossOrigin,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            background: Rgba([0, 0, 0, 255]),
            scale: 2,
            cross_origin: CrossOrigin::AllowTaint,
        }
    }
}

impl CaptureOptions {
    pub fn with_scale(scale: u32) -> Self {
        Self {
            scale,
            ..Self::default()
        }
    }
}

/// Produces one raster of whatever the render state currently describes
#[allow(async_fn_in_trait)]
pub trait CompositeRenderer {
    async fn capture(&self, state: &RenderState, options: &CaptureOptions) -> Result<RgbaImage>;
}

/// Logical layout of the status card, in unscaled pixels
const CARD_WIDTH: u32 = 360;
const CARD_HEIGHT: u32 = 640;
const PROGRESS_INSET: u32 = 8;
const PROGRESS_TOP: u32 = 8;
const PROGRESS_HEIGHT: u32 = 3;
const AVATAR_LEFT: u32 = 44;
const AVATAR_TOP: u32 = 22;
const AVATAR_SIZE: u32 = 40;
const CONTENT_TOP: u32 = 76;
const CONTENT_BOTTOM_MARGIN: u32 = 96;
const TITLE_LEFT: u32 = 96;
const TITLE_TOP: u32 = 24;
const TITLE_SIZE: f32 = 16.0;
const TIME_TOP: u32 = 45;
const TIME_SIZE: f32 = 13.0;
const CAPTION_TOP: u32 = CARD_HEIGHT - CONTENT_BOTTOM_MARGIN + 8;
const CAPTION_SIZE: f32 = 16.0;
const CAPTION_LINE_HEIGHT: u32 = 20;
const CAPTION_MAX_LINES: usize = 2;
const CAPTION_INSET: u32 = 16;
const VIEWS_TOP: u32 = CARD_HEIGHT - 30;
const VIEWS_SIZE: f32 = 14.0;
const EYE_WIDTH: u32 = 18;
const EYE_GAP: u32 = 6;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const DIM_WHITE: Rgba<u8> = Rgba([200, 200, 200, 255]);

/// Built-in renderer for the status card
#[derive(Debug, Clone)]
pub struct CardRenderer {
    fonts: Arc<FontBook>,
}

impl Default for CardRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl CardRenderer {
    /// Renderer using the platform font directories
    pub fn new() -> Self {
        Self::with_fonts(FontBook::system())
    }

    pub fn with_fonts(fonts: FontBook) -> Self {
        Self {
            fonts: Arc::new(fonts),
        }
    }

    /// Output size for a given scale
    pub fn output_size(scale: u32) -> (u32, u32) {
        let s = scale.clamp(1, MAX_EXPORT_SCALE);
        (CARD_WIDTH * s, CARD_HEIGHT * s)
    }
}

/// Everything the card shows, detached from the render state
struct CardContent {
    status: Option<String>,
    profile: Option<String>,
    progress: f32,
    time: Option<String>,
    caption: String,
    views: Option<String>,
    font: FontChoice,
}

impl CardContent {
    fn from_state(state: &RenderState) -> Self {
        Self {
            status: state.status_image.clone(),
            profile: state.profile_image.as_ref().map(|p| p.as_str().to_string()),
            progress: state.progress,
            time: state.time_label(),
            caption: state.caption.trim().to_string(),
            views: state.views.label().map(str::to_string),
            font: state.font.clone(),
        }
    }
}

impl CompositeRenderer for CardRenderer {
    async fn capture(&self, state: &RenderState, options: &CaptureOptions) -> Result<RgbaImage> {
        let content = CardContent::from_state(state);
        let fonts = Arc::clone(&self.fonts);
        let options = *options;

        // Font loading and pixel work happen off the async thread
        tokio::task::spawn_blocking(move || {
            let font = fonts.resolve(&content.font);
            if font.is_none() {
                warn!("No usable font for '{}', card text left out", content.font.family);
            }
            draw_card(&content, font.as_ref(), &options)
        })
        .await?
    }
}

fn draw_card(content: &CardContent, font: Option<&FontArc>, options: &CaptureOptions) -> Result<RgbaImage> {
    let (width, height) = CardRenderer::output_size(options.scale);
    let s = width / CARD_WIDTH;
    let mut canvas = RgbaImage::from_pixel(width, height, options.background);

    // Progress bar: dim track, white fill
    let track_x = PROGRESS_INSET * s;
    let track_w = width - 2 * PROGRESS_INSET * s;
    fill_rect(&mut canvas, track_x, PROGRESS_TOP * s, track_w, PROGRESS_HEIGHT * s, Rgba([255, 255, 255, 90]));
    let fill_w = (track_w as f32 * content.progress.clamp(0.0, 1.0)).round() as u32;
    fill_rect(&mut canvas, track_x, PROGRESS_TOP * s, fill_w, PROGRESS_HEIGHT * s, WHITE);

    if let Some(media) = load_media(content.status.as_deref(), "status media", options.cross_origin)? {
        let area_h = height - (CONTENT_TOP + CONTENT_BOTTOM_MARGIN) * s;
        let fitted = fit_contain(&media, width, area_h);
        let x = (width - fitted.width()) / 2;
        let y = CONTENT_TOP * s + (area_h - fitted.height()) / 2;
        imageops::overlay(&mut canvas, &fitted, x as i64, y as i64);
    }

    if let Some(photo) = load_media(content.profile.as_deref(), "profile photo", options.cross_origin)? {
        let avatar = round_avatar(&photo, AVATAR_SIZE * s);
        imageops::overlay(&mut canvas, &avatar, (AVATAR_LEFT * s) as i64, (AVATAR_TOP * s) as i64);
    }

    if let Some(font) = font {
        draw_text_block(&mut canvas, content, font, s);
    }

    debug!("Captured {}x{} card", width, height);
    Ok(canvas)
}

fn draw_text_block(canvas: &mut RgbaImage, content: &CardContent, font: &FontArc, s: u32) {
    let px = |size: f32| PxScale::from(size * s as f32);
    let left = (TITLE_LEFT * s) as i32;

    draw_text_mut(canvas, WHITE, left, (TITLE_TOP * s) as i32, px(TITLE_SIZE), font, "My status");
    if let Some(time) = &content.time {
        draw_text_mut(canvas, DIM_WHITE, left, (TIME_TOP * s) as i32, px(TIME_SIZE), font, time);
    }

    if !content.caption.is_empty() {
        let max_w = (CARD_WIDTH - 2 * CAPTION_INSET) * s;
        let lines = wrap_lines(font, px(CAPTION_SIZE), &content.caption, max_w);
        for (i, line) in lines.iter().take(CAPTION_MAX_LINES).enumerate() {
            let (line_w, _) = text_size(px(CAPTION_SIZE), font, line);
            let x = (canvas.width().saturating_sub(line_w) / 2) as i32;
            let y = ((CAPTION_TOP + i as u32 * CAPTION_LINE_HEIGHT) * s) as i32;
            draw_text_mut(canvas, WHITE, x, y, px(CAPTION_SIZE), font, line);
        }
    }

    if let Some(views) = &content.views {
        let (text_w, text_h) = text_size(px(VIEWS_SIZE), font, views);
        let total_w = (EYE_WIDTH + EYE_GAP) * s + text_w;
        let x = canvas.width().saturating_sub(total_w) / 2;
        let y = VIEWS_TOP * s;
        draw_eye(canvas, x, y + text_h / 2, s);
        draw_text_mut(canvas, WHITE, (x + (EYE_WIDTH + EYE_GAP) * s) as i32, y as i32, px(VIEWS_SIZE), font, views);
    }
}

/// Outlined eye with a filled pupil, left edge at `x`, centered on `cy`
fn draw_eye(canvas: &mut RgbaImage, x: u32, cy: u32, s: u32) {
    let center = ((x + EYE_WIDTH * s / 2) as i32, cy as i32);
    draw_hollow_ellipse_mut(canvas, center, (EYE_WIDTH * s / 2) as i32, (5 * s) as i32, WHITE);
    draw_filled_circle_mut(canvas, center, (3 * s) as i32, WHITE);
}

/// Greedy word wrap against the rendered width. A single word wider than the
/// line stays on its own line.
fn wrap_lines(font: &FontArc, scale: PxScale, text: &str, max_w: u32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", line, word)
            };
            if line.is_empty() || text_size(scale, font, &candidate).0 <= max_w {
                line = candidate;
            } else {
                lines.push(std::mem::replace(&mut line, word.to_string()));
            }
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

/// Decode an image source for drawing. Non-inline sources are skipped under
/// `UseCors` and must decode under `AllowTaint`.
fn load_media(uri: Option<&str>, what: &str, cross_origin: CrossOrigin) -> Result<Option<DynamicImage>> {
    let Some(uri) = uri else {
        return Ok(None);
    };
    if cross_origin == CrossOrigin::UseCors && !uri.starts_with("data:") {
        debug!("Leaving out {} from a non-inline source", what);
        return Ok(None);
    }
    data_uri::decode_image(uri)
        .map(Some)
        .map_err(|e| Error::capture(format!("{}: {}", what, e)))
}

fn fill_rect(canvas: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgba<u8>) {
    if w == 0 || h == 0 {
        return;
    }
    let patch = RgbaImage::from_pixel(w, h, color);
    imageops::overlay(canvas, &patch, x as i64, y as i64);
}

/// Scale to fit inside the box, preserving aspect ratio
fn fit_contain(img: &DynamicImage, max_w: u32, max_h: u32) -> RgbaImage {
    img.resize(max_w, max_h, FilterType::Triangle).to_rgba8()
}

/// Center-crop to a square, scale to `size` and clear everything outside the circle
fn round_avatar(img: &DynamicImage, size: u32) -> RgbaImage {
    let side = img.width().min(img.height());
    let x = (img.width() - side) / 2;
    let y = (img.height() - side) / 2;
    let square = img.crop_imm(x, y, side, side);
    let mut avatar = square.resize_exact(size, size, FilterType::Triangle).to_rgba8();

    let radius = size as f32 / 2.0;
    for (px, py, pixel) in avatar.enumerate_pixels_mut() {
        let dx = px as f32 + 0.5 - radius;
        let dy = py as f32 + 0.5 - radius;
        if dx * dx + dy * dy > radius * radius {
            pixel.0[3] = 0;
        }
    }
    avatar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::compress::CompressedPhoto;
    use crate::state::render::ViewCount;
    use image::RgbImage;

    fn png_uri(img: RgbImage) -> String {
        let mut buffer = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        data_uri::encode("image/png", buffer.get_ref())
    }

    /// Renderer over the installed fonts, or `None` on a machine without any
    fn renderer_with_fonts() -> Option<CardRenderer> {
        let fonts = FontBook::system();
        if fonts.resolve(&FontChoice::default()).is_none() {
            eprintln!("no usable system font installed, skipping text check");
            return None;
        }
        Some(CardRenderer::with_fonts(fonts))
    }

    fn text_state() -> RenderState {
        RenderState {
            progress: 0.0,
            hour: "14".to_string(),
            ..RenderState::default()
        }
    }

    /// Whether any pixel in rows `y0..y1` differs from black
    fn rows_lit(raster: &RgbaImage, y0: u32, y1: u32) -> bool {
        (y0..y1.min(raster.height()))
            .any(|y| (0..raster.width()).any(|x| raster.get_pixel(x, y).0 != [0, 0, 0, 255]))
    }

    #[tokio::test]
    async fn test_empty_state_is_black_at_double_scale() {
        let state = RenderState {
            progress: 0.0,
            ..RenderState::default()
        };
        let raster = CardRenderer::new()
            .capture(&state, &CaptureOptions::default())
            .await
            .unwrap();

        assert_eq!(raster.dimensions(), (720, 1280));
        assert_eq!(raster.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(raster.get_pixel(719, 1279).0, [0, 0, 0, 255]);
    }

    #[tokio::test]
    async fn test_profile_photo_lands_in_avatar_slot() {
        let red = png_uri(RgbImage::from_pixel(50, 80, image::Rgb([255, 0, 0])));
        let state = RenderState {
            profile_image: Some(CompressedPhoto::from_data_uri(red)),
            ..RenderState::default()
        };

        let raster = CardRenderer::new()
            .capture(&state, &CaptureOptions::with_scale(1))
            .await
            .unwrap();

        let center = raster.get_pixel(AVATAR_LEFT + AVATAR_SIZE / 2, AVATAR_TOP + AVATAR_SIZE / 2);
        assert_eq!(center.0, [255, 0, 0, 255]);
        // Corner of the avatar square stays background
        assert_eq!(raster.get_pixel(AVATAR_LEFT, AVATAR_TOP).0, [0, 0, 0, 255]);
    }

    #[tokio::test]
    async fn test_status_media_centered_in_content_area() {
        let green = png_uri(RgbImage::from_pixel(100, 100, image::Rgb([0, 255, 0])));
        let state = RenderState {
            status_image: Some(green),
            ..RenderState::default()
        };

        let raster = CardRenderer::new()
            .capture(&state, &CaptureOptions::with_scale(1))
            .await
            .unwrap();

        let mid_y = CONTENT_TOP + (CARD_HEIGHT - CONTENT_TOP - CONTENT_BOTTOM_MARGIN) / 2;
        assert_eq!(raster.get_pixel(CARD_WIDTH / 2, mid_y).0, [0, 255, 0, 255]);
    }

    #[tokio::test]
    async fn test_broken_media_is_a_capture_error() {
        let state = RenderState {
            status_image: Some("data:image/png;base64,AAAA".to_string()),
            ..RenderState::default()
        };

        let err = CardRenderer::new()
            .capture(&state, &CaptureOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Capture(_)));
    }

    #[tokio::test]
    async fn test_minute_change_only_touches_time_row() {
        let Some(renderer) = renderer_with_fonts() else {
            return;
        };
        let options = CaptureOptions::with_scale(1);
        let at = |minute: &str| RenderState {
            minute: Some(minute.to_string()),
            ..text_state()
        };

        let first = renderer.capture(&at("07"), &options).await.unwrap();
        let again = renderer.capture(&at("07"), &options).await.unwrap();
        let second = renderer.capture(&at("42"), &options).await.unwrap();

        assert!(first == again);
        assert!(first != second);
        for (x, y, pixel) in first.enumerate_pixels() {
            if pixel != second.get_pixel(x, y) {
                assert!((TIME_TOP..TIME_TOP + 24).contains(&y), "unexpected change at ({x}, {y})");
            }
        }
    }

    #[tokio::test]
    async fn test_caption_and_views_are_drawn() {
        let Some(renderer) = renderer_with_fonts() else {
            return;
        };
        let options = CaptureOptions::with_scale(1);

        let bare = renderer.capture(&text_state(), &options).await.unwrap();
        assert!(rows_lit(&bare, TITLE_TOP, TITLE_TOP + 20));
        assert!(rows_lit(&bare, TIME_TOP, TIME_TOP + 20));
        assert!(!rows_lit(&bare, CAPTION_TOP, VIEWS_TOP));
        assert!(!rows_lit(&bare, VIEWS_TOP, CARD_HEIGHT));

        let state = RenderState {
            caption: "Sunday at the lake".to_string(),
            views: ViewCount::Count("57".to_string()),
            font: FontChoice::parse("DejaVu Sans|italic"),
            ..text_state()
        };
        let full = renderer.capture(&state, &options).await.unwrap();
        assert!(rows_lit(&full, CAPTION_TOP, CAPTION_TOP + CAPTION_LINE_HEIGHT));
        assert!(rows_lit(&full, VIEWS_TOP, CARD_HEIGHT));
    }

    #[tokio::test]
    async fn test_long_caption_wraps_onto_second_line() {
        let Some(renderer) = renderer_with_fonts() else {
            return;
        };
        let state = RenderState {
            caption: "a caption long enough that it cannot possibly fit on one line of the card".to_string(),
            ..text_state()
        };

        let raster = renderer.capture(&state, &CaptureOptions::with_scale(1)).await.unwrap();
        let second_line = CAPTION_TOP + CAPTION_LINE_HEIGHT;
        assert!(rows_lit(&raster, second_line, second_line + CAPTION_LINE_HEIGHT));
    }

    #[tokio::test]
    async fn test_no_font_leaves_text_out() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = CardRenderer::with_fonts(FontBook::new(vec![dir.path().to_path_buf()]));
        let state = RenderState {
            caption: "hello".to_string(),
            views: ViewCount::Count("60".to_string()),
            ..text_state()
        };

        let raster = renderer.capture(&state, &CaptureOptions::with_scale(1)).await.unwrap();
        assert!(!rows_lit(&raster, TITLE_TOP, CARD_HEIGHT));
    }

    #[tokio::test]
    async fn test_cross_origin_mode_for_non_inline_sources() {
        let state = RenderState {
            status_image: Some("blob:status-shot/7".to_string()),
            ..RenderState::default()
        };
        let renderer = CardRenderer::with_fonts(FontBook::new(Vec::new()));

        let cors = CaptureOptions {
            cross_origin: CrossOrigin::UseCors,
            ..CaptureOptions::with_scale(1)
        };
        let raster = renderer.capture(&state, &cors).await.unwrap();
        assert!(!rows_lit(&raster, CONTENT_TOP, CARD_HEIGHT - CONTENT_BOTTOM_MARGIN));

        let taint = CaptureOptions::with_scale(1);
        let err = renderer.capture(&state, &taint).await.unwrap_err();
        assert!(matches!(err, Error::Capture(_)));
    }

    #[test]
    fn test_output_size_clamps_scale() {
        assert_eq!(CardRenderer::output_size(0), (CARD_WIDTH, CARD_HEIGHT));
        assert_eq!(CardRenderer::output_size(2), (720, 1280));
        assert_eq!(
            CardRenderer::output_size(u32::MAX),
            (CARD_WIDTH * MAX_EXPORT_SCALE, CARD_HEIGHT * MAX_EXPORT_SCALE)
        );
    }
}
