//! Profile photo compression
//!
//! Resizes a source image so its longer edge fits `max_dimension`, then
//! re-encodes it as JPEG at decreasing quality until the data URI fits the
//! size budget or the quality floor is reached. The search is linear with a
//! fixed step, so the number of encodes is bounded no matter the input.

use image::codecs::jpeg::JpegEncoder;
use image::{imageops::FilterType, DynamicImage, RgbImage};
use tracing::{debug, info};

use crate::config::CompressionConfig;
use crate::error::{Error, Result};
use crate::media::data_uri;

/// Base64 overhead applied to the binary size budget
pub const ENCODING_OVERHEAD: f64 = 1.33;

/// A JPEG data URI ready for the photo library. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompressedPhoto(String);

impl CompressedPhoto {
    /// Wrap a stored data URI
    pub fn from_data_uri(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encoded length, which is what the size budget is measured against
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Result of one compression run
#[derive(Debug, Clone)]
pub struct Compressed {
    pub photo: CompressedPhoto,
    pub width: u32,
    pub height: u32,
    /// Final quality in hundredths
    pub quality: u8,
    /// Number of JPEG encodes performed
    pub attempts: u32,
}

impl Compressed {
    /// Whether the budget was met; compression is best-effort
    pub fn within_budget(&self, target_bytes: usize) -> bool {
        self.photo.len() as f64 <= encoded_budget(target_bytes)
    }
}

fn encoded_budget(target_bytes: usize) -> f64 {
    target_bytes as f64 * ENCODING_OVERHEAD
}

/// Dimensions after fitting the longer edge into `max_dim`.
/// Images already inside the box are left alone.
pub fn fit_dimensions(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    if width <= max_dim && height <= max_dim {
        return (width, height);
    }

    if width > height {
        let h = (height as f64 * (max_dim as f64 / width as f64)).round() as u32;
        (max_dim, h.max(1))
    } else {
        let w = (width as f64 * (max_dim as f64 / height as f64)).round() as u32;
        (w.max(1), max_dim)
    }
}

/// Compress encoded image bytes (any format the `image` crate decodes)
pub async fn compress(source: Vec<u8>, config: CompressionConfig) -> Result<Compressed> {
    // Decoding and encoding are CPU-bound
    tokio::task::spawn_blocking(move || {
        let img = image::load_from_memory(&source)
            .map_err(|e| Error::decode("image decode", e.to_string()))?;
        compress_image(&img, &config)
    })
    .await?
}

/// Blocking version of compression for an already decoded image
pub fn compress_image(img: &DynamicImage, config: &CompressionConfig) -> Result<Compressed> {
    let (width, height) = fit_dimensions(img.width(), img.height(), config.max_dimension);
    debug!(
        "Resizing {}x{} to {}x{}",
        img.width(),
        img.height(),
        width,
        height
    );

    let surface = if (width, height) == (img.width(), img.height()) {
        flatten_on_black(img)
    } else {
        flatten_on_black(&img.resize_exact(width, height, FilterType::Lanczos3))
    };

    let budget = encoded_budget(config.target_bytes);
    let mut quality = config.initial_quality;
    let mut uri = encode_jpeg(&surface, quality)?;
    let mut attempts = 1;

    // Reduce quality until under budget or at the floor
    while uri.len() as f64 > budget && quality > config.min_quality {
        quality = quality.saturating_sub(config.quality_step).max(config.min_quality);
        uri = encode_jpeg(&surface, quality)?;
        attempts += 1;
    }

    info!(
        "🗜️  Compressed to {}x{} at quality {} ({} bytes, {} attempt(s))",
        width,
        height,
        quality,
        uri.len(),
        attempts
    );

    Ok(Compressed {
        photo: CompressedPhoto(uri),
        width,
        height,
        quality,
        attempts,
    })
}

/// JPEG has no alpha; transparent areas come out black like a cleared canvas
fn flatten_on_black(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let scale = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
        image::Rgb([scale(r), scale(g), scale(b)])
    })
}

fn encode_jpeg(surface: &RgbImage, quality: u8) -> Result<String> {
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder.encode_image(surface)?;
    Ok(data_uri::encode("image/jpeg", &buffer))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// High-entropy image that compresses badly at any quality
    fn noisy_image(width: u32, height: u32) -> DynamicImage {
        let mut state: u32 = 0x1234_5678;
        let img = RgbImage::from_fn(width, height, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [r, g, b, _] = state.to_le_bytes();
            image::Rgb([r, g, b])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_fit_dimensions_landscape() {
        assert_eq!(fit_dimensions(1600, 900, 400), (400, 225));
        assert_eq!(fit_dimensions(1000, 333, 400), (400, 133));
    }

    #[test]
    fn test_fit_dimensions_portrait_and_square() {
        assert_eq!(fit_dimensions(900, 1600, 400), (225, 400));
        assert_eq!(fit_dimensions(800, 800, 400), (400, 400));
    }

    #[test]
    fn test_fit_dimensions_small_image_untouched() {
        assert_eq!(fit_dimensions(300, 120, 400), (300, 120));
        assert_eq!(fit_dimensions(400, 400, 400), (400, 400));
    }

    #[test]
    fn test_fit_dimensions_preserves_ratio() {
        for (w, h) in [(4032, 3024), (1080, 1920), (401, 3), (5000, 4999), (7, 2000)] {
            let (fw, fh) = fit_dimensions(w, h, 400);
            assert_eq!(fw.max(fh), 400);
            let expected_short = (w.min(h) as f64 * 400.0 / w.max(h) as f64).round() as u32;
            assert_eq!(fw.min(fh), expected_short.max(1));
        }
    }

    #[test]
    fn test_small_budget_stops_at_quality_floor() {
        let config = CompressionConfig {
            target_bytes: 1,
            ..CompressionConfig::default()
        };

        let result = compress_image(&noisy_image(500, 300), &config).unwrap();

        assert_eq!((result.width, result.height), (400, 240));
        assert_eq!(result.quality, 50);
        // 92, 85, 78, 71, 64, 57, 50
        assert_eq!(result.attempts, 7);
        assert!(!result.within_budget(config.target_bytes));
        assert!(result.photo.as_str().starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_generous_budget_encodes_once() {
        let config = CompressionConfig::default();
        let flat = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, image::Rgb([200, 10, 10])));

        let result = compress_image(&flat, &config).unwrap();

        assert_eq!(result.quality, 92);
        assert_eq!(result.attempts, 1);
        assert!(result.within_budget(config.target_bytes));
    }

    #[test]
    fn test_transparent_pixels_become_black() {
        let clear = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 255, 255, 0])));
        let flat = flatten_on_black(&clear);
        assert_eq!(flat.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[tokio::test]
    async fn test_compress_decodes_encoded_bytes() {
        let mut png = std::io::Cursor::new(Vec::new());
        noisy_image(800, 600)
            .write_to(&mut png, image::ImageFormat::Png)
            .unwrap();

        let result = compress(png.into_inner(), CompressionConfig::default()).await.unwrap();
        assert_eq!((result.width, result.height), (400, 300));

        let decoded = data_uri::decode_image(result.photo.as_str()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (400, 300));
    }

    #[tokio::test]
    async fn test_compress_rejects_garbage() {
        let err = compress(b"not an image".to_vec(), CompressionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MediaDecodeFailed { .. }));
    }
}
