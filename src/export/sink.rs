//! Where captured screenshots go

use std::path::{Path, PathBuf};

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use tracing::info;

use crate::error::Result;

/// Receives each finished screenshot ("download")
#[allow(async_fn_in_trait)]
pub trait OutputSink {
    /// Persist `raster` under `filename` and return where it went
    async fn save(&mut self, filename: &str, raster: &RgbaImage) -> Result<PathBuf>;
}

/// Writes PNG files into a directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl OutputSink for DirectorySink {
    async fn save(&mut self, filename: &str, raster: &RgbaImage) -> Result<PathBuf> {
        let png = encode_png(raster)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(filename);
        tokio::fs::write(&path, png).await?;
        info!("💾 Saved {}", path.display());
        Ok(path)
    }
}

/// Lossless PNG at the strongest compression setting
pub fn encode_png(raster: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, FilterType::Adaptive);
    encoder.write_image(
        raster.as_raw(),
        raster.width(),
        raster.height(),
        ExtendedColorType::Rgba8,
    )?;
    Ok(buffer)
}
