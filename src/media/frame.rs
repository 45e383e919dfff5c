//! Representative still frame extraction for video sources
//!
//! The composite renderer cannot rasterize live video, so a video status is
//! captured through one still taken at the midpoint of its duration.
//! Extraction runs in two awaited stages (metadata, then seek + grab), each
//! bounded by the configured decode timeout.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use image::{imageops, ImageFormat, RgbaImage};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::MediaConfig;
use crate::error::{Error, Result};
use crate::media::data_uri;

/// Turns a video source into a displayable still image (PNG data URI)
#[allow(async_fn_in_trait)]
pub trait FrameExtractor {
    async fn extract_mid_frame(&self, source: &Path) -> Result<String>;
}

/// What the metadata stage learns about a video
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMetadata {
    /// Coded width, before any display rotation
    pub width: u32,
    /// Coded height, before any display rotation
    pub height: u32,
    pub duration_sec: f64,
    /// Display rotation in degrees, normalized to 0, 90, 180 or 270
    pub rotation: u32,
}

impl VideoMetadata {
    /// Size of the picture as it is shown. Decoders apply the display
    /// rotation, so a quarter turn swaps the coded width and height.
    pub fn display_size(&self) -> (u32, u32) {
        match self.rotation {
            90 | 270 => (self.height, self.width),
            _ => (self.width, self.height),
        }
    }

    /// Seek target for the representative frame
    pub fn midpoint(&self) -> f64 {
        if self.duration_sec.is_finite() && self.duration_sec > 0.0 {
            self.duration_sec / 2.0
        } else {
            0.0
        }
    }
}

/// Frame extractor backed by the `ffprobe` and `ffmpeg` executables
#[derive(Debug, Clone)]
pub struct FfmpegFrameExtractor {
    ffprobe: String,
    ffmpeg: String,
    timeout: Duration,
}

impl FfmpegFrameExtractor {
    pub fn new(ffprobe: impl Into<String>, ffmpeg: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            ffmpeg: ffmpeg.into(),
            timeout,
        }
    }

    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(&config.ffprobe, &config.ffmpeg, config.decode_timeout())
    }

    /// Stage 1: wait for duration and native dimensions
    pub async fn load_metadata(&self, source: &Path) -> Result<VideoMetadata> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
            .arg(source);

        let stdout = self.run_stage("metadata", cmd).await?;
        let metadata = parse_probe(&stdout)?;

        if metadata.midpoint() == 0.0 {
            warn!("No usable duration for {}, using the first frame", source.display());
        }
        debug!(
            "Video metadata: {}x{} rotated {}, {:.3}s",
            metadata.width, metadata.height, metadata.rotation, metadata.duration_sec
        );
        Ok(metadata)
    }

    /// Stage 2: seek to `at_sec` and grab one frame as PNG bytes
    pub async fn seek_and_grab(&self, source: &Path, at_sec: f64) -> Result<Vec<u8>> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-ss", &format!("{:.3}", at_sec), "-i"])
            .arg(source)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"]);

        let stdout = self.run_stage("seek", cmd).await?;
        if stdout.is_empty() {
            return Err(Error::decode("seek", "decoder produced no frame"));
        }
        Ok(stdout)
    }

    async fn run_stage(&self, stage: &'static str, mut cmd: Command) -> Result<Vec<u8>> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| Error::decode(stage, format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| Error::decode(stage, format!("failed to start decoder: {}", e)))?;

        if !output.status.success() {
            return Err(Error::decode(
                stage,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(output.stdout)
    }
}

impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract_mid_frame(&self, source: &Path) -> Result<String> {
        let metadata = self.load_metadata(source).await?;
        let png = self.seek_and_grab(source, metadata.midpoint()).await?;

        let uri = tokio::task::spawn_blocking(move || rasterize_frame(&png, metadata)).await??;
        info!("🎞️  Extracted mid frame from {}", source.display());
        Ok(uri)
    }
}

/// Draw the decoded frame at the origin of a surface sized to the video's
/// displayed dimensions and encode the surface as a PNG data URI
fn rasterize_frame(png: &[u8], metadata: VideoMetadata) -> Result<String> {
    let frame = image::load_from_memory_with_format(png, ImageFormat::Png)
        .map_err(|e| Error::decode("seek", e.to_string()))?;

    let (width, height) = metadata.display_size();
    if (frame.width(), frame.height()) != (width, height) {
        warn!(
            "Decoded frame is {}x{}, expected {}x{}",
            frame.width(),
            frame.height(),
            width,
            height
        );
    }
    let mut surface = RgbaImage::new(width, height);
    imageops::overlay(&mut surface, &frame.to_rgba8(), 0, 0);

    let mut buffer = std::io::Cursor::new(Vec::new());
    surface.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(data_uri::encode("image/png", buffer.get_ref()))
}

/// Pull width, height and duration out of `ffprobe -print_format json` output
pub fn parse_probe(json: &[u8]) -> Result<VideoMetadata> {
    #[derive(Deserialize)]
    struct ProbeSideData {
        rotation: Option<f64>,
    }
    #[derive(Deserialize)]
    struct ProbeTags {
        rotate: Option<String>,
    }
    #[derive(Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        duration: Option<String>,
        #[serde(default)]
        side_data_list: Vec<ProbeSideData>,
        tags: Option<ProbeTags>,
    }
    #[derive(Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(Deserialize)]
    struct ProbeOut {
        #[serde(default)]
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let parsed: ProbeOut = serde_json::from_slice(json)
        .map_err(|e| Error::decode("metadata", format!("unreadable probe output: {}", e)))?;
    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| Error::decode("metadata", "no video stream found"))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(Error::decode("metadata", "video stream has no dimensions")),
    };

    // Container duration first, stream duration as fallback
    let duration_sec = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(stream.duration.as_deref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    // Display matrix side data on current ffprobe, the `rotate` tag on older ones
    let rotation = stream
        .side_data_list
        .iter()
        .find_map(|side| side.rotation)
        .or_else(|| {
            stream
                .tags
                .as_ref()
                .and_then(|t| t.rotate.as_deref())
                .and_then(|r| r.trim().parse::<f64>().ok())
        })
        .map(normalize_rotation)
        .unwrap_or(0);

    Ok(VideoMetadata {
        width,
        height,
        duration_sec,
        rotation,
    })
}

/// Snap any angle in degrees (e.g. -90) to 0, 90, 180 or 270
fn normalize_rotation(degrees: f64) -> u32 {
    if !degrees.is_finite() {
        return 0;
    }
    let quarter_turns = (degrees / 90.0).round() as i64;
    (quarter_turns.rem_euclid(4) * 90) as u32
}
