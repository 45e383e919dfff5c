//! Status media ingestion
//!
//! Turns a user-selected file into something the preview and the composite
//! renderer can both display. Images are read whole into a data URI. Videos
//! get a revocable object reference for playback plus a still frame, because
//! captured output shows the still in place of the live video.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::error::Result;
use crate::media::data_uri;
use crate::media::frame::FrameExtractor;

/// Coarse MIME category of a selected file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// `video/*` is a video, everything else is treated as an image
    pub fn from_mime(mime: &str) -> Self {
        match mime.split('/').next() {
            Some("video") => MediaKind::Video,
            _ => MediaKind::Image,
        }
    }
}

/// A file picked by the user
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub path: PathBuf,
    /// Declared MIME type; guessed from the extension when absent
    pub mime: Option<String>,
}

impl SelectedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mime: None,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn mime(&self) -> String {
        self.mime.clone().unwrap_or_else(|| {
            mime_guess::from_path(&self.path)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        })
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    live: HashMap<u64, PathBuf>,
}

/// Lock the table, taking it over from a holder that panicked
fn lock_live(inner: &Mutex<RegistryInner>) -> MutexGuard<'_, RegistryInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Issues revocable `blob:` style references to local media files
#[derive(Debug, Clone, Default)]
pub struct ObjectUrlRegistry {
    inner: Arc<Mutex<RegistryInner>>,
    next_id: Arc<AtomicU64>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` and hand back a reference that revokes itself on drop
    pub fn create(&self, path: &Path) -> ObjectUrl {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock_live(&self.inner).live.insert(id, path.to_path_buf());
        ObjectUrl {
            id,
            uri: format!("blob:status-shot/{}", id),
            registry: Arc::clone(&self.inner),
        }
    }

    /// Look up the file behind a live reference
    pub fn resolve(&self, uri: &str) -> Option<PathBuf> {
        let id: u64 = uri.strip_prefix("blob:status-shot/")?.parse().ok()?;
        lock_live(&self.inner).live.get(&id).cloned()
    }

    /// Number of references not yet revoked
    pub fn live_count(&self) -> usize {
        lock_live(&self.inner).live.len()
    }
}

/// A live object reference. Dropping it revokes the reference.
#[derive(Debug)]
pub struct ObjectUrl {
    id: u64,
    uri: String,
    registry: Arc<Mutex<RegistryInner>>,
}

impl ObjectUrl {
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl Drop for ObjectUrl {
    fn drop(&mut self) {
        lock_live(&self.registry).live.remove(&self.id);
        debug!("Revoked {}", self.uri);
    }
}

/// Displayable status media, owned by the active session and never persisted
#[derive(Debug)]
pub struct MediaAsset {
    pub kind: MediaKind,
    /// Data URI of the image, or of the extracted still for videos
    pub display_source: String,
    /// Playback reference for videos
    pub source: Option<ObjectUrl>,
}

/// Holds the current status media and replaces it on each ingestion
pub struct MediaIngestor<E> {
    extractor: E,
    registry: ObjectUrlRegistry,
    current: Option<MediaAsset>,
}

impl<E: FrameExtractor> MediaIngestor<E> {
    pub fn new(extractor: E) -> Self {
        Self::with_registry(extractor, ObjectUrlRegistry::new())
    }

    pub fn with_registry(extractor: E, registry: ObjectUrlRegistry) -> Self {
        Self {
            extractor,
            registry,
            current: None,
        }
    }

    pub fn registry(&self) -> &ObjectUrlRegistry {
        &self.registry
    }

    pub fn current(&self) -> Option<&MediaAsset> {
        self.current.as_ref()
    }

    /// Release the current media, including its playback reference
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Ingest a selected file. No file is a no-op that returns `None`.
    ///
    /// The previous asset is replaced only once the new one is fully readable,
    /// and its object reference is released at that point.
    pub async fn ingest(&mut self, file: Option<SelectedFile>) -> Result<Option<&MediaAsset>> {
        let Some(file) = file else {
            return Ok(None);
        };

        let mime = file.mime();
        let kind = MediaKind::from_mime(&mime);
        info!("📥 Ingesting {} as {:?} ({})", file.path.display(), kind, mime);

        let asset = match kind {
            MediaKind::Image => {
                let bytes = tokio::fs::read(&file.path).await?;
                let mime = display_mime(&mime, &bytes);
                MediaAsset {
                    kind,
                    display_source: data_uri::encode(&mime, &bytes),
                    source: None,
                }
            }
            MediaKind::Video => {
                // Dropped (and so revoked) if the still cannot be produced
                let object_url = self.registry.create(&file.path);
                let still = self.extractor.extract_mid_frame(&file.path).await?;
                MediaAsset {
                    kind,
                    display_source: still,
                    source: Some(object_url),
                }
            }
        };

        self.current = Some(asset);
        Ok(self.current.as_ref())
    }
}

/// Prefer the sniffed image format over a generic or missing declared type
fn display_mime(declared: &str, bytes: &[u8]) -> String {
    if declared.starts_with("image/") {
        return declared.to_string();
    }
    image::guess_format(bytes)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| declared.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::AtomicUsize;
    use tempfile::tempdir;

    /// Returns a fixed still, or fails when told to
    struct StubExtractor {
        calls: AtomicUsize,
        fail: bool,
    }

    impl StubExtractor {
        fn ok() -> Self {
            Self { calls: AtomicUsize::new(0), fail: false }
        }

        fn failing() -> Self {
            Self { calls: AtomicUsize::new(0), fail: true }
        }
    }

    impl FrameExtractor for StubExtractor {
        async fn extract_mid_frame(&self, _source: &Path) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::decode("seek", "never settled"))
            } else {
                Ok("data:image/png;base64,AAAA".to_string())
            }
        }
    }

    #[test]
    fn test_mime_category_split() {
        assert_eq!(MediaKind::from_mime("video/mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_mime("image/webp"), MediaKind::Image);
        assert_eq!(MediaKind::from_mime("application/octet-stream"), MediaKind::Image);
    }

    #[tokio::test]
    async fn test_no_file_is_a_noop() {
        let mut ingestor = MediaIngestor::new(StubExtractor::ok());
        assert!(ingestor.ingest(None).await.unwrap().is_none());
        assert!(ingestor.current().is_none());
    }

    #[tokio::test]
    async fn test_image_becomes_data_uri() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status.png");
        image::RgbImage::new(3, 2).save(&path).unwrap();

        let mut ingestor = MediaIngestor::new(StubExtractor::ok());
        let asset = ingestor.ingest(Some(SelectedFile::new(&path))).await.unwrap().unwrap();

        assert_eq!(asset.kind, MediaKind::Image);
        assert!(asset.display_source.starts_with("data:image/png;base64,"));
        assert!(asset.source.is_none());
        assert_eq!(ingestor.extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_video_reference_released_when_superseded() {
        let mut ingestor = MediaIngestor::new(StubExtractor::ok());
        let registry = ingestor.registry().clone();

        let first = ingestor
            .ingest(Some(SelectedFile::new("first.mp4")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.kind, MediaKind::Video);
        let first_uri = first.source.as_ref().unwrap().uri().to_string();
        assert_eq!(registry.resolve(&first_uri), Some(PathBuf::from("first.mp4")));

        ingestor.ingest(Some(SelectedFile::new("second.webm"))).await.unwrap();
        assert_eq!(registry.live_count(), 1);
        assert!(registry.resolve(&first_uri).is_none());

        ingestor.clear();
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_extraction_keeps_previous_asset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status.png");
        image::RgbImage::new(1, 1).save(&path).unwrap();

        let mut ingestor = MediaIngestor::new(StubExtractor::failing());
        ingestor.ingest(Some(SelectedFile::new(&path))).await.unwrap();

        let err = ingestor
            .ingest(Some(SelectedFile::new("broken.mp4")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MediaDecodeFailed { .. }));
        assert_eq!(ingestor.current().unwrap().kind, MediaKind::Image);
        assert_eq!(ingestor.registry().live_count(), 0);
    }

    #[test]
    fn test_registry_survives_poisoned_lock() {
        let registry = ObjectUrlRegistry::new();
        let url = registry.create(Path::new("clip.mp4"));

        let inner = Arc::clone(&registry.inner);
        let _ = std::thread::spawn(move || {
            let _guard = inner.lock().unwrap();
            panic!("poison the registry lock");
        })
        .join();
        assert!(registry.inner.is_poisoned());

        assert_eq!(registry.live_count(), 1);
        let second = registry.create(Path::new("other.mp4"));
        assert_eq!(registry.live_count(), 2);
        assert_eq!(registry.resolve(second.uri()), Some(PathBuf::from("other.mp4")));

        drop(url);
        drop(second);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_declared_mime_overrides_extension() {
        let file = SelectedFile::new("clip.bin").with_mime("video/quicktime");
        assert_eq!(MediaKind::from_mime(&file.mime()), MediaKind::Video);
    }
}
