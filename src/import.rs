//! Batch import of profile photos into the library
//!
//! Expands the given files and folders into image files, compresses every
//! one of them and returns the results in input order, ready for a single
//! `append_batch`.

use std::path::{Path, PathBuf};

use tokio::task::JoinSet;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::CompressionConfig;
use crate::error::Result;
use crate::media::compress::{self, CompressedPhoto};
use crate::media::ingest::MediaKind;

/// Outcome of an import run
#[derive(Debug, Default)]
pub struct ImportResult {
    pub photos: Vec<CompressedPhoto>,
    /// Files that could not be decoded, with the reason
    pub skipped: Vec<(PathBuf, String)>,
}

/// Whether `path` looks like an image by its extension
fn is_image(path: &Path) -> bool {
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.type_() == mime_guess::mime::IMAGE)
        .unwrap_or(false)
}

/// Expand inputs into image files. Folders are walked recursively and
/// sorted by path; explicitly named files are kept as given.
pub fn collect_image_paths(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && is_image(e.path()))
                .map(|e| e.into_path())
                .collect();
            found.sort();
            info!("🔍 Found {} image(s) in {}", found.len(), input.display());
            paths.extend(found);
        } else if MediaKind::from_mime(
            mime_guess::from_path(input).first_or_octet_stream().essence_str(),
        ) == MediaKind::Video
        {
            warn!("Skipping video {}, profile photos must be images", input.display());
        } else {
            paths.push(input.clone());
        }
    }

    paths
}

/// Compress every file; decodes run concurrently, results keep input order.
/// Undecodable files are reported in `skipped` instead of failing the run.
pub async fn compress_files(paths: Vec<PathBuf>, config: CompressionConfig) -> Result<ImportResult> {
    let mut tasks = JoinSet::new();
    for (index, path) in paths.into_iter().enumerate() {
        tasks.spawn(async move {
            let outcome = match tokio::fs::read(&path).await {
                Ok(bytes) => compress::compress(bytes, config).await,
                Err(e) => Err(e.into()),
            };
            (index, path, outcome)
        });
    }

    let mut done = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        done.push(joined?);
    }
    done.sort_by_key(|(index, _, _)| *index);

    let mut result = ImportResult::default();
    for (_, path, outcome) in done {
        match outcome {
            Ok(compressed) => result.photos.push(compressed.photo),
            Err(e) => {
                warn!("⚠️  Skipping {}: {}", path.display(), e);
                result.skipped.push((path, e.to_string()));
            }
        }
    }
    Ok(result)
}
