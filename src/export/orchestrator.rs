//! Batch screenshot export
//!
//! Drives the render state through one snapshot per job, strictly in
//! sequence: apply the job, let the view settle, capture, save, restore.
//! Job k+1 never touches the state before job k has been saved, and the
//! state is handed back exactly as it was, whether the run succeeds or not.

use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;
use tracing::{error, info};

use super::job::ExportJob;
use super::renderer::{CaptureOptions, CompositeRenderer};
use super::sink::OutputSink;
use crate::config::ExportConfig;
use crate::error::{Error, Result};
use crate::media::compress::CompressedPhoto;
use crate::state::kv::KeyValueStore;
use crate::state::library::PhotoLibrary;
use crate::state::render::RenderState;
use crate::state::selection::SelectionSet;

/// What to wait for between mutating the state and capturing it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleStrategy {
    /// Sleep for a fixed time so a live view can repaint
    FixedDelay(Duration),
    /// Capture right away; for renderers that read the state directly
    Immediate,
}

impl SettleStrategy {
    pub async fn settle(&self) {
        match self {
            SettleStrategy::FixedDelay(delay) => tokio::time::sleep(*delay).await,
            SettleStrategy::Immediate => {}
        }
    }
}

/// One screenshot that made it to the sink
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedShot {
    pub path: PathBuf,
    pub sequence_number: Option<usize>,
    pub synthetic_views: Option<u32>,
    pub synthetic_minute: String,
}

/// Sequences export jobs through a renderer and a sink
pub struct ExportOrchestrator<R, O> {
    renderer: R,
    sink: O,
    options: CaptureOptions,
    settle: SettleStrategy,
    filename_stem: String,
}

impl<R: CompositeRenderer, O: OutputSink> ExportOrchestrator<R, O> {
    pub fn new(renderer: R, sink: O) -> Self {
        Self {
            renderer,
            sink,
            options: CaptureOptions::default(),
            settle: SettleStrategy::FixedDelay(Duration::from_millis(100)),
            filename_stem: "whatsapp-status".to_string(),
        }
    }

    pub fn from_config(renderer: R, sink: O, config: &ExportConfig) -> Self {
        Self::new(renderer, sink)
            .with_options(CaptureOptions::with_scale(config.scale))
            .with_settle(SettleStrategy::FixedDelay(config.settle_delay()))
            .with_filename_stem(config.filename_stem.clone())
    }

    pub fn with_options(mut self, options: CaptureOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_settle(mut self, settle: SettleStrategy) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_filename_stem(mut self, stem: impl Into<String>) -> Self {
        self.filename_stem = stem.into();
        self
    }

    pub fn sink(&self) -> &O {
        &self.sink
    }

    /// Export one screenshot per selected library photo, or a single default
    /// screenshot when nothing is selected.
    ///
    /// Fails with `MissingHour` before reading the library or producing
    /// anything. A failure part way through returns `ExportAborted` naming
    /// the job; screenshots already saved stay on disk.
    pub async fn run_export<S: KeyValueStore, G: Rng>(
        &mut self,
        state: &mut RenderState,
        selection: &SelectionSet,
        library: &PhotoLibrary<S>,
        rng: &mut G,
    ) -> Result<Vec<ExportedShot>> {
        if !state.has_hour() {
            return Err(Error::MissingHour);
        }

        // Resolve everything up front so a stale index fails before any capture
        let profiles: Vec<Option<CompressedPhoto>> = if selection.is_empty() {
            vec![None]
        } else {
            let photos = library.load_all()?;
            selection.resolve(&photos)?.into_iter().map(Some).collect()
        };
        let batch = !selection.is_empty();
        let total = profiles.len();

        info!("📸 Exporting {} screenshot(s)", total);

        let snapshot = state.clone();
        let mut shots: Vec<ExportedShot> = Vec::with_capacity(total);

        for (i, profile) in profiles.into_iter().enumerate() {
            let sequence_number = batch.then_some(i + 1);
            let job = ExportJob::roll(rng, &snapshot.views, profile, sequence_number);

            let outcome = self.run_job(state, &job).await;
            // Hand the slot back before anything else happens
            state.clone_from(&snapshot);

            match outcome {
                Ok(path) => shots.push(ExportedShot {
                    path,
                    sequence_number: job.sequence_number,
                    synthetic_views: job.synthetic_views,
                    synthetic_minute: job.synthetic_minute,
                }),
                Err(source) => {
                    error!("Export job {} of {} failed: {}", i + 1, total, source);
                    return Err(Error::ExportAborted {
                        job: i + 1,
                        total,
                        saved: shots.into_iter().map(|shot| shot.path).collect(),
                        source: Box::new(source),
                    });
                }
            }
        }

        info!("✅ Export complete: {} file(s)", shots.len());
        Ok(shots)
    }

    /// apply -> settle -> capture -> save
    async fn run_job(&mut self, state: &mut RenderState, job: &ExportJob) -> Result<PathBuf> {
        job.apply(state);
        self.settle.settle().await;

        let raster = self.renderer.capture(state, &self.options).await?;
        let filename = job.filename(&self.filename_stem);
        info!(
            "Captured {} (views: {:?}, minute: {})",
            filename, job.synthetic_views, job.synthetic_minute
        );
        self.sink.save(&filename, &raster).await
    }
}
