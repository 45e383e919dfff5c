//! Per-screenshot export jobs and their synthetic metadata

use std::ops::RangeInclusive;

use rand::Rng;

use crate::media::compress::CompressedPhoto;
use crate::state::render::{RenderState, ViewCount};

/// Range synthetic view counts are drawn from
pub const SYNTHETIC_VIEWS: RangeInclusive<u32> = 52..=70;

/// One screenshot to produce. Lives for a single orchestrator iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportJob {
    /// Profile photo to show; `None` keeps the live one
    pub profile_image: Option<CompressedPhoto>,
    /// 1-based position in a batch; `None` for a single default export
    pub sequence_number: Option<usize>,
    /// Drawn only when the view counter asks for randomness
    pub synthetic_views: Option<u32>,
    /// Two-digit minute, `00` to `59`
    pub synthetic_minute: String,
}

impl ExportJob {
    /// Build a job with freshly drawn metadata
    pub fn roll<R: Rng>(
        rng: &mut R,
        views: &ViewCount,
        profile_image: Option<CompressedPhoto>,
        sequence_number: Option<usize>,
    ) -> Self {
        let synthetic_views = views.is_random().then(|| random_views(rng));
        Self {
            profile_image,
            sequence_number,
            synthetic_views,
            synthetic_minute: random_minute(rng),
        }
    }

    /// Push this job's values into the render state
    pub fn apply(&self, state: &mut RenderState) {
        if let Some(photo) = &self.profile_image {
            state.profile_image = Some(photo.clone());
        }
        if let Some(views) = self.synthetic_views {
            state.views = ViewCount::Count(views.to_string());
        }
        state.minute = Some(self.synthetic_minute.clone());
    }

    /// `<stem>-screenshot.png`, or `<stem>-screenshot-<n>.png` inside a batch
    pub fn filename(&self, stem: &str) -> String {
        match self.sequence_number {
            Some(n) => format!("{}-screenshot-{}.png", stem, n),
            None => format!("{}-screenshot.png", stem),
        }
    }
}

pub fn random_views<R: Rng>(rng: &mut R) -> u32 {
    rng.gen_range(SYNTHETIC_VIEWS)
}

pub fn random_minute<R: Rng>(rng: &mut R) -> String {
    format!("{:02}", rng.gen_range(0..=59u32))
}
