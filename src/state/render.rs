//! Explicit render state for the status card
//!
//! This is the single slot the composite renderer reads. The live session
//! owns it; an export borrows it mutably for the whole run and hands it back
//! exactly as it found it.

use rand::Rng;

use crate::media::compress::CompressedPhoto;

/// How the view counter is shown
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ViewCount {
    /// No view counter on the card
    #[default]
    Hidden,
    /// Text shown as-is
    Count(String),
    /// Draw a fresh count for every exported screenshot
    Random,
}

impl ViewCount {
    /// Parse user input. Empty hides the counter; `random` (or `?`) requests
    /// a synthetic count per export.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            ViewCount::Hidden
        } else if trimmed.eq_ignore_ascii_case("random") || trimmed == "?" {
            ViewCount::Random
        } else {
            ViewCount::Count(trimmed.to_string())
        }
    }

    pub fn is_random(&self) -> bool {
        matches!(self, ViewCount::Random)
    }

    /// Text for the card, if any
    pub fn label(&self) -> Option<&str> {
        match self {
            ViewCount::Count(text) => Some(text),
            ViewCount::Hidden | ViewCount::Random => None,
        }
    }
}

/// Caption font selection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FontChoice {
    pub family: String,
    pub italic: bool,
}

impl Default for FontChoice {
    fn default() -> Self {
        Self {
            family: "Arial".to_string(),
            italic: false,
        }
    }
}

impl FontChoice {
    /// Parse `Family` or `Family|italic`
    pub fn parse(value: &str) -> Self {
        match value.strip_suffix("|italic") {
            Some(family) => Self {
                family: family.to_string(),
                italic: true,
            },
            None => Self {
                family: value.to_string(),
                italic: false,
            },
        }
    }
}

/// Everything the status card shows
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    /// Data URI of the status image, or the still frame of a video
    pub status_image: Option<String>,
    pub profile_image: Option<CompressedPhoto>,
    pub caption: String,
    /// Hour part of the time label; required for export
    pub hour: String,
    /// Two-digit minute appended to the hour, when set
    pub minute: Option<String>,
    pub views: ViewCount,
    pub font: FontChoice,
    /// Story progress bar fill, 0.0 to 1.0
    pub progress: f32,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            status_image: None,
            profile_image: None,
            caption: String::new(),
            hour: String::new(),
            minute: None,
            views: ViewCount::Hidden,
            font: FontChoice::default(),
            progress: 0.6,
        }
    }
}

impl RenderState {
    /// Fresh session state with the progress bar somewhere between 40% and 80%
    pub fn new_session<R: Rng>(rng: &mut R) -> Self {
        Self {
            progress: rng.gen_range(0.4..0.8),
            ..Self::default()
        }
    }

    pub fn has_hour(&self) -> bool {
        !self.hour.trim().is_empty()
    }

    /// `hour` or `hour:minute`, or `None` when no hour is set
    pub fn time_label(&self) -> Option<String> {
        if !self.has_hour() {
            return None;
        }
        let hour = self.hour.trim();
        Some(match &self.minute {
            Some(minute) => format!("{}:{}", hour, minute),
            None => hour.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_view_count_parsing() {
        assert_eq!(ViewCount::parse(""), ViewCount::Hidden);
        assert_eq!(ViewCount::parse(" 123 "), ViewCount::Count("123".to_string()));
        assert_eq!(ViewCount::parse("Random"), ViewCount::Random);
        assert_eq!(ViewCount::parse("?"), ViewCount::Random);
        assert_eq!(ViewCount::Random.label(), None);
    }

    #[test]
    fn test_font_choice_parsing() {
        assert_eq!(
            FontChoice::parse("Georgia|italic"),
            FontChoice { family: "Georgia".to_string(), italic: true }
        );
        assert_eq!(
            FontChoice::parse("Times New Roman"),
            FontChoice { family: "Times New Roman".to_string(), italic: false }
        );
    }

    #[test]
    fn test_time_label() {
        let mut state = RenderState::default();
        assert_eq!(state.time_label(), None);

        state.hour = "14".to_string();
        assert_eq!(state.time_label().as_deref(), Some("14"));

        state.minute = Some("07".to_string());
        assert_eq!(state.time_label().as_deref(), Some("14:07"));
    }

    #[test]
    fn test_session_progress_range() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let state = RenderState::new_session(&mut rng);
            assert!((0.4..0.8).contains(&state.progress));
        }
    }
}
