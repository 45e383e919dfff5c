//! Font lookup for the card text
//!
//! Faces are matched by file name across the configured directories and the
//! platform font directories. A family that is not installed falls back to a
//! common sans-serif face, then to the first face found.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};

use ab_glyph::FontArc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::ExportConfig;
use crate::state::render::FontChoice;

const FONT_EXTENSIONS: [&str; 3] = ["ttf", "otf", "ttc"];

/// Tried in order when the requested family is missing
const FALLBACK_FAMILIES: [&str; 6] = [
    "Arial",
    "Helvetica",
    "DejaVu Sans",
    "Liberation Sans",
    "Noto Sans",
    "Roboto",
];

/// Name fragments that mark a face as something other than the plain style
const VARIANT_WORDS: [&str; 14] = [
    "bold", "light", "thin", "black", "heavy", "medium", "semi", "extra", "condensed",
    "narrow", "mono", "math", "display", "caption",
];

/// Font files available to the renderer, loaded on first use
pub struct FontBook {
    dirs: Vec<PathBuf>,
    files: OnceLock<Vec<PathBuf>>,
    loaded: Mutex<HashMap<FontChoice, Option<FontArc>>>,
}

impl FontBook {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs,
            files: OnceLock::new(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Platform font directories only
    pub fn system() -> Self {
        Self::new(system_font_dirs())
    }

    /// Configured directories first, then the platform ones
    pub fn from_config(config: &ExportConfig) -> Self {
        let mut dirs = config.font_dirs.clone();
        dirs.extend(system_font_dirs());
        Self::new(dirs)
    }

    /// Every font file found, sorted by path
    pub fn files(&self) -> &[PathBuf] {
        self.files.get_or_init(|| {
            let files = scan_font_files(&self.dirs);
            info!("🔤 Found {} font file(s)", files.len());
            files
        })
    }

    pub fn has_fonts(&self) -> bool {
        !self.files().is_empty()
    }

    /// Best installed face for `choice`, or `None` when no font can be loaded
    pub fn resolve(&self, choice: &FontChoice) -> Option<FontArc> {
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(font) = loaded.get(choice) {
            return font.clone();
        }

        let font = self.pick(choice).and_then(load_font);
        loaded.insert(choice.clone(), font.clone());
        font
    }

    /// File that best matches `choice`, following the fallback chain
    pub fn pick(&self, choice: &FontChoice) -> Option<&Path> {
        let files = self.files();
        let best = best_match(files, &choice.family, choice.italic).or_else(|| {
            debug!("Font family '{}' not installed, falling back", choice.family);
            FALLBACK_FAMILIES
                .iter()
                .find_map(|family| best_match(files, family, choice.italic))
        });
        best.or_else(|| files.first().map(PathBuf::as_path))
    }
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontBook")
            .field("dirs", &self.dirs)
            .field("files", &self.files.get().map(Vec::len))
            .finish()
    }
}

/// Where fonts usually live on Linux, macOS and Windows
pub fn system_font_dirs() -> Vec<PathBuf> {
    let mut dirs_list = Vec::new();
    if let Some(dir) = dirs::font_dir() {
        dirs_list.push(dir);
    }
    if let Some(home) = dirs::home_dir() {
        dirs_list.push(home.join(".fonts"));
    }
    for dir in [
        "/usr/share/fonts",
        "/usr/local/share/fonts",
        "/Library/Fonts",
        "/System/Library/Fonts",
        "C:\\Windows\\Fonts",
    ] {
        dirs_list.push(PathBuf::from(dir));
    }
    dirs_list
}

fn scan_font_files(dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = dirs
        .iter()
        .filter(|dir| dir.is_dir())
        .flat_map(|dir| {
            WalkDir::new(dir)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
        })
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| FONT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files.dedup();
    files
}

fn load_font(path: &Path) -> Option<FontArc> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to read font {}: {}", path.display(), e);
            return None;
        }
    };
    match FontArc::try_from_vec(bytes) {
        Ok(font) => {
            debug!("Loaded font {}", path.display());
            Some(font)
        }
        Err(e) => {
            warn!("Unusable font {}: {}", path.display(), e);
            None
        }
    }
}

fn best_match<'a>(files: &'a [PathBuf], family: &str, italic: bool) -> Option<&'a Path> {
    files
        .iter()
        .filter_map(|path| {
            let stem = path.file_stem()?.to_str()?;
            let score = match_score(stem, family, italic)?;
            Some((score, std::cmp::Reverse(stem.len()), path.as_path()))
        })
        .max_by_key(|(score, shorter, _)| (*score, *shorter))
        .map(|(_, _, path)| path)
}

/// Lowercase letters and digits only, so "DejaVu Sans" matches "DejaVuSans-Oblique"
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// How well a file stem fits a family and slant; `None` if it is another family
fn match_score(stem: &str, family: &str, italic: bool) -> Option<u32> {
    let family = normalize(family);
    if family.is_empty() {
        return None;
    }
    let stem = normalize(stem);
    let rest = stem.strip_prefix(family.as_str())?;

    let slanted = rest.contains("italic") || rest.contains("oblique");
    let plain = !VARIANT_WORDS.iter().any(|word| rest.contains(word));

    let mut score = 1;
    if slanted == italic {
        score += 4;
    }
    if plain {
        score += 2;
    }
    Some(score)
}
