//! Status screenshot composer
//!
//! Builds mock chat-status screenshots from a status image or video, keeps a
//! persistent library of compressed profile photos, and batch-exports one
//! screenshot per selected photo.

pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod logging;
pub mod media;
pub mod state;

pub use error::{Error, Result};
