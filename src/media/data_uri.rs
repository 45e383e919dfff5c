//! `data:` URI encoding for in-memory images
//!
//! Displayable images and stored profile photos travel as
//! `data:<mime>;base64,<payload>` strings.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{Error, Result};

/// Wrap raw bytes in a base64 data URI
pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Split a base64 data URI into its MIME type and decoded bytes
pub fn decode(uri: &str) -> Result<(String, Vec<u8>)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| Error::decode("data uri", "missing `data:` scheme"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::decode("data uri", "missing payload separator"))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| Error::decode("data uri", "only base64 payloads are supported"))?;

    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| Error::decode("data uri", e.to_string()))?;

    Ok((mime.to_string(), bytes))
}

/// Decode a data URI straight into pixels
pub fn decode_image(uri: &str) -> Result<image::DynamicImage> {
    let (_, bytes) = decode(uri)?;
    image::load_from_memory(&bytes).map_err(|e| Error::decode("image decode", e.to_string()))
}
