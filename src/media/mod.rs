/// Media pipeline module
///
/// This module handles:
/// - Encoding images as data URIs (data_uri.rs)
/// - Turning selected files into displayable media (ingest.rs)
/// - Extracting a representative still from videos (frame.rs)
/// - Compressing profile photos to a size budget (compress.rs)

pub mod data_uri;
pub mod ingest;
pub mod frame;
pub mod compress;
