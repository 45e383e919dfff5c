/// State management module
///
/// This module handles all application state, including:
/// - Flat key-value persistence with atomic batches (kv.rs)
/// - The ordered profile photo library on top of it (library.rs)
/// - The render state read by the composite renderer (render.rs)
/// - Photos selected for batch export (selection.rs)

pub mod kv;
pub mod library;
pub mod render;
pub mod selection;
