/// Screenshot export module
///
/// This module handles:
/// - Export jobs with synthetic view counts and minutes (job.rs)
/// - The composite renderer interface and built-in card renderer (renderer.rs)
/// - Font lookup for the card text (fonts.rs)
/// - Saving finished PNGs (sink.rs)
/// - Sequencing jobs over the shared render state (orchestrator.rs)

pub mod fonts;
pub mod job;
pub mod orchestrator;
pub mod renderer;
pub mod sink;

pub use fonts::FontBook;
pub use orchestrator::{ExportOrchestrator, ExportedShot, SettleStrategy};
pub use renderer::{CaptureOptions, CardRenderer, CompositeRenderer};
pub use sink::{DirectorySink, OutputSink};
