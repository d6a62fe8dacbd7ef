//! Order pipeline: turns an order's photos and a book template into
//! composited pages.
//!
//! [`controller::PipelineController`] owns the order state machine and
//! drives identity extraction, two-phase generation, post-processing and
//! compositing. Everything external is injected as a capability trait
//! object so the pipeline runs against fakes in tests.

pub mod assets;
pub mod controller;
pub mod identity;
pub mod orchestrator;
pub mod postprocess;
pub mod source;
pub mod store;
pub mod workspace;

pub use controller::{OrderJob, OrderReport, PageReport, PhotoInput, PipelineController};
pub use store::{InMemoryProgressStore, PageRecord, ProgressStore};
