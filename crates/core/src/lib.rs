//! Domain core for the storybook pipeline.
//!
//! Pure types and algorithms with no I/O beyond in-memory image work:
//! photo quality, identity selection, artifact correction, slot
//! compositing, template descriptors, the fallback chain and the order
//! state machine. External
//! services are reached through the traits in [`capabilities`].

pub mod artifact;
pub mod background;
pub mod capabilities;
pub mod compositor;
pub mod error;
pub mod fallback;
pub mod identity;
pub mod order;
pub mod prompt;
pub mod quality;
pub mod retry;
pub mod template;
pub mod types;
