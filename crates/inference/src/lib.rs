//! HTTP clients for the external inference capabilities.
//!
//! Provides the Replicate prediction client used for character generation,
//! plus thin clients for the face-analysis and background-removal
//! services. Each implements the matching trait from
//! `pickabook_core::capabilities`.

pub mod api;
pub mod background;
pub mod face;
pub mod generator;
mod http;
pub mod poll;
pub mod predictions;
