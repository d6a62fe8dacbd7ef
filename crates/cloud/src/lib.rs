//! Blob publication backends for finished pages.
//!
//! Both stores implement `pickabook_core::capabilities::BlobStore`: an S3
//! (or S3-compatible) bucket, and a plain directory served as static
//! files.

pub mod local;
pub mod s3;

pub use local::LocalBlobStore;
pub use s3::{S3BlobStore, S3Config};
