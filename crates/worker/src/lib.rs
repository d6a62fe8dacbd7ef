//! Order worker: configuration, Postgres-backed progress and the polling
//! loop that feeds queued orders to the pipeline.

pub mod config;
pub mod runner;
pub mod services;
pub mod store;
