//! Vital-sign ingestion: validation, threshold alerts and summaries over
//! readings from wearable sensors.

pub mod alerts;
pub mod config;
pub mod db;
pub mod errors;
pub mod export;
pub mod ingest;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod mqtt;
pub mod payload;
pub mod rest;
pub mod retention;
pub mod stats;
pub mod store;
pub mod validate;

pub use errors::{Error, Result};
pub use ingest::{BatchOutcome, IngestOutcome, Ingestor};
