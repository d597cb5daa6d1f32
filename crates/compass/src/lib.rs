//! Ingestion of raw COMPASS extracts.
//!
//! This crate is the pipeline's view of the upstream dataset: a typed
//! registry of extract kinds, a store-backed catalog of extract files, an
//! in-memory columnar [`SourceTable`] for small lookups, and a bounded
//! [`stream::stream_extract`] streamer for full scans.

pub mod catalog;
pub mod error;
pub mod kind;
pub mod source;
pub mod stream;

pub use catalog::{CatalogConfig, ExtractFile, load_catalog_config};
pub use error::CompassError;
pub use kind::ExtractKind;
pub use source::SourceTable;
pub use stream::{ExtractBatches, stream_extract};
