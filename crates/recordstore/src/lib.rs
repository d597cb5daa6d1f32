//! Record store boundary for the swanlake derivation pipeline.
//!
//! Tables are declared as typed Rust structs ([`Record`]), converted to and
//! from Arrow record batches with serde_arrow, filtered with set-membership
//! [`Predicate`]s, and written through a deduplicating [`RecordStore::insert_many`]
//! that makes every derivation safe to re-run.

pub mod error;
pub mod memory;
pub mod parquet_store;
pub mod predicate;
pub mod schema;
pub mod store;
pub mod typed;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use parquet_store::ParquetStore;
pub use predicate::{Predicate, Scalar, scalar_at};
pub use schema::{ForArrow, Record, row_key};
pub use store::{BatchStream, RecordStore};
