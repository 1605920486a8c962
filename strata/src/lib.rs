//! Layered warehouse ingestion orchestration.
//!
//! `strata` promotes raw tabular files landed in an object store through three
//! progressively curated layers of a cloud warehouse: RAW (schema-inferred
//! from staged files), STAGING (deduplicated, schema-evolved, optionally
//! flattened), and CURATED (filtered subsets and views). The crate covers
//! schema inference and evolution, the deduplicating RAW→STAGING merge, and
//! the asynchronous ingestion-pipe lifecycle; [`pipeline::WarehousePipeline`]
//! composes the per-layer operations over a shared warehouse gateway.

pub mod error;
pub mod layers;
pub mod macros;
pub mod metadata;
pub mod pipe;
pub mod pipeline;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod warehouse;
