//! Per-layer warehouse operations.
//!
//! One capability type per curation layer, each holding a gateway handle and
//! the shared pipeline context. Composition happens in
//! [`crate::pipeline::WarehousePipeline`].

pub mod curated;
pub mod environment;
pub mod raw;
pub mod staging;
