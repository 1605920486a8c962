//! Shared configuration types for strata pipelines.

mod base;
mod connection;
mod pipeline;
mod warehouse;

pub use base::ValidationError;
pub use connection::{
    CredentialsError, ObjectStoreConnectionConfig, WarehouseConnectionConfig,
    WarehouseConnectionConfigWithoutSecrets,
};
pub use pipeline::{
    DEFAULT_SORT_COLUMN, FlattenField, FlattenSpec, PipelineConfig, StagingPolicy, SubsetSpec,
};
pub use warehouse::{IngestConfig, LayerDatabases, SystemColumn, WarehouseConfig};
