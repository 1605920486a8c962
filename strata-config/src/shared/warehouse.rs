use serde::Deserialize;

use crate::shared::{PipelineConfig, ValidationError};

/// Per-layer database names for the three curation layers.
#[derive(Debug, Clone, Deserialize)]
pub struct LayerDatabases {
    /// Database holding tables inferred directly from staged files.
    pub raw: String,
    /// Database holding deduplicated, schema-evolved projections of RAW.
    pub staging: String,
    /// Database holding filtered subsets derived from STAGING.
    pub curated: String,
}

impl LayerDatabases {
    /// Iterates over `(layer name, database name)` pairs in promotion order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("raw", self.raw.as_str()),
            ("staging", self.staging.as_str()),
            ("curated", self.curated.as_str()),
        ]
        .into_iter()
    }
}

/// A warehouse-managed housekeeping column added to every RAW table.
///
/// System columns are never inferred from source data; they are added as
/// idempotent decorations after inference, and their `expression` is evaluated
/// by the ingestion pipe's copy statement.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub expression: String,
}

/// Warehouse-wide configuration shared by every pipeline in a file.
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    /// Object-store bucket holding source files.
    pub bucket_name: String,
    /// Prefix within the bucket under which all pipeline prefixes live.
    #[serde(default)]
    pub bucket_path: String,
    /// Layer database names.
    pub databases: LayerDatabases,
    /// Database holding shared utility objects (file formats).
    pub utils_database: String,
    /// Schema within the utilities database.
    pub utils_schema: String,
    /// Name of the shared file format bound to every stage.
    pub file_format: String,
    /// Housekeeping columns appended to every RAW table, in order.
    #[serde(default)]
    pub system_columns: Vec<SystemColumn>,
}

impl WarehouseConfig {
    /// Validates warehouse-level invariants.
    ///
    /// Layer database names must be non-empty and distinct from the utilities
    /// database, which owns shared objects and must never receive layer data.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.utils_database.is_empty() {
            return Err(ValidationError::EmptyField("utils_database"));
        }
        if self.utils_schema.is_empty() {
            return Err(ValidationError::EmptyField("utils_schema"));
        }
        if self.file_format.is_empty() {
            return Err(ValidationError::EmptyField("file_format"));
        }
        if self.bucket_name.is_empty() {
            return Err(ValidationError::EmptyField("bucket_name"));
        }

        for (layer, database) in self.databases.iter() {
            if database.is_empty() {
                return Err(ValidationError::EmptyLayerDatabase(layer));
            }
            if database.eq_ignore_ascii_case(&self.utils_database) {
                return Err(ValidationError::LayerCollidesWithUtils(layer));
            }
        }

        Ok(())
    }
}

/// One configuration file: a warehouse and the pipelines that feed it.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    pub global: WarehouseConfig,
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
}

impl IngestConfig {
    /// Validates the warehouse section and every pipeline section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.global.validate()?;

        for pipeline in &self.pipelines {
            pipeline.validate()?;
        }

        for (idx, pipeline) in self.pipelines.iter().enumerate() {
            let duplicated = self.pipelines[..idx]
                .iter()
                .any(|other| other.namespace.eq_ignore_ascii_case(&pipeline.namespace));
            if duplicated {
                return Err(ValidationError::DuplicateNamespace(
                    pipeline.namespace.clone(),
                ));
            }
        }

        Ok(())
    }
}
