use std::collections::BTreeMap;

use serde::Deserialize;

use crate::shared::ValidationError;

/// Default sort column used to pick the winning row during merges.
///
/// This is the ingestion-timestamp system column, so with no explicit sort key
/// the latest ingested row wins.
pub const DEFAULT_SORT_COLUMN: &str = "_INGESTED_TIMESTAMP";

fn default_max_file_count() -> usize {
    5
}

fn default_sort_key() -> Vec<String> {
    vec![DEFAULT_SORT_COLUMN.to_string()]
}

/// A single extraction expression with its resolved output alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenField {
    pub expression: String,
    pub alias: String,
}

/// A rule extracting nested fields out of a semi-structured column into flat
/// aliased columns.
#[derive(Debug, Clone, Deserialize)]
pub struct FlattenSpec {
    /// Source column holding the semi-structured payload.
    pub column: String,
    /// Extraction expressions, each optionally carrying an explicit
    /// `AS <alias>` suffix.
    pub fields: Vec<String>,
}

impl FlattenSpec {
    /// Resolves every field into an `(expression, alias)` pair.
    ///
    /// The alias is the identifier after an explicit ` AS `, or the trailing
    /// identifier after the last extraction operator (`:` or `.`) when no
    /// alias is given. A `::type` cast suffix never contributes to the alias.
    pub fn resolved_fields(&self) -> Vec<FlattenField> {
        self.fields
            .iter()
            .map(|field| {
                let (expression, alias) = split_alias(field);
                FlattenField {
                    expression: expression.to_string(),
                    alias: alias.to_uppercase(),
                }
            })
            .collect()
    }

    /// Resolved output aliases, in field order.
    pub fn aliases(&self) -> Vec<String> {
        self.resolved_fields()
            .into_iter()
            .map(|field| field.alias)
            .collect()
    }
}

/// Splits `expr AS alias` into its parts, deriving the alias from the
/// expression itself when no explicit alias is present.
fn split_alias(field: &str) -> (&str, &str) {
    // ASCII-only uppercasing keeps byte offsets aligned with the original.
    let upper = field.to_ascii_uppercase();
    if let Some(position) = upper.rfind(" AS ") {
        let expression = field[..position].trim_end();
        let alias = field[position + 4..].trim();
        return (expression, alias);
    }

    let expression = field.trim();
    // Strip a trailing `::type` cast before looking for the extraction operator.
    let without_cast = match expression.rfind("::") {
        Some(position) => &expression[..position],
        None => expression,
    };
    let alias = without_cast
        .rsplit(|c| c == ':' || c == '.')
        .next()
        .unwrap_or(without_cast);

    (expression, alias)
}

/// Controls how RAW rows are projected and deduplicated into STAGING.
#[derive(Debug, Clone, Deserialize)]
pub struct StagingPolicy {
    /// RAW columns never propagated to STAGING.
    #[serde(default)]
    pub exclude_columns: Vec<String>,
    /// Flatten rules applied to semi-structured columns.
    #[serde(default)]
    pub flatten_columns: Vec<FlattenSpec>,
    /// Primary-key columns the merge deduplicates on. Empty means append-only.
    #[serde(default)]
    pub primary_keys: Vec<String>,
    /// Sort-key columns, compared lexicographically to pick the winning row.
    #[serde(default = "default_sort_key")]
    pub sort_key: Vec<String>,
}

impl Default for StagingPolicy {
    fn default() -> Self {
        Self {
            exclude_columns: Vec::new(),
            flatten_columns: Vec::new(),
            primary_keys: Vec::new(),
            sort_key: default_sort_key(),
        }
    }
}

/// A filtered subset of STAGING materialized into the CURATED layer.
#[derive(Debug, Clone, Deserialize)]
pub struct SubsetSpec {
    /// Name of the curated table or view.
    pub name: String,
    /// Filter predicates, combined as a conjunction. Empty means all rows.
    #[serde(default)]
    pub filters: Vec<String>,
    /// When set, a secure view is created instead of a table.
    #[serde(default)]
    pub secure: bool,
}

/// Configuration for a single ingestion pipeline.
///
/// The namespace doubles as the stage, table, and pipe name within each layer
/// database, so it must be unique per warehouse.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub namespace: String,
    pub schema: String,
    /// Object-store prefix (relative to the global bucket path) holding this
    /// pipeline's source files.
    #[serde(default)]
    pub bucket_path: String,
    /// Maximum number of staged files examined per schema-inference pass.
    #[serde(default = "default_max_file_count")]
    pub max_file_count: usize,
    /// Per-column type overrides applied during schema inference.
    #[serde(default)]
    pub column_overrides: BTreeMap<String, String>,
    #[serde(default)]
    pub staging: StagingPolicy,
    #[serde(default)]
    pub subsets: Vec<SubsetSpec>,
}

impl PipelineConfig {
    /// Validates pipeline-level invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.namespace.is_empty() {
            return Err(ValidationError::EmptyNamespace);
        }
        if self.schema.is_empty() {
            return Err(ValidationError::EmptySchema(self.namespace.clone()));
        }
        if self.max_file_count == 0 {
            return Err(ValidationError::MaxFileCountZero(self.namespace.clone()));
        }
        for subset in &self.subsets {
            if subset.name.is_empty() {
                return Err(ValidationError::EmptySubsetName(self.namespace.clone()));
            }
        }

        Ok(())
    }

    /// Object-store prefix for this pipeline, lower-cased with no trailing
    /// separator.
    pub fn prefix(&self) -> String {
        self.bucket_path.trim_end_matches('/').to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_alias_wins() {
        let spec = FlattenSpec {
            column: "PAYLOAD".to_string(),
            fields: vec!["PAYLOAD:customer.id::STRING AS customer_id".to_string()],
        };

        let fields = spec.resolved_fields();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].expression, "PAYLOAD:customer.id::STRING");
        assert_eq!(fields[0].alias, "CUSTOMER_ID");
    }

    #[test]
    fn alias_derived_from_trailing_identifier() {
        let spec = FlattenSpec {
            column: "PAYLOAD".to_string(),
            fields: vec![
                "PAYLOAD:order_id".to_string(),
                "PAYLOAD:customer.region::STRING".to_string(),
            ],
        };

        assert_eq!(spec.aliases(), vec!["ORDER_ID", "REGION"]);
    }

    #[test]
    fn sort_key_defaults_to_ingestion_timestamp() {
        let policy = StagingPolicy::default();
        assert_eq!(policy.sort_key, vec![DEFAULT_SORT_COLUMN.to_string()]);
    }

    #[test]
    fn rejects_zero_max_file_count() {
        let pipeline = PipelineConfig {
            namespace: "orders".to_string(),
            schema: "SALES".to_string(),
            bucket_path: "orders".to_string(),
            max_file_count: 0,
            column_overrides: BTreeMap::new(),
            staging: StagingPolicy::default(),
            subsets: Vec::new(),
        };

        assert!(matches!(
            pipeline.validate(),
            Err(ValidationError::MaxFileCountZero(_))
        ));
    }

    #[test]
    fn prefix_is_lowercased_without_trailing_separator() {
        let pipeline = PipelineConfig {
            namespace: "orders".to_string(),
            schema: "SALES".to_string(),
            bucket_path: "Inbound/Orders/".to_string(),
            max_file_count: 5,
            column_overrides: BTreeMap::new(),
            staging: StagingPolicy::default(),
            subsets: Vec::new(),
        };

        assert_eq!(pipeline.prefix(), "inbound/orders");
    }
}
