//! SQL statement builders for every warehouse operation.
//!
//! Pure functions from configuration to statement text. Statements are built
//! multi-line for readability and whitespace-normalized by the gateway before
//! submission. Everything here is idempotent by construction: provisioning
//! uses `IF NOT EXISTS`, replacement uses `CREATE OR REPLACE`.

use std::collections::BTreeMap;

use strata_config::shared::{FlattenField, SystemColumn};

use crate::metadata::Column;

/// A column participating in the RAW→STAGING merge.
///
/// `select_expression` is the expression projected from RAW for this column;
/// it differs from `name` only for flatten-derived alias columns.
#[derive(Debug, Clone)]
pub struct MergeColumn {
    pub name: String,
    pub select_expression: String,
}

impl MergeColumn {
    /// A plain column projected under its own name.
    pub fn plain(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            select_expression: name.clone(),
            name,
        }
    }

    /// A derived column projected from an extraction expression.
    pub fn derived(name: impl Into<String>, select_expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            select_expression: select_expression.into(),
        }
    }

    fn select_item(&self) -> String {
        if self.select_expression == self.name {
            self.name.clone()
        } else {
            format!("{} AS {}", self.select_expression, self.name)
        }
    }
}

pub fn create_database(name: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {name};")
}

pub fn create_schema(database: &str, schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {database}.{schema};")
}

/// CSV file format shared by every stage.
///
/// `PARSE_HEADER` is required for schema inference over CSV files.
pub fn create_file_format(database: &str, schema: &str, name: &str) -> String {
    format!(
        "CREATE FILE FORMAT IF NOT EXISTS {database}.{schema}.{name} \
         TYPE = CSV \
         PARSE_HEADER = TRUE \
         FIELD_OPTIONALLY_ENCLOSED_BY = '\"' \
         TRIM_SPACE = TRUE \
         ERROR_ON_COLUMN_COUNT_MISMATCH = FALSE;"
    )
}

pub fn create_stage(database: &str, schema: &str, stage: &str, file_format_ref: &str) -> String {
    format!(
        "CREATE STAGE IF NOT EXISTS {database}.{schema}.{stage} \
         FILE_FORMAT = {file_format_ref};"
    )
}

/// Uploads one local file into a stage path, overwriting a same-named object
/// so re-staging is safe to repeat.
pub fn put_file(local_path: &str, stage_uri: &str) -> String {
    format!("PUT file://{local_path} {stage_uri} AUTO_COMPRESS = FALSE OVERWRITE = TRUE;")
}

/// Column metadata for a table, ordered by ordinal position.
pub fn table_columns_query(database: &str, schema: &str, table: &str) -> String {
    format!(
        "SELECT COLUMN_NAME, DATA_TYPE \
         FROM {database}.INFORMATION_SCHEMA.COLUMNS \
         WHERE TABLE_SCHEMA = '{}' AND TABLE_NAME = '{}' \
         ORDER BY ORDINAL_POSITION;",
        schema.to_uppercase(),
        table.to_uppercase(),
    )
}

/// Creates the RAW table from the layout inferred over currently staged files.
///
/// `CREATE TABLE IF NOT EXISTS` makes re-inference safe: an existing table is
/// left untouched, so columns are never dropped or retyped by a re-run.
/// `column_overrides` substitute the inferred type for the named columns.
pub fn create_inferred_table(
    table: &str,
    stage_location: &str,
    file_format_ref: &str,
    max_file_count: usize,
    column_overrides: &BTreeMap<String, String>,
) -> String {
    let type_expression = if column_overrides.is_empty() {
        "TYPE".to_string()
    } else {
        let arms = column_overrides
            .iter()
            .map(|(column, data_type)| {
                format!(
                    "WHEN '{}' THEN '{}'",
                    column.to_uppercase(),
                    data_type.to_uppercase()
                )
            })
            .collect::<Vec<_>>()
            .join(" ");
        format!("CASE UPPER(COLUMN_NAME) {arms} ELSE TYPE END")
    };

    format!(
        "CREATE TABLE IF NOT EXISTS {table} USING TEMPLATE ( \
           SELECT ARRAY_AGG(OBJECT_CONSTRUCT( \
             'COLUMN_NAME', COLUMN_NAME, \
             'TYPE', {type_expression}, \
             'NULLABLE', NULLABLE)) \
           FROM TABLE(INFER_SCHEMA( \
             LOCATION => '{stage_location}', \
             FILE_FORMAT => '{file_format_ref}', \
             MAX_FILE_COUNT => {max_file_count})) \
         );"
    )
}

/// Adds one housekeeping column when missing. System columns are idempotent
/// decorations, never inferred from source data.
pub fn add_system_column(table: &str, column: &SystemColumn) -> String {
    format!(
        "ALTER TABLE {table} ADD COLUMN IF NOT EXISTS {} {};",
        column.name, column.data_type
    )
}

/// Creates the STAGING table by projecting the RAW layout over an empty row
/// set. Flatten-derived alias columns follow the projected source columns.
pub fn create_staging_table(
    staging_table: &str,
    raw_table: &str,
    columns: &[String],
    flatten_fields: &[FlattenField],
) -> String {
    let mut select_items: Vec<String> = columns.to_vec();
    for field in flatten_fields {
        select_items.push(format!("{} AS {}", field.expression, field.alias));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {staging_table} AS \
         SELECT {} FROM {raw_table} WHERE FALSE;",
        select_items.join(", ")
    )
}

/// One additive alter listing every newly discovered column, in RAW ordinal
/// order, with its RAW-inferred type.
pub fn evolve_table(table: &str, new_columns: &[Column]) -> String {
    let additions = new_columns
        .iter()
        .map(|column| format!("COLUMN IF NOT EXISTS {} {}", column.name, column.data_type))
        .collect::<Vec<_>>()
        .join(", ");

    format!("ALTER TABLE {table} ADD {additions};")
}

/// Deduplicating upsert from RAW into STAGING.
///
/// One winning row per primary-key tuple: the row with the maximum sort-key
/// tuple, sort keys compared in configured order, latest first.
pub fn merge_into(
    target_table: &str,
    source_table: &str,
    columns: &[MergeColumn],
    primary_keys: &[String],
    sort_keys: &[String],
) -> String {
    let select_list = columns
        .iter()
        .map(MergeColumn::select_item)
        .collect::<Vec<_>>()
        .join(", ");

    let partition = primary_keys.join(", ");
    let order = sort_keys
        .iter()
        .map(|key| format!("{key} DESC"))
        .collect::<Vec<_>>()
        .join(", ");

    let on = primary_keys
        .iter()
        .map(|key| format!("target.{key} = source.{key}"))
        .collect::<Vec<_>>()
        .join(" AND ");

    let update_set = columns
        .iter()
        .filter(|column| !primary_keys.iter().any(|key| key == &column.name))
        .map(|column| format!("target.{0} = source.{0}", column.name))
        .collect::<Vec<_>>()
        .join(", ");

    let insert_columns = columns
        .iter()
        .map(|column| column.name.clone())
        .collect::<Vec<_>>()
        .join(", ");
    let insert_values = columns
        .iter()
        .map(|column| format!("source.{}", column.name))
        .collect::<Vec<_>>()
        .join(", ");

    let matched_clause = if update_set.is_empty() {
        // Every projected column is part of the key; nothing to update.
        String::new()
    } else {
        format!("WHEN MATCHED THEN UPDATE SET {update_set} ")
    };

    format!(
        "MERGE INTO {target_table} AS target USING ( \
           SELECT {select_list} FROM {source_table} \
           QUALIFY ROW_NUMBER() OVER (PARTITION BY {partition} ORDER BY {order}) = 1 \
         ) AS source ON {on} \
         {matched_clause}\
         WHEN NOT MATCHED THEN INSERT ({insert_columns}) VALUES ({insert_values});"
    )
}

/// Plain append from RAW into STAGING, used when no primary keys are
/// configured. Never updates existing rows.
pub fn insert_append(target_table: &str, source_table: &str, columns: &[MergeColumn]) -> String {
    let insert_columns = columns
        .iter()
        .map(|column| column.name.clone())
        .collect::<Vec<_>>()
        .join(", ");
    let select_list = columns
        .iter()
        .map(MergeColumn::select_item)
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {target_table} ({insert_columns}) \
         SELECT {select_list} FROM {source_table};"
    )
}

/// Copy statement loading staged files into RAW, evaluating every system
/// column's value expression alongside the file data.
pub fn copy_into(
    table: &str,
    stage_location: &str,
    file_format_ref: &str,
    system_columns: &[SystemColumn],
) -> String {
    let include_metadata = if system_columns.is_empty() {
        String::new()
    } else {
        let assignments = system_columns
            .iter()
            .map(|column| format!("{} = {}", column.name, column.expression))
            .collect::<Vec<_>>()
            .join(", ");
        format!(" INCLUDE_METADATA = ({assignments})")
    };

    format!(
        "COPY INTO {table} FROM '{stage_location}' \
         FILE_FORMAT = (FORMAT_NAME = '{file_format_ref}') \
         MATCH_BY_COLUMN_NAME = CASE_INSENSITIVE{include_metadata};"
    )
}

/// (Re)defines the ingestion pipe around a copy statement. Replacing an
/// existing pipe does not affect already-ingested data.
pub fn create_pipe(pipe: &str, copy_statement: &str) -> String {
    let copy_statement = copy_statement.trim_end_matches(';');
    format!("CREATE OR REPLACE PIPE {pipe} AS {copy_statement};")
}

pub fn refresh_pipe(pipe: &str) -> String {
    format!("ALTER PIPE {pipe} REFRESH;")
}

pub fn pipe_status(pipe: &str) -> String {
    format!("SELECT SYSTEM$PIPE_STATUS('{pipe}');")
}

/// Materializes one curated subset: a filtered copy, or a secure view when
/// `secure` is set.
pub fn create_subset(
    subset_object: &str,
    staging_table: &str,
    filters: &[String],
    secure: bool,
) -> String {
    let object_type = if secure { "SECURE VIEW" } else { "TABLE" };
    let where_clause = if filters.is_empty() {
        "TRUE".to_string()
    } else {
        filters.join(" AND ")
    };

    format!(
        "CREATE OR REPLACE {object_type} {subset_object} AS \
         SELECT * FROM {staging_table} WHERE {where_clause};"
    )
}
