//! STAGING layer: projection, schema evolution, and the deduplicating merge.

use strata_config::shared::{FlattenField, FlattenSpec, StagingPolicy};
use tracing::{debug, info};

use crate::error::{ErrorKind, StrataResult};
use crate::metadata::{Column, ColumnSet, table_columns};
use crate::pipeline::PipelineContext;
use crate::{bail, strata_error};
use crate::warehouse::statements::MergeColumn;
use crate::warehouse::{WarehouseClient, statements};

fn is_excluded(name: &str, policy: &StagingPolicy) -> bool {
    policy
        .exclude_columns
        .iter()
        .any(|excluded| excluded.eq_ignore_ascii_case(name))
}

fn flatten_spec_for<'a>(name: &str, policy: &'a StagingPolicy) -> Option<&'a FlattenSpec> {
    policy
        .flatten_columns
        .iter()
        .find(|spec| spec.column.eq_ignore_ascii_case(name))
}

/// STAGING-layer operations for one pipeline namespace.
#[derive(Debug, Clone)]
pub struct StagingOps<W> {
    client: W,
    ctx: PipelineContext,
}

impl<W> StagingOps<W>
where
    W: WarehouseClient,
{
    pub fn new(client: W, ctx: PipelineContext) -> Self {
        Self { client, ctx }
    }

    /// Current RAW column set, re-read from the warehouse on every call.
    async fn raw_columns(&self) -> StrataResult<ColumnSet> {
        let ctx = &self.ctx;
        table_columns(
            &self.client,
            &ctx.global().databases.raw,
            ctx.schema(),
            ctx.table(),
        )
        .await
    }

    /// Current STAGING column set, re-read from the warehouse on every call.
    async fn staging_columns(&self) -> StrataResult<ColumnSet> {
        let ctx = &self.ctx;
        table_columns(
            &self.client,
            &ctx.global().databases.staging,
            ctx.schema(),
            ctx.table(),
        )
        .await
    }

    /// Creates the STAGING table from the RAW structure when it does not yet
    /// exist; an existing table is untouched and later structural changes go
    /// only through [`StagingOps::evolve`].
    pub async fn create(&self) -> StrataResult<()> {
        let ctx = &self.ctx;
        let policy = &ctx.pipeline().staging;
        let raw_columns = self.raw_columns().await?;

        if raw_columns.is_empty() {
            bail!(
                ErrorKind::InvalidData,
                "RAW table has no columns to project into STAGING",
                ctx.raw_table()
            );
        }

        let projected: Vec<String> = raw_columns
            .names()
            .filter(|name| !is_excluded(name, policy))
            .map(str::to_string)
            .collect();
        let flatten_fields: Vec<FlattenField> = policy
            .flatten_columns
            .iter()
            .flat_map(FlattenSpec::resolved_fields)
            .collect();

        let statement = statements::create_staging_table(
            &ctx.staging_table(),
            &ctx.raw_table(),
            &projected,
            &flatten_fields,
        );
        self.client.execute(&statement).await?;

        info!(table = %ctx.staging_table(), "ensured STAGING table");

        Ok(())
    }

    /// Adds newly discovered RAW columns to STAGING.
    ///
    /// Strictly additive: `new = Raw − Staging − Excluded`, added in RAW's
    /// ordinal order with their RAW-inferred types. An empty difference
    /// issues no statement at all.
    pub async fn evolve(&self) -> StrataResult<()> {
        let ctx = &self.ctx;
        let policy = &ctx.pipeline().staging;
        let raw_columns = self.raw_columns().await?;
        let staging_columns = self.staging_columns().await?;

        let new_columns: Vec<Column> = raw_columns
            .iter()
            .filter(|column| {
                !staging_columns.contains(&column.name) && !is_excluded(&column.name, policy)
            })
            .cloned()
            .collect();

        if new_columns.is_empty() {
            debug!(table = %ctx.staging_table(), "no new columns to evolve");
            return Ok(());
        }

        info!(
            table = %ctx.staging_table(),
            columns = ?new_columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            "evolving STAGING schema"
        );

        let statement = statements::evolve_table(&ctx.staging_table(), &new_columns);
        self.client.execute(&statement).await?;

        Ok(())
    }

    /// Merges deduplicated RAW data into STAGING.
    ///
    /// For each distinct primary-key tuple the row with the maximum sort-key
    /// tuple wins; winners update matching STAGING rows and insert new ones.
    /// With no primary keys configured the merge degenerates to a plain
    /// append and never updates existing rows.
    ///
    /// RAW columns are re-fetched immediately before the statement is built,
    /// so the merge always reflects RAW's current structure.
    pub async fn merge(&self) -> StrataResult<()> {
        let ctx = &self.ctx;
        let policy = &ctx.pipeline().staging;
        let raw_columns = self.raw_columns().await?;

        if raw_columns.is_empty() {
            bail!(
                ErrorKind::InvalidData,
                "RAW table has no columns to merge into STAGING",
                ctx.raw_table()
            );
        }

        let mut columns: Vec<MergeColumn> = Vec::with_capacity(raw_columns.len());
        for column in raw_columns.iter() {
            if is_excluded(&column.name, policy) {
                continue;
            }
            match flatten_spec_for(&column.name, policy) {
                // Flatten sources are substituted by their extracted aliases.
                Some(spec) => {
                    for field in spec.resolved_fields() {
                        columns.push(MergeColumn::derived(field.alias, field.expression));
                    }
                }
                None => columns.push(MergeColumn::plain(column.name.as_str())),
            }
        }

        let primary_keys: Vec<String> = policy
            .primary_keys
            .iter()
            .map(|key| key.to_uppercase())
            .collect();
        let sort_keys: Vec<String> = policy
            .sort_key
            .iter()
            .map(|key| key.to_uppercase())
            .collect();

        // Sort keys only matter when there is a key to deduplicate on.
        if !primary_keys.is_empty() {
            for key in primary_keys.iter().chain(sort_keys.iter()) {
                if !columns.iter().any(|column| column.name == *key) {
                    return Err(strata_error!(
                        ErrorKind::InvalidData,
                        "Merge key column is not part of the merged column set",
                        format!("column {key} missing from {}", ctx.raw_table())
                    ));
                }
            }
        }

        let statement = if primary_keys.is_empty() {
            debug!(table = %ctx.staging_table(), "no primary keys configured, appending");
            statements::insert_append(&ctx.staging_table(), &ctx.raw_table(), &columns)
        } else {
            statements::merge_into(
                &ctx.staging_table(),
                &ctx.raw_table(),
                &columns,
                &primary_keys,
                &sort_keys,
            )
        };
        self.client.execute(&statement).await?;

        info!(table = %ctx.staging_table(), "merged RAW into STAGING");

        Ok(())
    }
}
