//! Warehouse environment provisioning and file staging.

use std::path::Path;

use strata_config::shared::WarehouseConfig;
use tracing::{debug, info};

use crate::error::StrataResult;
use crate::pipeline::PipelineContext;
use crate::warehouse::{WarehouseClient, statements};

/// Creates the utilities database/schema/file-format and every layer
/// database. Every statement uses `IF NOT EXISTS`, so re-running against an
/// already-provisioned warehouse is a no-op.
pub async fn provision<W>(client: &W, config: &WarehouseConfig) -> StrataResult<()>
where
    W: WarehouseClient,
{
    client
        .execute(&statements::create_database(&config.utils_database))
        .await?;
    client
        .execute(&statements::create_schema(
            &config.utils_database,
            &config.utils_schema,
        ))
        .await?;
    client
        .execute(&statements::create_file_format(
            &config.utils_database,
            &config.utils_schema,
            &config.file_format,
        ))
        .await?;

    for (layer, database) in config.databases.iter() {
        client
            .execute(&statements::create_database(database))
            .await?;
        debug!(layer, database, "ensured layer database");
    }

    Ok(())
}

/// Idempotent schema creation within one database.
pub async fn provision_schema<W>(client: &W, database: &str, schema: &str) -> StrataResult<()>
where
    W: WarehouseClient,
{
    client
        .execute(&statements::create_schema(database, schema))
        .await?;

    Ok(())
}

/// Environment operations scoped to one pipeline namespace.
#[derive(Debug, Clone)]
pub struct EnvironmentOps<W> {
    client: W,
    ctx: PipelineContext,
}

impl<W> EnvironmentOps<W>
where
    W: WarehouseClient,
{
    pub fn new(client: W, ctx: PipelineContext) -> Self {
        Self { client, ctx }
    }

    /// Ensures the pipeline's schema exists in every layer database, before
    /// any layer-specific work touches it.
    pub async fn prepare_schemas(&self) -> StrataResult<()> {
        let schema = self.ctx.schema();
        for (layer, database) in self.ctx.global().databases.iter() {
            provision_schema(&self.client, database, schema).await?;
            info!(layer, database, schema, "ensured schema");
        }

        Ok(())
    }

    /// Idempotently (re)creates the stage and uploads every CSV file in
    /// `local_dir`, overwriting same-named objects so re-staging is safe.
    ///
    /// Returns the number of files staged.
    pub async fn stage_files(&self, local_dir: &Path) -> StrataResult<usize> {
        let ctx = &self.ctx;
        self.client
            .execute(&statements::create_stage(
                &ctx.global().databases.raw,
                ctx.schema(),
                ctx.stage(),
                &ctx.file_format_ref(),
            ))
            .await?;

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(local_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_csv = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            if path.is_file() && is_csv {
                files.push(path);
            }
        }
        files.sort();

        let stage_location = ctx.stage_location();
        for path in &files {
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let stage_uri = format!("{stage_location}{file_name}");
            self.client
                .execute(&statements::put_file(&path.display().to_string(), &stage_uri))
                .await?;
        }

        info!(
            stage = %ctx.stage_location(),
            files = files.len(),
            "staged local files"
        );

        Ok(files.len())
    }
}
