//! Per-namespace orchestration over a shared warehouse gateway.
//!
//! [`WarehousePipeline`] composes one capability type per layer around a
//! shared client handle and an immutable [`PipelineContext`]. Operations for
//! a single namespace execute strictly sequentially: each step depends on the
//! warehouse-visible effect of the previous one.

use std::path::Path;
use std::sync::Arc;

use strata_config::shared::{PipelineConfig, WarehouseConfig};
use tracing::info;

use crate::error::StrataResult;
use crate::layers::curated::CuratedOps;
use crate::layers::environment::{self, EnvironmentOps};
use crate::layers::raw::RawOps;
use crate::layers::staging::StagingOps;
use crate::pipe::{PipeOps, PipePollConfig, PipeWait};
use crate::warehouse::WarehouseClient;

/// Shared immutable view of one pipeline's configuration, with the
/// qualified-name conventions used across every layer.
///
/// Naming convention: `stage = table = namespace`, layer-qualified as
/// `<layerDatabase>.<schema>.<namespace>`; the pipe is named identically
/// within RAW's namespace.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    global: Arc<WarehouseConfig>,
    pipeline: Arc<PipelineConfig>,
}

impl PipelineContext {
    pub fn new(global: Arc<WarehouseConfig>, pipeline: Arc<PipelineConfig>) -> Self {
        Self { global, pipeline }
    }

    pub fn global(&self) -> &WarehouseConfig {
        &self.global
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    pub fn schema(&self) -> &str {
        &self.pipeline.schema
    }

    /// The namespace, used as the table name in every layer.
    pub fn table(&self) -> &str {
        &self.pipeline.namespace
    }

    /// The namespace, used as the stage name in RAW.
    pub fn stage(&self) -> &str {
        &self.pipeline.namespace
    }

    /// Fully qualified name of the shared file format.
    pub fn file_format_ref(&self) -> String {
        format!(
            "{}.{}.{}",
            self.global.utils_database, self.global.utils_schema, self.global.file_format
        )
    }

    pub fn raw_table(&self) -> String {
        format!(
            "{}.{}.{}",
            self.global.databases.raw, self.pipeline.schema, self.pipeline.namespace
        )
    }

    pub fn staging_table(&self) -> String {
        format!(
            "{}.{}.{}",
            self.global.databases.staging, self.pipeline.schema, self.pipeline.namespace
        )
    }

    pub fn curated_object(&self, name: &str) -> String {
        format!(
            "{}.{}.{}",
            self.global.databases.curated, self.pipeline.schema, name
        )
    }

    pub fn pipe_name(&self) -> String {
        self.raw_table()
    }

    /// Stage location including the pipeline's lower-cased prefix, with a
    /// trailing separator.
    pub fn stage_location(&self) -> String {
        let stage = format!(
            "@{}.{}.{}",
            self.global.databases.raw, self.pipeline.schema, self.pipeline.namespace
        );
        let prefix = self.pipeline.prefix();
        if prefix.is_empty() {
            format!("{stage}/")
        } else {
            format!("{stage}/{prefix}/")
        }
    }
}

/// High-level orchestrator for one pipeline namespace.
#[derive(Debug, Clone)]
pub struct WarehousePipeline<W>
where
    W: WarehouseClient + Clone,
{
    client: W,
    ctx: PipelineContext,
    env: EnvironmentOps<W>,
    raw: RawOps<W>,
    staging: StagingOps<W>,
    pipe: PipeOps<W>,
    curated: CuratedOps<W>,
}

impl<W> WarehousePipeline<W>
where
    W: WarehouseClient + Clone,
{
    pub fn new(client: W, ctx: PipelineContext) -> Self {
        Self {
            env: EnvironmentOps::new(client.clone(), ctx.clone()),
            raw: RawOps::new(client.clone(), ctx.clone()),
            staging: StagingOps::new(client.clone(), ctx.clone()),
            pipe: PipeOps::new(client.clone(), ctx.clone()),
            curated: CuratedOps::new(client.clone(), ctx.clone()),
            client,
            ctx,
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Provisions warehouse-wide objects: utilities database/schema, the
    /// shared file format, and every layer database.
    pub async fn setup_environment(&self) -> StrataResult<()> {
        environment::provision(&self.client, self.ctx.global()).await
    }

    /// Ensures this pipeline's schema exists across all layer databases.
    pub async fn prepare_schemas(&self) -> StrataResult<()> {
        self.env.prepare_schemas().await
    }

    /// Uploads the extracted local files into the pipeline's stage.
    pub async fn stage_files(&self, local_dir: &Path) -> StrataResult<usize> {
        self.env.stage_files(local_dir).await
    }

    /// Infers or evolves the RAW table from staged files.
    pub async fn build_raw(&self) -> StrataResult<()> {
        self.raw.infer().await
    }

    /// Creates or replaces the ingestion pipe.
    pub async fn create_pipe(&self) -> StrataResult<()> {
        self.pipe.create().await
    }

    /// Triggers the pipe and waits for ingestion to finish or time out.
    pub async fn trigger_pipe(&self, poll: &PipePollConfig) -> StrataResult<PipeWait> {
        self.pipe.trigger(poll).await
    }

    /// Creates, evolves, and merges the STAGING table, in that order.
    pub async fn build_staging(&self) -> StrataResult<()> {
        self.staging.create().await?;
        self.staging.evolve().await?;
        self.staging.merge().await?;

        Ok(())
    }

    /// Materializes the configured curated subsets.
    pub async fn build_curated(&self) -> StrataResult<()> {
        self.curated.create_subsets().await
    }

    /// Closes the underlying warehouse session. Best-effort.
    pub async fn close(&self) {
        info!(namespace = %self.ctx.table(), "closing warehouse session");
        self.client.close().await;
    }
}
