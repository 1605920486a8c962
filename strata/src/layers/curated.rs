//! CURATED layer: filtered subsets and secure views over STAGING.

use tracing::info;

use crate::error::StrataResult;
use crate::pipeline::PipelineContext;
use crate::warehouse::{WarehouseClient, statements};

/// CURATED-layer operations for one pipeline namespace.
#[derive(Debug, Clone)]
pub struct CuratedOps<W> {
    client: W,
    ctx: PipelineContext,
}

impl<W> CuratedOps<W>
where
    W: WarehouseClient,
{
    pub fn new(client: W, ctx: PipelineContext) -> Self {
        Self { client, ctx }
    }

    /// Creates or replaces every configured subset: a filtered table, or a
    /// secure view when the subset is marked secure. No subsets configured is
    /// a no-op, not an error.
    pub async fn create_subsets(&self) -> StrataResult<()> {
        let ctx = &self.ctx;
        let subsets = &ctx.pipeline().subsets;

        if subsets.is_empty() {
            info!(namespace = %ctx.table(), "no curated subsets configured");
            return Ok(());
        }

        for subset in subsets {
            let object = ctx.curated_object(&subset.name);
            info!(
                object = %object,
                secure = subset.secure,
                "creating curated subset"
            );

            let statement = statements::create_subset(
                &object,
                &ctx.staging_table(),
                &subset.filters,
                subset.secure,
            );
            self.client.execute(&statement).await?;
        }

        Ok(())
    }
}
