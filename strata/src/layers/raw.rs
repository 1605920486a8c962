//! RAW layer: schema inference over staged files.

use tracing::info;

use crate::error::StrataResult;
use crate::pipeline::PipelineContext;
use crate::warehouse::{WarehouseClient, statements};

/// RAW-layer operations for one pipeline namespace.
#[derive(Debug, Clone)]
pub struct RawOps<W> {
    client: W,
    ctx: PipelineContext,
}

impl<W> RawOps<W>
where
    W: WarehouseClient,
{
    pub fn new(client: W, ctx: PipelineContext) -> Self {
        Self { client, ctx }
    }

    /// Creates or evolves the RAW table from the files currently in the
    /// stage path.
    ///
    /// The create statement is safe to re-run: it never drops or retypes an
    /// existing column, only adds newly discovered ones. System columns are
    /// then added individually with `ADD COLUMN IF NOT EXISTS` — they are
    /// housekeeping decorations, never inferred from source data.
    pub async fn infer(&self) -> StrataResult<()> {
        let ctx = &self.ctx;
        let table = ctx.raw_table();

        let statement = statements::create_inferred_table(
            &table,
            &ctx.stage_location(),
            &ctx.file_format_ref(),
            ctx.pipeline().max_file_count,
            &ctx.pipeline().column_overrides,
        );
        self.client.execute(&statement).await?;

        for column in &ctx.global().system_columns {
            self.client
                .execute(&statements::add_system_column(&table, column))
                .await?;
        }

        info!(table = %table, "ensured inferred RAW table");

        Ok(())
    }
}
