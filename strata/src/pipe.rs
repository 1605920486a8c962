//! Ingestion pipe lifecycle: create or replace, trigger, poll to completion.
//!
//! The pipe moves through `ABSENT → CREATED → TRIGGERED → {SETTLED |
//! TIMED_OUT}`. Triggering is asynchronous on the warehouse side, so the only
//! way to observe completion is to poll the pipe's status until its pending
//! file count drains. A poll that never drains is tolerated: the loop logs a
//! warning and returns normally, and downstream steps proceed against
//! whatever RAW data is visible.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, StrataResult};
use crate::pipeline::PipelineContext;
use crate::strata_error;
use crate::warehouse::{WarehouseClient, statements};

/// Timing knobs for the trigger-and-wait loop.
#[derive(Debug, Clone)]
pub struct PipePollConfig {
    /// Interval between status polls.
    pub poll_interval: Duration,
    /// Budget for the pending-file count to drain before giving up.
    pub max_wait: Duration,
    /// Extra wait after a successful drain: ingestion metadata and RAW row
    /// visibility may lag behind the status signal.
    pub settle_wait: Duration,
}

impl Default for PipePollConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            max_wait: Duration::from_secs(120),
            settle_wait: Duration::from_secs(60),
        }
    }
}

/// Execution state reported by the warehouse for a pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeExecutionState {
    Running,
    Paused,
    /// Any of the `STOPPED_*` states.
    Stopped,
}

impl From<&str> for PipeExecutionState {
    fn from(state: &str) -> Self {
        match state {
            "RUNNING" => PipeExecutionState::Running,
            "PAUSED" => PipeExecutionState::Paused,
            _ => PipeExecutionState::Stopped,
        }
    }
}

fn deserialize_execution_state<'de, D>(
    deserializer: D,
) -> Result<Option<PipeExecutionState>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let state = Option::<String>::deserialize(deserializer)?;
    Ok(state.map(|state| PipeExecutionState::from(state.as_str())))
}

/// Point-in-time pipe status. Transient: re-fetched on every poll, never
/// cached.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipeStatus {
    #[serde(default)]
    pub pending_file_count: u64,
    #[serde(default, deserialize_with = "deserialize_execution_state")]
    pub execution_state: Option<PipeExecutionState>,
    #[serde(default)]
    pub last_ingested_file_path: Option<String>,
    #[serde(default)]
    pub last_ingested_timestamp: Option<DateTime<Utc>>,
}

impl PipeStatus {
    /// Ingestion has finished when nothing is pending and at least one file
    /// has ever been ingested.
    pub fn is_complete(&self) -> bool {
        self.pending_file_count == 0 && self.last_ingested_file_path.is_some()
    }
}

/// Outcome of a trigger-and-wait cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeWait {
    /// Pending files drained and the settle wait elapsed.
    Settled,
    /// The pending count never drained within `max_wait`. Not an error.
    TimedOut,
}

/// Pipe operations for one pipeline namespace.
#[derive(Debug, Clone)]
pub struct PipeOps<W> {
    client: W,
    ctx: PipelineContext,
}

impl<W> PipeOps<W>
where
    W: WarehouseClient,
{
    pub fn new(client: W, ctx: PipelineContext) -> Self {
        Self { client, ctx }
    }

    /// (Re)defines the pipe's copy statement: stage → RAW with the shared
    /// file format and every system column's value expression. Replacing an
    /// existing pipe is safe and does not affect already-ingested data.
    pub async fn create(&self) -> StrataResult<()> {
        let copy = statements::copy_into(
            &self.ctx.raw_table(),
            &self.ctx.stage_location(),
            &self.ctx.file_format_ref(),
            &self.ctx.global().system_columns,
        );
        let statement = statements::create_pipe(&self.ctx.pipe_name(), &copy);
        self.client.execute(&statement).await?;

        Ok(())
    }

    /// Issues a refresh, waits for ingestion to finish, and lets the
    /// warehouse's metadata settle before downstream reads.
    ///
    /// A timeout is reported in the return value, not as an error: the run
    /// proceeds, which means a later merge may see incomplete RAW data.
    pub async fn trigger(&self, poll: &PipePollConfig) -> StrataResult<PipeWait> {
        let pipe = self.ctx.pipe_name();
        self.client
            .execute(&statements::refresh_pipe(&pipe))
            .await?;
        info!(pipe = %pipe, "triggered pipe refresh");

        let outcome = self.wait_for_pipe(&pipe, poll).await?;

        if outcome == PipeWait::Settled {
            info!(
                pipe = %pipe,
                settle_secs = poll.settle_wait.as_secs(),
                "waiting for ingestion metadata to settle"
            );
            tokio::time::sleep(poll.settle_wait).await;
        }

        Ok(outcome)
    }

    /// Fetches the current pipe status.
    pub async fn status(&self) -> StrataResult<PipeStatus> {
        let pipe = self.ctx.pipe_name();
        let rows = self
            .client
            .execute(&statements::pipe_status(&pipe))
            .await?
            .unwrap_or_default();

        let Some(Some(payload)) = rows.into_iter().next().and_then(|row| row.into_iter().next())
        else {
            return Err(strata_error!(
                ErrorKind::ResponseInvalid,
                "Pipe status query returned no payload",
                pipe
            ));
        };

        Ok(serde_json::from_str(&payload)?)
    }

    /// Fixed-interval poll until the pipe drains or `max_wait` elapses.
    async fn wait_for_pipe(&self, pipe: &str, poll: &PipePollConfig) -> StrataResult<PipeWait> {
        let started = Instant::now();

        while started.elapsed() < poll.max_wait {
            let status = self.status().await?;
            debug!(
                pipe = %pipe,
                state = ?status.execution_state,
                pending = status.pending_file_count,
                last_file = status.last_ingested_file_path.as_deref(),
                "polled pipe status"
            );

            if status.is_complete() {
                info!(
                    pipe = %pipe,
                    last_file = status.last_ingested_file_path.as_deref(),
                    "pipe finished ingestion"
                );
                return Ok(PipeWait::Settled);
            }

            tokio::time::sleep(poll.poll_interval).await;
        }

        warn!(
            pipe = %pipe,
            max_wait_secs = poll.max_wait.as_secs(),
            "pipe did not finish ingestion within the wait budget"
        );

        Ok(PipeWait::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_the_warehouse_payload() {
        let payload = r#"{
            "executionState": "RUNNING",
            "pendingFileCount": 2,
            "lastIngestedFilePath": "orders/a.csv",
            "lastIngestedTimestamp": "2025-11-03T09:15:00.000Z"
        }"#;

        let status: PipeStatus = serde_json::from_str(payload).unwrap();

        assert_eq!(status.pending_file_count, 2);
        assert_eq!(status.execution_state, Some(PipeExecutionState::Running));
        assert!(!status.is_complete());
    }

    #[test]
    fn stopped_states_collapse_to_stopped() {
        let payload = r#"{"executionState": "STOPPED_STAGE_DROPPED", "pendingFileCount": 0}"#;

        let status: PipeStatus = serde_json::from_str(payload).unwrap();

        assert_eq!(status.execution_state, Some(PipeExecutionState::Stopped));
        // No file ever ingested: not complete even with nothing pending.
        assert!(!status.is_complete());
    }

    #[test]
    fn drained_pipe_with_an_ingested_file_is_complete() {
        let payload = r#"{
            "executionState": "RUNNING",
            "pendingFileCount": 0,
            "lastIngestedFilePath": "orders/b.csv"
        }"#;

        let status: PipeStatus = serde_json::from_str(payload).unwrap();

        assert!(status.is_complete());
    }
}
