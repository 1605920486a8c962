use std::path::Path;
use std::sync::Arc;

use strata::error::{ErrorKind, StrataError, StrataResult};
use strata::layers::environment;
use strata::pipe::{PipePollConfig, PipeWait};
use strata::pipeline::{PipelineContext, WarehousePipeline};
use strata::store::{ObjectStoreClient, extract_namespace};
use strata::strata_error;
use strata::warehouse::WarehouseClient;
use strata::warehouse::snowflake::SnowflakeClient;
use strata_config::shared::{
    IngestConfig, ObjectStoreConnectionConfig, PipelineConfig, WarehouseConfig,
    WarehouseConnectionConfig, WarehouseConnectionConfigWithoutSecrets,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::RunnerResult;

/// Which flow is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowMode {
    /// Bootstrap: provision the warehouse, then run the full ingestion
    /// sequence for every pipeline.
    Create,
    /// Refresh: restage the latest files, reingest, and rebuild STAGING and
    /// CURATED. Assumes a prior create provisioned the environment.
    Refresh,
}

/// Runs the requested flow over every loaded configuration.
///
/// Credentials are read up front: missing secrets abort the run before any
/// orchestration begins.
pub async fn run(mode: FlowMode, configs: Vec<IngestConfig>, parallelism: usize) -> RunnerResult<()> {
    let warehouse_credentials = WarehouseConnectionConfig::from_env()?;
    let store_credentials = ObjectStoreConnectionConfig::from_env()?;

    let connection = WarehouseConnectionConfigWithoutSecrets::from(&warehouse_credentials);
    info!(
        account = %connection.account,
        user = %connection.user,
        warehouse = %connection.warehouse,
        endpoint = %store_credentials.endpoint,
        parallelism,
        "credentials loaded"
    );

    for config in configs {
        run_ingest_config(
            mode,
            config,
            &warehouse_credentials,
            &store_credentials,
            parallelism,
        )
        .await?;
    }

    Ok(())
}

/// Runs one configuration file: provision once (create mode), then every
/// pipeline namespace through a bounded worker pool.
///
/// Namespaces own disjoint warehouse objects, so they run concurrently with
/// no in-process locking; a failing namespace never aborts the others, its
/// error is aggregated and reported at the end.
async fn run_ingest_config(
    mode: FlowMode,
    config: IngestConfig,
    warehouse_credentials: &WarehouseConnectionConfig,
    store_credentials: &ObjectStoreConnectionConfig,
    parallelism: usize,
) -> RunnerResult<()> {
    let global = Arc::new(config.global);

    if mode == FlowMode::Create {
        let client = SnowflakeClient::connect(warehouse_credentials).await?;
        let result = environment::provision(&client, &global).await;
        client.close().await;
        result?;
        info!("warehouse environment provisioned");
    }

    let store_client = ObjectStoreClient::new(store_credentials, &global)?;
    store_client.ensure_bucket().await?;

    let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
    let mut join_set: JoinSet<(String, StrataResult<()>)> = JoinSet::new();

    for pipeline in config.pipelines {
        let global = global.clone();
        let store_client = store_client.clone();
        let credentials = warehouse_credentials.clone();
        let semaphore = semaphore.clone();

        join_set.spawn(async move {
            // The semaphore is never closed, so acquisition cannot fail.
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("semaphore is never closed");

            let namespace = pipeline.namespace.clone();
            let result =
                run_namespace(mode, global, Arc::new(pipeline), store_client, credentials).await;
            (namespace, result)
        });
    }

    let mut errors = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((namespace, Ok(()))) => info!(%namespace, "pipeline completed"),
            Ok((namespace, Err(err))) => {
                error!(%namespace, error = %err, "pipeline failed");
                errors.push(err);
            }
            Err(join_err) => errors.push(strata_error!(
                ErrorKind::Unknown,
                "Pipeline task panicked",
                join_err
            )),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(StrataError::from(errors).into())
    }
}

/// Runs every step for one pipeline namespace, strictly sequentially.
async fn run_namespace(
    mode: FlowMode,
    global: Arc<WarehouseConfig>,
    pipeline: Arc<PipelineConfig>,
    store_client: ObjectStoreClient,
    credentials: WarehouseConnectionConfig,
) -> StrataResult<()> {
    info!(namespace = %pipeline.namespace, "starting pipeline");

    // The extraction directory must outlive the staging upload below.
    let extraction = extract_namespace(&store_client, &pipeline).await?;

    let client = SnowflakeClient::connect(&credentials).await?;
    let ctx = PipelineContext::new(global, pipeline);
    let warehouse_pipeline = WarehousePipeline::new(client, ctx);

    run_steps_with_session(
        &warehouse_pipeline,
        mode,
        extraction.dir(),
        &PipePollConfig::default(),
    )
    .await
}

/// Runs the flow steps and closes the warehouse session on every exit path
/// before any error propagates. Already-executed SQL is never rolled back;
/// each step is idempotent and safe to re-run instead.
async fn run_steps_with_session<W>(
    pipeline: &WarehousePipeline<W>,
    mode: FlowMode,
    local_dir: &Path,
    poll: &PipePollConfig,
) -> StrataResult<()>
where
    W: WarehouseClient + Clone,
{
    let result = run_pipeline_steps(pipeline, mode, local_dir, poll).await;
    pipeline.close().await;
    result
}

/// The per-namespace step sequence. Each step depends on the
/// warehouse-visible effect of the previous one.
async fn run_pipeline_steps<W>(
    pipeline: &WarehousePipeline<W>,
    mode: FlowMode,
    local_dir: &Path,
    poll: &PipePollConfig,
) -> StrataResult<()>
where
    W: WarehouseClient + Clone,
{
    if mode == FlowMode::Create {
        pipeline.prepare_schemas().await?;
    }

    pipeline.stage_files(local_dir).await?;

    if mode == FlowMode::Create {
        pipeline.build_raw().await?;
    }

    pipeline.create_pipe().await?;
    let outcome = pipeline.trigger_pipe(poll).await?;
    if outcome == PipeWait::TimedOut {
        warn!(
            namespace = %pipeline.context().table(),
            "ingestion did not settle; downstream steps run against possibly incomplete RAW data"
        );
    }

    pipeline.build_staging().await?;
    pipeline.build_curated().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use strata::test_utils::warehouse::MemoryWarehouse;
    use strata_config::shared::{LayerDatabases, StagingPolicy, SystemColumn};

    use super::*;

    fn context() -> PipelineContext {
        let global = WarehouseConfig {
            bucket_name: "landing".to_string(),
            bucket_path: String::new(),
            databases: LayerDatabases {
                raw: "RAW".to_string(),
                staging: "STAGING".to_string(),
                curated: "CURATED".to_string(),
            },
            utils_database: "UTILS".to_string(),
            utils_schema: "PUBLIC".to_string(),
            file_format: "CSV_DEFAULT".to_string(),
            system_columns: vec![SystemColumn {
                name: "_INGESTED_TIMESTAMP".to_string(),
                data_type: "TIMESTAMP_NTZ".to_string(),
                expression: "METADATA$START_SCAN_TIME".to_string(),
            }],
        };
        let pipeline = PipelineConfig {
            namespace: "orders".to_string(),
            schema: "SALES".to_string(),
            bucket_path: "orders".to_string(),
            max_file_count: 5,
            column_overrides: BTreeMap::new(),
            staging: StagingPolicy {
                exclude_columns: Vec::new(),
                flatten_columns: Vec::new(),
                primary_keys: vec!["ID".to_string()],
                sort_key: vec!["_INGESTED_TIMESTAMP".to_string()],
            },
            subsets: Vec::new(),
        };

        PipelineContext::new(Arc::new(global), Arc::new(pipeline))
    }

    fn fast_poll() -> PipePollConfig {
        PipePollConfig {
            poll_interval: Duration::from_millis(5),
            max_wait: Duration::from_millis(100),
            settle_wait: Duration::from_millis(1),
        }
    }

    const COMPLETE: &str = r#"{"executionState": "RUNNING", "pendingFileCount": 0, "lastIngestedFilePath": "orders/a.csv"}"#;

    async fn script_happy_path(warehouse: &MemoryWarehouse) {
        let columns = MemoryWarehouse::column_rows(&[
            ("ID", "NUMBER"),
            ("AMOUNT", "NUMBER"),
            ("_INGESTED_TIMESTAMP", "TIMESTAMP_NTZ"),
        ]);
        warehouse
            .respond("RAW.INFORMATION_SCHEMA.COLUMNS", columns.clone())
            .await;
        warehouse
            .respond("STAGING.INFORMATION_SCHEMA.COLUMNS", columns)
            .await;
        warehouse
            .respond(
                "SYSTEM$PIPE_STATUS",
                MemoryWarehouse::pipe_status_rows(COMPLETE),
            )
            .await;
    }

    #[tokio::test]
    async fn session_is_closed_when_a_step_fails() {
        let warehouse = MemoryWarehouse::new();
        script_happy_path(&warehouse).await;
        warehouse.fail_on("MERGE INTO", "permission denied").await;

        let local_dir = tempfile::tempdir().unwrap();
        std::fs::write(local_dir.path().join("a.csv"), "id,amount\n1,10\n").unwrap();

        let pipeline = WarehousePipeline::new(warehouse.clone(), context());
        let result = run_steps_with_session(
            &pipeline,
            FlowMode::Create,
            local_dir.path(),
            &fast_poll(),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(warehouse.close_count().await, 1);
    }

    #[tokio::test]
    async fn refresh_skips_schema_preparation_and_inference() {
        let warehouse = MemoryWarehouse::new();
        script_happy_path(&warehouse).await;

        let local_dir = tempfile::tempdir().unwrap();
        std::fs::write(local_dir.path().join("a.csv"), "id,amount\n1,10\n").unwrap();

        let pipeline = WarehousePipeline::new(warehouse.clone(), context());
        run_steps_with_session(&pipeline, FlowMode::Refresh, local_dir.path(), &fast_poll())
            .await
            .unwrap();

        assert!(warehouse.executed_matching("CREATE SCHEMA").await.is_empty());
        assert!(warehouse.executed_matching("USING TEMPLATE").await.is_empty());
        assert_eq!(warehouse.executed_matching("MERGE INTO").await.len(), 1);
        assert_eq!(warehouse.close_count().await, 1);
    }
}
