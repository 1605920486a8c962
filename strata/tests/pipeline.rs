#![cfg(feature = "test-utils")]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use strata::pipe::{PipePollConfig, PipeWait};
use strata::pipeline::{PipelineContext, WarehousePipeline};
use strata::test_utils::warehouse::MemoryWarehouse;
use strata_config::shared::{
    FlattenSpec, LayerDatabases, PipelineConfig, StagingPolicy, SubsetSpec, SystemColumn,
    WarehouseConfig,
};

fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn warehouse_config() -> WarehouseConfig {
    WarehouseConfig {
        bucket_name: "landing".to_string(),
        bucket_path: "inbound".to_string(),
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
    }
}

fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
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
    }
}

fn pipeline_with(
    warehouse: &MemoryWarehouse,
    pipeline: PipelineConfig,
) -> WarehousePipeline<MemoryWarehouse> {
    let ctx = PipelineContext::new(Arc::new(warehouse_config()), Arc::new(pipeline));
    WarehousePipeline::new(warehouse.clone(), ctx)
}

fn fast_poll() -> PipePollConfig {
    PipePollConfig {
        poll_interval: Duration::from_millis(5),
        max_wait: Duration::from_secs(2),
        settle_wait: Duration::from_millis(1),
    }
}

const PENDING_TWO: &str = r#"{"executionState": "RUNNING", "pendingFileCount": 2}"#;
const PENDING_ONE: &str = r#"{"executionState": "RUNNING", "pendingFileCount": 1}"#;
const COMPLETE: &str =
    r#"{"executionState": "RUNNING", "pendingFileCount": 0, "lastIngestedFilePath": "orders/b.csv"}"#;

#[tokio::test]
async fn provision_twice_produces_identical_idempotent_statements() {
    init_test_tracing();

    let warehouse = MemoryWarehouse::new();
    let pipeline = pipeline_with(&warehouse, pipeline_config());

    pipeline.setup_environment().await.unwrap();
    let first_run = warehouse.executed().await;

    warehouse.clear_executed().await;
    pipeline.setup_environment().await.unwrap();
    let second_run = warehouse.executed().await;

    assert_eq!(first_run, second_run);
    assert!(!first_run.is_empty());
    for statement in &first_run {
        assert!(
            statement.contains("IF NOT EXISTS"),
            "provisioning statement is not idempotent: {statement}"
        );
    }
}

#[tokio::test]
async fn provision_creates_utilities_and_every_layer_database() {
    let warehouse = MemoryWarehouse::new();
    let pipeline = pipeline_with(&warehouse, pipeline_config());

    pipeline.setup_environment().await.unwrap();

    let databases = warehouse.executed_matching("CREATE DATABASE").await;
    assert_eq!(databases.len(), 4); // UTILS + RAW + STAGING + CURATED
    assert!(
        warehouse
            .executed_matching("CREATE FILE FORMAT IF NOT EXISTS UTILS.PUBLIC.CSV_DEFAULT")
            .await
            .len()
            == 1
    );
}

#[tokio::test]
async fn prepare_schemas_touches_every_layer_database() {
    let warehouse = MemoryWarehouse::new();
    let pipeline = pipeline_with(&warehouse, pipeline_config());

    pipeline.prepare_schemas().await.unwrap();

    let schemas = warehouse.executed_matching("CREATE SCHEMA IF NOT EXISTS").await;
    assert_eq!(schemas.len(), 3);
    assert!(schemas[0].contains("RAW.SALES"));
    assert!(schemas[1].contains("STAGING.SALES"));
    assert!(schemas[2].contains("CURATED.SALES"));
}

#[tokio::test]
async fn build_raw_infers_then_decorates_with_system_columns() {
    let warehouse = MemoryWarehouse::new();
    let pipeline = pipeline_with(&warehouse, pipeline_config());

    pipeline.build_raw().await.unwrap();

    let executed = warehouse.executed().await;
    assert_eq!(executed.len(), 2);
    assert!(executed[0].contains("CREATE TABLE IF NOT EXISTS RAW.SALES.orders USING TEMPLATE"));
    assert!(executed[0].contains("MAX_FILE_COUNT => 5"));
    assert!(executed[1].contains(
        "ALTER TABLE RAW.SALES.orders ADD COLUMN IF NOT EXISTS _INGESTED_TIMESTAMP TIMESTAMP_NTZ"
    ));
}

#[tokio::test]
async fn evolve_adds_exactly_the_new_raw_columns_in_ordinal_order() {
    let warehouse = MemoryWarehouse::new();
    warehouse
        .respond(
            "RAW.INFORMATION_SCHEMA.COLUMNS",
            MemoryWarehouse::column_rows(&[
                ("ID", "NUMBER"),
                ("AMOUNT", "NUMBER"),
                ("DISCOUNT", "NUMBER"),
                ("INTERNAL_NOTE", "TEXT"),
                ("REGION", "TEXT"),
                ("_INGESTED_TIMESTAMP", "TIMESTAMP_NTZ"),
            ]),
        )
        .await;
    warehouse
        .respond(
            "STAGING.INFORMATION_SCHEMA.COLUMNS",
            MemoryWarehouse::column_rows(&[
                ("ID", "NUMBER"),
                ("AMOUNT", "NUMBER"),
                ("_INGESTED_TIMESTAMP", "TIMESTAMP_NTZ"),
            ]),
        )
        .await;

    let mut config = pipeline_config();
    config.staging.exclude_columns = vec!["INTERNAL_NOTE".to_string()];
    let pipeline = pipeline_with(&warehouse, config);

    pipeline.build_staging().await.unwrap();

    let alters = warehouse.executed_matching("ALTER TABLE STAGING.SALES.orders ADD").await;
    assert_eq!(alters.len(), 1);
    // Exactly Raw − Staging − Excluded, in RAW ordinal order.
    assert!(alters[0].contains(
        "ADD COLUMN IF NOT EXISTS DISCOUNT NUMBER, COLUMN IF NOT EXISTS REGION TEXT"
    ));
    assert!(!alters[0].contains("INTERNAL_NOTE"));
}

#[tokio::test]
async fn evolve_with_no_difference_issues_no_alter() {
    let warehouse = MemoryWarehouse::new();
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

    let pipeline = pipeline_with(&warehouse, pipeline_config());
    pipeline.build_staging().await.unwrap();

    assert!(
        warehouse
            .executed_matching("ALTER TABLE STAGING.SALES.orders")
            .await
            .is_empty()
    );
}

#[tokio::test]
async fn merge_deduplicates_on_primary_key_latest_sort_key_first() {
    let warehouse = MemoryWarehouse::new();
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

    let pipeline = pipeline_with(&warehouse, pipeline_config());
    pipeline.build_staging().await.unwrap();

    let merges = warehouse.executed_matching("MERGE INTO").await;
    assert_eq!(merges.len(), 1);
    let merge = &merges[0];
    assert!(merge.contains("MERGE INTO STAGING.SALES.orders AS target"));
    assert!(merge.contains(
        "QUALIFY ROW_NUMBER() OVER (PARTITION BY ID ORDER BY _INGESTED_TIMESTAMP DESC) = 1"
    ));
    assert!(merge.contains("ON target.ID = source.ID"));
    assert!(merge.contains("WHEN MATCHED THEN UPDATE SET target.AMOUNT = source.AMOUNT"));
    assert!(merge.contains("WHEN NOT MATCHED THEN INSERT (ID, AMOUNT, _INGESTED_TIMESTAMP)"));
}

#[tokio::test]
async fn merge_without_primary_keys_degenerates_to_append() {
    let warehouse = MemoryWarehouse::new();
    let columns = MemoryWarehouse::column_rows(&[("EVENT", "TEXT"), ("SEEN_AT", "TIMESTAMP_NTZ")]);
    warehouse
        .respond("RAW.INFORMATION_SCHEMA.COLUMNS", columns.clone())
        .await;
    warehouse
        .respond("STAGING.INFORMATION_SCHEMA.COLUMNS", columns)
        .await;

    let mut config = pipeline_config();
    config.staging.primary_keys = Vec::new();
    let pipeline = pipeline_with(&warehouse, config);

    pipeline.build_staging().await.unwrap();

    assert!(warehouse.executed_matching("MERGE INTO").await.is_empty());
    let inserts = warehouse.executed_matching("INSERT INTO").await;
    assert_eq!(inserts.len(), 1);
    assert!(inserts[0].contains("INSERT INTO STAGING.SALES.orders (EVENT, SEEN_AT)"));
    assert!(!inserts[0].contains("WHEN MATCHED"));
}

#[tokio::test]
async fn flatten_aliases_replace_their_source_column_in_the_merge() {
    let warehouse = MemoryWarehouse::new();
    let columns = MemoryWarehouse::column_rows(&[
        ("ID", "NUMBER"),
        ("PAYLOAD", "VARIANT"),
        ("_INGESTED_TIMESTAMP", "TIMESTAMP_NTZ"),
    ]);
    warehouse
        .respond("RAW.INFORMATION_SCHEMA.COLUMNS", columns.clone())
        .await;
    warehouse
        .respond("STAGING.INFORMATION_SCHEMA.COLUMNS", columns)
        .await;

    let mut config = pipeline_config();
    config.staging.flatten_columns = vec![FlattenSpec {
        column: "PAYLOAD".to_string(),
        fields: vec![
            "PAYLOAD:customer.id::STRING AS CUSTOMER_ID".to_string(),
            "PAYLOAD:customer.region::STRING".to_string(),
        ],
    }];
    let pipeline = pipeline_with(&warehouse, config);

    pipeline.build_staging().await.unwrap();

    // The staging projection keeps the source column and appends the aliases.
    let creates = warehouse
        .executed_matching("CREATE TABLE IF NOT EXISTS STAGING.SALES.orders")
        .await;
    assert_eq!(creates.len(), 1);
    assert!(creates[0].contains("PAYLOAD:customer.id::STRING AS CUSTOMER_ID"));
    assert!(creates[0].contains("PAYLOAD:customer.region::STRING AS REGION"));

    // The merge substitutes the aliases for the source column.
    let merges = warehouse.executed_matching("MERGE INTO").await;
    assert_eq!(merges.len(), 1);
    let merge = &merges[0];
    assert!(merge.contains("PAYLOAD:customer.id::STRING AS CUSTOMER_ID"));
    assert!(merge.contains(
        "WHEN NOT MATCHED THEN INSERT (ID, CUSTOMER_ID, REGION, _INGESTED_TIMESTAMP)"
    ));
    assert!(!merge.contains("source.PAYLOAD"));
}

#[tokio::test]
async fn curated_subsets_conjoin_filters_and_honor_the_secure_flag() {
    let warehouse = MemoryWarehouse::new();
    let mut config = pipeline_config();
    config.subsets = vec![
        SubsetSpec {
            name: "active_orders".to_string(),
            filters: vec!["STATUS = 'ACTIVE'".to_string()],
            secure: false,
        },
        SubsetSpec {
            name: "all_orders".to_string(),
            filters: Vec::new(),
            secure: true,
        },
    ];
    let pipeline = pipeline_with(&warehouse, config);

    pipeline.build_curated().await.unwrap();

    let executed = warehouse.executed().await;
    assert_eq!(executed.len(), 2);
    assert!(executed[0].contains(
        "CREATE OR REPLACE TABLE CURATED.SALES.active_orders AS \
         SELECT * FROM STAGING.SALES.orders WHERE STATUS = 'ACTIVE'"
    ));
    assert!(executed[1].contains("CREATE OR REPLACE SECURE VIEW CURATED.SALES.all_orders"));
    assert!(executed[1].contains("WHERE TRUE"));
}

#[tokio::test]
async fn no_subsets_configured_is_a_no_op() {
    let warehouse = MemoryWarehouse::new();
    let pipeline = pipeline_with(&warehouse, pipeline_config());

    pipeline.build_curated().await.unwrap();

    assert!(warehouse.executed().await.is_empty());
}

#[tokio::test]
async fn pipe_poll_returns_after_the_pending_count_drains() {
    init_test_tracing();

    let warehouse = MemoryWarehouse::new();
    warehouse
        .respond_seq(
            "SYSTEM$PIPE_STATUS",
            vec![
                MemoryWarehouse::pipe_status_rows(PENDING_TWO),
                MemoryWarehouse::pipe_status_rows(PENDING_ONE),
                MemoryWarehouse::pipe_status_rows(COMPLETE),
            ],
        )
        .await;

    let pipeline = pipeline_with(&warehouse, pipeline_config());
    let outcome = pipeline.trigger_pipe(&fast_poll()).await.unwrap();

    assert_eq!(outcome, PipeWait::Settled);
    assert_eq!(warehouse.executed_matching("ALTER PIPE").await.len(), 1);
    // Returned after the third poll, well before max_wait.
    assert_eq!(warehouse.executed_matching("SYSTEM$PIPE_STATUS").await.len(), 3);
}

#[tokio::test]
async fn pipe_poll_timeout_is_tolerated_not_raised() {
    init_test_tracing();

    let warehouse = MemoryWarehouse::new();
    warehouse
        .respond(
            "SYSTEM$PIPE_STATUS",
            MemoryWarehouse::pipe_status_rows(PENDING_TWO),
        )
        .await;

    let pipeline = pipeline_with(&warehouse, pipeline_config());
    let poll = PipePollConfig {
        poll_interval: Duration::from_millis(5),
        max_wait: Duration::from_millis(40),
        settle_wait: Duration::from_millis(1),
    };

    let outcome = pipeline.trigger_pipe(&poll).await.unwrap();

    assert_eq!(outcome, PipeWait::TimedOut);
    assert!(!warehouse.executed_matching("SYSTEM$PIPE_STATUS").await.is_empty());
}

#[tokio::test]
async fn create_pipe_wraps_the_copy_statement_with_system_columns() {
    let warehouse = MemoryWarehouse::new();
    let pipeline = pipeline_with(&warehouse, pipeline_config());

    pipeline.create_pipe().await.unwrap();

    let pipes = warehouse.executed_matching("CREATE OR REPLACE PIPE").await;
    assert_eq!(pipes.len(), 1);
    let pipe = &pipes[0];
    assert!(pipe.contains("CREATE OR REPLACE PIPE RAW.SALES.orders AS"));
    assert!(pipe.contains("COPY INTO RAW.SALES.orders FROM '@RAW.SALES.orders/orders/'"));
    assert!(pipe.contains("FORMAT_NAME = 'UTILS.PUBLIC.CSV_DEFAULT'"));
    assert!(pipe.contains("INCLUDE_METADATA = (_INGESTED_TIMESTAMP = METADATA$START_SCAN_TIME)"));
}

#[tokio::test]
async fn statement_failure_aborts_the_remaining_steps() {
    let warehouse = MemoryWarehouse::new();
    let columns = MemoryWarehouse::column_rows(&[("ID", "NUMBER"), ("_INGESTED_TIMESTAMP", "TS")]);
    warehouse
        .respond("RAW.INFORMATION_SCHEMA.COLUMNS", columns.clone())
        .await;
    warehouse
        .respond("STAGING.INFORMATION_SCHEMA.COLUMNS", columns)
        .await;
    warehouse
        .fail_on("CREATE TABLE IF NOT EXISTS STAGING", "permission denied")
        .await;

    let pipeline = pipeline_with(&warehouse, pipeline_config());
    let result = pipeline.build_staging().await;

    assert!(result.is_err());
    // The failing create stopped the sequence: no evolve, no merge.
    assert!(warehouse.executed_matching("MERGE INTO").await.is_empty());
}

#[tokio::test]
async fn end_to_end_orders_scenario_issues_the_full_statement_sequence() {
    init_test_tracing();

    let warehouse = MemoryWarehouse::new();
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

    let local_dir = tempfile::tempdir().unwrap();
    std::fs::write(local_dir.path().join("a.csv"), "id,amount\n1,10\n").unwrap();
    std::fs::write(local_dir.path().join("b.csv"), "id,amount\n1,20\n").unwrap();

    let pipeline = pipeline_with(&warehouse, pipeline_config());

    pipeline.prepare_schemas().await.unwrap();
    let staged = pipeline.stage_files(local_dir.path()).await.unwrap();
    assert_eq!(staged, 2);
    pipeline.build_raw().await.unwrap();
    pipeline.create_pipe().await.unwrap();
    let outcome = pipeline.trigger_pipe(&fast_poll()).await.unwrap();
    assert_eq!(outcome, PipeWait::Settled);
    pipeline.build_staging().await.unwrap();
    pipeline.build_curated().await.unwrap();
    pipeline.close().await;

    let puts = warehouse.executed_matching("PUT file://").await;
    assert_eq!(puts.len(), 2);
    assert!(puts[0].contains("@RAW.SALES.orders/orders/a.csv"));
    assert!(puts[1].contains("@RAW.SALES.orders/orders/b.csv"));

    let merges = warehouse.executed_matching("MERGE INTO").await;
    assert_eq!(merges.len(), 1);
    assert!(merges[0].contains("ORDER BY _INGESTED_TIMESTAMP DESC"));

    assert_eq!(warehouse.close_count().await, 1);
}
