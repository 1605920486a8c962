//! Thin object-store client for source file extraction.
//!
//! Wraps an S3-compatible store (MinIO in the shipped deployment) behind the
//! operations the flows need: a reachability probe, recursive listing, and
//! transfers. Files for a namespace live under
//! `<global bucket_path>/<pipeline bucket_path>`, lower-cased, and are
//! downloaded into an ephemeral local directory scoped to one extraction.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as StorePath;
use strata_config::shared::{ObjectStoreConnectionConfig, PipelineConfig, WarehouseConfig};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::StrataResult;

/// MinIO ignores the region but the S3 client requires one.
const DEFAULT_REGION: &str = "us-east-1";

/// Client scoped to the configured bucket.
#[derive(Debug, Clone)]
pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    base_prefix: String,
}

impl ObjectStoreClient {
    /// Builds a client for the warehouse's landing bucket.
    pub fn new(
        connection: &ObjectStoreConnectionConfig,
        global: &WarehouseConfig,
    ) -> StrataResult<Self> {
        let bucket = global.bucket_name.to_lowercase();
        let endpoint = if connection.endpoint.starts_with("http") {
            connection.endpoint.clone()
        } else {
            format!("http://{}", connection.endpoint)
        };

        let store = AmazonS3Builder::new()
            .with_endpoint(endpoint)
            .with_allow_http(true)
            .with_bucket_name(&bucket)
            .with_access_key_id(&connection.access_key)
            .with_secret_access_key(connection.secret_key())
            .with_region(DEFAULT_REGION)
            .build()?;

        Ok(Self {
            store: Arc::new(store),
            bucket,
            base_prefix: global.bucket_path.trim_matches('/').to_lowercase(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object prefix for a pipeline: global bucket path joined with the
    /// pipeline's own path, lower-cased.
    pub fn namespace_prefix(&self, pipeline: &PipelineConfig) -> String {
        let pipeline_prefix = pipeline.prefix();
        if self.base_prefix.is_empty() {
            pipeline_prefix
        } else if pipeline_prefix.is_empty() {
            self.base_prefix.clone()
        } else {
            format!("{}/{}", self.base_prefix, pipeline_prefix)
        }
    }

    /// Verifies the bucket is reachable.
    ///
    /// The store API has no bucket-management calls, so this probes with a
    /// list request; a missing bucket or bad credentials surface here, before
    /// any warehouse work starts.
    pub async fn ensure_bucket(&self) -> StrataResult<()> {
        let prefix = StorePath::from(self.base_prefix.as_str());
        match self.store.list(Some(&prefix)).next().await {
            None | Some(Ok(_)) => Ok(()),
            Some(Err(err)) => Err(err.into()),
        }
    }

    /// Lists every object under a prefix, recursively.
    pub async fn list_objects(&self, prefix: &str) -> StrataResult<Vec<String>> {
        let prefix = StorePath::from(prefix.to_lowercase());
        let mut stream = self.store.list(Some(&prefix));

        let mut objects = Vec::new();
        while let Some(meta) = stream.next().await {
            objects.push(meta?.location.to_string());
        }
        objects.sort();

        debug!(
            bucket = %self.bucket,
            prefix = %prefix,
            count = objects.len(),
            "listed objects"
        );

        Ok(objects)
    }

    /// Downloads one object to a local file.
    pub async fn download(&self, object: &str, local_path: &Path) -> StrataResult<()> {
        let bytes = self
            .store
            .get(&StorePath::from(object))
            .await?
            .bytes()
            .await?;
        tokio::fs::write(local_path, bytes).await?;

        Ok(())
    }

    /// Uploads one local file, overwriting a same-named object.
    pub async fn upload(&self, local_path: &Path, object: &str) -> StrataResult<()> {
        let bytes = tokio::fs::read(local_path).await?;
        self.store
            .put(&StorePath::from(object), bytes.into())
            .await?;

        Ok(())
    }
}

/// The result of one extraction: a temporary directory of downloaded files.
///
/// The directory is removed when this value is dropped, so it must outlive
/// the staging step that uploads its contents.
#[derive(Debug)]
pub struct Extraction {
    dir: TempDir,
    file_count: usize,
}

impl Extraction {
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }
}

/// Downloads every object under the pipeline's prefix into a fresh local
/// directory.
pub async fn extract_namespace(
    client: &ObjectStoreClient,
    pipeline: &PipelineConfig,
) -> StrataResult<Extraction> {
    let prefix = client.namespace_prefix(pipeline);
    let dir = tempfile::Builder::new()
        .prefix(&format!("strata_{}_", pipeline.namespace.to_lowercase()))
        .tempdir()?;

    let objects = client.list_objects(&prefix).await?;
    info!(
        namespace = %pipeline.namespace,
        prefix = %prefix,
        count = objects.len(),
        "downloading source objects"
    );

    for object in &objects {
        let file_name = object.rsplit('/').next().unwrap_or(object);
        client.download(object, &dir.path().join(file_name)).await?;
    }

    Ok(Extraction {
        dir,
        file_count: objects.len(),
    })
}
