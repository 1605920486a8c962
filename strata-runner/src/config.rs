use std::path::Path;

use strata_config::load_config_dir;
use strata_config::shared::IngestConfig;
use tracing::info;

use crate::error::RunnerResult;

/// Loads and validates every configuration file in the configuration
/// directory.
///
/// Validation happens during loading, so a broken file aborts the run before
/// any warehouse mutation.
pub fn load_runner_configs(directory: &Path) -> RunnerResult<Vec<IngestConfig>> {
    let configs = load_config_dir(directory)?;

    let pipelines: usize = configs.iter().map(|config| config.pipelines.len()).sum();
    info!(
        configs = configs.len(),
        pipelines,
        directory = %directory.display(),
        "loaded pipeline configuration"
    );

    Ok(configs)
}
