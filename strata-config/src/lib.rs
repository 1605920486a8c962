//! Configuration types and loading for strata ingestion pipelines.
//!
//! Pipeline configuration lives in a directory of YAML or JSON files, each
//! describing one warehouse (`global` section) and the pipelines that feed it.
//! Warehouse and object-store credentials are never part of those files; they
//! are read from the environment at startup.

mod load;
pub mod shared;

pub use load::{LoadConfigError, discover_config_files, load_config_dir, load_config_file};
