use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A layer database name is empty.
    #[error("database name for the `{0}` layer cannot be empty")]
    EmptyLayerDatabase(&'static str),
    /// A layer database collides with the utilities database.
    #[error("database name for the `{0}` layer collides with the utilities database")]
    LayerCollidesWithUtils(&'static str),
    /// The utilities database or schema is empty.
    #[error("`{0}` cannot be empty")]
    EmptyField(&'static str),
    /// A pipeline namespace is empty.
    #[error("pipeline namespace cannot be empty")]
    EmptyNamespace,
    /// A pipeline schema is empty.
    #[error("pipeline `{0}` has an empty schema")]
    EmptySchema(String),
    /// `max_file_count` must allow at least one file per inference pass.
    #[error("pipeline `{0}` has `max_file_count` set to zero")]
    MaxFileCountZero(String),
    /// Two pipelines share a namespace; namespaces name warehouse objects and must be unique.
    #[error("duplicate pipeline namespace `{0}`")]
    DuplicateNamespace(String),
    /// A subset has no name to materialize under.
    #[error("pipeline `{0}` has a subset with an empty name")]
    EmptySubsetName(String),
}
