use thiserror::Error;

/// Failure taxonomy shared by the reconciliation verbs and the promotion
/// flow. Carried inside `anyhow::Error` so call sites keep `?` + context;
/// tests and the exit-code mapping downcast to the variant.
#[derive(Debug, Error)]
pub enum GitopsError {
    /// Manifest source missing or unreadable, or the templating tool failed.
    #[error("render: {0}")]
    Render(String),

    /// The cluster client exited outside its documented code contract.
    #[error("cluster: {0}")]
    Cluster(String),

    /// Invalid flag combination, or a promotion target without the expected keys.
    #[error("config: {0}")]
    Config(String),

    /// Governance labels missing or carrying unexpected values.
    #[error("validation: {0}")]
    Validation(String),
}
