//! Error types for role resolution and effect combination

use thiserror::Error;

/// Role manager, effector and enforcer errors
#[derive(Debug, Error)]
pub enum RbacError {
    /// Argument rejected before any state was touched
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Role is not present in the graph
    #[error("Role not found: {0}")]
    RoleNotFound(String),

    /// Combination expression the effector does not implement
    #[error("Unsupported effect expression: {0}")]
    UnsupportedEffect(String),

    /// Malformed policy or grouping rule
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// Matcher collaborator failed while testing a rule
    #[error("Matcher evaluation failed: {0}")]
    Evaluation(String),

    /// Configuration could not be parsed or validated
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RbacError {
    /// True for the not-found condition callers are expected to branch on
    pub fn is_not_found(&self) -> bool {
        matches!(self, RbacError::RoleNotFound(_))
    }
}

impl From<toml::de::Error> for RbacError {
    fn from(err: toml::de::Error) -> Self {
        RbacError::Config(err.to_string())
    }
}

/// Result type for role manager and enforcement operations
pub type Result<T> = std::result::Result<T, RbacError>;
