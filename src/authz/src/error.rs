//! Error types for the access-decision engine

use thiserror::Error;

/// Access-decision engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Engine misconfigured (fatal at startup)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Failure inside an evaluator
    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    /// Decision cache unavailable
    #[error("Cache error: {0}")]
    Cache(String),

    /// Role or policy store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Malformed permission string
    #[error("Invalid permission '{0}'")]
    InvalidPermission(String),

    /// Invalid role definition
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    /// Role inheritance would form a cycle
    #[error("Circular role inheritance: {0}")]
    CircularInheritance(String),

    /// Role not found
    #[error("Role not found: {0}")]
    RoleNotFound(String),

    /// Invalid policy rule
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// Policy rule not found
    #[error("Policy not found: {0}")]
    PolicyNotFound(String),

    /// Caller is not allowed to perform an administrative operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
