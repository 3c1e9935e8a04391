use thiserror::Error;

/// Failures reported by a storage backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("record {0} was modified concurrently")]
    VersionConflict(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Request and integrity errors.
///
/// Business rejections (policy rules, threshold) are not errors and never
/// travel through this type; see [`crate::models::RejectionReason`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("approval {0} already has a prescription attached")]
    AlreadyLinked(String),

    #[error("authorization code space exhausted after {0} attempts")]
    CodeGenerationExhausted(u32),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
