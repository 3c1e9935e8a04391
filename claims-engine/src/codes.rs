use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::storage::CodeRegistry;

/// Shape of a minted authorization code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeFormat {
    /// `AP` + 8 hex characters.
    ServiceApproval,
    /// `AUTH-` + 12 hex characters.
    PrescriptionApproved,
    /// `N/A-` + 8 hex characters, still unique so rejections stay addressable.
    PrescriptionRejected,
}

impl CodeFormat {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::ServiceApproval => "AP",
            Self::PrescriptionApproved => "AUTH-",
            Self::PrescriptionRejected => "N/A-",
        }
    }

    pub fn random_len(&self) -> usize {
        match self {
            Self::PrescriptionApproved => 12,
            Self::ServiceApproval | Self::PrescriptionRejected => 8,
        }
    }
}

/// Produces candidate codes. Candidates carry no identifying data.
pub trait CodeSource: Send + Sync {
    fn candidate(&self, format: CodeFormat) -> String;
}

/// Random candidates taken from a v4 uuid.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidCodeSource;

impl CodeSource for UuidCodeSource {
    fn candidate(&self, format: CodeFormat) -> String {
        let hex = Uuid::new_v4().simple().to_string().to_uppercase();
        format!("{}{}", format.prefix(), &hex[..format.random_len()])
    }
}

/// Mints authorization codes that are unique for the lifetime of the store.
///
/// Each candidate is claimed in the [`CodeRegistry`]; a taken candidate is
/// discarded and a fresh one drawn, up to `max_attempts` times.
pub struct AuthorizationCodeGenerator {
    registry: Arc<dyn CodeRegistry>,
    source: Arc<dyn CodeSource>,
    max_attempts: u32,
}

impl AuthorizationCodeGenerator {
    pub fn new(registry: Arc<dyn CodeRegistry>, max_attempts: u32) -> Self {
        Self::with_source(registry, Arc::new(UuidCodeSource), max_attempts)
    }

    pub fn with_source(
        registry: Arc<dyn CodeRegistry>,
        source: Arc<dyn CodeSource>,
        max_attempts: u32,
    ) -> Self {
        Self {
            registry,
            source,
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn mint(&self, format: CodeFormat) -> Result<String> {
        for attempt in 1..=self.max_attempts {
            let candidate = self.source.candidate(format);
            if self.registry.reserve(&candidate).await? {
                debug!(code = %candidate, attempt, "Authorization code reserved");
                return Ok(candidate);
            }
            warn!(code = %candidate, attempt, "Authorization code collision, retrying");
        }
        Err(EngineError::CodeGenerationExhausted(self.max_attempts))
    }

    /// Whether a code has ever been handed out.
    pub async fn is_issued(&self, code: &str) -> Result<bool> {
        Ok(self.registry.contains(code).await?)
    }
}
