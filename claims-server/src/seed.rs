use anyhow::{Context, Result};
use claims_engine::{InMemoryReferenceStorage, ReferenceData};
use std::path::Path;
use tracing::{info, warn};

/// Build the reference store, seeded from `path` when given.
pub async fn load_reference_data(path: Option<&Path>) -> Result<InMemoryReferenceStorage> {
    let Some(path) = path else {
        warn!("SEED_FILE not set, starting with empty reference data");
        return Ok(InMemoryReferenceStorage::new());
    };

    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read seed file {}", path.display()))?;
    let data: ReferenceData = serde_json::from_str(&raw)
        .with_context(|| format!("invalid seed file {}", path.display()))?;

    info!(
        users = data.users.len(),
        policies = data.policies.len(),
        hospitals = data.hospitals.len(),
        insured_services = data.insured_services.len(),
        "Reference data loaded"
    );
    Ok(InMemoryReferenceStorage::from_data(data))
}
