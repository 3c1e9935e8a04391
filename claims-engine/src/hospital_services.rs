use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::{EngineError, Result, StorageError};
use crate::models::{HospitalServiceAuthorization, RecordId};
use crate::storage::{AuthorizationStorage, ReferenceStorage};

/// Retries for a grant or revoke that lost a race.
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Which hospitals may bill which insured services.
///
/// There is at most one record per (hospital, service) pair. Granting an
/// existing pair re-approves it; revoking is soft.
pub struct HospitalServiceAuthorizationRegistry {
    reference: Arc<dyn ReferenceStorage>,
    authorizations: Arc<dyn AuthorizationStorage>,
    clock: Arc<dyn Clock>,
}

impl HospitalServiceAuthorizationRegistry {
    pub fn new(
        reference: Arc<dyn ReferenceStorage>,
        authorizations: Arc<dyn AuthorizationStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reference,
            authorizations,
            clock,
        }
    }

    pub async fn grant(
        &self,
        hospital_id: RecordId,
        insured_service_id: RecordId,
        notes: Option<String>,
    ) -> Result<HospitalServiceAuthorization> {
        self.ensure_hospital(hospital_id).await?;
        self.ensure_service(insured_service_id).await?;

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let now = self.clock.now();
            let written = match self
                .authorizations
                .find_by_pair(hospital_id, insured_service_id)
                .await?
            {
                Some(mut existing) => {
                    existing.approve(notes.clone(), now);
                    self.authorizations.update(existing).await
                }
                None => {
                    let draft = HospitalServiceAuthorization::new(
                        hospital_id,
                        insured_service_id,
                        notes.clone(),
                        now,
                    );
                    self.authorizations.insert(draft).await
                }
            };

            match written {
                Ok(saved) => {
                    info!(
                        authorization_id = saved.id,
                        hospital_id,
                        insured_service_id,
                        "Hospital service authorization granted"
                    );
                    return Ok(saved);
                }
                Err(StorageError::VersionConflict(_) | StorageError::DuplicateKey(_)) => {
                    warn!(hospital_id, insured_service_id, "Concurrent grant, retrying");
                }
                Err(other) => return Err(other.into()),
            }
        }
        Err(contended(hospital_id, insured_service_id))
    }

    /// Soft-revoke the active grant for a pair. Returns false if there is none.
    pub async fn revoke(
        &self,
        hospital_id: RecordId,
        insured_service_id: RecordId,
    ) -> Result<bool> {
        self.ensure_hospital(hospital_id).await?;
        self.ensure_service(insured_service_id).await?;

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let Some(existing) = self
                .authorizations
                .find_by_pair(hospital_id, insured_service_id)
                .await?
            else {
                return Ok(false);
            };
            match self.revoke_record(existing).await {
                Err(EngineError::Storage(StorageError::VersionConflict(_))) => continue,
                other => return other,
            }
        }
        Err(contended(hospital_id, insured_service_id))
    }

    /// Soft-revoke by record id. Returns false if absent or already revoked.
    pub async fn revoke_by_id(&self, id: RecordId) -> Result<bool> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let Some(existing) = self.authorizations.get(id).await? else {
                return Ok(false);
            };
            match self.revoke_record(existing).await {
                Err(EngineError::Storage(StorageError::VersionConflict(_))) => continue,
                other => return other,
            }
        }
        Err(EngineError::InvalidState(format!(
            "authorization {id} kept changing concurrently"
        )))
    }

    /// Remove the record entirely. Returns false if nothing matched.
    pub async fn delete(&self, id: RecordId) -> Result<bool> {
        let deleted = self.authorizations.delete(id).await?;
        if deleted {
            info!(authorization_id = id, "Hospital service authorization deleted");
        }
        Ok(deleted)
    }

    /// Fetch by id, revoked records included.
    pub async fn get(&self, id: RecordId) -> Result<HospitalServiceAuthorization> {
        self.authorizations
            .get(id)
            .await?
            .ok_or_else(|| EngineError::not_found("hospital service authorization", id))
    }

    pub async fn list_approved_for_hospital(
        &self,
        hospital_id: RecordId,
    ) -> Result<Vec<HospitalServiceAuthorization>> {
        self.ensure_hospital(hospital_id).await?;
        Ok(self.authorizations.list_approved_by_hospital(hospital_id).await?)
    }

    pub async fn list_hospitals_for_service(
        &self,
        insured_service_id: RecordId,
    ) -> Result<Vec<HospitalServiceAuthorization>> {
        self.ensure_service(insured_service_id).await?;
        Ok(self
            .authorizations
            .list_approved_by_service(insured_service_id)
            .await?)
    }

    async fn revoke_record(&self, mut existing: HospitalServiceAuthorization) -> Result<bool> {
        if !existing.revoke(self.clock.now()) {
            return Ok(false);
        }
        let saved = self.authorizations.update(existing).await?;
        info!(
            authorization_id = saved.id,
            hospital_id = saved.hospital_id,
            insured_service_id = saved.insured_service_id,
            "Hospital service authorization revoked"
        );
        Ok(true)
    }

    async fn ensure_hospital(&self, hospital_id: RecordId) -> Result<()> {
        self.reference
            .get_hospital(hospital_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| EngineError::not_found("hospital", hospital_id))
    }

    async fn ensure_service(&self, insured_service_id: RecordId) -> Result<()> {
        self.reference
            .get_insured_service(insured_service_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| EngineError::not_found("insured service", insured_service_id))
    }
}

fn contended(hospital_id: RecordId, insured_service_id: RecordId) -> EngineError {
    EngineError::InvalidState(format!(
        "authorization for hospital {hospital_id} / service {insured_service_id} \
         kept changing concurrently"
    ))
}
