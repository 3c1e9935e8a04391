//! Keyed store traits the engine runs against.
//!
//! Every mutable record carries a `version`; `update` succeeds only when the
//! caller's version matches the stored one and bumps it, otherwise it fails
//! with [`StorageError::VersionConflict`]. Inserts that would break a
//! uniqueness rule fail with [`StorageError::DuplicateKey`].

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::StorageError;
use crate::models::{
    ConfigurableThreshold, Hospital, HospitalServiceAuthorization, InsuredService, Policy,
    PrescriptionApproval, RecordId, ServiceApproval, User,
};

pub use memory::{
    InMemoryAuthorizationStorage, InMemoryCodeRegistry, InMemoryPrescriptionApprovalStorage,
    InMemoryReferenceStorage, InMemoryServiceApprovalStorage, InMemoryThresholdStorage,
    ReferenceData,
};

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Registry of every authorization code ever handed out.
#[async_trait]
pub trait CodeRegistry: Send + Sync {
    /// Atomically claim `code`. Returns false if it was already taken.
    async fn reserve(&self, code: &str) -> StorageResult<bool>;
    async fn contains(&self, code: &str) -> StorageResult<bool>;
}

/// Read-only lookups of externally owned records.
#[async_trait]
pub trait ReferenceStorage: Send + Sync {
    async fn get_user(&self, id: RecordId) -> StorageResult<Option<User>>;
    async fn get_policy(&self, id: RecordId) -> StorageResult<Option<Policy>>;
    async fn get_hospital(&self, id: RecordId) -> StorageResult<Option<Hospital>>;
    async fn get_insured_service(&self, id: RecordId) -> StorageResult<Option<InsuredService>>;
}

/// Filter for listing service approvals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApprovalFilter {
    #[default]
    All,
    User(RecordId),
    Hospital(RecordId),
}

#[async_trait]
pub trait ServiceApprovalStorage: Send + Sync {
    /// Persist a new approval, assigning its id. The approval code must be unused.
    async fn insert(&self, approval: ServiceApproval) -> StorageResult<ServiceApproval>;
    async fn get_by_code(&self, code: &str) -> StorageResult<Option<ServiceApproval>>;
    async fn update(&self, approval: ServiceApproval) -> StorageResult<ServiceApproval>;
    /// Newest first.
    async fn list(&self, filter: ApprovalFilter) -> StorageResult<Vec<ServiceApproval>>;
}

#[async_trait]
pub trait PrescriptionApprovalStorage: Send + Sync {
    async fn insert(&self, approval: PrescriptionApproval) -> StorageResult<PrescriptionApproval>;
    async fn get(&self, id: RecordId) -> StorageResult<Option<PrescriptionApproval>>;
    /// Newest first, optionally restricted to one user.
    async fn list(&self, user_id: Option<RecordId>) -> StorageResult<Vec<PrescriptionApproval>>;
}

#[async_trait]
pub trait AuthorizationStorage: Send + Sync {
    /// Fails with `DuplicateKey` if a record already exists for the pair.
    async fn insert(
        &self,
        authorization: HospitalServiceAuthorization,
    ) -> StorageResult<HospitalServiceAuthorization>;
    async fn get(&self, id: RecordId) -> StorageResult<Option<HospitalServiceAuthorization>>;
    async fn find_by_pair(
        &self,
        hospital_id: RecordId,
        insured_service_id: RecordId,
    ) -> StorageResult<Option<HospitalServiceAuthorization>>;
    async fn update(
        &self,
        authorization: HospitalServiceAuthorization,
    ) -> StorageResult<HospitalServiceAuthorization>;
    /// Hard delete. Returns false if nothing matched.
    async fn delete(&self, id: RecordId) -> StorageResult<bool>;
    async fn list_approved_by_hospital(
        &self,
        hospital_id: RecordId,
    ) -> StorageResult<Vec<HospitalServiceAuthorization>>;
    async fn list_approved_by_service(
        &self,
        insured_service_id: RecordId,
    ) -> StorageResult<Vec<HospitalServiceAuthorization>>;
}

#[async_trait]
pub trait ThresholdStorage: Send + Sync {
    async fn current(&self) -> StorageResult<Option<ConfigurableThreshold>>;
    /// Update the single setting, creating it if absent.
    async fn upsert(
        &self,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> StorageResult<ConfigurableThreshold>;
}
