use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

use super::{
    ApprovalFilter, AuthorizationStorage, CodeRegistry, PrescriptionApprovalStorage,
    ReferenceStorage, ServiceApprovalStorage, StorageResult, ThresholdStorage,
};
use crate::error::StorageError;
use crate::models::{
    ConfigurableThreshold, Hospital, HospitalServiceAuthorization, InsuredService, Policy,
    PrescriptionApproval, RecordId, ServiceApproval, User,
};

/// Monotonic id source, starting at 1.
#[derive(Debug, Default)]
struct IdSequence(AtomicI64);

impl IdSequence {
    fn next(&self) -> RecordId {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn newest_first<T>(mut records: Vec<T>, id: impl Fn(&T) -> RecordId) -> Vec<T> {
    records.sort_by_key(|record| std::cmp::Reverse(id(record)));
    records
}

/// In-memory implementation of CodeRegistry
pub struct InMemoryCodeRegistry {
    codes: Arc<DashSet<String>>,
}

impl InMemoryCodeRegistry {
    pub fn new() -> Self {
        Self {
            codes: Arc::new(DashSet::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl Default for InMemoryCodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CodeRegistry for InMemoryCodeRegistry {
    async fn reserve(&self, code: &str) -> StorageResult<bool> {
        Ok(self.codes.insert(code.to_string()))
    }

    async fn contains(&self, code: &str) -> StorageResult<bool> {
        Ok(self.codes.contains(code))
    }
}

/// Reference records as loaded from a seed document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceData {
    pub users: Vec<User>,
    pub policies: Vec<Policy>,
    pub hospitals: Vec<Hospital>,
    pub insured_services: Vec<InsuredService>,
}

/// In-memory implementation of ReferenceStorage
pub struct InMemoryReferenceStorage {
    users: DashMap<RecordId, User>,
    policies: DashMap<RecordId, Policy>,
    hospitals: DashMap<RecordId, Hospital>,
    insured_services: DashMap<RecordId, InsuredService>,
}

impl InMemoryReferenceStorage {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            policies: DashMap::new(),
            hospitals: DashMap::new(),
            insured_services: DashMap::new(),
        }
    }

    pub fn from_data(data: ReferenceData) -> Self {
        let storage = Self::new();
        data.users.into_iter().for_each(|u| storage.insert_user(u));
        data.policies.into_iter().for_each(|p| storage.insert_policy(p));
        data.hospitals.into_iter().for_each(|h| storage.insert_hospital(h));
        data.insured_services
            .into_iter()
            .for_each(|s| storage.insert_insured_service(s));
        storage
    }

    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn insert_policy(&self, policy: Policy) {
        self.policies.insert(policy.id, policy);
    }

    pub fn insert_hospital(&self, hospital: Hospital) {
        self.hospitals.insert(hospital.id, hospital);
    }

    pub fn insert_insured_service(&self, service: InsuredService) {
        self.insured_services.insert(service.id, service);
    }
}

impl Default for InMemoryReferenceStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReferenceStorage for InMemoryReferenceStorage {
    async fn get_user(&self, id: RecordId) -> StorageResult<Option<User>> {
        Ok(self.users.get(&id).map(|entry| entry.clone()))
    }

    async fn get_policy(&self, id: RecordId) -> StorageResult<Option<Policy>> {
        Ok(self.policies.get(&id).map(|entry| entry.clone()))
    }

    async fn get_hospital(&self, id: RecordId) -> StorageResult<Option<Hospital>> {
        Ok(self.hospitals.get(&id).map(|entry| entry.clone()))
    }

    async fn get_insured_service(&self, id: RecordId) -> StorageResult<Option<InsuredService>> {
        Ok(self.insured_services.get(&id).map(|entry| entry.clone()))
    }
}

/// In-memory implementation of ServiceApprovalStorage, keyed by approval code
pub struct InMemoryServiceApprovalStorage {
    approvals: Arc<DashMap<String, ServiceApproval>>,
    ids: IdSequence,
}

impl InMemoryServiceApprovalStorage {
    pub fn new() -> Self {
        Self {
            approvals: Arc::new(DashMap::new()),
            ids: IdSequence::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.approvals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.approvals.is_empty()
    }
}

impl Default for InMemoryServiceApprovalStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceApprovalStorage for InMemoryServiceApprovalStorage {
    async fn insert(&self, mut approval: ServiceApproval) -> StorageResult<ServiceApproval> {
        match self.approvals.entry(approval.approval_code.clone()) {
            Entry::Occupied(_) => Err(StorageError::DuplicateKey(approval.approval_code)),
            Entry::Vacant(slot) => {
                approval.id = self.ids.next();
                approval.version = 0;
                slot.insert(approval.clone());
                Ok(approval)
            }
        }
    }

    async fn get_by_code(&self, code: &str) -> StorageResult<Option<ServiceApproval>> {
        Ok(self.approvals.get(code).map(|entry| entry.clone()))
    }

    async fn update(&self, mut approval: ServiceApproval) -> StorageResult<ServiceApproval> {
        let mut stored = self
            .approvals
            .get_mut(&approval.approval_code)
            .ok_or_else(|| {
                StorageError::Unavailable(format!("approval {} vanished", approval.approval_code))
            })?;
        if stored.version != approval.version {
            return Err(StorageError::VersionConflict(approval.approval_code));
        }
        approval.version += 1;
        *stored = approval.clone();
        Ok(approval)
    }

    async fn list(&self, filter: ApprovalFilter) -> StorageResult<Vec<ServiceApproval>> {
        let matching: Vec<ServiceApproval> = self
            .approvals
            .iter()
            .filter(|entry| match filter {
                ApprovalFilter::All => true,
                ApprovalFilter::User(id) => entry.user_id == id,
                ApprovalFilter::Hospital(id) => entry.hospital_id == id,
            })
            .map(|entry| entry.clone())
            .collect();
        Ok(newest_first(matching, |a| a.id))
    }
}

/// In-memory implementation of PrescriptionApprovalStorage
pub struct InMemoryPrescriptionApprovalStorage {
    approvals: Arc<DashMap<RecordId, PrescriptionApproval>>,
    numbers: Arc<DashMap<String, RecordId>>,
    ids: IdSequence,
}

impl InMemoryPrescriptionApprovalStorage {
    pub fn new() -> Self {
        Self {
            approvals: Arc::new(DashMap::new()),
            numbers: Arc::new(DashMap::new()),
            ids: IdSequence::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.approvals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.approvals.is_empty()
    }
}

impl Default for InMemoryPrescriptionApprovalStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrescriptionApprovalStorage for InMemoryPrescriptionApprovalStorage {
    async fn insert(
        &self,
        mut approval: PrescriptionApproval,
    ) -> StorageResult<PrescriptionApproval> {
        match self.numbers.entry(approval.authorization_number.clone()) {
            Entry::Occupied(_) => Err(StorageError::DuplicateKey(approval.authorization_number)),
            Entry::Vacant(slot) => {
                approval.id = self.ids.next();
                slot.insert(approval.id);
                self.approvals.insert(approval.id, approval.clone());
                Ok(approval)
            }
        }
    }

    async fn get(&self, id: RecordId) -> StorageResult<Option<PrescriptionApproval>> {
        Ok(self.approvals.get(&id).map(|entry| entry.clone()))
    }

    async fn list(&self, user_id: Option<RecordId>) -> StorageResult<Vec<PrescriptionApproval>> {
        let matching: Vec<PrescriptionApproval> = self
            .approvals
            .iter()
            .filter(|entry| user_id.is_none_or(|id| entry.user_id == id))
            .map(|entry| entry.clone())
            .collect();
        Ok(newest_first(matching, |a| a.id))
    }
}

/// In-memory implementation of AuthorizationStorage
pub struct InMemoryAuthorizationStorage {
    records: Arc<DashMap<RecordId, HospitalServiceAuthorization>>,
    pairs: Arc<DashMap<(RecordId, RecordId), RecordId>>,
    ids: IdSequence,
}

impl InMemoryAuthorizationStorage {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            pairs: Arc::new(DashMap::new()),
            ids: IdSequence::default(),
        }
    }

    fn list_approved_where(
        &self,
        predicate: impl Fn(&HospitalServiceAuthorization) -> bool,
    ) -> Vec<HospitalServiceAuthorization> {
        let mut matching: Vec<_> = self
            .records
            .iter()
            .filter(|entry| entry.approved && predicate(entry.value()))
            .map(|entry| entry.clone())
            .collect();
        matching.sort_by_key(|a| a.id);
        matching
    }
}

impl Default for InMemoryAuthorizationStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthorizationStorage for InMemoryAuthorizationStorage {
    async fn insert(
        &self,
        mut authorization: HospitalServiceAuthorization,
    ) -> StorageResult<HospitalServiceAuthorization> {
        let pair = (authorization.hospital_id, authorization.insured_service_id);
        match self.pairs.entry(pair) {
            Entry::Occupied(_) => Err(StorageError::DuplicateKey(format!(
                "hospital {} / service {}",
                pair.0, pair.1
            ))),
            Entry::Vacant(slot) => {
                authorization.id = self.ids.next();
                authorization.version = 0;
                self.records.insert(authorization.id, authorization.clone());
                slot.insert(authorization.id);
                Ok(authorization)
            }
        }
    }

    async fn get(&self, id: RecordId) -> StorageResult<Option<HospitalServiceAuthorization>> {
        Ok(self.records.get(&id).map(|entry| entry.clone()))
    }

    async fn find_by_pair(
        &self,
        hospital_id: RecordId,
        insured_service_id: RecordId,
    ) -> StorageResult<Option<HospitalServiceAuthorization>> {
        let Some(id) = self
            .pairs
            .get(&(hospital_id, insured_service_id))
            .map(|entry| *entry)
        else {
            return Ok(None);
        };
        Ok(self.records.get(&id).map(|entry| entry.clone()))
    }

    async fn update(
        &self,
        mut authorization: HospitalServiceAuthorization,
    ) -> StorageResult<HospitalServiceAuthorization> {
        let mut stored = self
            .records
            .get_mut(&authorization.id)
            .ok_or_else(|| {
                StorageError::VersionConflict(format!("authorization {}", authorization.id))
            })?;
        if stored.version != authorization.version {
            return Err(StorageError::VersionConflict(format!(
                "authorization {}",
                authorization.id
            )));
        }
        authorization.version += 1;
        *stored = authorization.clone();
        Ok(authorization)
    }

    async fn delete(&self, id: RecordId) -> StorageResult<bool> {
        match self.records.remove(&id) {
            Some((_, removed)) => {
                self.pairs
                    .remove(&(removed.hospital_id, removed.insured_service_id));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_approved_by_hospital(
        &self,
        hospital_id: RecordId,
    ) -> StorageResult<Vec<HospitalServiceAuthorization>> {
        Ok(self.list_approved_where(|a| a.hospital_id == hospital_id))
    }

    async fn list_approved_by_service(
        &self,
        insured_service_id: RecordId,
    ) -> StorageResult<Vec<HospitalServiceAuthorization>> {
        Ok(self.list_approved_where(|a| a.insured_service_id == insured_service_id))
    }
}

/// In-memory implementation of ThresholdStorage
pub struct InMemoryThresholdStorage {
    current: RwLock<Option<ConfigurableThreshold>>,
}

impl InMemoryThresholdStorage {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }
}

impl Default for InMemoryThresholdStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ThresholdStorage for InMemoryThresholdStorage {
    async fn current(&self) -> StorageResult<Option<ConfigurableThreshold>> {
        Ok(self.current.read().await.clone())
    }

    async fn upsert(
        &self,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> StorageResult<ConfigurableThreshold> {
        let mut current = self.current.write().await;
        let updated = match current.take() {
            Some(mut existing) => {
                existing.prescription_amount = amount;
                existing.updated_at = now;
                existing
            }
            None => ConfigurableThreshold {
                id: 1,
                prescription_amount: amount,
                updated_at: now,
            },
        };
        *current = Some(updated.clone());
        Ok(updated)
    }
}
