//! Shared test fixture: a fully wired engine over seeded in-memory stores.

use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

use crate::clock::{Clock, FixedClock};
use crate::config::EngineConfig;
use crate::eligibility::PolicyEligibilityValidator;
use crate::engine::{ClaimsEngine, EngineStores};
use crate::models::{Hospital, InsuredService, Policy, RecordId, User};
use crate::prescription_approval::{PrescriptionApprovalWorkflow, PrescriptionClaim};
use crate::service_approval::ServiceClaim;
use crate::storage::{
    InMemoryPrescriptionApprovalStorage, InMemoryReferenceStorage, InMemoryServiceApprovalStorage,
    PrescriptionApprovalStorage,
};

pub fn money(raw: &str) -> Decimal {
    Decimal::from_str(raw).unwrap()
}

pub struct Fixture {
    pub engine: ClaimsEngine,
    pub clock: Arc<FixedClock>,
    pub reference: Arc<InMemoryReferenceStorage>,
    pub service_store: Arc<InMemoryServiceApprovalStorage>,
    pub prescription_store: Arc<InMemoryPrescriptionApprovalStorage>,
}

impl Fixture {
    pub const HOSPITAL: RecordId = 10;
    pub const SERVICE: RecordId = 20;
    pub const OTHER_SERVICE: RecordId = 21;

    /// 70% policy, valid, coverage active.
    pub const ACTIVE_USER: RecordId = 1;
    pub const EXPIRED_USER: RecordId = 2;
    pub const NO_POLICY_USER: RecordId = 3;
    /// Valid policy but pending payments.
    pub const INACTIVE_USER: RecordId = 4;

    const VALID_POLICY: RecordId = 100;
    const EXPIRED_POLICY: RecordId = 101;

    pub fn new() -> Self {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(now));

        let reference = Arc::new(InMemoryReferenceStorage::new());
        reference.insert_policy(Policy {
            id: Self::VALID_POLICY,
            coverage_percentage: 70,
            expiration_date: now + Duration::days(365),
            cost: money("120.00"),
        });
        reference.insert_policy(Policy {
            id: Self::EXPIRED_POLICY,
            coverage_percentage: 80,
            expiration_date: now - Duration::days(1),
            cost: money("90.00"),
        });
        for (id, name, policy_id, coverage_active) in [
            (Self::ACTIVE_USER, "Ana", Some(Self::VALID_POLICY), true),
            (Self::EXPIRED_USER, "Bruno", Some(Self::EXPIRED_POLICY), true),
            (Self::NO_POLICY_USER, "Carla", None, true),
            (Self::INACTIVE_USER, "Diego", Some(Self::VALID_POLICY), false),
        ] {
            reference.insert_user(User {
                id,
                name: name.to_string(),
                email: format!("{}@example.com", name.to_lowercase()),
                policy_id,
                coverage_active,
            });
        }
        reference.insert_hospital(Hospital {
            id: Self::HOSPITAL,
            name: "General Hospital".to_string(),
        });
        reference.insert_insured_service(InsuredService {
            id: Self::SERVICE,
            name: "MRI".to_string(),
            category: Some("imaging".to_string()),
        });
        reference.insert_insured_service(InsuredService {
            id: Self::OTHER_SERVICE,
            name: "Blood panel".to_string(),
            category: None,
        });

        let service_store = Arc::new(InMemoryServiceApprovalStorage::new());
        let prescription_store = Arc::new(InMemoryPrescriptionApprovalStorage::new());
        let stores = EngineStores {
            service_approvals: service_store.clone(),
            prescription_approvals: prescription_store.clone(),
            ..EngineStores::in_memory(reference.clone())
        };

        let engine = ClaimsEngine::new(&EngineConfig::default(), stores, clock.clone());

        Self {
            engine,
            clock,
            reference,
            service_store,
            prescription_store,
        }
    }

    /// A prescription workflow sharing this fixture's engine state except
    /// for the approval store.
    pub fn prescription_workflow_with(
        &self,
        approvals: Arc<dyn PrescriptionApprovalStorage>,
    ) -> PrescriptionApprovalWorkflow {
        let clock: Arc<dyn Clock> = self.clock.clone();
        PrescriptionApprovalWorkflow::new(
            self.reference.clone(),
            approvals,
            Arc::new(PolicyEligibilityValidator::new(clock.clone())),
            self.engine.threshold.clone(),
            self.engine.codes.clone(),
            clock,
        )
    }

    pub fn service_claim(&self, user_id: RecordId, cost: &str) -> ServiceClaim {
        ServiceClaim {
            user_id,
            hospital_id: Self::HOSPITAL,
            service_id: "EXT-001".to_string(),
            service_name: "MRI".to_string(),
            service_description: None,
            service_cost: money(cost),
        }
    }

    pub fn prescription_claim(&self, user_id: RecordId, cost: &str) -> PrescriptionClaim {
        PrescriptionClaim {
            user_id,
            total_cost: money(cost),
            prescription_id_hospital: "HOSP-RX-1".to_string(),
            details: serde_json::json!({ "medicines": [] }),
        }
    }
}
