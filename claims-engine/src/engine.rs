use std::sync::Arc;

use crate::clock::Clock;
use crate::codes::AuthorizationCodeGenerator;
use crate::config::EngineConfig;
use crate::eligibility::PolicyEligibilityValidator;
use crate::hospital_services::HospitalServiceAuthorizationRegistry;
use crate::prescription_approval::PrescriptionApprovalWorkflow;
use crate::service_approval::ServiceApprovalWorkflow;
use crate::storage::{
    AuthorizationStorage, CodeRegistry, InMemoryAuthorizationStorage, InMemoryCodeRegistry,
    InMemoryPrescriptionApprovalStorage, InMemoryReferenceStorage, InMemoryServiceApprovalStorage,
    InMemoryThresholdStorage, PrescriptionApprovalStorage, ReferenceStorage,
    ServiceApprovalStorage, ThresholdStorage,
};
use crate::threshold::ThresholdPolicy;

/// Every store the engine needs.
#[derive(Clone)]
pub struct EngineStores {
    pub reference: Arc<dyn ReferenceStorage>,
    pub codes: Arc<dyn CodeRegistry>,
    pub service_approvals: Arc<dyn ServiceApprovalStorage>,
    pub prescription_approvals: Arc<dyn PrescriptionApprovalStorage>,
    pub authorizations: Arc<dyn AuthorizationStorage>,
    pub threshold: Arc<dyn ThresholdStorage>,
}

impl EngineStores {
    /// Fresh in-memory stores around the given reference data.
    pub fn in_memory(reference: Arc<InMemoryReferenceStorage>) -> Self {
        Self {
            reference,
            codes: Arc::new(InMemoryCodeRegistry::new()),
            service_approvals: Arc::new(InMemoryServiceApprovalStorage::new()),
            prescription_approvals: Arc::new(InMemoryPrescriptionApprovalStorage::new()),
            authorizations: Arc::new(InMemoryAuthorizationStorage::new()),
            threshold: Arc::new(InMemoryThresholdStorage::new()),
        }
    }
}

/// The wired-up engine. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct ClaimsEngine {
    pub service_approvals: Arc<ServiceApprovalWorkflow>,
    pub prescriptions: Arc<PrescriptionApprovalWorkflow>,
    pub authorizations: Arc<HospitalServiceAuthorizationRegistry>,
    pub threshold: Arc<ThresholdPolicy>,
    pub codes: Arc<AuthorizationCodeGenerator>,
}

impl ClaimsEngine {
    pub fn new(config: &EngineConfig, stores: EngineStores, clock: Arc<dyn Clock>) -> Self {
        let eligibility = Arc::new(PolicyEligibilityValidator::new(clock.clone()));
        let threshold = Arc::new(ThresholdPolicy::new(
            stores.threshold,
            clock.clone(),
            config.default_threshold,
            config.threshold_cache_ttl,
        ));
        let codes = Arc::new(AuthorizationCodeGenerator::new(
            stores.codes,
            config.code_max_attempts,
        ));

        let service_approvals = Arc::new(ServiceApprovalWorkflow::new(
            stores.reference.clone(),
            stores.service_approvals,
            eligibility.clone(),
            threshold.clone(),
            codes.clone(),
            clock.clone(),
        ));
        let prescriptions = Arc::new(PrescriptionApprovalWorkflow::new(
            stores.reference.clone(),
            stores.prescription_approvals,
            eligibility,
            threshold.clone(),
            codes.clone(),
            clock.clone(),
        ));
        let authorizations = Arc::new(HospitalServiceAuthorizationRegistry::new(
            stores.reference,
            stores.authorizations,
            clock,
        ));

        Self {
            service_approvals,
            prescriptions,
            authorizations,
            threshold,
            codes,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::service_approval::{AttachOutcome, PrescriptionAttachment, ServiceRequestOutcome};
    use crate::testing::{Fixture, money};

    #[tokio::test]
    async fn test_codes_are_unique_across_workflows() {
        let fixture = Fixture::new();
        let engine = &fixture.engine;

        let outcome = engine
            .service_approvals
            .request_approval(fixture.service_claim(Fixture::ACTIVE_USER, "100.00"))
            .await
            .unwrap();
        let ServiceRequestOutcome::Approved(service) = outcome else {
            panic!("expected approval, got {outcome:?}");
        };
        let prescription = engine
            .prescriptions
            .submit(fixture.prescription_claim(Fixture::ACTIVE_USER, "300.00"))
            .await
            .unwrap();

        assert_ne!(service.approval_code, prescription.authorization_number);
        assert!(engine.codes.is_issued(&service.approval_code).await.unwrap());
        assert!(engine.codes.is_issued(&prescription.authorization_number).await.unwrap());
    }

    #[tokio::test]
    async fn test_threshold_update_shared_by_both_workflows() {
        let fixture = Fixture::new();
        let engine = &fixture.engine;
        engine.threshold.update(money("10.00")).await.unwrap();

        let outcome = engine
            .service_approvals
            .request_approval(fixture.service_claim(Fixture::ACTIVE_USER, "100.00"))
            .await
            .unwrap();
        let ServiceRequestOutcome::Approved(service) = outcome else {
            panic!("expected approval, got {outcome:?}");
        };
        let attached = engine
            .service_approvals
            .attach_prescription(PrescriptionAttachment {
                approval_code: service.approval_code,
                prescription_id: "RX-1".to_string(),
                prescription_total: money("20.00"),
            })
            .await
            .unwrap();
        assert!(matches!(attached, AttachOutcome::Linked(_)));

        let prescription = engine
            .prescriptions
            .submit(fixture.prescription_claim(Fixture::ACTIVE_USER, "20.00"))
            .await
            .unwrap();
        assert!(prescription.is_approved());
    }
}
