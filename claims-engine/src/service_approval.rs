//! Medical-service claims.
//!
//! ```text
//! (none) --request--> APPROVED --complete--> COMPLETED
//!                        |
//!                        +--attach prescription below threshold--> REJECTED
//! ```
//!
//! Failed lookups and failed eligibility never create a record here; the
//! caller receives the reason directly.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::codes::{AuthorizationCodeGenerator, CodeFormat};
use crate::coverage::{CoverageCalculator, normalize_amount};
use crate::eligibility::{Eligibility, PolicyEligibilityValidator};
use crate::error::{EngineError, Result, StorageError};
use crate::models::{RecordId, RejectionReason, ServiceApproval, ServiceApprovalStatus};
use crate::storage::{ApprovalFilter, ReferenceStorage, ServiceApprovalStorage};
use crate::threshold::{ThresholdCheck, ThresholdPolicy};

/// A hospital's request to bill a service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceClaim {
    pub user_id: RecordId,
    pub hospital_id: RecordId,
    pub service_id: String,
    pub service_name: String,
    pub service_description: Option<String>,
    pub service_cost: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceRequestOutcome {
    Approved(ServiceApproval),
    Ineligible(RejectionReason),
}

/// Prescription details to attach to an approved service.
#[derive(Debug, Clone, PartialEq)]
pub struct PrescriptionAttachment {
    pub approval_code: String,
    pub prescription_id: String,
    pub prescription_total: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttachOutcome {
    Linked(ServiceApproval),
    /// The approval was moved to `REJECTED`; the reason is on the record.
    Rejected(ServiceApproval),
}

pub struct ServiceApprovalWorkflow {
    reference: Arc<dyn ReferenceStorage>,
    approvals: Arc<dyn ServiceApprovalStorage>,
    eligibility: Arc<PolicyEligibilityValidator>,
    threshold: Arc<ThresholdPolicy>,
    codes: Arc<AuthorizationCodeGenerator>,
    clock: Arc<dyn Clock>,
}

impl ServiceApprovalWorkflow {
    pub fn new(
        reference: Arc<dyn ReferenceStorage>,
        approvals: Arc<dyn ServiceApprovalStorage>,
        eligibility: Arc<PolicyEligibilityValidator>,
        threshold: Arc<ThresholdPolicy>,
        codes: Arc<AuthorizationCodeGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reference,
            approvals,
            eligibility,
            threshold,
            codes,
            clock,
        }
    }

    pub async fn request_approval(&self, claim: ServiceClaim) -> Result<ServiceRequestOutcome> {
        let service_cost = normalize_amount(claim.service_cost, "serviceCost")?;
        if claim.service_id.trim().is_empty() || claim.service_name.trim().is_empty() {
            return Err(EngineError::Validation(
                "serviceId and serviceName are required".to_string(),
            ));
        }

        let user = self
            .reference
            .get_user(claim.user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("user", claim.user_id))?;
        self.reference
            .get_hospital(claim.hospital_id)
            .await?
            .ok_or_else(|| EngineError::not_found("hospital", claim.hospital_id))?;

        let policy = match self.eligibility.evaluate(self.reference.as_ref(), &user).await? {
            Eligibility::Eligible(policy) => policy,
            Eligibility::Ineligible(reason) => {
                warn!(
                    user_id = user.id,
                    hospital_id = claim.hospital_id,
                    reason = reason.code(),
                    "Service claim ineligible"
                );
                return Ok(ServiceRequestOutcome::Ineligible(reason));
            }
        };

        let split =
            CoverageCalculator::split(service_cost, i64::from(policy.coverage_percentage))?;
        let approval_code = self.codes.mint(CodeFormat::ServiceApproval).await?;

        let draft = ServiceApproval {
            id: 0,
            approval_code,
            user_id: user.id,
            hospital_id: claim.hospital_id,
            service_id: claim.service_id,
            service_name: claim.service_name,
            service_description: claim.service_description,
            service_cost,
            covered_amount: split.covered_amount,
            patient_amount: split.patient_amount,
            coverage_percentage: policy.coverage_percentage,
            status: ServiceApprovalStatus::Approved,
            rejection_reason: None,
            approval_date: self.clock.now(),
            completed_date: None,
            prescription_id: None,
            prescription_total: None,
            version: 0,
        };

        let saved = self.approvals.insert(draft).await.map_err(|e| {
            error!(user_id = user.id, error = %e, "Failed to persist service approval");
            EngineError::from(e)
        })?;

        info!(
            approval_code = %saved.approval_code,
            user_id = saved.user_id,
            hospital_id = saved.hospital_id,
            service_cost = %saved.service_cost,
            covered_amount = %saved.covered_amount,
            patient_amount = %saved.patient_amount,
            "Service approval granted"
        );
        Ok(ServiceRequestOutcome::Approved(saved))
    }

    pub async fn attach_prescription(
        &self,
        attachment: PrescriptionAttachment,
    ) -> Result<AttachOutcome> {
        let prescription_total =
            normalize_amount(attachment.prescription_total, "prescriptionTotal")?;
        let mut approval = self.load(&attachment.approval_code).await?;

        if approval.status != ServiceApprovalStatus::Approved {
            return Err(EngineError::InvalidState(format!(
                "approval {} is {} and not in a state that accepts a prescription",
                approval.approval_code, approval.status
            )));
        }
        if approval.has_prescription() {
            return Err(EngineError::AlreadyLinked(approval.approval_code));
        }

        if let ThresholdCheck::Fail(reason) = self.threshold.evaluate(prescription_total).await? {
            warn!(
                approval_code = %approval.approval_code,
                prescription_total = %prescription_total,
                reason = reason.code(),
                "Prescription below threshold, rejecting approval"
            );
            approval.reject(reason)?;
            let saved = self.save(approval).await?;
            return Ok(AttachOutcome::Rejected(saved));
        }

        approval.link_prescription(attachment.prescription_id, prescription_total)?;
        let saved = self.save(approval).await?;
        info!(
            approval_code = %saved.approval_code,
            prescription_total = %prescription_total,
            "Prescription attached to service approval"
        );
        Ok(AttachOutcome::Linked(saved))
    }

    pub async fn check_status(&self, approval_code: &str) -> Result<ServiceApproval> {
        self.load(approval_code).await
    }

    /// Move an `APPROVED` record to `COMPLETED`, exactly once.
    pub async fn complete(&self, approval_code: &str) -> Result<ServiceApproval> {
        let mut approval = self.load(approval_code).await?;
        approval.complete(self.clock.now())?;
        let saved = self.save(approval).await?;
        info!(approval_code = %saved.approval_code, "Service approval completed");
        Ok(saved)
    }

    pub async fn list(&self, filter: ApprovalFilter) -> Result<Vec<ServiceApproval>> {
        Ok(self.approvals.list(filter).await?)
    }

    async fn load(&self, approval_code: &str) -> Result<ServiceApproval> {
        self.approvals
            .get_by_code(approval_code)
            .await?
            .ok_or_else(|| EngineError::not_found("service approval", approval_code))
    }

    /// Versioned write. Losing a race surfaces as `InvalidState`.
    async fn save(&self, approval: ServiceApproval) -> Result<ServiceApproval> {
        let code = approval.approval_code.clone();
        self.approvals.update(approval).await.map_err(|e| match e {
            StorageError::VersionConflict(_) => {
                warn!(approval_code = %code, "Service approval changed concurrently");
                EngineError::InvalidState(format!("approval {code} was changed concurrently"))
            }
            other => {
                error!(approval_code = %code, error = %other, "Failed to update service approval");
                EngineError::Storage(other)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Policy, User};
    use crate::testing::{Fixture, money};
    use chrono::Duration;

    fn claim(user_id: RecordId, cost: &str) -> ServiceClaim {
        ServiceClaim {
            user_id,
            hospital_id: Fixture::HOSPITAL,
            service_id: "EXT-001".to_string(),
            service_name: "MRI".to_string(),
            service_description: Some("Knee MRI".to_string()),
            service_cost: money(cost),
        }
    }

    async fn approved(fixture: &Fixture, cost: &str) -> ServiceApproval {
        match fixture
            .engine
            .service_approvals
            .request_approval(claim(Fixture::ACTIVE_USER, cost))
            .await
            .unwrap()
        {
            ServiceRequestOutcome::Approved(approval) => approval,
            other => panic!("expected approval, got {other:?}"),
        }
    }

    fn attachment(code: &str, total: &str) -> PrescriptionAttachment {
        PrescriptionAttachment {
            approval_code: code.to_string(),
            prescription_id: "RX-77".to_string(),
            prescription_total: money(total),
        }
    }

    #[tokio::test]
    async fn test_request_approves_with_coverage_split() {
        let fixture = Fixture::new();
        let approval = approved(&fixture, "100.00").await;

        assert_eq!(approval.status, ServiceApprovalStatus::Approved);
        assert_eq!(approval.covered_amount, money("70.00"));
        assert_eq!(approval.patient_amount, money("30.00"));
        assert_eq!(approval.coverage_percentage, 70);
        assert!(approval.approval_code.starts_with("AP"));
        assert_eq!(approval.approval_date, fixture.clock.now());
        assert!(approval.rejection_reason.is_none());
        assert_eq!(fixture.service_store.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_policy_creates_no_record() {
        let fixture = Fixture::new();
        let outcome = fixture
            .engine
            .service_approvals
            .request_approval(claim(Fixture::EXPIRED_USER, "100.00"))
            .await
            .unwrap();

        assert_eq!(outcome, ServiceRequestOutcome::Ineligible(RejectionReason::PolicyExpired));
        assert!(fixture.service_store.is_empty());
    }

    #[tokio::test]
    async fn test_other_ineligibility_reasons() {
        let fixture = Fixture::new();
        let workflow = &fixture.engine.service_approvals;

        let outcome = workflow
            .request_approval(claim(Fixture::NO_POLICY_USER, "10.00"))
            .await
            .unwrap();
        assert_eq!(outcome, ServiceRequestOutcome::Ineligible(RejectionReason::NoPolicyAssigned));

        let outcome = workflow
            .request_approval(claim(Fixture::INACTIVE_USER, "10.00"))
            .await
            .unwrap();
        assert_eq!(outcome, ServiceRequestOutcome::Ineligible(RejectionReason::CoverageInactive));
        assert!(fixture.service_store.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user_or_hospital_is_not_found() {
        let fixture = Fixture::new();
        let workflow = &fixture.engine.service_approvals;

        let err = workflow.request_approval(claim(404, "10.00")).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "user", .. }));

        let mut bad_hospital = claim(Fixture::ACTIVE_USER, "10.00");
        bad_hospital.hospital_id = 404;
        let err = workflow.request_approval(bad_hospital).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "hospital", .. }));
        assert!(fixture.service_store.is_empty());
    }

    #[tokio::test]
    async fn test_negative_cost_is_validation_error() {
        let fixture = Fixture::new();
        let err = fixture
            .engine
            .service_approvals
            .request_approval(claim(Fixture::ACTIVE_USER, "-5.00"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(fixture.service_store.is_empty());
    }

    #[tokio::test]
    async fn test_attach_prescription_links_once() {
        let fixture = Fixture::new();
        let workflow = &fixture.engine.service_approvals;
        let approval = approved(&fixture, "100.00").await;

        let outcome = workflow
            .attach_prescription(attachment(&approval.approval_code, "300.00"))
            .await
            .unwrap();
        let AttachOutcome::Linked(linked) = outcome else {
            panic!("expected link, got {outcome:?}");
        };
        assert_eq!(linked.status, ServiceApprovalStatus::Approved);
        assert_eq!(linked.prescription_id.as_deref(), Some("RX-77"));
        assert_eq!(linked.prescription_total, Some(money("300.00")));

        let mut second = attachment(&approval.approval_code, "900.00");
        second.prescription_id = "RX-99".to_string();
        let err = workflow.attach_prescription(second).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyLinked(_)));

        let stored = workflow.check_status(&approval.approval_code).await.unwrap();
        assert_eq!(stored.prescription_id.as_deref(), Some("RX-77"));
        assert_eq!(stored.prescription_total, Some(money("300.00")));
    }

    #[tokio::test]
    async fn test_attach_below_threshold_rejects_approval() {
        let fixture = Fixture::new();
        let workflow = &fixture.engine.service_approvals;
        let approval = approved(&fixture, "100.00").await;

        let outcome = workflow
            .attach_prescription(attachment(&approval.approval_code, "100.00"))
            .await
            .unwrap();
        let AttachOutcome::Rejected(rejected) = outcome else {
            panic!("expected rejection, got {outcome:?}");
        };
        assert_eq!(rejected.status, ServiceApprovalStatus::Rejected);
        let reason = rejected.rejection_reason.clone().unwrap();
        assert_eq!(reason.code(), "BELOW_THRESHOLD");
        assert!(reason.to_string().contains("250"));
        assert!(rejected.prescription_id.is_none());

        // A rejected approval accepts nothing further.
        let err = workflow
            .attach_prescription(attachment(&approval.approval_code, "500.00"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_attach_to_completed_is_invalid_state() {
        let fixture = Fixture::new();
        let workflow = &fixture.engine.service_approvals;
        let approval = approved(&fixture, "100.00").await;
        workflow.complete(&approval.approval_code).await.unwrap();

        let err = workflow
            .attach_prescription(attachment(&approval.approval_code, "500.00"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));

        let stored = workflow.check_status(&approval.approval_code).await.unwrap();
        assert_eq!(stored.status, ServiceApprovalStatus::Completed);
        assert!(stored.prescription_id.is_none());
        assert!(stored.prescription_total.is_none());
    }

    #[tokio::test]
    async fn test_coverage_above_hundred_is_validation_error() {
        let fixture = Fixture::new();
        fixture.reference.insert_policy(Policy {
            id: 200,
            coverage_percentage: 150,
            expiration_date: fixture.clock.now() + Duration::days(30),
            cost: money("50.00"),
        });
        fixture.reference.insert_user(User {
            id: 50,
            name: "Elena".to_string(),
            email: "elena@example.com".to_string(),
            policy_id: Some(200),
            coverage_active: true,
        });

        let err = fixture
            .engine
            .service_approvals
            .request_approval(claim(50, "100.00"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(fixture.service_store.is_empty());
    }

    #[tokio::test]
    async fn test_cost_too_large_to_split_creates_no_record() {
        let fixture = Fixture::new();
        let err = fixture
            .engine
            .service_approvals
            .request_approval(claim(Fixture::ACTIVE_USER, "10000000000000000000000000000"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(fixture.service_store.is_empty());
    }

    #[tokio::test]
    async fn test_attach_unknown_code_is_not_found() {
        let fixture = Fixture::new();
        let err = fixture
            .engine
            .service_approvals
            .attach_prescription(attachment("APNOPE0000", "500.00"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_complete_transitions_exactly_once() {
        let fixture = Fixture::new();
        let workflow = &fixture.engine.service_approvals;
        let approval = approved(&fixture, "100.00").await;

        fixture.clock.advance(Duration::hours(2));
        let completed = workflow.complete(&approval.approval_code).await.unwrap();
        assert_eq!(completed.status, ServiceApprovalStatus::Completed);
        assert_eq!(completed.completed_date, Some(fixture.clock.now()));

        let err = workflow.complete(&approval.approval_code).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));

        let err = workflow.complete("APNOPE0000").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_complete_rejected_is_invalid_state() {
        let fixture = Fixture::new();
        let workflow = &fixture.engine.service_approvals;
        let approval = approved(&fixture, "100.00").await;
        workflow
            .attach_prescription(attachment(&approval.approval_code, "1.00"))
            .await
            .unwrap();

        let err = workflow.complete(&approval.approval_code).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
        let stored = workflow.check_status(&approval.approval_code).await.unwrap();
        assert_eq!(stored.status, ServiceApprovalStatus::Rejected);
        assert!(stored.completed_date.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_completion_has_single_winner() {
        let fixture = Fixture::new();
        let approval = approved(&fixture, "100.00").await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = fixture.engine.clone();
            let code = approval.approval_code.clone();
            handles.push(tokio::spawn(async move {
                engine.service_approvals.complete(&code).await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(err) => assert!(matches!(err, EngineError::InvalidState(_))),
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_list_by_user_and_hospital() {
        let fixture = Fixture::new();
        let first = approved(&fixture, "10.00").await;
        let second = approved(&fixture, "20.00").await;
        let workflow = &fixture.engine.service_approvals;

        let mine = workflow.list(ApprovalFilter::User(Fixture::ACTIVE_USER)).await.unwrap();
        let codes: Vec<_> = mine.into_iter().map(|a| a.approval_code).collect();
        assert_eq!(codes, vec![second.approval_code, first.approval_code]);

        let at_hospital = workflow
            .list(ApprovalFilter::Hospital(Fixture::HOSPITAL))
            .await
            .unwrap();
        assert_eq!(at_hospital.len(), 2);
        let inactive = workflow
            .list(ApprovalFilter::User(Fixture::INACTIVE_USER))
            .await
            .unwrap();
        assert!(inactive.is_empty());
    }
}
