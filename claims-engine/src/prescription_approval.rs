//! Prescription-only claims.
//!
//! Every evaluated claim ends in exactly one terminal record, approved or
//! rejected, so rejections stay auditable. Only a failing store turns into an
//! error.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::codes::{AuthorizationCodeGenerator, CodeFormat};
use crate::coverage::normalize_amount;
use crate::eligibility::{Eligibility, PolicyEligibilityValidator};
use crate::error::{EngineError, Result};
use crate::models::{PrescriptionApproval, PrescriptionApprovalStatus, RecordId, RejectionReason};
use crate::storage::{PrescriptionApprovalStorage, ReferenceStorage};
use crate::threshold::{ThresholdCheck, ThresholdPolicy};

/// A pharmacy's request to bill a prescription.
#[derive(Debug, Clone, PartialEq)]
pub struct PrescriptionClaim {
    pub user_id: RecordId,
    pub total_cost: Decimal,
    pub prescription_id_hospital: String,
    pub details: serde_json::Value,
}

pub struct PrescriptionApprovalWorkflow {
    reference: Arc<dyn ReferenceStorage>,
    approvals: Arc<dyn PrescriptionApprovalStorage>,
    eligibility: Arc<PolicyEligibilityValidator>,
    threshold: Arc<ThresholdPolicy>,
    codes: Arc<AuthorizationCodeGenerator>,
    clock: Arc<dyn Clock>,
}

impl PrescriptionApprovalWorkflow {
    pub fn new(
        reference: Arc<dyn ReferenceStorage>,
        approvals: Arc<dyn PrescriptionApprovalStorage>,
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

    /// Decide a claim and persist the decision.
    ///
    /// A negative cost is malformed input and is refused before evaluation,
    /// without a record.
    pub async fn submit(&self, claim: PrescriptionClaim) -> Result<PrescriptionApproval> {
        let cost = normalize_amount(claim.total_cost, "totalCost")?;

        match self.decide(claim.user_id, cost).await? {
            None => self.persist(claim, cost, None).await,
            Some(reason) => {
                warn!(
                    user_id = claim.user_id,
                    prescription_id_hospital = %claim.prescription_id_hospital,
                    reason = reason.code(),
                    "Prescription claim rejected"
                );
                self.persist(claim, cost, Some(reason)).await
            }
        }
    }

    pub async fn get(&self, id: RecordId) -> Result<PrescriptionApproval> {
        self.approvals
            .get(id)
            .await?
            .ok_or_else(|| EngineError::not_found("prescription approval", id))
    }

    pub async fn list(&self, user_id: Option<RecordId>) -> Result<Vec<PrescriptionApproval>> {
        Ok(self.approvals.list(user_id).await?)
    }

    /// `None` means approve.
    async fn decide(&self, user_id: RecordId, cost: Decimal) -> Result<Option<RejectionReason>> {
        let Some(user) = self.reference.get_user(user_id).await? else {
            return Ok(Some(RejectionReason::UserNotFound));
        };
        if let Eligibility::Ineligible(reason) =
            self.eligibility.evaluate(self.reference.as_ref(), &user).await?
        {
            return Ok(Some(reason));
        }
        if let ThresholdCheck::Fail(reason) = self.threshold.evaluate(cost).await? {
            return Ok(Some(reason));
        }
        Ok(None)
    }

    async fn persist(
        &self,
        claim: PrescriptionClaim,
        cost: Decimal,
        rejection: Option<RejectionReason>,
    ) -> Result<PrescriptionApproval> {
        let (status, format) = match rejection {
            None => (PrescriptionApprovalStatus::Approved, CodeFormat::PrescriptionApproved),
            Some(_) => (PrescriptionApprovalStatus::Rejected, CodeFormat::PrescriptionRejected),
        };
        let authorization_number = self.codes.mint(format).await?;

        let record = PrescriptionApproval {
            id: 0,
            authorization_number,
            user_id: claim.user_id,
            prescription_id_hospital: claim.prescription_id_hospital,
            prescription_details: claim.details,
            prescription_cost: cost,
            status,
            rejection_reason: rejection,
            decided_at: self.clock.now(),
        };

        let saved = self.approvals.insert(record).await.map_err(|e| {
            error!(user_id = claim.user_id, error = %e, "Failed to persist prescription decision");
            EngineError::from(e)
        })?;

        if saved.is_approved() {
            info!(
                authorization_number = %saved.authorization_number,
                user_id = saved.user_id,
                prescription_cost = %saved.prescription_cost,
                "Prescription approved"
            );
        }
        Ok(saved)
    }
}
