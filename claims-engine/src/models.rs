use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EngineError, Result};

/// Store-assigned record identifier.
pub type RecordId = i64;

/// Why a claim was turned down.
///
/// Every variant has a stable [`code`](RejectionReason::code) that clients can
/// branch on; the `Display` text is meant for humans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    UserNotFound,
    NoPolicyAssigned,
    PolicyExpired,
    CoverageInactive,
    BelowThreshold { threshold: Decimal },
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::NoPolicyAssigned => "NO_POLICY_ASSIGNED",
            Self::PolicyExpired => "POLICY_EXPIRED",
            Self::CoverageInactive => "COVERAGE_INACTIVE",
            Self::BelowThreshold { .. } => "BELOW_THRESHOLD",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserNotFound => write!(f, "user not found"),
            Self::NoPolicyAssigned => write!(f, "user has no policy assigned"),
            Self::PolicyExpired => write!(f, "user policy has expired"),
            Self::CoverageInactive => write!(f, "client coverage inactive"),
            Self::BelowThreshold { threshold } => {
                write!(f, "amount below minimum threshold of {threshold}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceApprovalStatus {
    Approved,
    Rejected,
    Completed,
}

impl fmt::Display for ServiceApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Completed => "COMPLETED",
        };
        f.write_str(label)
    }
}

/// One authorization decision for a medical service claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceApproval {
    pub id: RecordId,
    pub approval_code: String,
    pub user_id: RecordId,
    pub hospital_id: RecordId,
    pub service_id: String,
    pub service_name: String,
    pub service_description: Option<String>,
    pub service_cost: Decimal,
    pub covered_amount: Decimal,
    pub patient_amount: Decimal,
    /// Policy coverage at decision time, kept for audit.
    pub coverage_percentage: u8,
    pub status: ServiceApprovalStatus,
    pub rejection_reason: Option<RejectionReason>,
    pub approval_date: DateTime<Utc>,
    pub completed_date: Option<DateTime<Utc>>,
    pub prescription_id: Option<String>,
    pub prescription_total: Option<Decimal>,
    #[serde(default)]
    pub version: u64,
}

impl ServiceApproval {
    pub fn has_prescription(&self) -> bool {
        self.prescription_id.is_some()
    }

    /// Attach prescription details. Allowed once, and only while `APPROVED`.
    pub fn link_prescription(&mut self, prescription_id: String, total: Decimal) -> Result<()> {
        self.require_approved("accepts a prescription")?;
        if self.has_prescription() {
            return Err(EngineError::AlreadyLinked(self.approval_code.clone()));
        }
        self.prescription_id = Some(prescription_id);
        self.prescription_total = Some(total);
        Ok(())
    }

    pub fn reject(&mut self, reason: RejectionReason) -> Result<()> {
        self.require_approved("can be rejected")?;
        self.status = ServiceApprovalStatus::Rejected;
        self.rejection_reason = Some(reason);
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.require_approved("can be completed")?;
        self.status = ServiceApprovalStatus::Completed;
        self.completed_date = Some(now);
        Ok(())
    }

    fn require_approved(&self, action: &str) -> Result<()> {
        if self.status != ServiceApprovalStatus::Approved {
            return Err(EngineError::InvalidState(format!(
                "approval {} is {} and no longer {action}",
                self.approval_code, self.status
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrescriptionApprovalStatus {
    Approved,
    Rejected,
}

/// Terminal record of a prescription-only decision. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionApproval {
    pub id: RecordId,
    pub authorization_number: String,
    pub user_id: RecordId,
    pub prescription_id_hospital: String,
    pub prescription_details: serde_json::Value,
    pub prescription_cost: Decimal,
    pub status: PrescriptionApprovalStatus,
    pub rejection_reason: Option<RejectionReason>,
    pub decided_at: DateTime<Utc>,
}

impl PrescriptionApproval {
    pub fn is_approved(&self) -> bool {
        self.status == PrescriptionApprovalStatus::Approved
    }
}

/// Grant allowing a hospital to bill for an insured service.
///
/// Revocation is soft: `approved` flips to false and `revoked_at` is stamped,
/// the record itself stays retrievable by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalServiceAuthorization {
    pub id: RecordId,
    pub hospital_id: RecordId,
    pub insured_service_id: RecordId,
    pub approved: bool,
    pub approval_date: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    #[serde(default)]
    pub version: u64,
}

impl HospitalServiceAuthorization {
    pub fn new(
        hospital_id: RecordId,
        insured_service_id: RecordId,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            hospital_id,
            insured_service_id,
            approved: true,
            approval_date: Some(now),
            revoked_at: None,
            notes,
            version: 0,
        }
    }

    pub fn approve(&mut self, notes: Option<String>, now: DateTime<Utc>) {
        self.approved = true;
        self.approval_date = Some(now);
        self.revoked_at = None;
        self.notes = notes;
    }

    /// Returns false when the grant was already inactive.
    pub fn revoke(&mut self, now: DateTime<Utc>) -> bool {
        if !self.approved {
            return false;
        }
        self.approved = false;
        self.revoked_at = Some(now);
        true
    }
}

/// The current minimum prescription amount setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurableThreshold {
    pub id: RecordId,
    pub prescription_amount: Decimal,
    pub updated_at: DateTime<Utc>,
}

// Reference data, owned outside the engine.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: RecordId,
    pub name: String,
    pub email: String,
    pub policy_id: Option<RecordId>,
    /// False while the user has pending payments.
    pub coverage_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: RecordId,
    pub coverage_percentage: u8,
    pub expiration_date: DateTime<Utc>,
    pub cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hospital {
    pub id: RecordId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsuredService {
    pub id: RecordId,
    pub name: String,
    pub category: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approval() -> ServiceApproval {
        ServiceApproval {
            id: 1,
            approval_code: "AP00000001".to_string(),
            user_id: 1,
            hospital_id: 1,
            service_id: "SRV-1".to_string(),
            service_name: "X-Ray".to_string(),
            service_description: None,
            service_cost: Decimal::new(10000, 2),
            covered_amount: Decimal::new(7000, 2),
            patient_amount: Decimal::new(3000, 2),
            coverage_percentage: 70,
            status: ServiceApprovalStatus::Approved,
            rejection_reason: None,
            approval_date: Utc::now(),
            completed_date: None,
            prescription_id: None,
            prescription_total: None,
            version: 0,
        }
    }

    #[test]
    fn test_link_prescription_only_once() {
        let mut approval = approval();
        approval
            .link_prescription("RX-1".to_string(), Decimal::new(30000, 2))
            .unwrap();

        let err = approval
            .link_prescription("RX-2".to_string(), Decimal::new(50000, 2))
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyLinked(_)));
        assert_eq!(approval.prescription_id.as_deref(), Some("RX-1"));
        assert_eq!(approval.prescription_total, Some(Decimal::new(30000, 2)));
    }

    #[test]
    fn test_complete_requires_approved() {
        let mut approval = approval();
        approval.reject(RejectionReason::CoverageInactive).unwrap();

        let err = approval.complete(Utc::now()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
        assert!(approval.completed_date.is_none());
    }

    #[test]
    fn test_rejection_reason_codes_are_stable() {
        let reason = RejectionReason::BelowThreshold {
            threshold: Decimal::new(25000, 2),
        };
        assert_eq!(reason.code(), "BELOW_THRESHOLD");
        assert_eq!(reason.to_string(), "amount below minimum threshold of 250.00");

        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["code"], "BELOW_THRESHOLD");
        assert_eq!(json["threshold"], "250.00");
    }

    #[test]
    fn test_revoke_is_soft_and_idempotent() {
        let now = Utc::now();
        let mut grant = HospitalServiceAuthorization::new(1, 2, None, now);
        assert!(grant.revoke(now));
        assert!(!grant.revoke(now));
        assert!(!grant.approved);
        assert_eq!(grant.approval_date, Some(now));
        assert_eq!(grant.revoked_at, Some(now));
    }
}
