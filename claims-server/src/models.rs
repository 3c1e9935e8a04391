use chrono::{DateTime, Utc};
use claims_engine::{
    ConfigurableThreshold, CurrentThreshold, HospitalServiceAuthorization, PrescriptionApproval,
    PrescriptionApprovalStatus, RecordId, RejectionReason, ServiceApproval, ServiceApprovalStatus,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Requests

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceApprovalRequest {
    pub user_id: RecordId,
    pub hospital_id: RecordId,
    pub service_id: String,
    pub service_name: String,
    pub service_description: Option<String>,
    pub service_cost: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachPrescriptionRequest {
    pub approval_code: String,
    pub prescription_id: String,
    pub prescription_total: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionApprovalRequest {
    pub user_id: RecordId,
    pub total_cost: Decimal,
    pub prescription_id_hospital: String,
    #[serde(default)]
    pub details: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdUpdateRequest {
    pub prescription_amount: Decimal,
}

/// Ids are optional so a missing one is a 400 with a message, not a
/// deserialization failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequest {
    pub hospital_id: Option<RecordId>,
    pub service_id: Option<RecordId>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceApprovalQuery {
    pub user_id: Option<RecordId>,
    pub hospital_id: Option<RecordId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionQuery {
    pub user_id: Option<RecordId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthorizationQuery {
    pub hospital: Option<RecordId>,
    pub service: Option<RecordId>,
}

// Responses

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceApprovalGranted {
    pub success: bool,
    pub approval_id: RecordId,
    pub approval_code: String,
    pub service_cost: Decimal,
    pub covered_amount: Decimal,
    pub patient_amount: Decimal,
    pub coverage_percentage: u8,
    pub approval_date: DateTime<Utc>,
}

impl From<&ServiceApproval> for ServiceApprovalGranted {
    fn from(approval: &ServiceApproval) -> Self {
        Self {
            success: true,
            approval_id: approval.id,
            approval_code: approval.approval_code.clone(),
            service_cost: approval.service_cost,
            covered_amount: approval.covered_amount,
            patient_amount: approval.patient_amount,
            coverage_percentage: approval.coverage_percentage,
            approval_date: approval.approval_date,
        }
    }
}

/// A business rejection: the request was understood and refused.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub success: bool,
    pub status: &'static str,
    pub rejection_code: &'static str,
    pub rejection_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_code: Option<String>,
}

impl Rejection {
    pub fn new(reason: &RejectionReason) -> Self {
        Self {
            success: false,
            status: "REJECTED",
            rejection_code: reason.code(),
            rejection_reason: reason.to_string(),
            approval_id: None,
            approval_code: None,
        }
    }

    pub fn for_approval(approval: &ServiceApproval) -> Self {
        let mut rejection = match &approval.rejection_reason {
            Some(reason) => Self::new(reason),
            None => Self {
                success: false,
                status: "REJECTED",
                rejection_code: "UNKNOWN",
                rejection_reason: String::new(),
                approval_id: None,
                approval_code: None,
            },
        };
        rejection.approval_id = Some(approval.id);
        rejection.approval_code = Some(approval.approval_code.clone());
        rejection
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionLinked {
    pub success: bool,
    pub approval_id: RecordId,
    pub approval_code: String,
    pub prescription_id: Option<String>,
    pub prescription_total: Option<Decimal>,
    pub status: ServiceApprovalStatus,
}

impl From<&ServiceApproval> for PrescriptionLinked {
    fn from(approval: &ServiceApproval) -> Self {
        Self {
            success: true,
            approval_id: approval.id,
            approval_code: approval.approval_code.clone(),
            prescription_id: approval.prescription_id.clone(),
            prescription_total: approval.prescription_total,
            status: approval.status,
        }
    }
}

/// Full projection of a service approval.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceApprovalView {
    pub success: bool,
    pub approval_id: RecordId,
    pub approval_code: String,
    pub user_id: RecordId,
    pub hospital_id: RecordId,
    pub service_id: String,
    pub service_name: String,
    pub service_description: Option<String>,
    pub service_cost: Decimal,
    pub covered_amount: Decimal,
    pub patient_amount: Decimal,
    pub coverage_percentage: u8,
    pub status: ServiceApprovalStatus,
    pub approval_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prescription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prescription_total: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl From<&ServiceApproval> for ServiceApprovalView {
    fn from(approval: &ServiceApproval) -> Self {
        Self {
            success: true,
            approval_id: approval.id,
            approval_code: approval.approval_code.clone(),
            user_id: approval.user_id,
            hospital_id: approval.hospital_id,
            service_id: approval.service_id.clone(),
            service_name: approval.service_name.clone(),
            service_description: approval.service_description.clone(),
            service_cost: approval.service_cost,
            covered_amount: approval.covered_amount,
            patient_amount: approval.patient_amount,
            coverage_percentage: approval.coverage_percentage,
            status: approval.status,
            approval_date: approval.approval_date,
            completed_date: approval.completed_date,
            prescription_id: approval.prescription_id.clone(),
            prescription_total: approval.prescription_total,
            rejection_code: approval.rejection_reason.as_ref().map(RejectionReason::code),
            rejection_reason: approval.rejection_reason.as_ref().map(ToString::to_string),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceApprovalCompleted {
    pub success: bool,
    pub approval_id: RecordId,
    pub approval_code: String,
    pub status: ServiceApprovalStatus,
    pub completed_date: Option<DateTime<Utc>>,
}

impl From<&ServiceApproval> for ServiceApprovalCompleted {
    fn from(approval: &ServiceApproval) -> Self {
        Self {
            success: true,
            approval_id: approval.id,
            approval_code: approval.approval_code.clone(),
            status: approval.status,
            completed_date: approval.completed_date,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionApprovalView {
    pub id: RecordId,
    /// `Approved` or `Rejected`.
    pub status: &'static str,
    pub authorization_number: String,
    pub user_id: RecordId,
    pub prescription_id_hospital: String,
    pub prescription_cost: Decimal,
    pub prescription_details: Value,
    pub decided_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl From<&PrescriptionApproval> for PrescriptionApprovalView {
    fn from(approval: &PrescriptionApproval) -> Self {
        let status = match approval.status {
            PrescriptionApprovalStatus::Approved => "Approved",
            PrescriptionApprovalStatus::Rejected => "Rejected",
        };
        Self {
            id: approval.id,
            status,
            authorization_number: approval.authorization_number.clone(),
            user_id: approval.user_id,
            prescription_id_hospital: approval.prescription_id_hospital.clone(),
            prescription_cost: approval.prescription_cost,
            prescription_details: approval.prescription_details.clone(),
            decided_at: approval.decided_at,
            rejection_code: approval.rejection_reason.as_ref().map(RejectionReason::code),
            rejection_reason: approval.rejection_reason.as_ref().map(ToString::to_string),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdView {
    pub prescription_amount: Decimal,
    pub configured: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<CurrentThreshold> for ThresholdView {
    fn from(current: CurrentThreshold) -> Self {
        Self {
            prescription_amount: current.prescription_amount,
            configured: current.configured,
            updated_at: current.updated_at,
        }
    }
}

impl From<ConfigurableThreshold> for ThresholdView {
    fn from(saved: ConfigurableThreshold) -> Self {
        Self {
            prescription_amount: saved.prescription_amount,
            configured: true,
            updated_at: Some(saved.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationView {
    pub id: RecordId,
    pub hospital_id: RecordId,
    pub service_id: RecordId,
    pub approved: bool,
    pub approval_date: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl From<&HospitalServiceAuthorization> for AuthorizationView {
    fn from(record: &HospitalServiceAuthorization) -> Self {
        Self {
            id: record.id,
            hospital_id: record.hospital_id,
            service_id: record.insured_service_id,
            approved: record.approved,
            approval_date: record.approval_date,
            revoked_at: record.revoked_at,
            notes: record.notes.clone(),
        }
    }
}
