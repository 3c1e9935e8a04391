pub mod clock;
pub mod codes;
pub mod config;
pub mod coverage;
pub mod eligibility;
pub mod engine;
pub mod error;
pub mod hospital_services;
pub mod models;
pub mod prescription_approval;
pub mod service_approval;
pub mod storage;
pub mod threshold;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use clock::{Clock, FixedClock, SystemClock};
pub use codes::{AuthorizationCodeGenerator, CodeFormat};
pub use config::EngineConfig;
pub use coverage::{CoverageCalculator, CoverageSplit};
pub use eligibility::{Eligibility, PolicyEligibilityValidator};
pub use engine::{ClaimsEngine, EngineStores};
pub use error::{EngineError, Result, StorageError};
pub use hospital_services::HospitalServiceAuthorizationRegistry;
pub use models::{
    ConfigurableThreshold, Hospital, HospitalServiceAuthorization, InsuredService, Policy,
    PrescriptionApproval, PrescriptionApprovalStatus, RecordId, RejectionReason, ServiceApproval,
    ServiceApprovalStatus, User,
};
pub use prescription_approval::{PrescriptionApprovalWorkflow, PrescriptionClaim};
pub use service_approval::{
    AttachOutcome, PrescriptionAttachment, ServiceApprovalWorkflow, ServiceClaim,
    ServiceRequestOutcome,
};
pub use storage::{ApprovalFilter, InMemoryReferenceStorage, ReferenceData};
pub use threshold::{CurrentThreshold, ThresholdCheck, ThresholdPolicy};
