use std::sync::Arc;

use crate::clock::Clock;
use crate::error::Result;
use crate::models::{Policy, RejectionReason, User};
use crate::storage::ReferenceStorage;

/// Outcome of an eligibility check.
#[derive(Debug, Clone, PartialEq)]
pub enum Eligibility {
    Eligible(Policy),
    Ineligible(RejectionReason),
}

/// Decides whether a user's policy and standing permit a new claim.
///
/// Checks run in order and stop at the first failure: policy present, policy
/// not expired, coverage active.
pub struct PolicyEligibilityValidator {
    clock: Arc<dyn Clock>,
}

impl PolicyEligibilityValidator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn check(&self, user: &User, policy: Option<&Policy>) -> Eligibility {
        let Some(policy) = policy else {
            return Eligibility::Ineligible(RejectionReason::NoPolicyAssigned);
        };
        if policy.expiration_date < self.clock.now() {
            return Eligibility::Ineligible(RejectionReason::PolicyExpired);
        }
        if !user.coverage_active {
            return Eligibility::Ineligible(RejectionReason::CoverageInactive);
        }
        Eligibility::Eligible(policy.clone())
    }

    /// Resolve the user's policy through `reference` and check it.
    ///
    /// A dangling policy reference counts as no policy.
    pub async fn evaluate(
        &self,
        reference: &dyn ReferenceStorage,
        user: &User,
    ) -> Result<Eligibility> {
        let policy = match user.policy_id {
            Some(policy_id) => reference.get_policy(policy_id).await?,
            None => None,
        };
        Ok(self.check(user, policy.as_ref()))
    }
}
