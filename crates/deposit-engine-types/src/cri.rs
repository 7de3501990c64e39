//! The tagged-union `Resource` used throughout the Critical Repository
//! Interaction (C6, §4.6) and the error path, per the redesign note in §9:
//! "Dynamic dispatch by subtype across Deposit/Submission handlers → a
//! tagged union `Resource = Deposit | Submission`, matched explicitly in
//! the error path and in CRI. No virtual tables."

use serde::{Deserialize, Serialize};

use crate::deposit::Deposit;
use crate::submission::Submission;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resource-type", rename_all = "snake_case")]
pub enum Resource {
    Deposit(Deposit),
    Submission(Submission),
}

impl Resource {
    pub fn as_deposit(&self) -> Option<&Deposit> {
        match self {
            Resource::Deposit(d) => Some(d),
            Resource::Submission(_) => None,
        }
    }

    pub fn as_submission(&self) -> Option<&Submission> {
        match self {
            Resource::Deposit(_) => None,
            Resource::Submission(s) => Some(s),
        }
    }
}

/// Outcome of `performCritical` (§4.6): either the read-modify-write
/// committed (carrying the resource as last written), or one of the two
/// named failure modes that make the retry-vs-give-up decision explicit
/// rather than folding both into a single "failed" case.
#[derive(Debug, Clone, PartialEq)]
pub enum CriOutcome {
    /// The precondition rejected the resource as read; retrying with a
    /// fresh read may still succeed (§4.6).
    PreconditionFailed,
    /// The compare-and-set write lost the race after postcondition
    /// checks passed; the whole read-modify-write cycle is retried (§4.6).
    PostconditionFailed,
    Success(Resource),
}

impl CriOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CriOutcome::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deposit::{Deposit, DepositStatus};
    use crate::ids::{DepositId, RepositoryId, SubmissionId};

    #[test]
    fn resource_discriminates_by_variant() {
        let deposit = Deposit::new(
            DepositId::from("d1"),
            SubmissionId::from("s1"),
            RepositoryId::from("r1"),
        );
        let resource = Resource::Deposit(deposit);
        assert!(resource.as_deposit().is_some());
        assert!(resource.as_submission().is_none());
    }

    #[test]
    fn success_outcome_carries_committed_resource() {
        let deposit = Deposit::new(
            DepositId::from("d1"),
            SubmissionId::from("s1"),
            RepositoryId::from("r1"),
        );
        let outcome = CriOutcome::Success(Resource::Deposit(deposit));
        assert!(outcome.is_success());
        match outcome {
            CriOutcome::Success(Resource::Deposit(d)) => {
                assert_eq!(d.status, DepositStatus::None)
            }
            _ => panic!("expected deposit"),
        }
    }
}
