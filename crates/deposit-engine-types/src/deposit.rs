//! The `Deposit` and `RepositoryCopy` entities (§3) and their status enums.
//!
//! `Deposit` is the unit C7 operates on: one (submission, target-repository)
//! pair. Every transition on `status` must be mediated by CRI (§4.6) — this
//! module only describes the shape, never performs the write.

use serde::{Deserialize, Serialize};

use crate::ids::{DepositId, RepositoryCopyId, RepositoryId, SubmissionId};

/// Deposit status. Invariant (i): observed values form a prefix of
/// `None -> Submitted -> {Accepted | Rejected | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    None,
    Submitted,
    Accepted,
    Rejected,
    Failed,
}

impl DepositStatus {
    /// True once no further transition is legal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected | Self::Failed)
    }

    /// Whether `self -> next` is a legal edge in the partial order from §3.
    pub fn can_transition_to(self, next: DepositStatus) -> bool {
        use DepositStatus::*;
        matches!(
            (self, next),
            (None, Submitted)
                | (None, Failed)
                | (Submitted, Accepted)
                | (Submitted, Rejected)
                | (Submitted, Failed)
                | (Failed, Submitted)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub id: DepositId,
    pub submission: SubmissionId,
    pub repository: RepositoryId,
    pub status: DepositStatus,
    /// URL the refresh loop polls (C5). Absent until C7 step 7 sets it.
    #[serde(default)]
    pub status_probe_uri: Option<String>,
    #[serde(default)]
    pub repository_copy: Option<RepositoryCopyId>,
    /// Set by CRI on failure (C7 step 8); cleared on a `none -> submitted` retry.
    #[serde(default)]
    pub error_kind: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl Deposit {
    pub fn new(id: DepositId, submission: SubmissionId, repository: RepositoryId) -> Self {
        Self {
            id,
            submission,
            repository,
            status: DepositStatus::None,
            status_probe_uri: None,
            repository_copy: None,
            error_kind: None,
            error_message: None,
        }
    }

    /// Invariant (iii): no probe URI and no copy implies the deposit cannot be `submitted`.
    pub fn satisfies_submitted_invariant(&self) -> bool {
        if self.status != DepositStatus::Submitted {
            return true;
        }
        self.status_probe_uri.is_some() || self.repository_copy.is_some()
    }
}

/// Copy-status of the landing record in the target repository (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyStatus {
    InProgress,
    Complete,
    Stalled,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryCopy {
    pub id: RepositoryCopyId,
    pub submission: SubmissionId,
    pub repository: RepositoryId,
    pub access_url: Option<String>,
    pub external_identifier: Option<String>,
    pub copy_status: CopyStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(DepositStatus::Accepted.is_terminal());
        assert!(DepositStatus::Rejected.is_terminal());
        assert!(DepositStatus::Failed.is_terminal());
        assert!(!DepositStatus::None.is_terminal());
        assert!(!DepositStatus::Submitted.is_terminal());
    }

    #[test]
    fn legal_transitions_only() {
        assert!(DepositStatus::None.can_transition_to(DepositStatus::Submitted));
        assert!(DepositStatus::Submitted.can_transition_to(DepositStatus::Accepted));
        assert!(DepositStatus::Failed.can_transition_to(DepositStatus::Submitted));
        assert!(!DepositStatus::Accepted.can_transition_to(DepositStatus::Submitted));
        assert!(!DepositStatus::None.can_transition_to(DepositStatus::Accepted));
    }

    #[test]
    fn submitted_requires_probe_or_copy() {
        let mut d = Deposit::new(
            DepositId::from("d1"),
            SubmissionId::from("s1"),
            RepositoryId::from("r1"),
        );
        d.status = DepositStatus::Submitted;
        assert!(!d.satisfies_submitted_invariant());
        d.status_probe_uri = Some("https://example.org/statement".into());
        assert!(d.satisfies_submitted_invariant());
    }
}
