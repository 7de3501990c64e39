//! The vocabulary the Error Classifier (C9, §4.9) produces. This module
//! only names the taxonomy; the classification logic itself lives in
//! `deposit_engine::classify` since it needs to inspect live error values
//! from every other component.

use serde::{Deserialize, Serialize};

/// Kinds, not class names (§7): every exception reaching a task boundary is
/// mapped to exactly one of these by C9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Configuration,
    ModelInvalid,
    AssemblyFailure,
    TransportNetwork,
    TransportRejected,
    TransportServerError,
    StatusUnknown,
    Internal,
}

impl ErrorKind {
    /// Policy table from §4.9 / §7: which kinds the Refresh loop should
    /// re-schedule versus treat as a terminal outcome for the deposit.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::TransportNetwork | Self::TransportServerError)
    }

    /// Whether this kind terminates the deposit outright (as opposed to
    /// leaving it in its prior state for a future refresh pass).
    pub fn is_terminal_for_deposit(self) -> bool {
        matches!(
            self,
            Self::ModelInvalid | Self::TransportRejected | Self::Configuration | Self::Internal
        )
    }

    /// `internal` additionally flags the submission for operator attention (§4.9).
    pub fn flags_submission_for_operator(self) -> bool {
        matches!(self, Self::Internal)
    }
}

/// Output of C9 (§4.9): `{kind, retryable, target-resource, user-message}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub retryable: bool,
    pub target_resource: Option<String>,
    pub user_message: String,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, user_message: impl Into<String>) -> Self {
        Self {
            retryable: kind.is_retryable(),
            kind,
            target_resource: None,
            user_message: user_message.into(),
        }
    }

    pub fn with_target_resource(mut self, resource: impl Into<String>) -> Self {
        self.target_resource = Some(resource.into());
        self
    }
}
