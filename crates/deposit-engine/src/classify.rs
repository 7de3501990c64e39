//! Error Classifier (C9, §4.9, §7): the single place classification policy
//! lives. Every exception reaching a task boundary passes through
//! [`classify`] exactly once (§7 "Propagation").

use deposit_engine_types::error::{ClassifiedError, ErrorKind};

use crate::transport::TransportError;

/// The failure shapes a Deposit Task (C7) can hand to the classifier.
/// Keeping this as a closed enum — rather than boxing `anyhow::Error`
/// everywhere — is what lets [`classify`] be an exhaustive match instead of
/// string-sniffing an opaque error (§9's stance against ad hoc dispatch
/// extends naturally to the error path).
pub enum TaskFailure {
    Configuration(String),
    ModelInvalid(String),
    AssemblyFailure(String),
    Transport(TransportError),
    StatusUnknown(String),
    Internal(String),
}

/// Map a task failure to `{kind, retryable, target-resource, user-message}` (§4.9).
pub fn classify(failure: TaskFailure, target_resource: Option<String>) -> ClassifiedError {
    let (kind, message) = match failure {
        TaskFailure::Configuration(msg) => (ErrorKind::Configuration, msg),
        TaskFailure::ModelInvalid(msg) => (ErrorKind::ModelInvalid, msg),
        TaskFailure::AssemblyFailure(msg) => (ErrorKind::AssemblyFailure, msg),
        TaskFailure::Transport(err) => transport_kind_and_message(err),
        TaskFailure::StatusUnknown(msg) => (ErrorKind::StatusUnknown, msg),
        TaskFailure::Internal(msg) => (ErrorKind::Internal, msg),
    };

    let mut classified = ClassifiedError::new(kind, message);
    if let Some(resource) = target_resource {
        classified = classified.with_target_resource(resource);
    }
    classified
}

fn transport_kind_and_message(err: TransportError) -> (ErrorKind, String) {
    match err {
        TransportError::Network(msg) => (ErrorKind::TransportNetwork, msg),
        TransportError::Rejected(msg) => (ErrorKind::TransportRejected, msg),
        TransportError::ServerError(msg) => (ErrorKind::TransportServerError, msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_retryable() {
        let c = classify(
            TaskFailure::Transport(TransportError::Network("connection reset".into())),
            None,
        );
        assert_eq!(c.kind, ErrorKind::TransportNetwork);
        assert!(c.retryable);
    }

    #[test]
    fn rejected_errors_are_terminal() {
        let c = classify(
            TaskFailure::Transport(TransportError::Rejected("checksum mismatch".into())),
            Some("deposit://d1".into()),
        );
        assert_eq!(c.kind, ErrorKind::TransportRejected);
        assert!(!c.retryable);
        assert_eq!(c.target_resource.as_deref(), Some("deposit://d1"));
    }

    #[test]
    fn internal_errors_flag_operator_attention() {
        let c = classify(TaskFailure::Internal("unreachable state".into()), None);
        assert!(c.kind.flags_submission_for_operator());
    }
}
