//! Event Filter (C1, §4.1): the sole admission gate between the inbound
//! event stream and everything downstream. A dropped event has no
//! observable side effects; only `accept` schedules work.

use deposit_engine_types::event::{EventType, IngestEvent};
use deposit_engine_types::ids::SubmissionId;

/// URI identifying the Submission resource type in `resource-type` (§4.1).
pub const SUBMISSION_TYPE_URI: &str = "urn:deposit-engine:resource-type:submission";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    Accepted,
    Dropped,
}

/// What the filter needs to know about the referenced Submission beyond the
/// event envelope itself (§4.1: "the Submission referenced is user-submitted,
/// source=user").
#[derive(Debug, Clone, Copy)]
pub struct SubmissionFacts {
    pub user_submitted: bool,
    pub source_is_user: bool,
}

/// Evaluate the admission predicate (§4.1). `self_agent` is the configured
/// agent name whose own events must never be re-ingested (avoids the
/// ingest loop reacting to its own writes).
pub fn filter(
    event: &IngestEvent,
    self_agent: &str,
    submission: Option<SubmissionFacts>,
) -> FilterOutcome {
    let event_type_ok = matches!(event.event_type, EventType::Created | EventType::Modified);
    let resource_type_ok = event.resource_types().any(|t| t == SUBMISSION_TYPE_URI);
    let agent_ok = event.object.agent.name != self_agent;

    let submission_ok = match submission {
        Some(facts) => facts.user_submitted && facts.source_is_user,
        None => false,
    };

    if event_type_ok && resource_type_ok && agent_ok && submission_ok {
        FilterOutcome::Accepted
    } else {
        FilterOutcome::Dropped
    }
}

/// Extract the submission id the event payload names, per §6's inbound
/// event shape (`payload` carries the event body). A malformed body is
/// treated as a reject, never propagated (§4.1).
pub fn submission_id_from_payload(event: &IngestEvent) -> Option<SubmissionId> {
    event
        .payload
        .get("submission-id")
        .and_then(|v| v.as_str())
        .map(SubmissionId::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deposit_engine_types::event::{EventAgent, EventObject};

    fn event(event_type: EventType, resource_type: &str, agent: &str, payload: serde_json::Value) -> IngestEvent {
        IngestEvent {
            id: "evt-1".into(),
            timestamp: chrono::Utc::now(),
            event_type,
            resource_type: resource_type.into(),
            object: EventObject {
                agent: EventAgent { name: agent.into() },
            },
            payload,
        }
    }

    const USER: SubmissionFacts = SubmissionFacts {
        user_submitted: true,
        source_is_user: true,
    };

    #[test]
    fn accepts_created_user_submission() {
        let e = event(EventType::Created, SUBMISSION_TYPE_URI, "alice", serde_json::json!({}));
        assert_eq!(filter(&e, "deposit-engine", Some(USER)), FilterOutcome::Accepted);
    }

    #[test]
    fn drops_self_originated_events() {
        let e = event(EventType::Modified, SUBMISSION_TYPE_URI, "deposit-engine", serde_json::json!({}));
        assert_eq!(filter(&e, "deposit-engine", Some(USER)), FilterOutcome::Dropped);
    }

    #[test]
    fn drops_wrong_resource_type() {
        let e = event(EventType::Created, "urn:deposit-engine:resource-type:file", "alice", serde_json::json!({}));
        assert_eq!(filter(&e, "deposit-engine", Some(USER)), FilterOutcome::Dropped);
    }

    #[test]
    fn drops_non_user_source() {
        let e = event(EventType::Created, SUBMISSION_TYPE_URI, "alice", serde_json::json!({}));
        let facts = SubmissionFacts {
            user_submitted: true,
            source_is_user: false,
        };
        assert_eq!(filter(&e, "deposit-engine", Some(facts)), FilterOutcome::Dropped);
    }

    #[test]
    fn drops_unclassified_event_type() {
        let e = event(EventType::Other, SUBMISSION_TYPE_URI, "alice", serde_json::json!({}));
        assert_eq!(filter(&e, "deposit-engine", Some(USER)), FilterOutcome::Dropped);
    }

    #[test]
    fn extracts_submission_id_from_payload() {
        let e = event(
            EventType::Created,
            SUBMISSION_TYPE_URI,
            "alice",
            serde_json::json!({"submission-id": "s-42"}),
        );
        assert_eq!(
            submission_id_from_payload(&e),
            Some(SubmissionId::from("s-42"))
        );
    }

    #[test]
    fn malformed_payload_yields_none_not_panic() {
        let e = event(EventType::Created, SUBMISSION_TYPE_URI, "alice", serde_json::json!([1, 2, 3]));
        assert_eq!(submission_id_from_payload(&e), None);
    }
}
