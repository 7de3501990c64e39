//! `Submission` (§3), the root entity an ingest event names, and
//! `DepositModel`, the flattened in-memory view C2 builds from it.

use serde::{Deserialize, Serialize};

use crate::ids::{FileId, GrantId, PersonId, PublicationId, RepositoryId, SubmissionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionSource {
    User,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub user_submitted: bool,
    pub source: SubmissionSource,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
    /// Required (§4.2: "Fails with InvalidModel when the Submission is
    /// missing its submitter reference").
    pub submitter: PersonId,
    /// Authors aggregated under the `author` role (§4.2). The full
    /// Publication→Journal→Publisher graph contributes no fields to
    /// `DepositModel` beyond existence — those come from the metadata blob
    /// — so only the identifier is kept here, resolved for existence only.
    pub authors: Vec<PersonId>,
    pub publication: PublicationId,
    pub grants: Vec<GrantId>,
    pub target_repositories: Vec<RepositoryId>,
    pub files: Vec<FileId>,
    /// Opaque submission-meta blob; C2 extracts fields from this without
    /// ever deserializing it into a concrete schema — downstream transports
    /// get it back verbatim (§4.2, §4.4.2).
    pub metadata: String,
}

/// Role under which a person is aggregated onto a [`DepositModel`]. The same
/// human may appear under more than one role (§4.2) — roles are not
/// deduplicated by person identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonRole {
    Submitter,
    Pi,
    Copi,
    Author,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub role: PersonRole,
    pub name: String,
    pub email: Option<String>,
}

/// Classification of a custodial [`File`] within a package (§4.2, §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    Manuscript,
    Supplement,
    Figure,
    Table,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub id: FileId,
    pub submission: SubmissionId,
    pub name: String,
    pub role: FileRole,
    pub description: Option<String>,
    /// Opaque locator; C2 never dereferences this (§4.2).
    pub content_locator: String,
}

/// Flattened view built by C2 (§3, §4.2), owned exclusively by one Deposit
/// Task and dropped at task end. Carries everything C3 needs to assemble a
/// package without re-walking the submission graph.
#[derive(Debug, Clone, PartialEq)]
pub struct DepositModel {
    pub submission_id: SubmissionId,
    pub title: String,
    pub abstract_text: Option<String>,
    pub journal_title: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub issns: Vec<IssnWithType>,
    /// Trimmed, validated DOI (§4.2: "Fails with InvalidModel ... the DOI is malformed").
    pub doi: Option<String>,
    pub nlm_ta_id: Option<String>,
    pub embargo_lift_date: Option<chrono::NaiveDate>,
    pub persons: Vec<Person>,
    pub files: Vec<File>,
    /// Preserved verbatim for downstream transports (§4.2).
    pub raw_submission_meta: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssnWithType {
    pub issn: String,
    pub pub_type: String,
}

/// Error produced when C2 cannot build a [`DepositModel`] (§4.2). Terminal
/// for the task: the caller maps this to `ErrorKind::ModelInvalid`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidModel {
    #[error("submission {0} has no submitter reference")]
    MissingSubmitter(SubmissionId),
    #[error("referenced entity could not be resolved: {0}")]
    UnresolvedReference(String),
    #[error("malformed DOI: {0:?}")]
    MalformedDoi(String),
    #[error("unparseable embargo-lift-date: {0:?}")]
    UnparseableEmbargoDate(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn person_same_human_multiple_roles_preserved() {
        let persons = vec![
            Person {
                id: PersonId::from("p1"),
                role: PersonRole::Submitter,
                name: "A. Researcher".into(),
                email: Some("a@example.org".into()),
            },
            Person {
                id: PersonId::from("p1"),
                role: PersonRole::Author,
                name: "A. Researcher".into(),
                email: Some("a@example.org".into()),
            },
        ];
        assert_eq!(persons.len(), 2);
        assert_ne!(persons[0].role, persons[1].role);
    }
}
