//! Submission Model Builder (C2, §4.2): resolves a submission id into a
//! flattened [`DepositModel`], ready for the Streaming Assembler (C3).

use anyhow::Result;
use chrono::NaiveDate;
use deposit_engine_types::ids::SubmissionId;
use deposit_engine_types::submission::{DepositModel, File, InvalidModel, IssnWithType, Person, PersonRole};
use serde_json::Value;

use crate::source::SourceRepository;

/// Build a [`DepositModel`] for `submission_id` (§4.2).
///
/// Entity resolution (submitter, grants→personnel, authors, files,
/// publication) happens up front so any missing reference surfaces as
/// [`InvalidModel`] before any byte of the package is produced. The spec
/// allows these resolutions "possibly in parallel"; this implementation
/// resolves sequentially since the reads are cheap relative to the
/// transport step that follows, and a sequential pass keeps error
/// attribution unambiguous (which lookup failed is part of the message).
pub fn build_model(
    repo: &dyn SourceRepository,
    submission_id: &SubmissionId,
) -> Result<DepositModel, InvalidModel> {
    let submission = repo
        .get_submission(submission_id)
        .map_err(|e| InvalidModel::UnresolvedReference(format!("submission: {e}")))?;

    let submitter = repo.get_person(&submission.submitter).map_err(|_| {
        InvalidModel::MissingSubmitter(submission_id.clone())
    })?;

    repo.resolve_publication(&submission.publication)
        .map_err(|e| InvalidModel::UnresolvedReference(format!("publication: {e}")))?;

    let mut persons = vec![submitter];
    for grant in &submission.grants {
        let personnel = repo
            .grant_personnel(grant)
            .map_err(|e| InvalidModel::UnresolvedReference(format!("grant {grant}: {e}")))?;
        for (person_id, role) in personnel {
            let person = repo
                .get_person(&person_id)
                .map_err(|e| InvalidModel::UnresolvedReference(format!("person {person_id}: {e}")))?;
            persons.push(Person { role, ..person });
        }
    }
    for author_id in &submission.authors {
        let person = repo
            .get_person(author_id)
            .map_err(|e| InvalidModel::UnresolvedReference(format!("author {author_id}: {e}")))?;
        persons.push(Person {
            role: PersonRole::Author,
            ..person
        });
    }

    let mut files: Vec<File> = Vec::with_capacity(submission.files.len());
    for file_id in &submission.files {
        let file = repo
            .get_file(file_id)
            .map_err(|e| InvalidModel::UnresolvedReference(format!("file {file_id}: {e}")))?;
        files.push(file);
    }

    let meta: Value = serde_json::from_str(&submission.metadata)
        .map_err(|e| InvalidModel::UnresolvedReference(format!("submission-meta is not valid JSON: {e}")))?;

    let title = meta
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let abstract_text = meta.get("abstract").and_then(Value::as_str).map(str::to_string);
    let journal_title = meta.get("journal-title").and_then(Value::as_str).map(str::to_string);
    let volume = meta.get("volume").and_then(Value::as_str).map(str::to_string);
    let issue = meta.get("issue").and_then(Value::as_str).map(str::to_string);
    let nlm_ta_id = meta.get("nlm-ta-id").and_then(Value::as_str).map(str::to_string);

    let issns = meta
        .get("issns")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|entry| {
                    let issn = entry.get("issn")?.as_str()?.to_string();
                    let pub_type = entry.get("pub-type")?.as_str()?.to_string();
                    Some(IssnWithType { issn, pub_type })
                })
                .collect()
        })
        .unwrap_or_default();

    let doi = match meta.get("doi").and_then(Value::as_str) {
        Some(raw) => Some(parse_doi(raw)?),
        None => None,
    };

    let embargo_lift_date = match meta.get("embargo-lift-date").and_then(Value::as_str) {
        Some(raw) => Some(parse_embargo_date(raw)?),
        None => None,
    };

    Ok(DepositModel {
        submission_id: submission_id.clone(),
        title,
        abstract_text,
        journal_title,
        volume,
        issue,
        issns,
        doi,
        nlm_ta_id,
        embargo_lift_date,
        persons,
        files,
        raw_submission_meta: submission.metadata,
    })
}

/// DOIs are trimmed and must start with the `10.` registrant prefix (§4.2).
fn parse_doi(raw: &str) -> Result<String, InvalidModel> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.starts_with("10.") || !trimmed.contains('/') {
        return Err(InvalidModel::MalformedDoi(raw.to_string()));
    }
    Ok(trimmed.to_string())
}

fn parse_embargo_date(raw: &str) -> Result<NaiveDate, InvalidModel> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| InvalidModel::UnparseableEmbargoDate(raw.to_string()))
}
