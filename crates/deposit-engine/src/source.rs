//! The source repository client (§4.6, §5): the one durable shared
//! resource every component reads and writes through. Explicit DI per the
//! redesign note in §9 — `SourceRepository` is passed into every component
//! that needs it rather than reached through a process-wide singleton.

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::Mutex;

use deposit_engine_types::cri::Resource;
use deposit_engine_types::ids::{DepositId, FileId, GrantId, PersonId, PublicationId, SubmissionId};
use deposit_engine_types::submission::{File, Person, PersonRole, Submission};
use deposit_engine_types::{Deposit, RepositoryCopy};

/// Outcome of an optimistic-concurrency write (§4.6 step 5): either the
/// write committed, or another writer's intervening change lost it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Committed,
    Conflict,
}

/// The read/write surface CRI (C6) and the Submission Model Builder (C2)
/// need against the source-of-truth repository. `Send + Sync` so a single
/// client can be shared (read-only-after-construction) across worker
/// threads (§5: "thread-safe clients for the source repository").
pub trait SourceRepository: Send + Sync {
    fn get_deposit(&self, id: &DepositId) -> Result<Deposit>;
    fn get_submission(&self, id: &SubmissionId) -> Result<Submission>;
    fn get_person(&self, id: &PersonId) -> Result<Person>;
    fn get_file(&self, id: &FileId) -> Result<File>;

    /// Existence check only: Publication→Journal→Publisher contributes no
    /// field to `DepositModel` beyond resolvability (§4.2 — the descriptive
    /// fields all come from the opaque metadata blob instead).
    fn resolve_publication(&self, id: &PublicationId) -> Result<()>;

    /// Grants→Users (§4.2): the PI/CoPI persons a grant names, with the
    /// role each should be aggregated under.
    fn grant_personnel(&self, id: &GrantId) -> Result<Vec<(PersonId, PersonRole)>>;

    /// Compare-and-set: write `next` iff the repository's current value for
    /// `next`'s id still equals `previous` (§4.6 step 4-5).
    fn compare_and_set(&self, previous: &Resource, next: &Resource) -> Result<CasOutcome>;

    fn create_repository_copy(&self, copy: &RepositoryCopy) -> Result<()>;

    /// Deposits currently in `submitted` status, for the refresh loop (§4.8).
    fn submitted_deposits(&self) -> Result<Vec<Deposit>>;

    /// Every `Deposit` already provisioned for `submission_id` — one per
    /// target repository named on the Submission — for the ingest loop to
    /// dispatch against (§4.1, §4.8). The Dispatcher never creates a
    /// `Deposit`; it only ever drives an existing one from `none` onward.
    fn deposits_for_submission(&self, id: &SubmissionId) -> Result<Vec<Deposit>>;
}

/// In-memory fake used by tests and by `deposit-engine-cli`'s dry-run
/// paths. Mirrors the registry fake pattern the teacher tests against
/// (`tiny_http::Server` stand-ins for the crates.io registry), but here the
/// resource itself — not an HTTP layer — is the thing under test, so a
/// plain `Mutex<HashMap>` is enough.
#[derive(Default)]
pub struct InMemorySourceRepository {
    deposits: Mutex<HashMap<String, Deposit>>,
    submissions: Mutex<HashMap<String, Submission>>,
    persons: Mutex<HashMap<String, Person>>,
    files: Mutex<HashMap<String, File>>,
    publications: Mutex<HashMap<String, ()>>,
    grants: Mutex<HashMap<String, Vec<(PersonId, PersonRole)>>>,
    copies: Mutex<Vec<RepositoryCopy>>,
}

impl InMemorySourceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_deposit(&self, deposit: Deposit) {
        self.deposits
            .lock()
            .unwrap()
            .insert(deposit.id.as_str().to_string(), deposit);
    }

    pub fn seed_submission(&self, submission: Submission) {
        self.submissions
            .lock()
            .unwrap()
            .insert(submission.id.as_str().to_string(), submission);
    }

    pub fn seed_person(&self, person: Person) {
        self.persons
            .lock()
            .unwrap()
            .insert(person.id.as_str().to_string(), person);
    }

    pub fn seed_file(&self, file: File) {
        self.files
            .lock()
            .unwrap()
            .insert(file.id.as_str().to_string(), file);
    }

    pub fn seed_publication(&self, id: &PublicationId) {
        self.publications
            .lock()
            .unwrap()
            .insert(id.as_str().to_string(), ());
    }

    pub fn seed_grant(&self, id: &GrantId, personnel: Vec<(PersonId, PersonRole)>) {
        self.grants
            .lock()
            .unwrap()
            .insert(id.as_str().to_string(), personnel);
    }
}

impl SourceRepository for InMemorySourceRepository {
    fn get_deposit(&self, id: &DepositId) -> Result<Deposit> {
        self.deposits
            .lock()
            .unwrap()
            .get(id.as_str())
            .cloned()
            .with_context(|| format!("deposit not found: {id}"))
    }

    fn get_submission(&self, id: &SubmissionId) -> Result<Submission> {
        self.submissions
            .lock()
            .unwrap()
            .get(id.as_str())
            .cloned()
            .with_context(|| format!("submission not found: {id}"))
    }

    fn get_person(&self, id: &PersonId) -> Result<Person> {
        self.persons
            .lock()
            .unwrap()
            .get(id.as_str())
            .cloned()
            .with_context(|| format!("person not found: {id}"))
    }

    fn get_file(&self, id: &FileId) -> Result<File> {
        self.files
            .lock()
            .unwrap()
            .get(id.as_str())
            .cloned()
            .with_context(|| format!("file not found: {id}"))
    }

    fn resolve_publication(&self, id: &PublicationId) -> Result<()> {
        self.publications
            .lock()
            .unwrap()
            .get(id.as_str())
            .copied()
            .with_context(|| format!("publication not found: {id}"))
    }

    fn grant_personnel(&self, id: &GrantId) -> Result<Vec<(PersonId, PersonRole)>> {
        self.grants
            .lock()
            .unwrap()
            .get(id.as_str())
            .cloned()
            .with_context(|| format!("grant not found: {id}"))
    }

    fn compare_and_set(&self, previous: &Resource, next: &Resource) -> Result<CasOutcome> {
        match (previous, next) {
            (Resource::Deposit(prev), Resource::Deposit(nxt)) => {
                let mut guard = self.deposits.lock().unwrap();
                let key = nxt.id.as_str().to_string();
                let current = guard.get(&key);
                if current != Some(prev) {
                    return Ok(CasOutcome::Conflict);
                }
                guard.insert(key, nxt.clone());
                Ok(CasOutcome::Committed)
            }
            (Resource::Submission(prev), Resource::Submission(nxt)) => {
                let mut guard = self.submissions.lock().unwrap();
                let key = nxt.id.as_str().to_string();
                let current = guard.get(&key);
                if current != Some(prev) {
                    return Ok(CasOutcome::Conflict);
                }
                guard.insert(key, nxt.clone());
                Ok(CasOutcome::Committed)
            }
            _ => bail!("compare_and_set: previous and next must be the same resource variant"),
        }
    }

    fn create_repository_copy(&self, copy: &RepositoryCopy) -> Result<()> {
        self.copies.lock().unwrap().push(copy.clone());
        Ok(())
    }

    fn submitted_deposits(&self) -> Result<Vec<Deposit>> {
        Ok(self
            .deposits
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.status == deposit_engine_types::DepositStatus::Submitted)
            .cloned()
            .collect())
    }

    fn deposits_for_submission(&self, id: &SubmissionId) -> Result<Vec<Deposit>> {
        Ok(self
            .deposits
            .lock()
            .unwrap()
            .values()
            .filter(|d| &d.submission == id)
            .cloned()
            .collect())
    }
}

/// HTTP-backed client against the real source repository's REST API.
/// Mirrors `RegistryClient` in structure (single blocking [`Client`], one
/// method per endpoint, `StatusCode` matched explicitly) but speaks the
/// source repository's resource endpoints rather than the crates.io API.
#[derive(Debug, Clone)]
pub struct HttpSourceRepository {
    base_url: String,
    http: Client,
}

impl HttpSourceRepository {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(format!("deposit-engine/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client for source repository")?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

impl SourceRepository for HttpSourceRepository {
    fn get_deposit(&self, id: &DepositId) -> Result<Deposit> {
        let resp = self
            .http
            .get(self.url(&format!("deposits/{id}")))
            .send()
            .with_context(|| format!("fetching deposit {id}"))?;
        match resp.status() {
            StatusCode::OK => resp.json().context("parsing deposit JSON"),
            s => bail!("unexpected status fetching deposit {id}: {s}"),
        }
    }

    fn get_submission(&self, id: &SubmissionId) -> Result<Submission> {
        let resp = self
            .http
            .get(self.url(&format!("submissions/{id}")))
            .send()
            .with_context(|| format!("fetching submission {id}"))?;
        match resp.status() {
            StatusCode::OK => resp.json().context("parsing submission JSON"),
            s => bail!("unexpected status fetching submission {id}: {s}"),
        }
    }

    fn get_person(&self, id: &PersonId) -> Result<Person> {
        let resp = self
            .http
            .get(self.url(&format!("people/{id}")))
            .send()
            .with_context(|| format!("fetching person {id}"))?;
        match resp.status() {
            StatusCode::OK => resp.json().context("parsing person JSON"),
            s => bail!("unexpected status fetching person {id}: {s}"),
        }
    }

    fn get_file(&self, id: &FileId) -> Result<File> {
        let resp = self
            .http
            .get(self.url(&format!("files/{id}")))
            .send()
            .with_context(|| format!("fetching file {id}"))?;
        match resp.status() {
            StatusCode::OK => resp.json().context("parsing file JSON"),
            s => bail!("unexpected status fetching file {id}: {s}"),
        }
    }

    fn resolve_publication(&self, id: &PublicationId) -> Result<()> {
        let resp = self
            .http
            .head(self.url(&format!("publications/{id}")))
            .send()
            .with_context(|| format!("resolving publication {id}"))?;
        match resp.status() {
            StatusCode::OK => Ok(()),
            s => bail!("publication {id} did not resolve: {s}"),
        }
    }

    fn grant_personnel(&self, id: &GrantId) -> Result<Vec<(PersonId, PersonRole)>> {
        let resp = self
            .http
            .get(self.url(&format!("grants/{id}/personnel")))
            .send()
            .with_context(|| format!("fetching grant personnel {id}"))?;
        match resp.status() {
            StatusCode::OK => resp.json().context("parsing grant personnel JSON"),
            s => bail!("unexpected status fetching grant personnel {id}: {s}"),
        }
    }

    fn compare_and_set(&self, previous: &Resource, next: &Resource) -> Result<CasOutcome> {
        let resp = self
            .http
            .put(self.url("resources"))
            .json(&serde_json::json!({ "previous": previous, "next": next }))
            .send()
            .context("compare-and-set request failed")?;
        match resp.status() {
            StatusCode::OK => Ok(CasOutcome::Committed),
            StatusCode::CONFLICT => Ok(CasOutcome::Conflict),
            s => bail!("unexpected status from compare-and-set: {s}"),
        }
    }

    fn create_repository_copy(&self, copy: &RepositoryCopy) -> Result<()> {
        let resp = self
            .http
            .post(self.url("repository-copies"))
            .json(copy)
            .send()
            .context("creating repository copy failed")?;
        match resp.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(()),
            s => bail!("unexpected status creating repository copy: {s}"),
        }
    }

    fn submitted_deposits(&self) -> Result<Vec<Deposit>> {
        let resp = self
            .http
            .get(self.url("deposits?status=submitted"))
            .send()
            .context("listing submitted deposits failed")?;
        match resp.status() {
            StatusCode::OK => resp.json().context("parsing submitted-deposits JSON"),
            s => bail!("unexpected status listing submitted deposits: {s}"),
        }
    }

    fn deposits_for_submission(&self, id: &SubmissionId) -> Result<Vec<Deposit>> {
        let resp = self
            .http
            .get(self.url(&format!("submissions/{id}/deposits")))
            .send()
            .with_context(|| format!("listing deposits for submission {id}"))?;
        match resp.status() {
            StatusCode::OK => resp.json().context("parsing submission-deposits JSON"),
            s => bail!("unexpected status listing deposits for submission {id}: {s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deposit_engine_types::ids::RepositoryId;

    #[test]
    fn compare_and_set_detects_conflict() {
        let repo = InMemorySourceRepository::new();
        let deposit = Deposit::new(
            DepositId::from("d1"),
            SubmissionId::from("s1"),
            RepositoryId::from("r1"),
        );
        repo.seed_deposit(deposit.clone());

        let mut stale = deposit.clone();
        stale.status = deposit_engine_types::DepositStatus::Failed;

        let mut concurrent_write = deposit.clone();
        concurrent_write.status = deposit_engine_types::DepositStatus::Submitted;
        let outcome = repo
            .compare_and_set(&Resource::Deposit(deposit.clone()), &Resource::Deposit(concurrent_write))
            .unwrap();
        assert_eq!(outcome, CasOutcome::Committed);

        // A second writer still holding the pre-commit value conflicts.
        let outcome = repo
            .compare_and_set(&Resource::Deposit(deposit), &Resource::Deposit(stale))
            .unwrap();
        assert_eq!(outcome, CasOutcome::Conflict);
    }
}
