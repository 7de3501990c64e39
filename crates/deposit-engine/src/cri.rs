//! Critical Region Interaction (C6, §4.6): the only code path allowed to
//! mutate a `Deposit` or `Submission`'s state, mediated entirely through
//! [`SourceRepository::compare_and_set`]. Every write contends with the
//! refresh loop and every other in-flight worker, so a losing
//! compare-and-set is an expected outcome, not a bug — this module's whole
//! job is retrying it within a bounded budget and reporting which kind of
//! "no" it ultimately got.

use anyhow::{bail, Result};

use deposit_engine_retry::{calculate_delay, RetryPolicy};
use deposit_engine_types::cri::{CriOutcome, Resource};
use deposit_engine_types::ids::{DepositId, SubmissionId};

use crate::source::{CasOutcome, SourceRepository};

/// Which entity a CRI call targets (§4.6 operates on either a `Deposit` or
/// a `Submission`, never both in one call).
pub enum ResourceRef {
    Deposit(DepositId),
    Submission(SubmissionId),
}

fn fetch(repo: &dyn SourceRepository, target: &ResourceRef) -> Result<Resource> {
    match target {
        ResourceRef::Deposit(id) => repo.get_deposit(id).map(Resource::Deposit),
        ResourceRef::Submission(id) => repo.get_submission(id).map(Resource::Submission),
    }
}

/// Run one critical-region interaction: fetch the current value, check
/// `precondition`, apply `modify`, check `postcondition`, then
/// compare-and-set (§4.6 steps 1-5). A conflicting write retries — refetching
/// the now-current value and re-evaluating `precondition` against it — up to
/// [`RetryPolicy::CriCompareAndSet`]'s budget (5 attempts, linear backoff).
///
/// `precondition` failing (on the first attempt or after a refetch) and
/// `postcondition` failing are both terminal, not retried: the point of the
/// retry is to race safely against concurrent writers, not to paper over a
/// modification that's wrong on its own terms.
pub fn perform_critical(
    repo: &dyn SourceRepository,
    target: ResourceRef,
    precondition: impl Fn(&Resource) -> bool,
    modify: impl Fn(&Resource) -> Resource,
    postcondition: impl Fn(&Resource) -> bool,
) -> Result<CriOutcome> {
    let config = RetryPolicy::CriCompareAndSet.to_config();
    let mut attempt = 1;

    loop {
        let current = fetch(repo, &target)?;

        if !precondition(&current) {
            return Ok(CriOutcome::PreconditionFailed);
        }

        let next = modify(&current);

        if !postcondition(&next) {
            return Ok(CriOutcome::PostconditionFailed);
        }

        match repo.compare_and_set(&current, &next)? {
            CasOutcome::Committed => return Ok(CriOutcome::Success(next)),
            CasOutcome::Conflict => {
                if attempt >= config.max_attempts {
                    bail!(
                        "compare-and-set conflict not resolved within {} attempts",
                        config.max_attempts
                    );
                }
                std::thread::sleep(calculate_delay(&config, attempt));
                attempt += 1;
            }
        }
    }
}
