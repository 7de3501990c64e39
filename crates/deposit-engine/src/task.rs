//! Deposit Task (C7, §4.7): the unit of work the Dispatcher (C8) hands to a
//! worker. Owns exactly one (submission, target-repository) pair end to
//! end — config lookup, model build, assembly, transport, and the CRI
//! writes that record the outcome — and guarantees the transport session is
//! closed on every exit path, success or failure.

use anyhow::{Context, Result};
use rand::Rng;

use deposit_engine_config::ConfigRegistry;
use deposit_engine_types::cri::Resource;
use deposit_engine_types::ids::{DepositId, RepositoryCopyId};
use deposit_engine_types::{ClassifiedError, CopyStatus, Deposit, DepositStatus, RepositoryCopy};

use crate::assembler::{self, CustodialFileSource};
use crate::classify::{classify, TaskFailure};
use crate::cri::{perform_critical, ResourceRef};
use crate::model::build_model;
use crate::source::SourceRepository;
use crate::transport::Transport;

/// What a completed Deposit Task reports back to the Dispatcher (§4.7,
/// §4.9): either it made it all the way to a transmitted package, or it
/// failed at a classified point.
#[derive(Debug)]
pub enum TaskOutcome {
    Deposited,
    Failed(ClassifiedError),
}

/// Run one Deposit Task for `deposit_id` (§4.7 steps 1-9).
pub fn run_deposit_task(
    repo: &dyn SourceRepository,
    files: &dyn CustodialFileSource,
    registry: &ConfigRegistry,
    deposit_id: &DepositId,
) -> Result<TaskOutcome> {
    let deposit = repo
        .get_deposit(deposit_id)
        .with_context(|| format!("loading deposit {deposit_id}"))?;

    if deposit.status != DepositStatus::None && deposit.status != DepositStatus::Failed {
        // Already past the point this task would move it from; nothing to do.
        return Ok(TaskOutcome::Deposited);
    }

    let target = deposit.repository.as_str().to_string();

    match attempt(repo, files, registry, &deposit) {
        Ok(AttemptOutcome::Receipt(receipt)) => {
            record_success(repo, &deposit, receipt)?;
            Ok(TaskOutcome::Deposited)
        }
        // Another worker (or a restart re-enqueue) already claimed this
        // deposit and is carrying it through; this run has nothing left to
        // do (§4.7 step 2, §5's at-most-once-per-(submission,repository)).
        Ok(AttemptOutcome::LostClaimRace) => Ok(TaskOutcome::Deposited),
        Err(failure) => {
            let classified = classify(failure, Some(target));
            record_failure(repo, &deposit, &classified)?;
            Ok(TaskOutcome::Failed(classified))
        }
    }
}

struct Receipt {
    status_probe_uri: Option<String>,
    repository_copy: Option<RepositoryCopyId>,
}

enum AttemptOutcome {
    Receipt(Receipt),
    LostClaimRace,
}

fn attempt(
    repo: &dyn SourceRepository,
    files: &dyn CustodialFileSource,
    registry: &ConfigRegistry,
    deposit: &Deposit,
) -> Result<AttemptOutcome, TaskFailure> {
    // Step 1: load the target repository's configuration.
    let repository = registry
        .get(deposit.repository.as_str())
        .ok_or_else(|| TaskFailure::Configuration(format!("no configuration for repository {}", deposit.repository)))?;

    // Step 2: claim the deposit (`none`/`failed` -> `submitted`) before any
    // model build, assembly, or transport work starts. The compare-and-set
    // this CRI performs is what makes at-most-one-in-flight-per-deposit
    // (§5) actually hold: a concurrent task or restart re-enqueue racing
    // for the same deposit loses here, before it ever touches the target
    // repository, rather than after it has already uploaded a package.
    let claimed = claim_for_submission(repo, deposit).map_err(|e| TaskFailure::Internal(e.to_string()))?;
    let Some(claimed) = claimed else {
        return Ok(AttemptOutcome::LostClaimRace);
    };

    let model = build_model(repo, &claimed.submission).map_err(|e| TaskFailure::ModelInvalid(e.to_string()))?;

    let package = assembler::assemble(&model, &repository.assembler, files)
        .map_err(|e| TaskFailure::AssemblyFailure(e.to_string()))?;

    let metadata = package.metadata.clone();

    let mut transport = Transport::open(&repository.transport).map_err(TaskFailure::Transport)?;

    let deposit_result = transport.deposit(&metadata, package.open());
    transport.close();

    let deposit_receipt = deposit_result.map_err(TaskFailure::Transport)?;

    let repository_copy = if deposit_receipt.access_url.is_some() || deposit_receipt.external_identifier.is_some() {
        let suffix: u32 = rand::rng().random();
        let copy_id = RepositoryCopyId::from(format!("{}-copy-{:x}", claimed.id, suffix));
        let copy = RepositoryCopy {
            id: copy_id.clone(),
            submission: claimed.submission.clone(),
            repository: claimed.repository.clone(),
            access_url: deposit_receipt.access_url.clone(),
            external_identifier: deposit_receipt.external_identifier.clone(),
            copy_status: CopyStatus::InProgress,
        };
        repo.create_repository_copy(&copy)
            .map_err(|e| TaskFailure::Internal(format!("recording repository copy failed: {e}")))?;
        Some(copy_id)
    } else {
        None
    };

    Ok(AttemptOutcome::Receipt(Receipt {
        status_probe_uri: deposit_receipt.status_probe_uri,
        repository_copy,
    }))
}

/// §4.7 step 2: CRI the deposit from `none`/`failed` to `submitted` ahead of
/// any assembly or transport work. Returns `None` when the precondition
/// fails — another worker already moved the deposit past `none`/`failed` —
/// so the caller can treat this run as a no-op instead of retrying work
/// someone else already owns.
fn claim_for_submission(repo: &dyn SourceRepository, deposit: &Deposit) -> Result<Option<Deposit>> {
    let outcome = perform_critical(
        repo,
        ResourceRef::Deposit(deposit.id.clone()),
        |current| {
            let d = current.as_deposit().expect("deposit CRI target");
            d.status == DepositStatus::None || d.status == DepositStatus::Failed
        },
        |current| {
            let mut d = current.as_deposit().expect("deposit CRI target").clone();
            d.status = DepositStatus::Submitted;
            d.error_kind = None;
            d.error_message = None;
            Resource::Deposit(d)
        },
        |next| next.as_deposit().expect("deposit CRI target").status == DepositStatus::Submitted,
    )?;

    match outcome {
        deposit_engine_types::CriOutcome::Success(resource) => {
            Ok(Some(resource.as_deposit().expect("deposit CRI target").clone()))
        }
        deposit_engine_types::CriOutcome::PreconditionFailed => Ok(None),
        other => anyhow::bail!("could not claim deposit for submission: {other:?}"),
    }
}

/// §4.7 step 7: attach the status-probe URI / repository-copy
/// back-reference the transport just produced to the deposit this task
/// already claimed as `submitted` in step 2 — the postcondition enforces
/// invariant (iii) (§3): a `submitted` deposit cannot lack both.
fn record_success(repo: &dyn SourceRepository, deposit: &Deposit, receipt: Receipt) -> Result<()> {
    let outcome = perform_critical(
        repo,
        ResourceRef::Deposit(deposit.id.clone()),
        |current| current.as_deposit().expect("deposit CRI target").status == DepositStatus::Submitted,
        |current| {
            let mut d = current.as_deposit().expect("deposit CRI target").clone();
            d.status_probe_uri = receipt.status_probe_uri.clone();
            d.repository_copy = receipt.repository_copy.clone();
            Resource::Deposit(d)
        },
        |next| next.as_deposit().expect("deposit CRI target").satisfies_submitted_invariant(),
    )?;

    match outcome {
        deposit_engine_types::CriOutcome::Success(_) => Ok(()),
        other => anyhow::bail!("could not record successful deposit: {other:?}"),
    }
}

/// §4.7 step 8: CRI the deposit to `failed`, recording the classification so
/// a future refresh or operator can see why. Reachable both before the step
/// 2 claim (the step 1 configuration lookup failed) and after it (model
/// build, assembly, or transport failed on a deposit this task already
/// claimed as `submitted`), so the precondition accepts either starting
/// point.
fn record_failure(repo: &dyn SourceRepository, deposit: &Deposit, classified: &ClassifiedError) -> Result<()> {
    let outcome = perform_critical(
        repo,
        ResourceRef::Deposit(deposit.id.clone()),
        |current| {
            let d = current.as_deposit().expect("deposit CRI target");
            matches!(d.status, DepositStatus::None | DepositStatus::Failed | DepositStatus::Submitted)
        },
        |current| {
            let mut d = current.as_deposit().expect("deposit CRI target").clone();
            d.status = DepositStatus::Failed;
            d.error_kind = Some(format!("{:?}", classified.kind));
            d.error_message = Some(classified.user_message.clone());
            Resource::Deposit(d)
        },
        |_| true,
    )?;

    match outcome {
        deposit_engine_types::CriOutcome::Success(_) => Ok(()),
        deposit_engine_types::CriOutcome::PreconditionFailed => Ok(()),
        other => anyhow::bail!("could not record deposit failure: {other:?}"),
    }
}
