use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use deposit_engine::config::{load_registry, load_runtime_options};
use deposit_engine::scheduler::{CancellationToken, Scheduler};
use deposit_engine::source::{HttpSourceRepository, SourceRepository};
use deposit_engine::task::TaskOutcome;
use deposit_engine_types::ids::DepositId;
use deposit_engine_types::IngestEvent;

mod files;

use files::FilesystemFileSource;

#[derive(Parser, Debug)]
#[command(name = "deposit-engine", version)]
#[command(about = "Submission-dispatch service: packages finalized submissions and deposits them to target repositories")]
struct Cli {
    /// Path to the configuration file (runtime options + repository registry).
    #[arg(long, default_value = "deposit-engine.toml")]
    config: PathBuf,

    /// Filesystem root custodial files are resolved relative to.
    #[arg(long, default_value = ".")]
    files_root: PathBuf,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the ingest and refresh loops until the event stream (stdin) closes.
    Listen,
    /// Run one pass of the refresh loop; restrict to the given probe URIs if any are given.
    Refresh {
        #[arg(long = "uri")]
        uri: Vec<String>,
    },
    /// Reset the given failed deposits to "none" and re-enqueue them.
    Retry {
        #[arg(long = "uri")]
        uri: Vec<String>,
    },
}

/// Exit codes per the CLI surface contract: 0=ok, 1=invalid-argument,
/// 2=transient-failure, 3=fatal.
const EXIT_OK: u8 = 0;
const EXIT_INVALID_ARGUMENT: u8 = 1;
const EXIT_TRANSIENT_FAILURE: u8 = 2;
const EXIT_FATAL: u8 = 3;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help/--version resolve through the same Err path as a
            // genuine usage error; only the latter counts as invalid-argument.
            let _ = e.print();
            use clap::error::ErrorKind as ClapErrorKind;
            let code = match e.kind() {
                ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => EXIT_OK,
                _ => EXIT_INVALID_ARGUMENT,
            };
            return ExitCode::from(code);
        }
    };

    match run(cli) {
        Ok(RunOutcome::Ok) => ExitCode::from(EXIT_OK),
        Ok(RunOutcome::TransientFailure) => ExitCode::from(EXIT_TRANSIENT_FAILURE),
        Err(e) => {
            eprintln!("[error] {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

enum RunOutcome {
    Ok,
    TransientFailure,
}

fn run(cli: Cli) -> Result<RunOutcome> {
    let opts = load_runtime_options(&cli.config).context("loading runtime configuration")?;
    let registry = Arc::new(load_registry(&cli.config).context("loading repository registry")?);
    let repo: Arc<dyn SourceRepository> =
        Arc::new(HttpSourceRepository::new(opts.source_repository_url.clone())?);
    let files = Arc::new(FilesystemFileSource::new(cli.files_root.clone()));

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&repo),
        files,
        registry,
        opts.self_agent.clone(),
        opts.worker_count,
    ));

    match cli.cmd {
        Commands::Listen => run_listen(scheduler, repo, opts.refresh_interval, opts.shutdown_wait),
        Commands::Refresh { uri } => run_refresh(&scheduler, &uri),
        Commands::Retry { uri } => run_retry(&scheduler, &uri),
    }
}

/// Reads newline-delimited `IngestEvent` JSON from stdin until it closes,
/// while a background thread sweeps the refresh loop at `refresh_interval`.
/// Process bootstrap (how events actually reach this binary, signal
/// handling) is explicitly out of this system's scope; NDJSON-over-stdin is
/// this adapter's own choice of event source.
fn run_listen(
    scheduler: Arc<Scheduler>,
    repo: Arc<dyn SourceRepository>,
    refresh_interval: std::time::Duration,
    shutdown_wait: std::time::Duration,
) -> Result<RunOutcome> {
    let cancel = CancellationToken::new();

    let refresh_cancel = cancel.clone();
    let http = reqwest::blocking::Client::new();
    let refresh_scheduler = Arc::clone(&scheduler);
    let refresh_handle = thread::spawn(move || {
        while !refresh_cancel.is_cancelled() {
            let _ = refresh_scheduler.refresh_once(&http, &[], &refresh_cancel);
            thread::sleep(refresh_interval);
        }
    });

    let mut any_retryable = false;
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("reading ingest event from stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let event: IngestEvent =
            serde_json::from_str(&line).context("parsing ingest event")?;

        let submission = event_filter::submission_facts(repo.as_ref(), &event)?;
        let outcomes = scheduler.ingest(&event, submission, &cancel)?;
        if outcomes.iter().any(retryable_outcome) {
            any_retryable = true;
        }
    }

    scheduler.shutdown(&cancel, shutdown_wait);
    refresh_handle.join().expect("refresh thread panicked");

    Ok(if any_retryable { RunOutcome::TransientFailure } else { RunOutcome::Ok })
}

fn run_refresh(scheduler: &Scheduler, uris: &[String]) -> Result<RunOutcome> {
    let http = reqwest::blocking::Client::new();
    let cancel = CancellationToken::new();
    scheduler.refresh_once(&http, uris, &cancel)?;
    Ok(RunOutcome::Ok)
}

fn run_retry(scheduler: &Scheduler, uris: &[String]) -> Result<RunOutcome> {
    let ids: Vec<DepositId> = uris.iter().map(|u| DepositId::from(u.as_str())).collect();
    let cancel = CancellationToken::new();
    let outcomes = scheduler.retry(ids, &cancel)?;
    Ok(if outcomes.iter().any(retryable_outcome) {
        RunOutcome::TransientFailure
    } else {
        RunOutcome::Ok
    })
}

fn retryable_outcome(outcome: &TaskOutcome) -> bool {
    matches!(outcome, TaskOutcome::Failed(classified) if classified.retryable)
}

mod event_filter {
    use anyhow::Result;
    use deposit_engine::event_filter::{submission_id_from_payload, SubmissionFacts};
    use deposit_engine::source::SourceRepository;
    use deposit_engine_types::IngestEvent;

    /// Look up the facts the filter needs (§4.1) for the submission an
    /// event's payload names, if any.
    pub fn submission_facts(
        repo: &dyn SourceRepository,
        event: &IngestEvent,
    ) -> Result<Option<SubmissionFacts>> {
        let Some(submission_id) = submission_id_from_payload(event) else {
            return Ok(None);
        };
        match repo.get_submission(&submission_id) {
            Ok(submission) => Ok(Some(SubmissionFacts {
                user_submitted: submission.user_submitted,
                source_is_user: matches!(submission.source, deposit_engine_types::submission::SubmissionSource::User),
            })),
            Err(_) => Ok(None),
        }
    }
}
