//! # deposit-engine
//!
//! The submission-dispatch core: takes finalized scholarly submissions and
//! their ingest events, assembles repository-specific deposit packages, and
//! transmits them to target repositories, tracking every attempt through a
//! compare-and-set protocol against a source-of-truth repository.
//!
//! ## Pipeline
//!
//! 1. [`event_filter`] admits or drops an inbound ingest event (C1, §4.1).
//! 2. [`model`] resolves an admitted submission's metadata graph into a
//!    transport-agnostic [`model::DepositModel`] (C2, §4.2).
//! 3. [`assembler`] materializes that model into a repository-specific
//!    package stream — archive, manifest, checksums (C3, §4.3).
//! 4. [`transport`] opens a session against the target repository (FTP,
//!    SWORDv2, or filesystem) and hands off the package (C4, §4.4).
//! 5. [`status`] polls a submitted deposit's status probe URI and resolves
//!    it through the repository's configured status mapping (C5, §4.5).
//! 6. [`classify`] turns a task failure into a [`deposit_engine_types::ClassifiedError`]
//!    with a retry/terminal verdict (C6, §4.6).
//! 7. [`task`] runs one deposit end to end — model, assembly, transport,
//!    and the CRI writes that record the outcome (C7, §4.7).
//! 8. [`scheduler`] drives the ingest and refresh loops over a bounded
//!    worker pool (C8, §4.8).
//! 9. [`cri`] implements the compare-and-set retry loop (C9) that every
//!    state transition above goes through.
//! 10. [`config`] and [`source`] round out the ambient stack: runtime
//!     options plus the per-repository registry (C10), and the
//!     [`source::SourceRepository`] abstraction over the source of truth.
//!
//! ## Modules
//!
//! - [`event_filter`] — Ingest Gate: admits or drops inbound events
//! - [`model`] — Model Resolver: submission metadata graph
//! - [`pipe`] — bounded in-memory byte pipe between assembler and transport
//! - [`assembler`] — Package Assembler: archive, manifest, checksums
//! - [`transport`] — Transport adapters: FTP, SWORDv2, filesystem
//! - [`status`] — Status Resolver: probe polling and state mapping
//! - [`cri`] — Compare-and-set retry loop shared by every state transition
//! - [`classify`] — Error Classifier: retry/terminal verdicts
//! - [`task`] — Deposit Task: one submission/repository pair end to end
//! - [`scheduler`] — Dispatcher: ingest and refresh loops over a worker pool
//! - [`config`] — Runtime configuration (worker pool size, timing)
//! - [`source`] — Source-of-truth repository abstraction
//!
//! ## Retry strategies
//!
//! Configurable retry strategies with backoff and jitter are re-exported
//! from the `deposit-engine-retry` crate as [`retry`].

pub mod event_filter;
pub mod model;
pub mod pipe;
pub mod assembler;
pub mod transport;
pub mod status;
pub mod cri;
pub mod classify;
pub mod task;
pub mod scheduler;
pub mod config;
pub mod source;

/// Configurable retry strategies with backoff and jitter.
/// Re-exported from the deposit-engine-retry crate.
pub use deposit_engine_retry as retry;
