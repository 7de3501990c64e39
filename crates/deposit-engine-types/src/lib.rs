//! Domain types shared across the deposit engine: the durable entities that
//! live in the source-of-truth repository (`Submission`, `Deposit`,
//! `RepositoryCopy`, `Repository`, `File`), the in-memory-only views built
//! and discarded per task (`DepositModel`, `PackageMetadata`, `Resource`),
//! and the cross-cutting vocabulary (error kinds, transport hints, CRI
//! outcomes) that every component in this workspace speaks.
//!
//! ## Modules
//!
//! - [`ids`] — newtype identifiers for every durable entity
//! - [`submission`] — `Submission`, `DepositModel`, and person/file aggregation
//! - [`deposit`] — `Deposit`, `DepositStatus`, `RepositoryCopy`, `CopyStatus`
//! - [`repository`] — `Repository` configuration: transport, assembler, status mapping
//! - [`package`] — `PackageMetadata`, `Resource`, archive/compression/checksum enums
//! - [`transport`] — per-protocol transport hints as a discriminated union
//! - [`error`] — `ErrorKind`, `ClassifiedError` (the vocabulary produced by C9)
//! - [`event`] — the inbound repository-event wire shape consumed by C1
//! - [`cri`] — the tagged-union `Resource` and CRI outcome types

pub mod cri;
pub mod deposit;
pub mod error;
pub mod event;
pub mod ids;
pub mod package;
pub mod repository;
pub mod submission;
pub mod transport;

pub use cri::{CriOutcome, Resource as CriResource};
pub use deposit::{CopyStatus, Deposit, DepositStatus, RepositoryCopy};
pub use error::{ClassifiedError, ErrorKind};
pub use event::{EventType, IngestEvent};
pub use ids::{
    DepositId, FileId, GrantId, PersonId, PublicationId, RepositoryCopyId, RepositoryId,
    SubmissionId,
};
pub use package::{
    ArchiveFormat, ChecksumAlgorithm, ChecksumSet, CompressionFormat, PackageMetadata, Resource,
};
pub use repository::{AssemblerSettings, Repository, StatusMapping, TransportSettings};
pub use submission::{
    DepositModel, File, FileRole, Person, PersonRole, Submission, SubmissionSource,
};
pub use transport::{AuthMode, AuthRealm, FtpHints, SwordV2Hints, TransportHints, TransportProtocol};
