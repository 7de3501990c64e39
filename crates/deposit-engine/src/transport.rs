//! Transport Adapters (C4, §4.4): one `open` per target repository, one
//! `deposit` call to hand off an assembled package. A tagged `Transport`
//! enum rather than `Box<dyn Transport>` (§9's redesign note against
//! dynamic dispatch for a closed, rarely-extended protocol set) — adding a
//! fourth protocol means adding a match arm everywhere, which the compiler
//! enforces, rather than a trait object callers could forget to wire up.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use suppaftp::FtpStream;

use deposit_engine_types::package::PackageMetadata;
use deposit_engine_types::transport::{
    AuthRealm, FtpDataType, FtpHints, FtpTransferMode, ProtocolHints, SwordV2Hints,
    TransportHints, FTP_CONNECT_BACKOFF_FACTOR, FTP_CONNECT_DEADLINE, FTP_CONNECT_INITIAL_BACKOFF,
};

/// What a Deposit Task learns back from a transport (§4.4, §4.7 step 6):
/// the probe C5 will later poll, plus whatever identifier the repository
/// assigned. Both are optional since Filesystem has neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepositReceipt {
    pub status_probe_uri: Option<String>,
    pub external_identifier: Option<String>,
    pub access_url: Option<String>,
}

/// The three failure shapes a transport can produce (§4.9): distinguishing
/// "try again" from "the repository said no" from "the repository is
/// broken" is what lets the Error Classifier (C9) apply policy without
/// re-inspecting the underlying error.
#[derive(Debug, Clone)]
pub enum TransportError {
    Network(String),
    Rejected(String),
    ServerError(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(m) => write!(f, "network error: {m}"),
            Self::Rejected(m) => write!(f, "rejected: {m}"),
            Self::ServerError(m) => write!(f, "server error: {m}"),
        }
    }
}

impl std::error::Error for TransportError {}

pub enum Transport {
    Ftp(FtpSession),
    SwordV2(SwordV2Session),
    Filesystem(FilesystemSession),
}

impl Transport {
    /// Open a session against `hints` (§4.4: "`open` establishes whatever
    /// session state the protocol needs before the first byte of a package
    /// is sent").
    pub fn open(hints: &TransportHints) -> Result<Self, TransportError> {
        match &hints.protocol {
            ProtocolHints::Ftp(ftp_hints) => Ok(Self::Ftp(FtpSession::open(hints, ftp_hints)?)),
            ProtocolHints::SwordV2(sword_hints) => {
                Ok(Self::SwordV2(SwordV2Session::open(hints, sword_hints)?))
            }
            ProtocolHints::Filesystem { destination_dir } => {
                Ok(Self::Filesystem(FilesystemSession::open(destination_dir)?))
            }
        }
    }

    pub fn deposit(
        &mut self,
        metadata: &PackageMetadata,
        reader: impl Read,
    ) -> Result<DepositReceipt, TransportError> {
        match self {
            Self::Ftp(session) => session.deposit(metadata, reader),
            Self::SwordV2(session) => session.deposit(metadata, reader),
            Self::Filesystem(session) => session.deposit(metadata, reader),
        }
    }

    pub fn close(self) {
        match self {
            Self::Ftp(session) => session.close(),
            Self::SwordV2(_) => {}
            Self::Filesystem(_) => {}
        }
    }
}

/// §4.4.1: session-open connects with a bounded retry budget (initial
/// 2000ms, ×1.5 each attempt, 30s deadline), validates the control channel
/// with a NOOP, logs in, sets transfer mode/data type/passive flag, then
/// ensures `base_directory` (with `%s` substituted by the UTC date) exists —
/// creating intermediate components — and changes into it.
pub struct FtpSession {
    stream: FtpStream,
    transfer_mode: FtpTransferMode,
    /// Set once a store fails partway through; §4.4.1 requires treating the
    /// session as unusable afterward rather than risking an out-of-order
    /// control-channel reply on a subsequent `deposit`.
    tainted: bool,
}

impl FtpSession {
    fn open(hints: &TransportHints, ftp_hints: &FtpHints) -> Result<Self, TransportError> {
        let address = format!("{}:{}", hints.server_fqdn, hints.server_port);
        let mut stream = connect_with_retry(&address)?;

        stream
            .noop()
            .map_err(|e| TransportError::Network(format!("NOOP failed: {e}")))?;

        match &hints.auth_realm {
            Some(AuthRealm::Basic { username, password }) => {
                stream
                    .login(username, password)
                    .map_err(|e| TransportError::Rejected(format!("FTP login failed: {e}")))?;
            }
            None => {
                stream
                    .login("anonymous", "")
                    .map_err(|e| TransportError::Rejected(format!("anonymous FTP login failed: {e}")))?;
            }
        }

        if ftp_hints.use_pasv {
            stream
                .set_mode(suppaftp::Mode::Passive);
        } else {
            stream.set_mode(suppaftp::Mode::Active);
        }

        let file_type = match ftp_hints.data_type {
            FtpDataType::Ascii => suppaftp::types::FileType::Ascii(suppaftp::types::FormatControl::Default),
            FtpDataType::Binary => suppaftp::types::FileType::Binary,
        };
        stream
            .transfer_type(file_type)
            .map_err(|e| TransportError::Network(format!("TYPE command failed: {e}")))?;

        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let directory = ftp_hints.base_directory.replace("%s", &today);
        ensure_and_enter_directory(&mut stream, &directory)?;

        Ok(Self {
            stream,
            transfer_mode: ftp_hints.transfer_mode,
            tainted: false,
        })
    }

    fn deposit(
        &mut self,
        metadata: &PackageMetadata,
        mut reader: impl Read,
    ) -> Result<DepositReceipt, TransportError> {
        // suppaftp only implements STREAM mode transfers; BLOCK and
        // COMPRESSED are accepted in configuration (some repositories still
        // advertise them) but sent as STREAM, which is wire-compatible for
        // any server that also only speaks STREAM.
        let _ = self.transfer_mode;

        if self.tainted {
            return Err(TransportError::ServerError(
                "FTP session is tainted by a previous failed store; reopen a new session".into(),
            ));
        }

        let (dir_part, leaf) = split_leaf(&metadata.name);

        let original_cwd = match &dir_part {
            Some(_) => Some(
                self.stream
                    .pwd()
                    .map_err(|e| TransportError::Network(format!("PWD failed: {e}")))?,
            ),
            None => None,
        };

        let result = match &dir_part {
            Some(dir) => ensure_and_enter_directory(&mut self.stream, dir)
                .and_then(|()| store_leaf(&mut self.stream, leaf, &mut reader)),
            None => store_leaf(&mut self.stream, leaf, &mut reader),
        };

        if result.is_err() {
            self.tainted = true;
        }

        if let Some(cwd) = original_cwd {
            let _ = self.stream.cwd(&cwd);
        }

        result
    }

    fn close(mut self) {
        let _ = self.stream.quit();
    }
}

/// Split a package name into its directory prefix (if any) and leaf
/// filename (§4.4.1: "paths starting with `/` are absolute ... all others
/// are relative to the current working directory").
fn split_leaf(name: &str) -> (Option<String>, &str) {
    let (body, absolute) = match name.strip_prefix('/') {
        Some(rest) => (rest, true),
        None => (name, false),
    };
    match body.rsplit_once('/') {
        Some((dir, leaf)) => {
            let dir = if absolute { format!("/{dir}") } else { dir.to_string() };
            (Some(dir), leaf)
        }
        None if absolute => (Some("/".to_string()), body),
        None => (None, body),
    }
}

/// Create every intermediate component of `path` (idempotently — an
/// "already exists" reply is success) and change into the final one
/// (§4.4.1). An empty component is a no-op, so a leading or doubled `/`
/// never trips a spurious `mkdir ""`.
fn ensure_and_enter_directory(stream: &mut FtpStream, path: &str) -> Result<(), TransportError> {
    if path.is_empty() {
        return Ok(());
    }
    let rest = if let Some(rest) = path.strip_prefix('/') {
        stream
            .cwd("/")
            .map_err(|e| TransportError::Rejected(format!("cwd / failed: {e}")))?;
        rest
    } else {
        path
    };
    for component in rest.split('/') {
        if component.is_empty() {
            continue;
        }
        mkdir_idempotent(stream, component)?;
        stream
            .cwd(component)
            .map_err(|e| TransportError::Rejected(format!("cwd {component} failed: {e}")))?;
    }
    Ok(())
}

fn mkdir_idempotent(stream: &mut FtpStream, component: &str) -> Result<(), TransportError> {
    match stream.mkdir(component) {
        Ok(()) => Ok(()),
        Err(e) => {
            if e.to_string().to_ascii_lowercase().contains("exist") {
                Ok(())
            } else {
                Err(TransportError::Rejected(format!("mkdir {component} failed: {e}")))
            }
        }
    }
}

/// Store `leaf` in the current directory via an explicit data-stream
/// handle so a mid-transfer failure can ABORT rather than leaving the
/// control channel to time out (§4.4.1).
fn store_leaf(stream: &mut FtpStream, leaf: &str, reader: &mut impl Read) -> Result<DepositReceipt, TransportError> {
    let mut data_stream = stream.put_with_stream(leaf).map_err(classify_ftp_put_error)?;
    match std::io::copy(reader, &mut data_stream) {
        Ok(_) => stream
            .finalize_put_stream(data_stream)
            .map(|_| DepositReceipt::default())
            .map_err(classify_ftp_put_error),
        Err(e) => {
            let _ = stream.abort(data_stream);
            Err(TransportError::Network(format!("writing {leaf} failed: {e}")))
        }
    }
}

/// `suppaftp`'s error type doesn't expose a structured status code for
/// every failure path, so classification falls back to the rendered
/// message: a reply in the 5xx range is a server-side rejection, anything
/// else (timeouts, connection resets) is a retryable network failure.
fn classify_ftp_put_error(err: suppaftp::FtpError) -> TransportError {
    let message = err.to_string();
    let is_server_error = message
        .split_whitespace()
        .any(|token| token.len() == 3 && token.starts_with('5') && token.chars().all(|c| c.is_ascii_digit()));
    if is_server_error {
        TransportError::ServerError(message)
    } else {
        TransportError::Network(message)
    }
}

fn connect_with_retry(address: &str) -> Result<FtpStream, TransportError> {
    let deadline = Instant::now() + FTP_CONNECT_DEADLINE;
    let mut backoff = FTP_CONNECT_INITIAL_BACKOFF;
    let mut last_err = None;

    loop {
        match FtpStream::connect(address) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                last_err = Some(e);
                if Instant::now() >= deadline {
                    break;
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                std::thread::sleep(backoff.min(remaining));
                backoff = Duration::from_secs_f64(backoff.as_secs_f64() * FTP_CONNECT_BACKOFF_FACTOR);
            }
        }
    }

    Err(TransportError::Network(format!(
        "could not connect to {address} within {:?}: {}",
        FTP_CONNECT_DEADLINE,
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// §4.4.2: fetches and caches the service document once at session-open,
/// then routes each deposit to a collection by matching `PackageMetadata`'s
/// collection-tags against the configured `collection_hints` (falling back
/// to `default_collection_url`), validated against the collections the
/// cached document actually advertises.
pub struct SwordV2Session {
    http: Client,
    hints: SwordV2Hints,
    auth_realm: Option<AuthRealm>,
    /// `href`s of every `<collection>` the cached service document
    /// advertised, used to validate the routed-to URL (§4.4.2 rule 3).
    collections: Vec<String>,
}

impl SwordV2Session {
    fn open(hints: &TransportHints, sword_hints: &SwordV2Hints) -> Result<Self, TransportError> {
        let http = Client::builder()
            .user_agent(format!("deposit-engine/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Network(format!("building HTTP client failed: {e}")))?;

        let auth_realm = hints.auth_realm.clone();
        let authed = |builder: reqwest::blocking::RequestBuilder| match &auth_realm {
            Some(AuthRealm::Basic { username, password }) => builder.basic_auth(username, Some(password)),
            None => builder,
        };

        let resp = authed(http.get(&sword_hints.service_doc_url))
            .send()
            .map_err(|e| TransportError::Network(format!("fetching service document failed: {e}")))?;
        let body = match resp.status() {
            StatusCode::OK => resp
                .text()
                .map_err(|e| TransportError::Network(format!("reading service document failed: {e}")))?,
            s if s.is_server_error() => return Err(TransportError::ServerError(format!("service document: {s}"))),
            s => return Err(TransportError::Rejected(format!("service document: {s}"))),
        };
        let collections = parse_collections(&body)
            .map_err(|e| TransportError::Rejected(format!("malformed service document: {e}")))?;

        Ok(Self {
            http,
            hints: sword_hints.clone(),
            auth_realm,
            collections,
        })
    }

    fn authed(&self, builder: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.auth_realm {
            Some(AuthRealm::Basic { username, password }) => builder.basic_auth(username, Some(password)),
            None => builder,
        }
    }

    /// §4.4.2 collection selection: case-insensitive tag match against the
    /// configured hints, in declared order, falling back to the default
    /// collection; the chosen URL must then match one the cached service
    /// document actually advertised, or the deposit fails with
    /// `InvalidCollectionUrl`.
    fn collection_url(&self, metadata: &PackageMetadata) -> Result<String, TransportError> {
        let tags = metadata.collection_tags();
        let chosen = self
            .hints
            .collection_hints
            .iter()
            .find(|hint| {
                tags.iter()
                    .any(|t| t.eq_ignore_ascii_case(&hint.tag))
            })
            .map(|hint| hint.url.as_str())
            .unwrap_or(&self.hints.default_collection_url);

        if self.collections.iter().any(|c| c == chosen) {
            Ok(chosen.to_string())
        } else {
            Err(TransportError::Rejected(format!(
                "InvalidCollectionUrl: {chosen} is not advertised by the service document"
            )))
        }
    }

    fn deposit(
        &mut self,
        metadata: &PackageMetadata,
        mut reader: impl Read,
    ) -> Result<DepositReceipt, TransportError> {
        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .map_err(|e| TransportError::Network(format!("reading package stream failed: {e}")))?;

        let url = self.collection_url(metadata)?;
        let mut request = self
            .authed(self.http.post(&url))
            .header("Content-Type", metadata.mime.clone())
            .header("Packaging", metadata.spec_uri.clone())
            .body(body);
        if let Some(md5) = metadata.checksums.md5.as_deref() {
            request = request.header("Content-MD5", md5.to_string());
        }
        if let Some(on_behalf_of) = &self.hints.on_behalf_of {
            request = request.header("On-Behalf-Of", on_behalf_of.clone());
        }

        let resp = request
            .send()
            .map_err(|e| TransportError::Network(format!("POST to {url} failed: {e}")))?;

        match resp.status() {
            StatusCode::CREATED | StatusCode::OK => {
                let status_probe_uri = resp
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                Ok(DepositReceipt {
                    status_probe_uri,
                    external_identifier: None,
                    access_url: None,
                })
            }
            s => {
                // §4.4.2/§7: the SWORDError body is preserved verbatim on
                // the deposit, not just the status line — a repository's
                // rejection reason (e.g. an MD5 mismatch) lives in the body.
                let body = resp.text().unwrap_or_default();
                let detail = if body.trim().is_empty() {
                    format!("deposit rejected: {s}")
                } else {
                    format!("deposit rejected: {s}: {body}")
                };
                if s.is_server_error() {
                    Err(TransportError::ServerError(detail))
                } else {
                    Err(TransportError::Rejected(detail))
                }
            }
        }
    }
}

/// Extract every `<collection href="...">` from a SWORDv2/APP service
/// document (§4.4.2), regardless of namespace prefix.
fn parse_collections(xml: &str) -> Result<Vec<String>> {
    let mut reader = quick_xml::reader::Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut collections = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Empty(tag)) | Ok(quick_xml::events::Event::Start(tag))
                if tag.local_name().as_ref() == b"collection" =>
            {
                for attr in tag.attributes().flatten() {
                    if attr.key.local_name().as_ref() == b"href" {
                        collections.push(attr.decode_and_unescape_value(reader.decoder())?.to_string());
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => bail!("malformed service document: {e}"),
            _ => {}
        }
        buf.clear();
    }

    Ok(collections)
}

/// §4.4.3: writes the package directly into `destination_dir`, naming it
/// after the package metadata. No session state beyond the target
/// directory; deposits complete synchronously, so there is nothing for C5
/// to poll.
pub struct FilesystemSession {
    destination_dir: String,
}

impl FilesystemSession {
    fn open(destination_dir: &str) -> Result<Self, TransportError> {
        fs::create_dir_all(destination_dir)
            .map_err(|e| TransportError::ServerError(format!("creating {destination_dir} failed: {e}")))?;
        Ok(Self {
            destination_dir: destination_dir.to_string(),
        })
    }

    fn deposit(
        &mut self,
        metadata: &PackageMetadata,
        mut reader: impl Read,
    ) -> Result<DepositReceipt, TransportError> {
        let target = Path::new(&self.destination_dir).join(&metadata.name);
        let mut file = fs::File::create(&target)
            .map_err(|e| TransportError::ServerError(format!("creating {}: {e}", target.display())))?;
        let written = std::io::copy(&mut reader, &mut file)
            .map_err(|e| TransportError::Network(format!("writing {}: {e}", target.display())))?;
        if let Some(expected) = metadata.size {
            if written != expected {
                return Err(TransportError::Rejected(format!(
                    "wrote {written} bytes, expected {expected}"
                )));
            }
        }
        Ok(DepositReceipt {
            status_probe_uri: None,
            external_identifier: None,
            access_url: Some(target.display().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deposit_engine_types::package::{ArchiveFormat, ChecksumSet, CompressionFormat};
    use std::io::Cursor;

    fn metadata(name: &str) -> PackageMetadata {
        PackageMetadata {
            name: name.into(),
            spec_uri: "SimpleZip".into(),
            mime: "application/zip".into(),
            size: Some(5),
            archive: ArchiveFormat::Zip,
            compression: CompressionFormat::Zip,
            checksums: ChecksumSet::default(),
            submission_meta: "{}".into(),
        }
    }

    #[test]
    fn filesystem_transport_writes_named_file_and_reports_access_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = FilesystemSession::open(dir.path().to_str().unwrap()).unwrap();
        let receipt = session.deposit(&metadata("pkg.zip"), Cursor::new(b"hello".to_vec())).unwrap();
        assert!(receipt.access_url.unwrap().ends_with("pkg.zip"));
        assert!(dir.path().join("pkg.zip").exists());
    }

    #[test]
    fn filesystem_transport_rejects_short_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = FilesystemSession::open(dir.path().to_str().unwrap()).unwrap();
        let mut meta = metadata("pkg.zip");
        meta.size = Some(999);
        let err = session.deposit(&meta, Cursor::new(b"hello".to_vec())).unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
    }

    fn sword_session(collection_hints: Vec<deposit_engine_types::transport::CollectionHint>) -> SwordV2Session {
        let hints = SwordV2Hints {
            service_doc_url: "http://example.org/svc".into(),
            default_collection_url: "http://example.org/collections/default".into(),
            on_behalf_of: None,
            collection_hints,
        };
        SwordV2Session {
            http: Client::new(),
            collections: vec![hints.default_collection_url.clone(), "http://example.org/collections/covid".into()],
            hints,
            auth_realm: None,
        }
    }

    #[test]
    fn collection_hints_route_by_matching_tag_case_insensitively() {
        let session = sword_session(vec![deposit_engine_types::transport::CollectionHint {
            tag: "covid".into(),
            url: "http://example.org/collections/covid".into(),
        }]);
        let meta = PackageMetadata {
            submission_meta: r#"{"hints":{"collection-tags":["COVID"]}}"#.into(),
            ..metadata("pkg.zip")
        };
        assert_eq!(session.collection_url(&meta).unwrap(), "http://example.org/collections/covid");

        let unmatched = PackageMetadata {
            submission_meta: "{}".into(),
            ..metadata("pkg.zip")
        };
        assert_eq!(session.collection_url(&unmatched).unwrap(), "http://example.org/collections/default");
    }

    #[test]
    fn collection_url_not_advertised_by_service_document_is_rejected() {
        let session = sword_session(vec![deposit_engine_types::transport::CollectionHint {
            tag: "covid".into(),
            url: "http://example.org/collections/unlisted".into(),
        }]);
        let meta = PackageMetadata {
            submission_meta: r#"{"hints":{"collection-tags":["covid"]}}"#.into(),
            ..metadata("pkg.zip")
        };
        let err = session.collection_url(&meta).unwrap_err();
        assert!(matches!(err, TransportError::Rejected(msg) if msg.contains("InvalidCollectionUrl")));
    }

    #[test]
    fn parses_collection_hrefs_from_a_service_document() {
        let doc = r#"<?xml version="1.0"?>
<service xmlns="http://www.w3.org/2007/app">
  <workspace>
    <collection href="http://example.org/collections/default"/>
    <collection href="http://example.org/collections/covid"/>
  </workspace>
</service>"#;
        let collections = parse_collections(doc).unwrap();
        assert_eq!(
            collections,
            vec![
                "http://example.org/collections/default".to_string(),
                "http://example.org/collections/covid".to_string(),
            ]
        );
    }
}
