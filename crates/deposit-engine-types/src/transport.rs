//! Transport hints (§4.4) as a discriminated union keyed on `mech`/`protocol`
//! discriminator fields, per the redesign note in §9: "Configuration
//! polymorphism via discriminator field `mech`" becomes a discriminated
//! union decoded at load time; an unknown discriminator fails loudly rather
//! than silently falling through to a default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportProtocol {
    Ftp,
    #[serde(rename = "SWORDv2")]
    SwordV2,
    Filesystem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    Userpass,
    None,
}

/// Auth realm, discriminated by `mech`. Only `basic` is implemented; any
/// other `mech` value must fail at config load rather than be silently
/// ignored (§9).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mech", rename_all = "snake_case")]
pub enum AuthRealm {
    Basic { username: String, password: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FtpTransferMode {
    Stream,
    Block,
    Compressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FtpDataType {
    Ascii,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtpHints {
    pub transfer_mode: FtpTransferMode,
    pub data_type: FtpDataType,
    pub use_pasv: bool,
    /// May contain a single `%s` placeholder substituted with the UTC date
    /// in `ISO_LOCAL_DATE` form on session open (§4.4).
    pub base_directory: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionHint {
    pub tag: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwordV2Hints {
    pub service_doc_url: String,
    pub default_collection_url: String,
    #[serde(default)]
    pub on_behalf_of: Option<String>,
    #[serde(default)]
    pub collection_hints: Vec<CollectionHint>,
}

/// Common transport hints (§4.4): protocol-specific fields are nested under
/// a tagged union rather than flattened with `Option`s, so an FTP
/// configuration cannot accidentally carry SWORDv2 fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportHints {
    pub auth_mode: AuthMode,
    #[serde(default)]
    pub auth_realm: Option<AuthRealm>,
    pub server_fqdn: String,
    pub server_port: u16,
    #[serde(flatten)]
    pub protocol: ProtocolHints,
}

/// The transport half of a [`crate::Repository`]'s configuration (§3: "transport
/// settings (protocol, auth realm, base URL)"). Shares its shape with
/// [`TransportHints`] — the values a `Repository` persists are exactly the
/// hints a Deposit Task passes to `Transport::open`.
pub type TransportSettings = TransportHints;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum ProtocolHints {
    Ftp(FtpHints),
    #[serde(rename = "SWORDv2")]
    SwordV2(SwordV2Hints),
    Filesystem { destination_dir: String },
}

impl ProtocolHints {
    pub fn protocol(&self) -> TransportProtocol {
        match self {
            ProtocolHints::Ftp(_) => TransportProtocol::Ftp,
            ProtocolHints::SwordV2(_) => TransportProtocol::SwordV2,
            ProtocolHints::Filesystem { .. } => TransportProtocol::Filesystem,
        }
    }
}

/// FTP connect retry budget (§4.4.1): initial 2000ms, factor 1.5, deadline 30s.
pub const FTP_CONNECT_INITIAL_BACKOFF: Duration = Duration::from_millis(2000);
pub const FTP_CONNECT_BACKOFF_FACTOR: f64 = 1.5;
pub const FTP_CONNECT_DEADLINE: Duration = Duration::from_secs(30);
