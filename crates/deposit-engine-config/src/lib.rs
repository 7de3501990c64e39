//! Configuration Registry (C10): the single typed, keyed map of per-target
//! repository configuration — assembler options, transport credentials,
//! status mapping — loaded once at startup and treated as immutable
//! thereafter (§5: "no in-process shared mutable state crosses task
//! boundaries except (i) the configuration registry (immutable after
//! load)").
//!
//! # Example
//!
//! ```no_run
//! use deposit_engine_config::load_registry;
//! use std::path::Path;
//!
//! let registry = load_registry(Path::new("deposit-engine.toml")).expect("load config");
//! for repository in registry.repositories() {
//!     println!("{}", repository.logical_key);
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use deposit_engine_types::repository::{AssemblerSettings, StatusMapping};
use deposit_engine_types::transport::{AuthRealm, ProtocolHints, TransportHints};
use deposit_engine_types::{Repository, RepositoryId};

/// On-disk shape of one `[repositories.<key>]` section (§6 "Configuration").
/// `transport-config.auth-realms` is a list on the wire — a discriminated
/// union per realm — but exactly one realm must resolve per repository;
/// zero or more than one is a configuration error rather than a silent
/// pick, consistent with the redesign note against ambiguous fallbacks (§9).
#[derive(Debug, Clone, Deserialize, Serialize)]
struct RepositorySection {
    #[serde(rename = "logical-key")]
    logical_key: String,
    #[serde(rename = "transport-config")]
    transport_config: TransportConfigSection,
    assembler: AssemblerSection,
    #[serde(rename = "repository-depositconfig")]
    deposit_config: DepositConfigSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct TransportConfigSection {
    #[serde(flatten)]
    hints: TransportHints,
    #[serde(rename = "auth-realms", default)]
    auth_realms: Vec<AuthRealm>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct AssemblerSection {
    options: AssemblerSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct DepositConfigSection {
    #[serde(rename = "deposit-processing")]
    deposit_processing: DepositProcessingSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct DepositProcessingSection {
    #[serde(rename = "status-mapping", default)]
    status_mapping: BTreeMap<String, StatusMapping>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct RegistryFile {
    #[serde(default)]
    repositories: BTreeMap<String, RepositorySection>,
}

/// The loaded, immutable configuration registry (C10).
#[derive(Debug, Clone, Default)]
pub struct ConfigRegistry {
    by_key: BTreeMap<String, Repository>,
}

impl ConfigRegistry {
    pub fn repositories(&self) -> impl Iterator<Item = &Repository> {
        self.by_key.values()
    }

    pub fn get(&self, logical_key: &str) -> Option<&Repository> {
        self.by_key.get(logical_key)
    }

    fn from_file(file: RegistryFile) -> Result<Self> {
        let mut by_key = BTreeMap::new();
        for (key, section) in file.repositories {
            let repository = resolve_repository(&key, section)?;
            by_key.insert(key, repository);
        }
        Ok(Self { by_key })
    }
}

fn resolve_repository(key: &str, section: RepositorySection) -> Result<Repository> {
    let auth_realm = match section.transport_config.auth_realms.len() {
        1 => Some(section.transport_config.auth_realms.into_iter().next().unwrap()),
        0 => None,
        n => bail!(
            "repository '{key}': expected exactly one auth-realm, found {n}"
        ),
    };
    let mut transport = section.transport_config.hints;
    transport.auth_realm = auth_realm;
    validate_protocol_hints(key, &transport.protocol)?;

    Ok(Repository {
        id: RepositoryId::from(key),
        logical_key: section.logical_key,
        transport,
        assembler: section.assembler.options,
        status_mapping: section.deposit_config.deposit_processing.status_mapping,
    })
}

fn validate_protocol_hints(key: &str, hints: &ProtocolHints) -> Result<()> {
    match hints {
        ProtocolHints::Ftp(ftp) if ftp.base_directory.is_empty() => {
            bail!("repository '{key}': ftp.base-directory must not be empty")
        }
        ProtocolHints::SwordV2(sword) if sword.service_doc_url.is_empty() => {
            bail!("repository '{key}': SWORDv2 service-doc-url must not be empty")
        }
        _ => Ok(()),
    }
}

/// Load the registry from a single TOML file (§6).
pub fn load_registry(path: &Path) -> Result<ConfigRegistry> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    load_registry_str(&content)
}

/// Parse the registry from an in-memory TOML document.
pub fn load_registry_str(content: &str) -> Result<ConfigRegistry> {
    let file: RegistryFile =
        toml::from_str(content).context("failed to parse configuration registry")?;
    ConfigRegistry::from_file(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[repositories.pmc]
logical-key = "pmc"

[repositories.pmc.transport-config]
auth_mode = "userpass"
server_fqdn = "ftp.example.org"
server_port = 21
protocol = "ftp"
transfer_mode = "stream"
data_type = "binary"
use_pasv = true
base_directory = "/logs/upload/%s"

[[repositories.pmc.transport-config.auth-realms]]
mech = "basic"
username = "svc"
password = "secret"

[repositories.pmc.assembler.options]
spec = "NIHMS-native-2017-07"
archive = "tar"
compression = "gzip"
algorithms = ["md5"]

[repositories.pmc.repository-depositconfig.deposit-processing.status-mapping]
"#;

    #[test]
    fn loads_single_repository() {
        let registry = load_registry_str(SAMPLE).expect("parse");
        let repo = registry.get("pmc").expect("pmc present");
        assert_eq!(repo.logical_key, "pmc");
        assert_eq!(repo.assembler.spec, "NIHMS-native-2017-07");
        assert!(repo.transport.auth_realm.is_some());
    }

    #[test]
    fn zero_auth_realms_leaves_none() {
        let content = SAMPLE.replacen(
            r#"[[repositories.pmc.transport-config.auth-realms]]
mech = "basic"
username = "svc"
password = "secret"
"#,
            "",
            1,
        );
        let registry = load_registry_str(&content).expect("parse");
        let repo = registry.get("pmc").expect("pmc present");
        assert!(repo.transport.auth_realm.is_none());
    }

    #[test]
    fn multiple_auth_realms_is_rejected() {
        let content = format!(
            "{SAMPLE}\n[[repositories.pmc.transport-config.auth-realms]]\nmech = \"basic\"\nusername = \"other\"\npassword = \"secret2\"\n"
        );
        let err = load_registry_str(&content).unwrap_err();
        assert!(err.to_string().contains("exactly one auth-realm"));
    }

    #[test]
    fn empty_ftp_base_directory_is_rejected() {
        let content = SAMPLE.replace(r#"base_directory = "/logs/upload/%s""#, r#"base_directory = """#);
        let err = load_registry_str(&content).unwrap_err();
        assert!(err.to_string().contains("base-directory must not be empty"));
    }

    #[test]
    fn missing_file_errors() {
        let err = load_registry(Path::new("/nonexistent/deposit-engine.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
