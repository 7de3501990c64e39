//! `Repository` (§3): the per-target-repository configuration record that
//! backs the Configuration Registry (C10, §4.10 in the original component
//! table; see §6 "Configuration").

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::RepositoryId;
use crate::package::{ArchiveFormat, ChecksumAlgorithm, CompressionFormat};
use crate::transport::TransportSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblerSettings {
    /// Packaging profile URI (e.g. `NIHMS-native-2017-07`, `DSpace-METS-SIP`, `SimpleZip`).
    pub spec: String,
    pub archive: ArchiveFormat,
    pub compression: CompressionFormat,
    pub algorithms: Vec<ChecksumAlgorithm>,
}

/// Status-mapping table (§4.5): per-source keys to a canonical status name,
/// with `*` as a configurable wildcard default. Exact match wins over
/// wildcard (§9, resolved open question).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusMapping {
    #[serde(flatten)]
    pub entries: BTreeMap<String, String>,
}

impl StatusMapping {
    const WILDCARD: &'static str = "*";

    /// Resolve a source status term to the configured canonical status.
    /// `None` means "status unknown; try again later" (§4.5).
    pub fn resolve(&self, term: &str) -> Option<&str> {
        let lower = term.to_ascii_lowercase();
        if let Some(exact) = self
            .entries
            .iter()
            .find(|(k, _)| k.to_ascii_lowercase() == lower)
        {
            return Some(exact.1.as_str());
        }
        self.entries.get(Self::WILDCARD).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    pub logical_key: String,
    pub transport: TransportSettings,
    pub assembler: AssemblerSettings,
    /// Keyed by status-probe "source" (e.g. the Atom statement kind); see §4.5.
    pub status_mapping: BTreeMap<String, StatusMapping>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> StatusMapping {
        StatusMapping {
            entries: BTreeMap::from([
                ("http://purl.org/net/sword/terms/archived".to_string(), "accepted".to_string()),
                ("*".to_string(), "submitted".to_string()),
            ]),
        }
    }

    #[test]
    fn exact_beats_wildcard() {
        let m = mapping();
        assert_eq!(
            m.resolve("http://purl.org/net/sword/terms/archived"),
            Some("accepted")
        );
    }

    #[test]
    fn unmatched_falls_to_wildcard() {
        let m = mapping();
        assert_eq!(
            m.resolve("http://purl.org/net/sword/terms/inProgress"),
            Some("submitted")
        );
    }

    #[test]
    fn case_insensitive_on_the_right_hand_identifier() {
        let m = mapping();
        assert_eq!(
            m.resolve("HTTP://PURL.ORG/NET/SWORD/TERMS/ARCHIVED"),
            Some("accepted")
        );
    }

    #[test]
    fn no_wildcard_configured_yields_none() {
        let m = StatusMapping {
            entries: BTreeMap::from([("exact-only".to_string(), "accepted".to_string())]),
        };
        assert_eq!(m.resolve("something-else"), None);
    }
}
