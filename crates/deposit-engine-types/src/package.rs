//! Archive/compression/checksum vocabulary plus `PackageMetadata` and
//! `Resource`, the metadata carried alongside a `PackageStream` (§3, §4.3).
//! The stream itself — the lazy, forward-only byte source — lives in
//! `deposit-engine::assembler`, which is where an actual `Read` impl
//! belongs; this crate only describes its attached metadata.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    None,
    Tar,
    Zip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionFormat {
    None,
    Gzip,
    Zip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumAlgorithm {
    Md5,
    Sha256,
    Sha512,
}

/// Checksums attached to a [`Resource`] once its bytes have been fully
/// tee'd through the configured digest(s) (§4.3).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha512: Option<String>,
}

impl ChecksumSet {
    pub fn get(&self, algorithm: ChecksumAlgorithm) -> Option<&str> {
        match algorithm {
            ChecksumAlgorithm::Md5 => self.md5.as_deref(),
            ChecksumAlgorithm::Sha256 => self.sha256.as_deref(),
            ChecksumAlgorithm::Sha512 => self.sha512.as_deref(),
        }
    }
}

/// Logical entry within a package (§3): one custodial file or one metadata
/// entry, named and checksummed once its bytes have been fully written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub byte_length: u64,
    pub checksums: ChecksumSet,
}

/// Metadata attached to a `PackageStream` (§3): everything a transport
/// adapter needs about the package without reading its bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub spec_uri: String,
    pub mime: String,
    /// `-1` (represented as `None` here) when the final size is unknown
    /// up front because the stream is still being produced (§3).
    pub size: Option<u64>,
    pub archive: ArchiveFormat,
    pub compression: CompressionFormat,
    pub checksums: ChecksumSet,
    /// Verbatim submission-meta JSON, preserved for collection-hint routing (§4.4.2).
    pub submission_meta: String,
}

impl PackageMetadata {
    /// `hints.collection-tags` extracted from `submission_meta`, if present (§4.4.2 rule 1).
    pub fn collection_tags(&self) -> Vec<String> {
        let parsed: serde_json::Value = match serde_json::from_str(&self.submission_meta) {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };
        parsed
            .get("hints")
            .and_then(|h| h.get("collection-tags"))
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_tags_extracted_case_preserving() {
        let meta = PackageMetadata {
            name: "pkg".into(),
            spec_uri: "SimpleZip".into(),
            mime: "application/zip".into(),
            size: None,
            archive: ArchiveFormat::Zip,
            compression: CompressionFormat::Zip,
            checksums: ChecksumSet::default(),
            submission_meta: r#"{"hints":{"collection-tags":["covid","nobel"]}}"#.into(),
        };
        assert_eq!(meta.collection_tags(), vec!["covid", "nobel"]);
    }

    #[test]
    fn missing_hints_yields_empty() {
        let meta = PackageMetadata {
            name: "pkg".into(),
            spec_uri: "SimpleZip".into(),
            mime: "application/zip".into(),
            size: None,
            archive: ArchiveFormat::Zip,
            compression: CompressionFormat::Zip,
            checksums: ChecksumSet::default(),
            submission_meta: "{}".into(),
        };
        assert!(meta.collection_tags().is_empty());
    }

    #[test]
    fn malformed_meta_is_tolerated() {
        let meta = PackageMetadata {
            name: "pkg".into(),
            spec_uri: "SimpleZip".into(),
            mime: "application/zip".into(),
            size: None,
            archive: ArchiveFormat::Zip,
            compression: CompressionFormat::Zip,
            checksums: ChecksumSet::default(),
            submission_meta: "not json".into(),
        };
        assert!(meta.collection_tags().is_empty());
    }
}
