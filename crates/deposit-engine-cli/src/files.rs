//! Custodial file resolution for the CLI binary (§3: "the on-disk bytes of
//! individual custodial files" are explicitly out of the core's scope).
//! Locators are treated as paths relative to a configured root, which is
//! this adapter's own choice of locator scheme.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};

use deposit_engine::assembler::CustodialFileSource;

pub struct FilesystemFileSource {
    root: PathBuf,
}

impl FilesystemFileSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl CustodialFileSource for FilesystemFileSource {
    fn open(&self, locator: &str) -> Result<Box<dyn Read + Send>> {
        let path = self.root.join(locator);
        let file = File::open(&path).with_context(|| format!("opening custodial file {}", path.display()))?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn opens_a_file_relative_to_the_configured_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("manuscript.pdf"), b"contents").unwrap();

        let source = FilesystemFileSource::new(dir.path().to_path_buf());
        let mut contents = Vec::new();
        source.open("manuscript.pdf").unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"contents");
    }

    #[test]
    fn missing_locator_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let source = FilesystemFileSource::new(dir.path().to_path_buf());
        assert!(source.open("does-not-exist.pdf").is_err());
    }
}
