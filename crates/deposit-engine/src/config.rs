//! Runtime configuration (§4.8, §5): the knobs that govern the process as
//! a whole rather than any single repository — worker pool size, the
//! ingest loop's self-agent name, and the refresh/shutdown timing. The
//! per-repository registry itself lives in
//! [`deposit_engine_config::ConfigRegistry`]; this module loads the
//! `[runtime]` table from the same configuration file and hands the
//! Dispatcher (C8) what it needs to drive that registry.

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use deposit_engine_config::ConfigRegistry;
use deposit_engine_duration::{deserialize_duration, serialize_duration};

use crate::scheduler::DEFAULT_SHUTDOWN_WAIT;

fn default_self_agent() -> String {
    "deposit-engine".to_string()
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1)
}

/// Refresh loop cadence (§4.8: "periodically enumerates `submitted`
/// deposits"); 60s absent an operator-supplied value.
fn default_refresh_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_shutdown_wait() -> Duration {
    DEFAULT_SHUTDOWN_WAIT
}

/// Runtime options for the `deposit-engine` process, loaded from the
/// `[runtime]` table of the same configuration file that carries the
/// per-repository registry (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuntimeOptions {
    /// Agent name the ingest loop refuses to re-ingest its own events from (§4.1).
    #[serde(default = "default_self_agent")]
    pub self_agent: String,

    /// Worker pool size; defaults to the host's logical core count (§4.8).
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Refresh loop sweep interval (§4.8).
    #[serde(
        default = "default_refresh_interval",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub refresh_interval: Duration,

    /// Maximum time `listen`'s shutdown path waits for in-flight workers (§4.8, §5).
    #[serde(
        default = "default_shutdown_wait",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub shutdown_wait: Duration,

    /// Base URL of the source-of-truth repository's HTTP API (§6).
    pub source_repository_url: String,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            self_agent: default_self_agent(),
            worker_count: default_worker_count(),
            refresh_interval: default_refresh_interval(),
            shutdown_wait: default_shutdown_wait(),
            source_repository_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct RuntimeFile {
    #[serde(default)]
    runtime: Option<RuntimeOptions>,
}

/// Load [`RuntimeOptions`] from the `[runtime]` table of `path`, defaulting
/// any field the file omits (including the whole table).
pub fn load_runtime_options(path: &Path) -> Result<RuntimeOptions> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let file: RuntimeFile =
        toml::from_str(&content).context("failed to parse [runtime] configuration")?;
    Ok(file.runtime.unwrap_or_default())
}

/// Load the per-repository [`ConfigRegistry`] from the same file (§6).
pub fn load_registry(path: &Path) -> Result<ConfigRegistry> {
    deposit_engine_config::load_registry(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_runtime_table_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[repositories]").unwrap();
        let opts = load_runtime_options(file.path()).unwrap();
        assert_eq!(opts.self_agent, "deposit-engine");
        assert_eq!(opts.shutdown_wait, DEFAULT_SHUTDOWN_WAIT);
    }

    #[test]
    fn explicit_runtime_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[runtime]
self-agent = "deposit-engine-staging"
worker-count = 4
refresh-interval = "30s"
shutdown-wait = "5s"
source-repository-url = "https://source.example.org"
"#
        )
        .unwrap();
        let opts = load_runtime_options(file.path()).unwrap();
        assert_eq!(opts.self_agent, "deposit-engine-staging");
        assert_eq!(opts.worker_count, 4);
        assert_eq!(opts.refresh_interval, Duration::from_secs(30));
        assert_eq!(opts.shutdown_wait, Duration::from_secs(5));
        assert_eq!(opts.source_repository_url, "https://source.example.org");
    }

    #[test]
    fn empty_file_uses_every_default() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let opts = load_runtime_options(file.path()).unwrap();
        assert!(opts.worker_count >= 1);
        assert_eq!(opts.refresh_interval, Duration::from_secs(60));
    }
}
