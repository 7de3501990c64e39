//! Duration parsing and serde codecs shared across the deposit engine's
//! configuration and retry types.
//!
//! Every timing knob in a repository config — connect timeouts, poll
//! intervals, task deadlines — accepts either a human-readable string
//! (`"30s"`, `"2m"`, parsed via [`humantime`]) or a plain integer number of
//! milliseconds, so operators can write whichever is natural in TOML.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum DurationHelper {
    Humantime(String),
    Millis(u64),
}

/// Deserialize a [`Duration`] from either a humantime string or a millisecond count.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match DurationHelper::deserialize(deserializer)? {
        DurationHelper::Humantime(s) => humantime::parse_duration(&s)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration {s:?}: {e}"))),
        DurationHelper::Millis(ms) => Ok(Duration::from_millis(ms)),
    }
}

/// Serialize a [`Duration`] as a humantime string (e.g. `"30s"`).
pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    humantime::format_duration(*duration)
        .to_string()
        .serialize(serializer)
}

/// Deserialize an `Option<Duration>`, treating `null`/absent as `None`.
pub fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<DurationHelper>::deserialize(deserializer)? {
        None => Ok(None),
        Some(DurationHelper::Humantime(s)) => humantime::parse_duration(&s)
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration {s:?}: {e}"))),
        Some(DurationHelper::Millis(ms)) => Ok(Some(Duration::from_millis(ms))),
    }
}

/// Parse a CLI-supplied duration string, accepted by both humantime form and bare milliseconds.
pub fn parse_cli_duration(s: &str) -> Result<Duration, String> {
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }
    humantime::parse_duration(s).map_err(|e| format!("invalid duration {s:?}: {e}"))
}
