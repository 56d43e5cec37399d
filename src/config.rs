/*!
 * Sandbox Configuration
 * Serde-loadable settings with environment overrides
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::core::limits::{
    BRIDGE_PAYLOAD_CAPACITY, BRIDGE_POLL_INTERVAL, DEFAULT_BOOT_TIMEOUT, DEFAULT_SERVE_PREFIX,
};
use crate::vfs::VfsSnapshot;

pub const ENV_ALLOWED_HOSTS: &str = "SANDBOX_ALLOWED_HOSTS";
pub const ENV_BOOT_TIMEOUT_MS: &str = "SANDBOX_BOOT_TIMEOUT_MS";
pub const ENV_BRIDGE_CAPACITY: &str = "SANDBOX_BRIDGE_CAPACITY";
pub const ENV_TRACE_JSON: &str = "SANDBOX_TRACE_JSON";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid sandbox config: {0}")]
    Parse(String),
}

/// Settings for one sandbox instance
///
/// Durations are given in milliseconds on the wire. `seed_files` holds
/// plain text contents keyed by absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SandboxConfig {
    #[serde(with = "millis")]
    pub boot_timeout: Duration,
    /// `None` allows every host; an empty list allows none
    pub allowed_hosts: Option<Vec<String>>,
    pub bridge_capacity: usize,
    #[serde(with = "millis")]
    pub bridge_poll_interval: Duration,
    #[serde(with = "millis")]
    pub fetch_timeout: Duration,
    pub serve_prefix: String,
    pub env: BTreeMap<String, String>,
    pub cwd: String,
    pub seed_files: BTreeMap<String, String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            boot_timeout: DEFAULT_BOOT_TIMEOUT,
            allowed_hosts: None,
            bridge_capacity: BRIDGE_PAYLOAD_CAPACITY,
            bridge_poll_interval: BRIDGE_POLL_INTERVAL,
            fetch_timeout: Duration::from_secs(30),
            serve_prefix: DEFAULT_SERVE_PREFIX.to_string(),
            env: BTreeMap::new(),
            cwd: "/".to_string(),
            seed_files: BTreeMap::new(),
        }
    }
}

impl SandboxConfig {
    /// Defaults overridden by `SANDBOX_*` environment variables
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Apply overrides from any key lookup; unparsable values are ignored
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(hosts) = lookup(ENV_ALLOWED_HOSTS) {
            self.allowed_hosts = Some(
                hosts
                    .split(',')
                    .map(str::trim)
                    .filter(|host| !host.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
        }
        if let Some(raw) = lookup(ENV_BOOT_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.boot_timeout = Duration::from_millis(ms),
                Err(_) => warn!(value = %raw, "ignoring invalid {ENV_BOOT_TIMEOUT_MS}"),
            }
        }
        if let Some(raw) = lookup(ENV_BRIDGE_CAPACITY) {
            match raw.trim().parse::<usize>() {
                Ok(capacity) if capacity > 0 => self.bridge_capacity = capacity,
                _ => warn!(value = %raw, "ignoring invalid {ENV_BRIDGE_CAPACITY}"),
            }
        }
        self
    }

    #[must_use]
    pub fn with_file(mut self, path: &str, contents: impl Into<String>) -> Self {
        self.seed_files.insert(path.to_string(), contents.into());
        self
    }

    #[must_use]
    pub fn with_allowed_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_hosts = Some(hosts.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_boot_timeout(mut self, timeout: Duration) -> Self {
        self.boot_timeout = timeout;
        self
    }

    /// Seed files as a snapshot
    pub fn seed_snapshot(&self) -> VfsSnapshot {
        VfsSnapshot::from_files(self.seed_files.iter())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
