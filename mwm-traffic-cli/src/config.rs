use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// The `traffic` section of the JSON config file.
///
/// ```json
/// {
///   "traffic": {
///     "base_url": "https://traffic.example.com/",
///     "keys_dir": "/data/traffic-keys",
///     "timeout_secs": 10
///   }
/// }
/// ```
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrafficConfig {
    pub base_url: Option<String>,
    pub keys_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    traffic: TrafficConfig,
}

impl TrafficConfig {
    pub fn from_json(bytes: &[u8]) -> anyhow::Result<Self> {
        let file: ConfigFile =
            serde_json::from_slice(bytes).context("Invalid JSON in traffic config")?;
        Ok(file.traffic)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        Self::from_json(&bytes)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}
