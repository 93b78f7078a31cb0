use crate::error::{Result, ServiceError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_ENV: &str = "ULP_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "ulp.toml";

/// Process-level configuration, deserialized from TOML. Every field has a
/// default, so a missing config file means "run with defaults".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Directory of flat corpus files (one record per line).
    pub corpus_dir: PathBuf,
    /// Directory for the account snapshot and the transaction journal.
    pub state_dir: PathBuf,
    /// Size the daily pool is restored to on each calendar-day reset.
    pub daily_cap: u32,
    /// One-time bonus credited to a referrer per referred account.
    pub referral_bonus: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from("data/corpus"),
            state_dir: PathBuf::from("data/state"),
            daily_cap: 2,
            referral_bonus: 1,
        }
    }
}

impl ServiceConfig {
    /// Load from `$ULP_CONFIG`, falling back to `./ulp.toml`, falling back
    /// to defaults when neither exists.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if path.exists() {
            Self::from_path(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| ServiceError::ConfigError(format!("{}: {e}", path.display())))
    }
}
