//! Runtime configuration (TOML)
//!
//! Missing fields fall back to defaults, a missing file yields
//! `RuntimeConfig::default()`. Every load is followed by `validate()`.
//!
//! ```toml
//! max_commit_retries = 16
//! journal = true
//!
//! [analysis]
//! max_source_bytes = 1048576
//! max_nesting_depth = 64
//!
//! [policy]
//! owner = "QUBIC-OWNER-ID"
//! protected_keys = ["owner"]
//!
//! [policy.privileged]
//! send_funds = "transfer"
//! get_contract_balance = "balance_read"
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::policy::OwnershipPolicy;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Retries after a failed optimistic commit before giving up
    pub max_commit_retries: u32,

    /// Record completed invocations in the journal
    pub journal: bool,

    pub analysis: AnalysisLimits,

    pub policy: OwnershipPolicy,
}

/// Bounds on untrusted source handed to the checker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisLimits {
    pub max_source_bytes: usize,
    pub max_nesting_depth: usize,
}

impl Default for AnalysisLimits {
    fn default() -> Self {
        Self {
            max_source_bytes: 1024 * 1024,
            max_nesting_depth: 64,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_commit_retries: 16,
            journal: true,
            analysis: AnalysisLimits::default(),
            policy: OwnershipPolicy::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.analysis.max_source_bytes == 0 {
            return Err(Error::ConfigError(
                "analysis.max_source_bytes must be > 0".into(),
            ));
        }
        if self.analysis.max_nesting_depth == 0 {
            return Err(Error::ConfigError(
                "analysis.max_nesting_depth must be > 0".into(),
            ));
        }
        self.policy.validate()
    }

    /// Parse and validate TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let cfg: RuntimeConfig =
            toml::from_str(text).map_err(|e| Error::ConfigError(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::ConfigError(e.to_string()))
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RuntimeConfig::default()`.
pub fn load_config(path: &Path) -> Result<RuntimeConfig> {
    if !path.exists() {
        let cfg = RuntimeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path)
        .map_err(|e| Error::ConfigError(format!("read {}: {}", path.display(), e)))?;
    RuntimeConfig::from_toml(&contents)
        .map_err(|e| Error::ConfigError(format!("parse {}: {}", path.display(), e)))
}
