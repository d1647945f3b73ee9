//! Settings stored in `converge.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::inherit::InheritPolicy;
use crate::io::shell::DEFAULT_OUTPUT_LIMIT_BYTES;

/// Converge configuration (TOML).
///
/// Missing fields default to the values below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConvergeConfig {
    /// Truncate captured command stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    pub guard: GuardConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GuardConfig {
    /// Timeout for command guards that do not set `timeout_secs`.
    pub timeout_secs: u64,

    /// How inherited attributes overwrite anonymous resource defaults.
    pub inherit_policy: InheritPolicy,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            inherit_policy: InheritPolicy::default(),
        }
    }
}

impl GuardConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ConvergeConfig {
    fn default() -> Self {
        Self {
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            guard: GuardConfig::default(),
        }
    }
}

impl ConvergeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.guard.timeout_secs == 0 {
            return Err(anyhow!("guard.timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ConvergeConfig::default()`.
pub fn load_config(path: &Path) -> Result<ConvergeConfig> {
    if !path.exists() {
        let cfg = ConvergeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ConvergeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ConvergeConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
