//! Persistence configuration via `tessera.toml`
//!
//! One flat file next to the application. Missing fields take their
//! defaults; unknown values are rejected when the file is read, not when
//! the setting is first used.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tessera_core::{BoolPolicy, Error, Result};

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "tessera.toml";

/// Which save/delete path is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceMode {
    /// Scripts when the store supports them, the locking fallback otherwise
    Auto,
    /// Always the atomic scripts
    Script,
    /// Always the locking fallback
    Lock,
}

/// Settings of the per-entity advisory lock used by the fallback path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockConfig {
    /// Lock lifetime in milliseconds; a holder that crashes frees the
    /// lock after this long (default: 5000)
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    /// Give up acquiring after this many milliseconds (default: 10000)
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// First backoff sleep in milliseconds (default: 1)
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    /// Backoff ceiling in milliseconds (default: 64)
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_ttl_ms() -> u64 {
    5000
}

fn default_acquire_timeout_ms() -> u64 {
    10_000
}

fn default_backoff_initial_ms() -> u64 {
    1
}

fn default_backoff_max_ms() -> u64 {
    64
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl LockConfig {
    /// Lock lifetime
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Acquisition deadline
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.ttl_ms == 0 {
            return Err(config_error("lock.ttl_ms must be greater than 0"));
        }
        if self.backoff_initial_ms == 0 || self.backoff_initial_ms > self.backoff_max_ms {
            return Err(config_error(
                "lock.backoff_initial_ms must be > 0 and <= lock.backoff_max_ms",
            ));
        }
        Ok(())
    }
}

/// Configuration loaded from `tessera.toml`.
///
/// # Example
///
/// ```toml
/// mode = "auto"
/// false_booleans = "string"
///
/// [lock]
/// ttl_ms = 5000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TesseraConfig {
    /// Save/delete path: `"auto"`, `"script"` or `"lock"`.
    #[serde(default = "default_mode_str")]
    pub mode: String,
    /// Directory holding `save.proc`/`delete.proc` listings; the
    /// compiled-in listings are used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts_dir: Option<PathBuf>,
    /// How `false` is stored: `"string"` or `"omit"`.
    #[serde(default = "default_false_booleans_str")]
    pub false_booleans: String,
    /// Advisory lock settings.
    #[serde(default)]
    pub lock: LockConfig,
}

fn default_mode_str() -> String {
    "auto".to_string()
}

fn default_false_booleans_str() -> String {
    "string".to_string()
}

impl Default for TesseraConfig {
    fn default() -> Self {
        Self {
            mode: default_mode_str(),
            scripts_dir: None,
            false_booleans: default_false_booleans_str(),
            lock: LockConfig::default(),
        }
    }
}

fn config_error(reason: impl Into<String>) -> Error {
    Error::Config {
        reason: reason.into(),
    }
}

impl TesseraConfig {
    /// Parse the mode string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"auto"`, `"script"` or `"lock"`.
    pub fn persistence_mode(&self) -> Result<PersistenceMode> {
        match self.mode.as_str() {
            "auto" => Ok(PersistenceMode::Auto),
            "script" => Ok(PersistenceMode::Script),
            "lock" => Ok(PersistenceMode::Lock),
            other => Err(config_error(format!(
                "Invalid mode '{}' in tessera.toml. Expected \"auto\", \"script\" or \"lock\".",
                other
            ))),
        }
    }

    /// Parse the `false_booleans` string.
    pub fn bool_policy(&self) -> Result<BoolPolicy> {
        match self.false_booleans.as_str() {
            "string" => Ok(BoolPolicy::String),
            "omit" => Ok(BoolPolicy::OmitFalse),
            other => Err(config_error(format!(
                "Invalid false_booleans '{}' in tessera.toml. Expected \"string\" or \"omit\".",
                other
            ))),
        }
    }

    /// Check every field.
    pub fn validate(&self) -> Result<()> {
        self.persistence_mode()?;
        self.bool_policy()?;
        self.lock.validate()
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Tessera configuration
#
# Save/delete path: "auto" (default), "script" or "lock"
#   "auto"   = atomic scripts if the store supports them, else the lock fallback
#   "script" = always atomic scripts
#   "lock"   = always the per-entity lock fallback
mode = "auto"

# Directory with save.proc / delete.proc listings (default: built-in listings)
# scripts_dir = "scripts"

# How boolean false is stored: "string" (default) writes "false",
# "omit" leaves the field out of the hash
false_booleans = "string"

[lock]
ttl_ms = 5000
acquire_timeout_ms = 10000
backoff_initial_ms = 1
backoff_max_ms = 64
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Io {
            reason: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml(&content)
            .map_err(|e| config_error(format!("'{}': {}", path.display(), e)))
    }

    /// Parse and validate config text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: TesseraConfig =
            toml::from_str(content).map_err(|e| config_error(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| Error::Io {
                reason: format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ),
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| config_error(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| Error::Io {
            reason: format!("Failed to write config file '{}': {}", path.display(), e),
        })
    }
}
