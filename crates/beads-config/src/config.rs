//! Configuration types and loading for the beads system.
//!
//! The main entry point is [`BeadsConfig`], the contents of
//! `.beads/config.yaml`. Loading layers the YAML file under `BEADS_*`
//! environment overrides via figment; saving writes plain YAML so the file
//! stays human-editable.

use std::collections::HashMap;
use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or written.
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// The configuration file contained invalid YAML.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Figment layering failed.
    #[error("failed to load config: {0}")]
    Load(#[from] Box<figment::Error>),
}

/// A specialized `Result` type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Custom types configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TypesConfig {
    /// Comma-separated list of custom issue types.
    #[serde(default)]
    pub custom: String,
}

/// Flush scheduling configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushConfig {
    /// Debounce window between a mutation and its export, in milliseconds.
    #[serde(default = "default_debounce_ms", rename = "debounce-ms")]
    pub debounce_ms: u64,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    500
}

/// Retention configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Days a tombstone (and its manifest entry) survives before cleanup.
    #[serde(default = "default_tombstone_days", rename = "tombstone-days")]
    pub tombstone_days: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            tombstone_days: default_tombstone_days(),
        }
    }
}

fn default_tombstone_days() -> u64 {
    30
}

/// Daemon configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Whether the CLI should route through a daemon when one is running.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Main config struct
// ---------------------------------------------------------------------------

/// The full beads configuration, corresponding to `.beads/config.yaml`.
///
/// All fields use serde defaults so a partially-specified YAML file
/// deserializes with sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BeadsConfig {
    /// Issue ID prefix (e.g., `"bd"`).
    #[serde(default, rename = "issue-prefix")]
    pub prefix: Option<String>,

    /// Output JSON instead of human-readable text.
    #[serde(default)]
    pub json: bool,

    /// Skip the database entirely and operate on JSONL alone.
    #[serde(default, rename = "no-db")]
    pub no_db: bool,

    /// Actor identity override.
    #[serde(default)]
    pub actor: Option<String>,

    /// Custom issue types.
    #[serde(default)]
    pub types: TypesConfig,

    /// Flush scheduling.
    #[serde(default)]
    pub flush: FlushConfig,

    /// Tombstone retention.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Daemon behavior.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Integration credentials and endpoints, keyed by system name.
    #[serde(default)]
    pub integrations: HashMap<String, String>,
}

impl BeadsConfig {
    /// Returns custom types as trimmed, non-empty strings.
    pub fn custom_types(&self) -> Vec<String> {
        parse_comma_list(&self.types.custom)
    }

    /// The configured prefix, or the default `"bd"`.
    pub fn prefix_or_default(&self) -> &str {
        self.prefix.as_deref().unwrap_or("bd")
    }
}

/// Parses a comma-separated string into trimmed, non-empty strings.
fn parse_comma_list(s: &str) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    s.split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Loads configuration from `config.yaml` inside the given `.beads/`
/// directory, with `BEADS_*` environment variables layered on top
/// (e.g. `BEADS_JSON=true`, `BEADS_ISSUE_PREFIX=proj`).
pub fn load_config(beads_dir: &Path) -> Result<BeadsConfig> {
    let config_path = beads_dir.join("config.yaml");

    let mut figment = Figment::from(Serialized::defaults(BeadsConfig::default()));
    if config_path.exists() {
        figment = figment.merge(Yaml::file(&config_path));
    }
    figment = figment.merge(Env::prefixed("BEADS_").map(|key| {
        // BEADS_ISSUE_PREFIX -> issue-prefix, BEADS_NO_DB -> no-db
        key.as_str().to_lowercase().replace('_', "-").into()
    }));

    let config = figment.extract().map_err(Box::new)?;
    Ok(config)
}

/// Saves configuration to `config.yaml` inside the given `.beads/`
/// directory, creating it if needed.
pub fn save_config(beads_dir: &Path, config: &BeadsConfig) -> Result<()> {
    std::fs::create_dir_all(beads_dir)?;
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(beads_dir.join("config.yaml"), yaml)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config() {
        let cfg = BeadsConfig::default();
        assert!(cfg.prefix.is_none());
        assert_eq!(cfg.prefix_or_default(), "bd");
        assert_eq!(cfg.flush.debounce_ms, 500);
        assert_eq!(cfg.retention.tombstone_days, 30);
        assert!(cfg.daemon.enabled);
        assert!(cfg.custom_types().is_empty());
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(dir.path()).unwrap();
        assert!(cfg.prefix.is_none());
    }

    #[test]
    fn roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = BeadsConfig::default();
        cfg.prefix = Some("proj".into());
        cfg.types.custom = "gate, wisp".into();
        cfg.retention.tombstone_days = 7;

        save_config(dir.path(), &cfg).unwrap();
        let loaded = load_config(dir.path()).unwrap();
        assert_eq!(loaded.prefix.as_deref(), Some("proj"));
        assert_eq!(loaded.custom_types(), vec!["gate", "wisp"]);
        assert_eq!(loaded.retention.tombstone_days, 7);
    }

    #[test]
    fn partial_yaml_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "issue-prefix: proj\njson: true\n",
        )
        .unwrap();
        let cfg = load_config(dir.path()).unwrap();
        assert_eq!(cfg.prefix.as_deref(), Some("proj"));
        assert!(cfg.json);
        assert_eq!(cfg.flush.debounce_ms, 500);
    }

    #[test]
    fn parse_comma_list_variants() {
        assert_eq!(parse_comma_list(""), Vec::<String>::new());
        assert_eq!(parse_comma_list("a, b, c"), vec!["a", "b", "c"]);
        assert_eq!(parse_comma_list(",,"), Vec::<String>::new());
    }
}
