//! Layered YAML configuration: one or more filesets, each validated at
//! construction time.
//!
//! Grounded in the teacher's `settings_manager.rs` per-field
//! `#[serde(default = "...")]` pattern; there is no schema-validation crate
//! in the corpus analogous to the Python original's `jsonschema`, so
//! validation is hand-written here, same as the teacher does for its own
//! settings structs.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

fn default_extension() -> String {
  "mtbl".to_string()
}

fn default_frequency() -> u64 {
  1800
}

fn default_retry_timeout() -> u64 {
  60
}

fn default_max_downloads() -> usize {
  4
}

/// One fileset's configuration, as read from YAML.
#[derive(Debug, Clone, Deserialize)]
pub struct FilesetConfig {
  pub fileset_uri: Option<String>,
  pub destination: Option<PathBuf>,
  pub base: Option<String>,
  #[serde(default = "default_extension")]
  pub extension: String,
  #[serde(default = "default_frequency")]
  pub frequency: u64,
  pub download_timeout: Option<u64>,
  #[serde(default = "default_retry_timeout")]
  pub retry_timeout: u64,
  #[serde(default = "default_max_downloads")]
  pub max_downloads: usize,
  pub apikey: Option<String>,
  pub validator: Option<PathBuf>,
  #[serde(default)]
  pub digest_required: bool,
  #[serde(default)]
  pub minimal: bool,
}

/// The full configuration file: a named map of fileset configurations.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub filesets: std::collections::BTreeMap<String, FilesetConfig>,
}

impl Config {
  pub fn load(path: &std::path::Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
      path: path.to_path_buf(),
      source: e,
    })?;
    let config: Config = serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
      path: path.to_path_buf(),
      source: e,
    })?;
    Ok(config)
  }
}

/// A fully validated, CLI-flag-over-config-over-default fileset
/// configuration ready to drive a [`crate::sync::SyncCoordinator`].
#[derive(Debug, Clone)]
pub struct ValidatedFilesetConfig {
  pub name: String,
  pub fileset_uri: String,
  pub destination: PathBuf,
  pub base: String,
  pub extension: String,
  pub frequency: Duration,
  pub download_timeout: Option<Duration>,
  pub retry_timeout: Duration,
  pub max_downloads: usize,
  pub apikey: Option<String>,
  pub validator: Option<PathBuf>,
  pub digest_required: bool,
  pub minimal: bool,
}

impl FilesetConfig {
  /// Validate this configuration, deriving `base` from the manifest URI's
  /// basename when absent, and rejecting a destination that does not
  /// already exist as a directory.
  pub fn validate(&self, name: &str) -> Result<ValidatedFilesetConfig, ConfigError> {
    let fileset_uri = self
      .fileset_uri
      .clone()
      .ok_or_else(|| ConfigError::MissingUri(name.to_string()))?;

    let destination = self
      .destination
      .clone()
      .ok_or_else(|| ConfigError::MissingDestination(name.to_string()))?;
    if !destination.is_dir() {
      return Err(ConfigError::DestinationMissing(destination));
    }

    if self.max_downloads == 0 {
      return Err(ConfigError::ZeroConcurrency(name.to_string()));
    }

    let base = self
      .base
      .clone()
      .unwrap_or_else(|| derive_base_from_uri(&fileset_uri));

    Ok(ValidatedFilesetConfig {
      name: name.to_string(),
      fileset_uri,
      destination,
      base,
      extension: self.extension.clone(),
      frequency: Duration::from_secs(self.frequency),
      download_timeout: self.download_timeout.map(Duration::from_secs),
      retry_timeout: Duration::from_secs(self.retry_timeout),
      max_downloads: self.max_downloads,
      apikey: self.apikey.clone(),
      validator: self.validator.clone(),
      digest_required: self.digest_required,
      minimal: self.minimal,
    })
  }
}

/// Derive a prefix from a manifest URI's basename, e.g.
/// `https://host/dns.fileset` → `dns`.
fn derive_base_from_uri(uri: &str) -> String {
  let basename = uri.rsplit('/').next().unwrap_or(uri);
  basename
    .strip_suffix(".fileset")
    .unwrap_or(basename)
    .to_string()
}
