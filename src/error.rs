//! Per-module error taxonomy, composed into [`DtmgrError`] at the CLI boundary.
//!
//! Mirrors the policy table in the specification: parse errors are never
//! fatal, fetch/integrity errors drive retry back-off, and config errors are
//! the only kind that abort a fileset at construction time.

use std::path::PathBuf;

/// Failure to interpret a basename as a [`crate::model::FileDescriptor`].
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
  #[error("unable to parse time letter from file name {0}")]
  MissingGranularity(String),

  #[error("time letter {0} not in valid set {{Y,Q,M,W,D,H,X,m}}")]
  InvalidGranularity(String),

  #[error("timestamp '{0}' does not match any known format")]
  InvalidTimestamp(String),
}

/// Failure to retrieve bytes over HTTP(S), either the manifest or a file.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
  #[error("request error: {0}")]
  Request(#[from] reqwest::Error),

  #[error("unexpected HTTP status {0}")]
  Status(reqwest::StatusCode),
}

/// Failure of an in-flight download's integrity checks or validator.
#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
  #[error("content-length mismatch: expected {expected}, got {actual}")]
  ContentLength { expected: u64, actual: u64 },

  #[error("digest mismatch for algorithm {algorithm}: expected {expected}, got {actual}")]
  DigestMismatch {
    algorithm: String,
    expected: String,
    actual: String,
  },

  #[error("digest required but no Digest header was present")]
  DigestRequired,

  #[error("validator command exited with status {0}")]
  ValidatorFailed(i32),

  #[error("validator command could not be run: {0}")]
  ValidatorSpawn(String),
}

/// Failure reading, writing, or renaming a manifest or data file on disk.
#[derive(Debug, thiserror::Error)]
pub enum ManifestIoError {
  #[error("I/O error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("destination is not a directory: {0}")]
  NotADirectory(PathBuf),
}

/// Failure validating or constructing a fileset's configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("fileset '{0}' has no destination directory configured")]
  MissingDestination(String),

  #[error("destination directory does not exist: {0}")]
  DestinationMissing(PathBuf),

  #[error("max_downloads must be non-zero for fileset '{0}'")]
  ZeroConcurrency(String),

  #[error("fileset '{0}' has no fileset_uri configured")]
  MissingUri(String),
}

/// Top-level error, the union the CLI layer reports to the operator.
#[derive(Debug, thiserror::Error)]
pub enum DtmgrError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error(transparent)]
  Integrity(#[from] IntegrityError),

  #[error(transparent)]
  ManifestIo(#[from] ManifestIoError),
}
