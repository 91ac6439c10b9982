//! Per-file fetch protocol: stream a remote file to a sibling tempfile
//! with integrity checks, then rename it over the final target.
//!
//! Grounded in the teacher's `downloader.rs::download_browser` streaming
//! loop (`bytes_stream()` + `StreamExt`, chunked `io::copy`), generalized
//! with the digest/content-length/validator checks from `fileset.py`'s
//! Python `DownloadManager._download` worker.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, warn};

use crate::digest::{self, DigestVerifier};
use crate::error::{FetchError, IntegrityError};
use crate::model::FileDescriptor;

/// Parameters shared across every worker invocation for one fileset.
#[derive(Clone)]
pub struct WorkerConfig {
  pub download_timeout: Option<Duration>,
  pub apikey: Option<String>,
  pub validator: Option<PathBuf>,
  pub digest_required: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
  #[error(transparent)]
  Fetch(#[from] FetchError),
  #[error(transparent)]
  Integrity(#[from] IntegrityError),
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

/// Fetch a single file described by `descriptor` (whose `source_uri` and
/// `directory` must already be set) and leave it at its final path on
/// success. On any failure the tempfile is removed and the error is
/// returned for the caller to log and cool down.
pub async fn fetch_file(
  client: &reqwest::Client,
  descriptor: &FileDescriptor,
  config: &WorkerConfig,
) -> Result<(), WorkerError> {
  let uri = descriptor
    .source_uri
    .as_deref()
    .expect("descriptor enqueued for download must carry a source_uri");
  let directory = descriptor
    .directory
    .as_deref()
    .expect("descriptor enqueued for download must carry a directory");
  let target = directory.join(&descriptor.name);

  debug!("fetching {uri} -> {}", target.display());

  let mut request = client.get(uri);
  if let Some(timeout) = config.download_timeout {
    request = request.timeout(timeout);
  }
  if let Some(apikey) = &config.apikey {
    request = request.header("X-Api-Key", apikey);
  }

  let response = request.send().await.map_err(FetchError::Request)?;
  if !response.status().is_success() {
    return Err(WorkerError::Fetch(FetchError::Status(response.status())));
  }

  let expected_length = response
    .content_length();
  let digest_header = response
    .headers()
    .get("Digest")
    .and_then(|v| v.to_str().ok())
    .and_then(digest::parse_digest_header);
  let last_modified = response
    .headers()
    .get("Last-Modified")
    .and_then(|v| v.to_str().ok())
    .and_then(|v| httpdate::parse_http_date(v).ok());

  if config.digest_required && digest_header.is_none() {
    return Err(WorkerError::Integrity(IntegrityError::DigestRequired));
  }

  let mut verifier = digest_header
    .as_ref()
    .map(|(alg, expected)| DigestVerifier::new(*alg, expected.clone()));

  let mut tmp = tempfile::Builder::new()
    .prefix(&format!(".{}.", descriptor.name))
    .rand_bytes(6)
    .tempfile_in(directory)?;

  let mut received: u64 = 0;
  let mut stream = response.bytes_stream();
  while let Some(chunk) = stream.next().await {
    let chunk = chunk.map_err(FetchError::Request)?;
    if let Some(v) = verifier.as_mut() {
      v.update(&chunk);
    }
    std::io::Write::write_all(&mut tmp, &chunk)?;
    received += chunk.len() as u64;
  }

  if let Some(expected) = expected_length {
    if expected != received {
      return Err(WorkerError::Integrity(IntegrityError::ContentLength {
        expected,
        actual: received,
      }));
    }
  }

  let digest_alg_ext = if let Some(v) = verifier {
    let alg_ext = v.algorithm_name();
    v.finish()?;
    Some(alg_ext)
  } else {
    None
  };

  std::io::Write::flush(&mut tmp)?;
  set_permissions_0644(tmp.path())?;

  if let Some(mtime) = last_modified {
    set_mtime(tmp.path(), mtime)?;
  }

  if let Some(validator) = &config.validator {
    run_validator(validator, tmp.path()).await?;
  }

  if let Some(alg_ext) = digest_alg_ext {
    if let Err(e) = write_digest_sidecar(&target, alg_ext, digest_header.as_ref().map(|(_, v)| v.as_str())) {
      warn!("failed to write digest sidecar for {}: {e}", target.display());
    }
  }

  if let Err(e) = tmp.persist(&target) {
    if let Some(alg_ext) = digest_alg_ext {
      let sidecar = sidecar_path(&target, alg_ext);
      let _ = std::fs::remove_file(sidecar);
    }
    return Err(WorkerError::Io(e.error));
  }

  Ok(())
}

fn sidecar_path(target: &Path, alg_ext: &str) -> PathBuf {
  let mut name = target.file_name().unwrap_or_default().to_os_string();
  name.push(".");
  name.push(alg_ext);
  target.with_file_name(name)
}

fn write_digest_sidecar(target: &Path, alg_ext: &str, digest_b64: Option<&str>) -> std::io::Result<()> {
  let sidecar = sidecar_path(target, alg_ext);
  let dir = sidecar.parent().unwrap_or_else(|| Path::new("."));
  let basename = sidecar
    .file_name()
    .and_then(|n| n.to_str())
    .unwrap_or("digest");
  let mut tmp = tempfile::Builder::new()
    .prefix(&format!(".{basename}."))
    .rand_bytes(6)
    .tempfile_in(dir)?;

  let digest_hex = digest_b64.and_then(digest::base64_to_hex).unwrap_or_default();
  let basename_target = target.file_name().and_then(|n| n.to_str()).unwrap_or_default();
  std::io::Write::write_all(
    &mut tmp,
    format!("{digest_hex}  {basename_target}\n").as_bytes(),
  )?;
  std::io::Write::flush(&mut tmp)?;
  set_permissions_0644(tmp.path())?;
  tmp.persist(&sidecar).map_err(|e| e.error)?;
  Ok(())
}

async fn run_validator(validator: &Path, file: &Path) -> Result<(), IntegrityError> {
  let status = tokio::process::Command::new(validator)
    .arg(file)
    .stdin(Stdio::null())
    .status()
    .await
    .map_err(|e| IntegrityError::ValidatorSpawn(e.to_string()))?;

  if status.success() {
    Ok(())
  } else {
    Err(IntegrityError::ValidatorFailed(status.code().unwrap_or(-1)))
  }
}

#[cfg(unix)]
fn set_permissions_0644(path: &Path) -> std::io::Result<()> {
  use std::os::unix::fs::PermissionsExt;
  std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_permissions_0644(_path: &Path) -> std::io::Result<()> {
  Ok(())
}

fn set_mtime(path: &Path, mtime: std::time::SystemTime) -> std::io::Result<()> {
  let ft = filetime::FileTime::from_system_time(mtime);
  filetime::set_file_mtime(path, ft)
}
