//! Per-fileset synchronization loop.
//!
//! Grounded in `original_source/dnstable_manager/__init__.py::run()` for
//! the exact step ordering and `next_remote_refresh` gating, and in the
//! teacher's `sync/scheduler.rs` for the task/tick shape (here a plain
//! interval loop rather than `tokio::select!`, since the spec calls for a
//! fixed 1-second tick rather than event-driven wakeups).

use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::config::ValidatedFilesetConfig;
use crate::download::{DownloadManager, DownloadManagerConfig, WorkerConfig};
use crate::fileset::FilesetState;

/// Drives one fileset's {scan, fetch, diff, prune, write, purge} pipeline
/// on a 1-second tick, deferring to its own [`DownloadManager`] for the
/// actual file transfers.
pub struct SyncCoordinator {
  state: FilesetState,
  config: ValidatedFilesetConfig,
  client: reqwest::Client,
  manager: std::sync::Arc<DownloadManager>,
  next_remote_refresh: Option<Instant>,
}

impl SyncCoordinator {
  pub fn new(config: ValidatedFilesetConfig, client: reqwest::Client) -> SyncCoordinator {
    let state = FilesetState::new(config.destination.clone(), config.base.clone(), config.extension.clone());

    let manager_config = DownloadManagerConfig {
      max_downloads: config.max_downloads,
      retry_timeout: config.retry_timeout,
      worker: WorkerConfig {
        download_timeout: config.download_timeout,
        apikey: config.apikey.clone(),
        validator: config.validator.clone(),
        digest_required: config.digest_required,
      },
    };
    let manager = DownloadManager::new(client.clone(), manager_config);

    SyncCoordinator {
      state,
      config,
      client,
      manager,
      next_remote_refresh: None,
    }
  }

  /// Runs forever, one tick per second, until the process is terminated.
  /// Intended to be spawned as its own task per configured fileset.
  pub async fn run(mut self) {
    let manager = self.manager.clone();
    tokio::spawn(manager.run());

    loop {
      self.tick().await;
      tokio::time::sleep(Duration::from_secs(1)).await;
    }
  }

  /// Runs a single iteration, useful for tests and for a `--once` CLI mode.
  pub async fn tick(&mut self) {
    if let Err(e) = self.state.scan_local_directory() {
      warn!("[{}] local scan failed: {e}", self.config.name);
    }

    let now = Instant::now();
    if self.next_remote_refresh.map_or(true, |t| now >= t) {
      match self.fetch_remote_manifest().await {
        Ok(body) => {
          self.state.load_remote_fileset(&self.config.fileset_uri, &body);
          self.next_remote_refresh = Some(now + self.config.frequency);
        }
        Err(e) => {
          error!("[{}] remote manifest fetch failed: {e}", self.config.name);
          self.next_remote_refresh = Some(now + self.config.retry_timeout);
        }
      }
    }

    let mut missing: Vec<_> = self.state.missing_files().into_iter().collect();
    missing.sort();
    missing.reverse();
    for f in missing {
      if !self.manager.contains(&f).await {
        self.manager.enqueue(f).await;
      }
    }

    self.state.prune_obsolete(self.config.minimal);
    self.state.prune_redundant(self.config.minimal);

    if let Err(e) = self.state.write_manifest(true) {
      error!("[{}] failed to write minimal manifest: {e}", self.config.name);
    }
    if !self.config.minimal {
      if let Err(e) = self.state.write_manifest(false) {
        error!("[{}] failed to write full manifest: {e}", self.config.name);
      }
    }

    self.state.purge_deleted_files();
    self.sweep_temporary_files();
  }

  async fn fetch_remote_manifest(&self) -> Result<String, reqwest::Error> {
    info!("[{}] retrieving {}", self.config.name, self.config.fileset_uri);
    let response = self.client.get(&self.config.fileset_uri).send().await?;
    let response = response.error_for_status()?;
    response.text().await
  }

  /// Unlink abandoned hidden tempfiles not currently held open by any
  /// process on the host. Falls back to "always sweep" when `lsof` is
  /// unavailable, since `/proc/<pid>/fd` enumeration is not portable.
  fn sweep_temporary_files(&self) {
    let candidates = match self.state.list_temporary_files() {
      Ok(c) => c,
      Err(e) => {
        warn!("[{}] tempfile sweep scan failed: {e}", self.config.name);
        return;
      }
    };

    for path in candidates {
      if is_held_open(&path) {
        continue;
      }
      match std::fs::remove_file(&path) {
        Ok(()) => info!("swept abandoned tempfile {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("failed to sweep tempfile {}: {e}", path.display()),
      }
    }
  }
}

/// Best-effort check via `lsof -t <path>` for whether any process has the
/// file open. When `lsof` is not on `PATH`, logs once at `warn` and treats
/// every candidate as unheld, matching §4.4's "always sweep" fallback.
#[cfg(unix)]
fn is_held_open(path: &PathBuf) -> bool {
  match std::process::Command::new("lsof")
    .arg("-t")
    .arg(path)
    .output()
  {
    Ok(output) => !output.stdout.is_empty(),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      warn!("lsof not found on PATH; sweeping tempfiles unconditionally");
      false
    }
    Err(e) => {
      warn!("lsof invocation failed: {e}; sweeping {} unconditionally", path.display());
      false
    }
  }
}

#[cfg(not(unix))]
fn is_held_open(_path: &PathBuf) -> bool {
  false
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;
  use wiremock::matchers::{method, path as path_matcher};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn validated_config(destination: PathBuf, fileset_uri: String) -> ValidatedFilesetConfig {
    ValidatedFilesetConfig {
      name: "dns".to_string(),
      fileset_uri,
      destination,
      base: "dns".to_string(),
      extension: "mtbl".to_string(),
      frequency: Duration::from_secs(1800),
      download_timeout: None,
      retry_timeout: Duration::from_secs(60),
      max_downloads: 4,
      apikey: None,
      validator: None,
      digest_required: false,
      minimal: true,
    }
  }

  #[tokio::test]
  async fn tick_enqueues_missing_files_and_writes_manifest() {
    let server = MockServer::start().await;
    let manifest_body = "dns.2014.Y.mtbl\ndns.201501.M.mtbl\n";
    Mock::given(method("GET"))
      .and(path_matcher("/dns.fileset"))
      .respond_with(ResponseTemplate::new(200).set_body_string(manifest_body))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path_matcher("/dns.2014.Y.mtbl"))
      .respond_with(ResponseTemplate::new(200).set_body_bytes(b"y".to_vec()))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path_matcher("/dns.201501.M.mtbl"))
      .respond_with(ResponseTemplate::new(200).set_body_bytes(b"m".to_vec()))
      .mount(&server)
      .await;

    let dir = TempDir::new().unwrap();
    let config = validated_config(dir.path().to_path_buf(), format!("{}/dns.fileset", server.uri()));
    let mut coordinator = SyncCoordinator::new(config, reqwest::Client::new());

    coordinator.tick().await;

    assert!(dir.path().join("dns.fileset").exists());
    assert!(coordinator.manager.contains(&crate::model::FileDescriptor::parse("dns.2014.Y.mtbl").unwrap()).await);
  }

  #[test]
  fn is_held_open_does_not_panic_for_nonexistent_path() {
    let path = PathBuf::from("/nonexistent/for/dtmgr/tests/.dns.foo.abcdef");
    let _ = is_held_open(&path);
  }
}
