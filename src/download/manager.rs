//! Coordinator for a bounded pool of file-download workers.
//!
//! Grounded in the teacher's `sync/scheduler.rs::SyncScheduler`: the same
//! shape of `Arc<Mutex<_>>`-guarded collections, the same
//! `tokio::select!`-between-a-channel-and-a-tick event loop, and the same
//! in-flight tracking that makes enqueue idempotent. The scheduling policy
//! itself (coarsest-first, cooling-down timers) is the Python original's
//! `DownloadManager`, ported from threads to tasks.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;

use crate::model::FileDescriptor;

use super::worker::{fetch_file, WorkerConfig};

#[derive(Clone)]
pub struct DownloadManagerConfig {
  pub max_downloads: usize,
  pub retry_timeout: Duration,
  pub worker: WorkerConfig,
}

enum Event {
  WorkerFinished(FileDescriptor, Result<(), String>),
  CooldownExpired(FileDescriptor),
}

/// A single long-running coordinator with a bounded worker pool, tracking
/// jobs across `pending`, `active`, and `cooling_down` collections keyed
/// by file descriptor.
pub struct DownloadManager {
  client: reqwest::Client,
  config: DownloadManagerConfig,
  running: Arc<AtomicBool>,
  pending: Arc<Mutex<HashSet<FileDescriptor>>>,
  active: Arc<Mutex<HashSet<FileDescriptor>>>,
  cooling_down: Arc<Mutex<HashSet<FileDescriptor>>>,
  events_tx: mpsc::UnboundedSender<Event>,
  events_rx: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
}

impl DownloadManager {
  pub fn new(client: reqwest::Client, config: DownloadManagerConfig) -> Arc<DownloadManager> {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    Arc::new(DownloadManager {
      client,
      config,
      running: Arc::new(AtomicBool::new(true)),
      pending: Arc::new(Mutex::new(HashSet::new())),
      active: Arc::new(Mutex::new(HashSet::new())),
      cooling_down: Arc::new(Mutex::new(HashSet::new())),
      events_tx,
      events_rx: Mutex::new(Some(events_rx)),
    })
  }

  /// "Known to the manager" iff present in `pending`, `active`, or
  /// `cooling_down`. Callers must check this before enqueuing.
  pub async fn contains(&self, f: &FileDescriptor) -> bool {
    self.pending.lock().await.contains(f)
      || self.active.lock().await.contains(f)
      || self.cooling_down.lock().await.contains(f)
  }

  /// Idempotent with respect to `contains`: inserting a descriptor already
  /// known to the manager is a no-op.
  pub async fn enqueue(&self, f: FileDescriptor) {
    if self.contains(&f).await {
      return;
    }
    self.pending.lock().await.insert(f);
  }

  pub fn stop(&self) {
    self.running.store(false, Ordering::SeqCst);
  }

  /// Runs until `stop()` is called, reaping finished workers and filling
  /// idle slots from `pending` in coarsest-first order after every event.
  pub async fn run(self: Arc<Self>) {
    let mut rx = self
      .events_rx
      .lock()
      .await
      .take()
      .expect("DownloadManager::run must only be called once");

    self.dispatch_pending().await;

    while self.running.load(Ordering::SeqCst) {
      tokio::select! {
        event = rx.recv() => {
          match event {
            Some(Event::WorkerFinished(f, result)) => self.on_worker_finished(f, result).await,
            Some(Event::CooldownExpired(f)) => {
              self.cooling_down.lock().await.remove(&f);
              debug!("cooldown expired for {}", f.name);
            }
            None => break,
          }
          self.dispatch_pending().await;
        }
        _ = sleep(Duration::from_millis(500)) => {
          self.dispatch_pending().await;
        }
      }
    }
  }

  async fn on_worker_finished(&self, f: FileDescriptor, result: Result<(), String>) {
    self.active.lock().await.remove(&f);
    match result {
      Ok(()) => info!("download completed: {}", f.name),
      Err(e) => {
        warn!("download failed for {}: {e}", f.name);
        self.cooling_down.lock().await.insert(f.clone());
        let tx = self.events_tx.clone();
        let retry_timeout = self.config.retry_timeout;
        tokio::spawn(async move {
          sleep(retry_timeout).await;
          let _ = tx.send(Event::CooldownExpired(f));
        });
      }
    }
  }

  /// Select up to `max_downloads - |active|` items from `pending`, in
  /// coarsest-first order (the §3 total order taken from the high end),
  /// and spawn a worker for each.
  async fn dispatch_pending(&self) {
    let mut active = self.active.lock().await;
    let available = self.config.max_downloads.saturating_sub(active.len());
    if available == 0 {
      return;
    }

    let mut pending = self.pending.lock().await;
    let mut candidates: Vec<FileDescriptor> = pending.iter().cloned().collect();
    candidates.sort();
    candidates.reverse();
    candidates.truncate(available);

    for f in &candidates {
      pending.remove(f);
      active.insert(f.clone());
    }
    drop(pending);
    drop(active);

    for f in candidates {
      self.spawn_worker(f);
    }
  }

  fn spawn_worker(&self, f: FileDescriptor) {
    let client = self.client.clone();
    let worker_config = self.config.worker.clone();
    let events_tx = self.events_tx.clone();

    tokio::spawn(async move {
      let result = fetch_file(&client, &f, &worker_config)
        .await
        .map_err(|e| e.to_string());
      let _ = events_tx.send(Event::WorkerFinished(f, result));
    });
  }
}
