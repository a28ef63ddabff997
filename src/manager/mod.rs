pub mod clock;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::errors::ColdVaultError;
use crate::models::{ArchiveRecord, RetrievalJob};
use crate::store::ArchiveStore;

pub use clock::{Clock, SystemClock};

/// File name of the durable job-table snapshot, kept in the data directory.
pub const SNAPSHOT_FILE_NAME: &str = "retrieval-manager-active-jobs.json";

/// Outcome of an initiate call.
///
/// `Fetched` is only returned after the payload has actually landed in the
/// cache; an outstanding job whose estimate has counted down to zero is
/// still `Pending(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalOutcome {
    /// The payload is in the cache now.
    Fetched,
    /// A job is outstanding; estimated seconds until the payload lands.
    Pending(i64),
    /// The store refused to start a job; the client should retry later.
    Refused,
}

struct ManagerState {
    jobs: HashMap<String, RetrievalJob>,
    initialized: bool,
}

/// Owns the table of outstanding retrieval jobs and the background poller
/// that drives them to completion.
///
/// All job-table access goes through one coarse async mutex; retrievals take
/// hours, so contention on a table this cold is a non-issue. The table is
/// snapshotted to disk whenever it changes and reloaded at init, so jobs
/// survive a restart. A snapshot that exists but cannot be parsed is fatal
/// at init: dropping it would orphan store-side jobs and later duplicate
/// them.
pub struct RetrievalManager {
    store: Arc<dyn ArchiveStore>,
    clock: Arc<dyn Clock>,
    snapshot_path: PathBuf,
    retrieval_delay_secs: i64,
    min_poll_interval_secs: i64,
    state: Mutex<ManagerState>,
    shutdown_tx: watch::Sender<bool>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl RetrievalManager {
    pub fn new(
        store: Arc<dyn ArchiveStore>,
        clock: Arc<dyn Clock>,
        snapshot_path: PathBuf,
        retrieval_delay_secs: i64,
        min_poll_interval_secs: i64,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            clock,
            snapshot_path,
            retrieval_delay_secs,
            min_poll_interval_secs,
            state: Mutex::new(ManagerState {
                jobs: HashMap::new(),
                initialized: false,
            }),
            shutdown_tx,
            poller: Mutex::new(None),
        }
    }

    pub fn retrieval_delay_secs(&self) -> i64 {
        self.retrieval_delay_secs
    }

    /// Load the persisted job table and start the background poller.
    /// Idempotent; the second and later calls are no-ops.
    pub async fn init(self: &Arc<Self>) -> Result<(), ColdVaultError> {
        {
            let mut state = self.state.lock().await;
            if state.initialized {
                return Ok(());
            }
            state.jobs = self.load_snapshot().await?;
            state.initialized = true;
            tracing::info!(
                "Retrieval manager initialized with {} active job(s)",
                state.jobs.len()
            );
        }

        let manager = Arc::clone(self);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            manager.run_poller(shutdown_rx).await;
        });
        *self.poller.lock().await = Some(handle);
        Ok(())
    }

    /// Stop the background poller and wait for it to exit.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.poller.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!("Poller task failed to join: {}", e);
            }
        }
        tracing::info!("Retrieval manager stopped");
    }

    /// Request retrieval of an archived resource. Re-requesting a resource
    /// with an outstanding job never starts a second store job.
    pub async fn initiate_retrieval(
        &self,
        record: &ArchiveRecord,
    ) -> Result<RetrievalOutcome, ColdVaultError> {
        let dest = record.cache_file.clone().ok_or_else(|| {
            ColdVaultError::Validation(format!(
                "Archive record has no cache location: {}",
                record.combined_id()
            ))
        })?;

        let job = RetrievalJob::new_archive(record, dest, self.retrieval_delay_secs);
        self.initiate(job).await
    }

    /// Request retrieval of a vault's inventory document. Same contract as
    /// [`initiate_retrieval`](Self::initiate_retrieval).
    pub async fn initiate_inventory_retrieval(
        &self,
        vault: &str,
        dest: PathBuf,
    ) -> Result<RetrievalOutcome, ColdVaultError> {
        let job = RetrievalJob::new_inventory(vault, dest, self.retrieval_delay_secs);
        self.initiate(job).await
    }

    async fn initiate(&self, mut job: RetrievalJob) -> Result<RetrievalOutcome, ColdVaultError> {
        let key = job.table_key();
        let mut state = self.state.lock().await;
        if !state.initialized {
            return Err(ColdVaultError::Validation(
                "Retrieval manager has not been initialized".to_string(),
            ));
        }

        let now = self.clock.now();

        if let Some(existing) = state.jobs.get(&key).cloned() {
            if existing.poll_completion(self.store.as_ref()).await? {
                if existing.fetch_payload(self.store.as_ref(), &existing.dest).await? {
                    state.jobs.remove(&key);
                    self.persist(&state.jobs).await?;
                    tracing::info!("Retrieval complete on request. resource: {}", key);
                    return Ok(RetrievalOutcome::Fetched);
                }
                // Output fetch failed transiently; report the current wait
                // and let the poller retry.
            }
            return Ok(RetrievalOutcome::Pending(
                existing.estimated_secs_remaining(now)?,
            ));
        }

        if !job.start(self.store.as_ref(), now).await? {
            return Ok(RetrievalOutcome::Refused);
        }

        let estimate = job.estimated_secs_remaining(now)?;
        state.jobs.insert(key.clone(), job);
        self.persist(&state.jobs).await?;
        tracing::info!(
            "Retrieval job queued. resource: {} estimate: {}s",
            key,
            estimate
        );
        Ok(RetrievalOutcome::Pending(estimate))
    }

    /// Whether a retrieval job is outstanding for the given table key.
    pub async fn already_requested(&self, table_key: &str) -> bool {
        self.state.lock().await.jobs.contains_key(table_key)
    }

    pub async fn active_jobs(&self) -> Vec<RetrievalJob> {
        let state = self.state.lock().await;
        let mut jobs: Vec<RetrievalJob> = state.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| a.table_key().cmp(&b.table_key()));
        jobs
    }

    /// One poller pass: poll every job, fetch and retire the completed
    /// ones, persist if the table changed. Returns how long to sleep before
    /// the next pass.
    pub async fn poll_active_jobs(&self) -> i64 {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let mut retired = Vec::new();
        let mut pending_estimates = Vec::new();

        for (key, job) in state.jobs.iter() {
            match job.poll_completion(self.store.as_ref()).await {
                Ok(true) => match job.fetch_payload(self.store.as_ref(), &job.dest).await {
                    Ok(true) => retired.push(key.clone()),
                    Ok(false) | Err(_) => pending_estimates.push(0),
                },
                Ok(false) => match job.estimated_secs_remaining(now) {
                    Ok(estimate) => pending_estimates.push(estimate),
                    Err(e) => {
                        tracing::error!("Unpollable job in table. resource: {} msg: {}", key, e);
                        pending_estimates.push(0);
                    }
                },
                Err(e) => {
                    tracing::error!("Poll failed. resource: {} msg: {}", key, e);
                    pending_estimates.push(0);
                }
            }
        }

        if !retired.is_empty() {
            for key in &retired {
                state.jobs.remove(key);
                tracing::info!("Retrieval complete. resource: {}", key);
            }
            // A failed snapshot write here is not fatal: the in-memory table
            // is authoritative until the next successful persist.
            if let Err(e) = self.persist(&state.jobs).await {
                tracing::error!("Failed to persist job table after poll: {}", e);
            }
        }

        next_poll_interval(
            &pending_estimates,
            self.min_poll_interval_secs,
            self.retrieval_delay_secs,
        )
    }

    async fn run_poller(&self, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::debug!("Retrieval poller started");
        loop {
            let sleep_secs = self.poll_active_jobs().await;
            tracing::debug!("Poller sleeping for {}s", sleep_secs);

            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_secs(sleep_secs as u64)) => {}
                _ = shutdown_rx.changed() => {
                    tracing::debug!("Retrieval poller shutting down");
                    return;
                }
            }
        }
    }

    async fn load_snapshot(&self) -> Result<HashMap<String, RetrievalJob>, ColdVaultError> {
        let content = match tokio::fs::read_to_string(&self.snapshot_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No job table snapshot at {}", self.snapshot_path.display());
                return Ok(HashMap::new());
            }
            Err(e) => {
                return Err(ColdVaultError::Snapshot(format!(
                    "Failed to read {}: {}",
                    self.snapshot_path.display(),
                    e
                )));
            }
        };

        serde_json::from_str(&content).map_err(|e| {
            ColdVaultError::Snapshot(format!(
                "Failed to parse {}: {}",
                self.snapshot_path.display(),
                e
            ))
        })
    }

    /// Atomically replace the snapshot: write a sibling temp file, then
    /// rename over the target.
    async fn persist(
        &self,
        jobs: &HashMap<String, RetrievalJob>,
    ) -> Result<(), ColdVaultError> {
        let json = serde_json::to_string_pretty(jobs)?;
        let tmp = self.snapshot_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json.as_bytes()).await?;
        tokio::fs::rename(&tmp, &self.snapshot_path).await?;
        Ok(())
    }
}

/// How long the poller should sleep: the smallest estimated wait among
/// pending jobs, floored so a pile of nearly-done jobs cannot turn the
/// poller into a busy loop; the full default delay when the table is empty.
pub fn next_poll_interval(pending_estimates: &[i64], floor_secs: i64, default_secs: i64) -> i64 {
    match pending_estimates.iter().min() {
        Some(&smallest) => smallest.max(floor_secs),
        None => default_secs,
    }
}
