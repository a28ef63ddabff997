use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ColdVaultError;
use crate::models::ArchiveRecord;
use crate::store::{ArchiveStore, JobParameters};

pub const ARCHIVE_RETRIEVAL_TAG: &str = "archive-retrieval";
pub const INVENTORY_RETRIEVAL_TAG: &str = "inventory-retrieval";

/// Sentinel resource id for whole-vault inventory jobs. '#' cannot occur in
/// a vault-relative resource path, so it never collides with a real resource.
pub const INVENTORY_RESOURCE_ID: &str = "#inventory";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    ArchiveRetrieval,
    InventoryRetrieval,
}

impl JobKind {
    pub fn wire_tag(&self) -> &'static str {
        match self {
            JobKind::ArchiveRetrieval => ARCHIVE_RETRIEVAL_TAG,
            JobKind::InventoryRetrieval => INVENTORY_RETRIEVAL_TAG,
        }
    }
}

/// One outstanding asynchronous retrieval against the archival store.
///
/// State machine: unstarted -> started -> (polled) -> complete -> payload
/// fetched, at which point the manager retires the job. `start` on a started
/// job and `poll`/`fetch` on an unstarted one are caller-contract violations
/// and surface as distinct error kinds; transient store failures surface as
/// `Ok(false)` so the poller's next cycle simply retries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalJob {
    pub vault: String,
    /// Vault-relative resource id, or [`INVENTORY_RESOURCE_ID`].
    pub resource_id: String,
    pub kind: JobKind,
    /// None for inventory jobs.
    pub archive_id: Option<String>,
    pub expected_delay_secs: i64,
    /// Where the payload is written once the store reports completion.
    pub dest: PathBuf,
    pub started_at: Option<DateTime<Utc>>,
    /// Opaque job handle issued by the store's "initiate job" call.
    pub store_job_id: Option<String>,
}

impl RetrievalJob {
    pub fn new_archive(record: &ArchiveRecord, dest: PathBuf, expected_delay_secs: i64) -> Self {
        Self {
            vault: record.vault.clone(),
            resource_id: record.resource_id.clone(),
            kind: JobKind::ArchiveRetrieval,
            archive_id: Some(record.archive_id.clone()),
            expected_delay_secs,
            dest,
            started_at: None,
            store_job_id: None,
        }
    }

    pub fn new_inventory(vault: &str, dest: PathBuf, expected_delay_secs: i64) -> Self {
        Self {
            vault: vault.to_string(),
            resource_id: INVENTORY_RESOURCE_ID.to_string(),
            kind: JobKind::InventoryRetrieval,
            archive_id: None,
            expected_delay_secs,
            dest,
            started_at: None,
            store_job_id: None,
        }
    }

    /// Key under which the manager tracks this job: the vault-qualified
    /// resource path.
    pub fn table_key(&self) -> String {
        format!("{}{}", self.vault, self.resource_id)
    }

    pub fn started(&self) -> bool {
        self.started_at.is_some() && self.store_job_id.is_some()
    }

    fn description(&self) -> String {
        match self.kind {
            JobKind::ArchiveRetrieval => format!("Retrieving {}{}", self.vault, self.resource_id),
            JobKind::InventoryRetrieval => format!("Inventory of vault {}", self.vault),
        }
    }

    /// Issue the store's asynchronous "initiate job" call.
    ///
    /// Returns `Ok(true)` and records the start timestamp and job handle on
    /// success; logs and returns `Ok(false)` on a store failure so the
    /// caller can retry. Double-start is an [`ColdVaultError::AlreadyStarted`]
    /// contract violation, not a retriable condition.
    pub async fn start(
        &mut self,
        store: &dyn ArchiveStore,
        now: DateTime<Utc>,
    ) -> Result<bool, ColdVaultError> {
        if self.started() {
            return Err(ColdVaultError::AlreadyStarted(self.table_key()));
        }

        let params = JobParameters {
            job_type: self.kind.wire_tag().to_string(),
            archive_id: self.archive_id.clone(),
            description: self.description(),
        };

        match store.initiate_job(&self.vault, &params).await {
            Ok(job_id) => {
                tracing::debug!(
                    "Retrieval job started. resource: {} store job id: {}",
                    self.table_key(),
                    job_id
                );
                self.started_at = Some(now);
                self.store_job_id = Some(job_id);
                Ok(true)
            }
            Err(e) => {
                tracing::error!(
                    "Retrieval job failed to start. resource: {} msg: {}",
                    self.table_key(),
                    e
                );
                Ok(false)
            }
        }
    }

    /// Estimated wait in seconds: `max(0, expected_delay - elapsed)`.
    pub fn estimated_secs_remaining(&self, now: DateTime<Utc>) -> Result<i64, ColdVaultError> {
        let started_at = self
            .started_at
            .ok_or_else(|| ColdVaultError::NotStarted(self.table_key()))?;

        let elapsed = (now - started_at).num_seconds();
        Ok((self.expected_delay_secs - elapsed).max(0))
    }

    /// Ask the store whether the job has completed.
    pub async fn poll_completion(&self, store: &dyn ArchiveStore) -> Result<bool, ColdVaultError> {
        let job_id = self
            .store_job_id
            .as_deref()
            .ok_or_else(|| ColdVaultError::NotStarted(self.table_key()))?;

        match store.describe_job(&self.vault, job_id).await {
            Ok(status) => Ok(status.completed),
            Err(e) => {
                tracing::error!(
                    "Failed to describe store job. resource: {} job id: {} msg: {}",
                    self.table_key(),
                    job_id,
                    e
                );
                Ok(false)
            }
        }
    }

    /// Stream the completed job's output to `dest`, overwriting it.
    ///
    /// Any store or I/O failure logs and returns `Ok(false)` so the poller
    /// retries next cycle instead of losing the job record.
    pub async fn fetch_payload(
        &self,
        store: &dyn ArchiveStore,
        dest: &Path,
    ) -> Result<bool, ColdVaultError> {
        let job_id = self
            .store_job_id
            .as_deref()
            .ok_or_else(|| ColdVaultError::NotStarted(self.table_key()))?;

        match store.get_job_output(&self.vault, job_id, dest).await {
            Ok(()) => {
                tracing::info!(
                    "Retrieved payload. resource: {} dest: {}",
                    self.table_key(),
                    dest.display()
                );
                Ok(true)
            }
            Err(e) => {
                tracing::error!(
                    "Failed to fetch job output. resource: {} job id: {} msg: {}",
                    self.table_key(),
                    job_id,
                    e
                );
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::store::JobStatus;

    /// Store double: scripted to succeed or fail, counts initiate calls.
    struct ScriptedStore {
        fail_initiate: bool,
        completed: bool,
        initiate_calls: AtomicUsize,
    }

    impl ScriptedStore {
        fn new() -> Self {
            Self {
                fail_initiate: false,
                completed: false,
                initiate_calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail_initiate: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl ArchiveStore for ScriptedStore {
        async fn initiate_job(
            &self,
            _vault: &str,
            _params: &JobParameters,
        ) -> Result<String, ColdVaultError> {
            self.initiate_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_initiate {
                Err(ColdVaultError::Store("store unavailable".to_string()))
            } else {
                Ok("store-job-1".to_string())
            }
        }

        async fn describe_job(
            &self,
            _vault: &str,
            _job_id: &str,
        ) -> Result<JobStatus, ColdVaultError> {
            Ok(JobStatus {
                completed: self.completed,
                status_code: "InProgress".to_string(),
            })
        }

        async fn get_job_output(
            &self,
            _vault: &str,
            _job_id: &str,
            dest: &Path,
        ) -> Result<(), ColdVaultError> {
            tokio::fs::write(dest, b"payload").await?;
            Ok(())
        }
    }

    fn make_job() -> RetrievalJob {
        let record = ArchiveRecord::new("noaa", "/data/sst.nc", "arch-1");
        RetrievalJob::new_archive(&record, PathBuf::from("/tmp/cv-test-dest"), 14_400)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_start_records_handle_and_timestamp() {
        let store = ScriptedStore::new();
        let mut job = make_job();
        assert!(!job.started());

        let started = job.start(&store, t0()).await.expect("start");
        assert!(started);
        assert!(job.started());
        assert_eq!(job.store_job_id.as_deref(), Some("store-job-1"));
        assert_eq!(job.started_at, Some(t0()));
    }

    #[tokio::test]
    async fn test_double_start_is_contract_violation() {
        let store = ScriptedStore::new();
        let mut job = make_job();
        job.start(&store, t0()).await.expect("start");

        let result = job.start(&store, t0()).await;
        match result {
            Err(ColdVaultError::AlreadyStarted(_)) => {}
            other => panic!("Expected AlreadyStarted, got: {:?}", other),
        }
        // The store must not have been asked to start a second job.
        assert_eq!(store.initiate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_failure_returns_false_not_error() {
        let store = ScriptedStore::failing();
        let mut job = make_job();

        let started = job.start(&store, t0()).await.expect("start call");
        assert!(!started);
        assert!(!job.started(), "A failed start leaves the job unstarted");
    }

    #[tokio::test]
    async fn test_failed_start_can_be_retried() {
        let mut job = make_job();
        let started = job.start(&ScriptedStore::failing(), t0()).await.unwrap();
        assert!(!started);

        let started = job.start(&ScriptedStore::new(), t0()).await.unwrap();
        assert!(started);
    }

    #[test]
    fn test_estimate_before_start_is_error() {
        let job = make_job();
        match job.estimated_secs_remaining(t0()) {
            Err(ColdVaultError::NotStarted(_)) => {}
            other => panic!("Expected NotStarted, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_estimate_counts_down_and_clamps_at_zero() {
        let store = ScriptedStore::new();
        let mut job = make_job();
        job.start(&store, t0()).await.expect("start");

        assert_eq!(job.estimated_secs_remaining(t0()).unwrap(), 14_400);

        let later = t0() + chrono::Duration::seconds(4_400);
        assert_eq!(job.estimated_secs_remaining(later).unwrap(), 10_000);

        let way_later = t0() + chrono::Duration::seconds(100_000);
        assert_eq!(job.estimated_secs_remaining(way_later).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_poll_before_start_is_error() {
        let store = ScriptedStore::new();
        let job = make_job();
        match job.poll_completion(&store).await {
            Err(ColdVaultError::NotStarted(_)) => {}
            other => panic!("Expected NotStarted, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_poll_reports_store_completion() {
        let mut store = ScriptedStore::new();
        let mut job = make_job();
        job.start(&store, t0()).await.expect("start");

        assert!(!job.poll_completion(&store).await.unwrap());

        store.completed = true;
        assert!(job.poll_completion(&store).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_before_start_is_error() {
        let store = ScriptedStore::new();
        let job = make_job();
        match job.fetch_payload(&store, Path::new("/tmp/nowhere")).await {
            Err(ColdVaultError::NotStarted(_)) => {}
            other => panic!("Expected NotStarted, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_writes_destination() {
        let tmp = tempfile::TempDir::new().expect("temp dir");
        let dest = tmp.path().join("sst.nc");

        let mut store = ScriptedStore::new();
        store.completed = true;
        let mut job = make_job();
        job.start(&store, t0()).await.expect("start");

        let fetched = job.fetch_payload(&store, &dest).await.unwrap();
        assert!(fetched);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }

    #[test]
    fn test_job_serde_roundtrip() {
        let mut job = make_job();
        job.started_at = Some(t0());
        job.store_job_id = Some("store-job-1".to_string());

        let json = serde_json::to_string(&job).expect("serialize");
        let deserialized: RetrievalJob = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(job, deserialized);
    }

    #[test]
    fn test_job_kind_wire_tags() {
        assert_eq!(JobKind::ArchiveRetrieval.wire_tag(), "archive-retrieval");
        assert_eq!(
            JobKind::InventoryRetrieval.wire_tag(),
            "inventory-retrieval"
        );
    }

    #[test]
    fn test_inventory_job_table_key() {
        let job = RetrievalJob::new_inventory("noaa", PathBuf::from("/tmp/inv"), 14_400);
        assert_eq!(job.table_key(), "noaa#inventory");
        assert!(job.archive_id.is_none());
    }
}
