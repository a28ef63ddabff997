pub mod http;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ColdVaultError;

pub use http::HttpArchiveStore;

/// Access-key pair for the archival store, supplied by configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_key: secret_key.into(),
        }
    }
}

/// Parameters for the store's "initiate job" call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobParameters {
    /// Store-specific job-type tag: "archive-retrieval" or
    /// "inventory-retrieval".
    #[serde(rename = "type")]
    pub job_type: String,
    /// Present for archive retrievals, absent for inventory jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_id: Option<String>,
    pub description: String,
}

/// What the store's "describe job" endpoint reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub completed: bool,
    #[serde(default)]
    pub status_code: String,
}

/// The archival store's asynchronous job API. Retrievals take hours; a job
/// is initiated, polled via describe, and its output fetched once complete.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Start an asynchronous retrieval job; returns the store's opaque
    /// job id.
    async fn initiate_job(
        &self,
        vault: &str,
        params: &JobParameters,
    ) -> Result<String, ColdVaultError>;

    /// Query the state of a previously initiated job.
    async fn describe_job(&self, vault: &str, job_id: &str)
        -> Result<JobStatus, ColdVaultError>;

    /// Stream a completed job's output to `dest`, overwriting it.
    async fn get_job_output(
        &self,
        vault: &str,
        job_id: &str,
        dest: &Path,
    ) -> Result<(), ColdVaultError>;
}
