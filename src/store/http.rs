use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use crate::errors::ColdVaultError;
use crate::store::{ArchiveStore, Credentials, JobParameters, JobStatus};

const ACCESS_KEY_HEADER: &str = "x-access-key-id";
const SECRET_KEY_HEADER: &str = "x-secret-key";

#[derive(Debug, Deserialize)]
struct InitiateJobResponse {
    job_id: String,
}

/// Archival-store client speaking a Glacier-style REST API:
///
/// ```text
/// POST {endpoint}/vaults/{vault}/jobs              -> { "job_id": ... }
/// GET  {endpoint}/vaults/{vault}/jobs/{id}         -> { "completed": ..., "status_code": ... }
/// GET  {endpoint}/vaults/{vault}/jobs/{id}/output  -> byte stream
/// ```
///
/// One long-lived client per process; connections are pooled and every
/// request carries the credential headers and an explicit timeout.
pub struct HttpArchiveStore {
    client: reqwest::Client,
    endpoint: String,
    credentials: Credentials,
}

impl HttpArchiveStore {
    pub fn new(
        endpoint: &str,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, ColdVaultError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ColdVaultError::Store(format!("failed to build store client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn jobs_url(&self, vault: &str) -> String {
        format!("{}/vaults/{}/jobs", self.endpoint, vault)
    }

    fn job_url(&self, vault: &str, job_id: &str) -> String {
        format!("{}/{}", self.jobs_url(vault), job_id)
    }

    fn job_output_url(&self, vault: &str, job_id: &str) -> String {
        format!("{}/output", self.job_url(vault, job_id))
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header(ACCESS_KEY_HEADER, &self.credentials.access_key_id)
            .header(SECRET_KEY_HEADER, &self.credentials.secret_key)
    }
}

#[async_trait]
impl ArchiveStore for HttpArchiveStore {
    async fn initiate_job(
        &self,
        vault: &str,
        params: &JobParameters,
    ) -> Result<String, ColdVaultError> {
        let response = self
            .authed(self.client.post(self.jobs_url(vault)))
            .json(params)
            .send()
            .await?
            .error_for_status()?;

        let body: InitiateJobResponse = response.json().await?;
        tracing::debug!(
            "Store job initiated. vault: {} type: {} job_id: {}",
            vault,
            params.job_type,
            body.job_id
        );
        Ok(body.job_id)
    }

    async fn describe_job(
        &self,
        vault: &str,
        job_id: &str,
    ) -> Result<JobStatus, ColdVaultError> {
        let response = self
            .authed(self.client.get(self.job_url(vault, job_id)))
            .send()
            .await?
            .error_for_status()?;

        let status: JobStatus = response.json().await?;
        tracing::debug!(
            "Described store job. vault: {} job_id: {} completed: {} status: {}",
            vault,
            job_id,
            status.completed,
            status.status_code
        );
        Ok(status)
    }

    async fn get_job_output(
        &self,
        vault: &str,
        job_id: &str,
        dest: &Path,
    ) -> Result<(), ColdVaultError> {
        let response = self
            .authed(self.client.get(self.job_output_url(vault, job_id)))
            .send()
            .await?
            .error_for_status()?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        tracing::info!(
            "Retrieved store job output. vault: {} job_id: {} dest: {}",
            vault,
            job_id,
            dest.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> HttpArchiveStore {
        HttpArchiveStore::new(
            "http://store.example.com/",
            Credentials::new("AKID", "SECRET"),
            Duration::from_secs(30),
        )
        .expect("build store")
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let store = make_store();
        assert_eq!(
            store.jobs_url("noaa"),
            "http://store.example.com/vaults/noaa/jobs"
        );
    }

    #[test]
    fn test_job_url() {
        let store = make_store();
        assert_eq!(
            store.job_url("noaa", "job-42"),
            "http://store.example.com/vaults/noaa/jobs/job-42"
        );
    }

    #[test]
    fn test_job_output_url() {
        let store = make_store();
        assert_eq!(
            store.job_output_url("noaa", "job-42"),
            "http://store.example.com/vaults/noaa/jobs/job-42/output"
        );
    }

    #[test]
    fn test_job_parameters_serialization() {
        let params = JobParameters {
            job_type: "archive-retrieval".to_string(),
            archive_id: Some("arch-1".to_string()),
            description: "Retrieving /data/x.nc".to_string(),
        };
        let json = serde_json::to_string(&params).expect("serialize");
        assert!(json.contains("\"type\":\"archive-retrieval\""));
        assert!(json.contains("\"archive_id\":\"arch-1\""));
    }

    #[test]
    fn test_inventory_parameters_omit_archive_id() {
        let params = JobParameters {
            job_type: "inventory-retrieval".to_string(),
            archive_id: None,
            description: "Vault inventory".to_string(),
        };
        let json = serde_json::to_string(&params).expect("serialize");
        assert!(!json.contains("archive_id"));
    }
}
