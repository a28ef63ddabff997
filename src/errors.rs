use thiserror::Error;

#[derive(Debug, Error)]
pub enum ColdVaultError {
    /// Caller-contract violation: `start` was called on a job that already
    /// has a store-side job handle.
    #[error("Retrieval job already started: {0}")]
    AlreadyStarted(String),

    /// Caller-contract violation: the job was polled or fetched before
    /// `start` succeeded.
    #[error("Retrieval job not started: {0}")]
    NotStarted(String),

    /// The persisted job-table snapshot exists but could not be read or
    /// parsed. Fatal at init: silently dropping it would orphan store-side
    /// jobs and later duplicate them.
    #[error("Job table snapshot error: {0}")]
    Snapshot(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// Transport-level failure talking to the archival store.
    #[error("Archive store error: {0}")]
    Store(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<std::io::Error> for ColdVaultError {
    fn from(err: std::io::Error) -> Self {
        ColdVaultError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ColdVaultError {
    fn from(err: serde_json::Error) -> Self {
        ColdVaultError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for ColdVaultError {
    fn from(err: reqwest::Error) -> Self {
        ColdVaultError::Store(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_started_display() {
        let err = ColdVaultError::AlreadyStarted("/noaa/data.nc".to_string());
        assert_eq!(
            err.to_string(),
            "Retrieval job already started: /noaa/data.nc"
        );
    }

    #[test]
    fn test_not_started_display() {
        let err = ColdVaultError::NotStarted("/noaa/data.nc".to_string());
        assert_eq!(err.to_string(), "Retrieval job not started: /noaa/data.nc");
    }

    #[test]
    fn test_snapshot_display() {
        let err = ColdVaultError::Snapshot("truncated file".to_string());
        assert_eq!(err.to_string(), "Job table snapshot error: truncated file");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: ColdVaultError = io_err.into();
        match err {
            ColdVaultError::Storage(msg) => assert!(msg.contains("file missing")),
            other => panic!("Expected Storage, got: {:?}", other),
        }
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("not valid json").unwrap_err();
        let err: ColdVaultError = json_err.into();
        match err {
            ColdVaultError::Storage(_) => {}
            other => panic!("Expected Storage, got: {:?}", other),
        }
    }
}
