use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Root of the on-disk vault registry. Defaults to `{data_dir}/vaults`.
    #[serde(default)]
    pub archive_root: Option<PathBuf>,
    #[serde(default = "default_store_endpoint")]
    pub store_endpoint: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_key: String,
    /// Expected archival-store retrieval latency, used as the default
    /// expected delay for new jobs and as the advertised server delay
    /// during async negotiation.
    #[serde(default = "default_retrieval_delay_secs")]
    pub retrieval_delay_secs: i64,
    /// Floor for the poller's adaptive sleep interval.
    #[serde(default = "default_min_poll_interval_secs")]
    pub min_poll_interval_secs: i64,
    /// How long a retrieved payload is promised to stay in the cache,
    /// advertised in accepted async responses.
    #[serde(default = "default_cache_persist_secs")]
    pub cache_persist_secs: i64,
    /// Per-request timeout on archival-store calls, so one slow call
    /// cannot stall the poller for the other jobs.
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8380
}

fn default_store_endpoint() -> String {
    "http://127.0.0.1:9000".to_string()
}

fn default_retrieval_delay_secs() -> i64 {
    14_400 // 4 hours
}

fn default_min_poll_interval_secs() -> i64 {
    60
}

fn default_cache_persist_secs() -> i64 {
    8_640_000 // 100 days
}

fn default_store_timeout_secs() -> u64 {
    300
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: None,
            archive_root: None,
            store_endpoint: default_store_endpoint(),
            access_key_id: String::new(),
            secret_key: String::new(),
            retrieval_delay_secs: default_retrieval_delay_secs(),
            min_poll_interval_secs: default_min_poll_interval_secs(),
            cache_persist_secs: default_cache_persist_secs(),
            store_timeout_secs: default_store_timeout_secs(),
        }
    }
}
