use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local metadata identifying one archived resource and its store-side
/// handle. Created when a resource is uploaded or when its record file is
/// loaded from disk; read-mostly afterward. The only post-creation mutation
/// is attaching the cache-file path once the payload lands locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveRecord {
    pub vault: String,
    /// Vault-relative resource id, e.g. "/data/2013/sst.nc".
    pub resource_id: String,
    /// Opaque handle issued by the archival store at upload time.
    pub archive_id: String,
    /// Cached format descriptors (e.g. "dap_version", "content_type").
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub cache_file: Option<PathBuf>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl ArchiveRecord {
    pub fn new(vault: &str, resource_id: &str, archive_id: &str) -> Self {
        Self {
            vault: vault.to_string(),
            resource_id: resource_id.to_string(),
            archive_id: archive_id.to_string(),
            metadata: HashMap::new(),
            cache_file: None,
            last_modified: None,
        }
    }

    /// The public path under which this resource is served: vault name
    /// followed by the vault-relative resource id.
    pub fn combined_id(&self) -> String {
        format!("{}{}", self.vault, self.resource_id)
    }

    /// Whether the payload is present in the local cache right now.
    pub fn is_cached(&self) -> bool {
        self.cache_file.as_ref().is_some_and(|p| p.is_file())
    }

    /// File name of this record within a vault's archive directory.
    pub fn file_name(&self) -> String {
        encode_resource_file_name(&self.resource_id)
    }
}

/// Encode a resource id into a flat, filesystem-safe file name.
/// '%' is escaped first so decoding stays unambiguous.
pub fn encode_resource_file_name(resource_id: &str) -> String {
    resource_id.replace('%', "%25").replace('/', "%2F")
}

pub fn decode_resource_file_name(file_name: &str) -> String {
    file_name.replace("%2F", "/").replace("%25", "%")
}

/// File-name convention for the synthetic resource id of an index document.
pub const INDEX_FILE_CONVENTION: &str = "index.json";

/// A directory-listing document for one level of a vault's namespace.
/// The content is opaque to the core; catalog rendering happens elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexDoc {
    pub vault: String,
    /// Vault-relative directory path this index describes.
    pub path: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    pub content: String,
}

fn default_delimiter() -> String {
    "/".to_string()
}

impl IndexDoc {
    /// Synthetic resource id this index is looked up under:
    /// `{path}{delimiter}index.json`.
    pub fn resource_id(&self) -> String {
        format!("{}{}{}", self.path, self.delimiter, INDEX_FILE_CONVENTION)
    }

    pub fn file_name(&self) -> String {
        encode_resource_file_name(&self.resource_id())
    }
}
