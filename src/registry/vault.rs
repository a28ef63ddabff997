use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::RwLock;

use crate::models::job::INVENTORY_RESOURCE_ID;
use crate::models::record::encode_resource_file_name;
use crate::models::{ArchiveRecord, IndexDoc};

pub const ARCHIVE_DIR_NAME: &str = "archive";
pub const INDEX_DIR_NAME: &str = "index";
pub const CACHE_DIR_NAME: &str = "cache";

/// One vault's local mirror: three on-disk areas under `<root>/<name>/` —
/// `archive/` (one JSON record file per resource), `index/` (one file per
/// directory-listing document), and `cache/` (downloaded payloads) — plus
/// in-memory maps over the first two, populated by [`Vault::load`].
///
/// Mutation only happens at startup or when a brand-new resource is
/// archived, so steady state is append-only reads.
pub struct Vault {
    name: String,
    archive_dir: PathBuf,
    index_dir: PathBuf,
    cache_dir: PathBuf,
    records: RwLock<HashMap<String, ArchiveRecord>>,
    indexes: RwLock<HashMap<String, IndexDoc>>,
}

impl Vault {
    /// Open (lazily creating) the vault's directory layout.
    pub async fn open(name: &str, root: &Path) -> Result<Self> {
        if name.is_empty() {
            anyhow::bail!("Vault name was empty");
        }

        let vault_dir = root.join(name);
        let archive_dir = vault_dir.join(ARCHIVE_DIR_NAME);
        let index_dir = vault_dir.join(INDEX_DIR_NAME);
        let cache_dir = vault_dir.join(CACHE_DIR_NAME);

        for dir in [&archive_dir, &index_dir, &cache_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create vault directory {}", dir.display()))?;
        }

        Ok(Self {
            name: name.to_string(),
            archive_dir,
            index_dir,
            cache_dir,
            records: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where a resource's payload lands once retrieved.
    pub fn cache_path_for(&self, resource_id: &str) -> PathBuf {
        self.cache_dir.join(encode_resource_file_name(resource_id))
    }

    /// Where this vault's inventory document lands once retrieved.
    pub fn inventory_cache_path(&self) -> PathBuf {
        self.cache_dir
            .join(format!("{}-INVENTORY.json", self.name))
    }

    /// Scan `archive/` and `index/` and populate the in-memory maps.
    /// Hidden files and subdirectories are skipped. Each loaded record gets
    /// its cache-file path attached so cache hits are a plain metadata check.
    pub async fn load(&self) -> Result<()> {
        let mut record_count = 0usize;
        let mut entries = tokio::fs::read_dir(&self.archive_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to read archive records directory {}",
                    self.archive_dir.display()
                )
            })?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_visible_file(&path) {
                tracing::debug!("Skipping non-record entry {}", path.display());
                continue;
            }

            let content = tokio::fs::read_to_string(&path).await?;
            let mut record: ArchiveRecord = serde_json::from_str(&content)
                .with_context(|| format!("Bad archive record file {}", path.display()))?;
            record.cache_file = Some(self.cache_path_for(&record.resource_id));

            tracing::debug!(
                "Loaded archive record. vault: {} resource: {}",
                self.name,
                record.resource_id
            );
            self.records
                .write()
                .await
                .insert(record.resource_id.clone(), record);
            record_count += 1;
        }

        let mut index_count = 0usize;
        let mut entries = tokio::fs::read_dir(&self.index_dir).await.with_context(|| {
            format!("Failed to read index directory {}", self.index_dir.display())
        })?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_visible_file(&path) {
                tracing::debug!("Skipping non-index entry {}", path.display());
                continue;
            }

            let content = tokio::fs::read_to_string(&path).await?;
            let index: IndexDoc = serde_json::from_str(&content)
                .with_context(|| format!("Bad index file {}", path.display()))?;

            tracing::debug!(
                "Loaded index. vault: {} resource: {}",
                self.name,
                index.resource_id()
            );
            self.indexes
                .write()
                .await
                .insert(index.resource_id(), index);
            index_count += 1;
        }

        tracing::info!(
            "Vault '{}' loaded: {} archive records, {} indexes",
            self.name,
            record_count,
            index_count
        );
        Ok(())
    }

    /// Write an archive record to disk and register it. Overwriting an
    /// existing record is allowed but logged loudly.
    pub async fn put_archive_record(&self, mut record: ArchiveRecord) -> Result<ArchiveRecord> {
        let target = self.archive_dir.join(record.file_name());
        if target.exists() {
            tracing::warn!("OVERWRITING archive record: {}", target.display());
        }

        record.cache_file = Some(self.cache_path_for(&record.resource_id));

        let json = serde_json::to_string_pretty(&record).context("Failed to serialize record")?;
        tokio::fs::write(&target, json.as_bytes())
            .await
            .with_context(|| format!("Failed to write archive record {}", target.display()))?;

        self.records
            .write()
            .await
            .insert(record.resource_id.clone(), record.clone());
        Ok(record)
    }

    /// Write an index document to disk and register it.
    pub async fn put_index(&self, index: IndexDoc) -> Result<()> {
        let target = self.index_dir.join(index.file_name());
        let json = serde_json::to_string_pretty(&index).context("Failed to serialize index")?;
        tokio::fs::write(&target, json.as_bytes())
            .await
            .with_context(|| format!("Failed to write index {}", target.display()))?;

        self.indexes.write().await.insert(index.resource_id(), index);
        Ok(())
    }

    pub async fn archive_record(&self, resource_id: &str) -> Option<ArchiveRecord> {
        if resource_id == INVENTORY_RESOURCE_ID {
            return None;
        }
        self.records.read().await.get(resource_id).cloned()
    }

    pub async fn index_doc(&self, resource_id: &str) -> Option<IndexDoc> {
        self.indexes.read().await.get(resource_id).cloned()
    }

    pub async fn resource_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }
}

fn is_visible_file(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    !path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}
