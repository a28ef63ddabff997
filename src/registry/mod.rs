pub mod vault;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::RwLock;

use crate::models::ArchiveRecord;

pub use vault::Vault;

/// All vaults mirrored under one root directory. Each immediate visible
/// subdirectory of the root is a vault.
pub struct VaultRegistry {
    root: PathBuf,
    vaults: RwLock<HashMap<String, Arc<Vault>>>,
}

impl VaultRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            vaults: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the root for vault directories and load each one's records and
    /// indexes. Called once at startup.
    pub async fn load_vaults(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create vault root {}", self.root.display()))?;

        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .with_context(|| format!("Failed to read vault root {}", self.root.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }

            let vault = Vault::open(name, &self.root).await?;
            vault.load().await?;
            self.vaults
                .write()
                .await
                .insert(name.to_string(), Arc::new(vault));
        }

        let count = self.vaults.read().await.len();
        tracing::info!("Vault registry loaded {} vault(s) from {}", count, self.root.display());
        Ok(())
    }

    pub async fn vault(&self, name: &str) -> Option<Arc<Vault>> {
        self.vaults.read().await.get(name).cloned()
    }

    /// Get the named vault, creating its directory layout on first use.
    pub async fn open_vault(&self, name: &str) -> Result<Arc<Vault>> {
        if let Some(vault) = self.vault(name).await {
            return Ok(vault);
        }

        let vault = Arc::new(Vault::open(name, &self.root).await?);
        vault.load().await?;
        self.vaults
            .write()
            .await
            .insert(name.to_string(), vault.clone());
        tracing::info!("Opened new vault '{}'", name);
        Ok(vault)
    }

    /// Resolve which vault a combined resource path belongs to by longest
    /// matching vault-name prefix. With nested-looking vault names (e.g.
    /// "foo" and "foobar") a bare prefix match is ambiguous; longest-match
    /// pins the answer. Known limitation: "foobar" shadows resources of
    /// "foo" whose ids happen to start with "bar".
    pub async fn resolve_vault_name(&self, combined_path: &str) -> Option<String> {
        let vaults = self.vaults.read().await;
        let mut best: Option<&str> = None;
        for name in vaults.keys() {
            if combined_path.starts_with(name.as_str())
                && best.is_none_or(|b| name.len() > b.len())
            {
                best = Some(name);
            }
        }
        best.map(str::to_string)
    }

    /// Look up an archive record by its combined path (vault name followed
    /// by the vault-relative resource id).
    pub async fn archive_record(&self, combined_path: &str) -> Option<(Arc<Vault>, ArchiveRecord)> {
        let vault_name = self.resolve_vault_name(combined_path).await?;
        let vault = self.vault(&vault_name).await?;
        let resource_id = &combined_path[vault_name.len()..];
        let record = vault.archive_record(resource_id).await?;
        Some((vault, record))
    }

    pub async fn vault_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.vaults.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
