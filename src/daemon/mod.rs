use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::manager::{RetrievalManager, SystemClock, SNAPSHOT_FILE_NAME};
use crate::models::GatewayConfig;
use crate::registry::VaultRegistry;
use crate::server::{create_router, AppState};
use crate::store::{Credentials, HttpArchiveStore};

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load the GatewayConfig using this resolution order:
///   1. --config CLI flag (passed as config_path)
///   2. COLDVAULT_CONFIG environment variable (path to the file)
///   3. Platform config dir (dirs::config_dir()/coldvault/config.json)
///   4. Fall back to {data_dir}/config.json
///   5. If no config file exists, use GatewayConfig::default()
pub fn load_config(config_path: Option<&Path>) -> Result<GatewayConfig> {
    // 1. Explicit config path
    if let Some(path) = config_path {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: GatewayConfig =
                serde_json::from_str(&content).context("Failed to parse config file")?;
            tracing::info!("Loaded config from: {}", path.display());
            return Ok(config);
        }
        return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
    }

    // 2. COLDVAULT_CONFIG env var
    if let Ok(env_path) = std::env::var("COLDVAULT_CONFIG") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .context("Failed to read config from COLDVAULT_CONFIG")?;
            let config: GatewayConfig = serde_json::from_str(&content)
                .context("Failed to parse config from COLDVAULT_CONFIG")?;
            tracing::info!("Loaded config from COLDVAULT_CONFIG: {}", path.display());
            return Ok(config);
        }
    }

    // 3. Platform config dir
    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join("coldvault").join("config.json");
        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .context("Failed to read config from platform config dir")?;
            let config: GatewayConfig = serde_json::from_str(&content)
                .context("Failed to parse config from platform config dir")?;
            tracing::info!("Loaded config from: {}", path.display());
            return Ok(config);
        }
    }

    // 4. Fall back to data_dir/config.json
    let data_dir = resolve_data_dir(None);
    let path = data_dir.join("config.json");
    if path.exists() {
        let content =
            std::fs::read_to_string(&path).context("Failed to read config from data dir")?;
        let config: GatewayConfig =
            serde_json::from_str(&content).context("Failed to parse config from data dir")?;
        tracing::info!("Loaded config from: {}", path.display());
        return Ok(config);
    }

    // 5. Use defaults
    tracing::info!("No config file found, using defaults");
    Ok(GatewayConfig::default())
}

/// Resolve the data directory. If `override_dir` is Some, use it.
/// Otherwise check COLDVAULT_DATA_DIR, then fall back to the platform
/// default (`dirs::data_dir()/coldvault`).
pub fn resolve_data_dir(override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir.to_path_buf();
    }

    if let Ok(d) = std::env::var("COLDVAULT_DATA_DIR") {
        return PathBuf::from(d);
    }

    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("coldvault")
}

/// Create the required data directories under `data_dir`.
pub async fn create_data_dirs(data_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .context("Failed to create data directory")?;
    tokio::fs::create_dir_all(data_dir.join("vaults"))
        .await
        .context("Failed to create vaults directory")?;
    tracing::info!("Data directories ensured at: {}", data_dir.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Composition root
// ---------------------------------------------------------------------------

/// Build the registry, the retrieval manager, and the HTTP server, then run
/// until Ctrl+C or SIGTERM. The manager's poller is stopped after the HTTP
/// server has drained so in-flight requests never race the shutdown.
pub async fn serve(
    config_path: Option<&Path>,
    data_dir_override: Option<&Path>,
    host_override: Option<&str>,
    port_override: Option<u16>,
) -> Result<()> {
    let mut config = load_config(config_path)?;

    if let Some(h) = host_override {
        config.host = h.to_string();
    }
    if let Some(p) = port_override {
        config.port = p;
    }

    let data_dir = if let Some(d) = data_dir_override {
        d.to_path_buf()
    } else if let Some(ref d) = config.data_dir {
        d.clone()
    } else {
        resolve_data_dir(None)
    };
    config.data_dir = Some(data_dir.clone());

    create_data_dirs(&data_dir).await?;

    let archive_root = config
        .archive_root
        .clone()
        .unwrap_or_else(|| data_dir.join("vaults"));

    let config = Arc::new(config);

    let registry = Arc::new(VaultRegistry::new(archive_root));
    registry.load_vaults().await?;

    let store = Arc::new(HttpArchiveStore::new(
        &config.store_endpoint,
        Credentials::new(config.access_key_id.clone(), config.secret_key.clone()),
        Duration::from_secs(config.store_timeout_secs),
    )?);

    let manager = Arc::new(RetrievalManager::new(
        store,
        Arc::new(SystemClock),
        data_dir.join(SNAPSHOT_FILE_NAME),
        config.retrieval_delay_secs,
        config.min_poll_interval_secs,
    ));
    manager.init().await.context("Retrieval manager init failed")?;

    let state = Arc::new(AppState {
        registry,
        manager: Arc::clone(&manager),
        config: Arc::clone(&config),
        start_time: Instant::now(),
    });

    let router = create_router(state);
    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .context(format!("Failed to bind to {}", bind_addr))?;

    tracing::info!("Gateway started. Listening on http://{}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    manager.shutdown().await;
    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                tokio::signal::ctrl_c().await.ok();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C signal");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM signal");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received Ctrl+C signal");
    }
}
