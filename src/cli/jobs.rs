// CLI gateway commands: status, jobs

use reqwest::Client;
use serde_json::Value;

use super::{base_url, handle_request_error};

/// coldvault status
pub async fn cmd_status(host: &str, port: u16) -> anyhow::Result<()> {
    let url = format!("{}/health", base_url(host, port));
    let response = Client::new()
        .get(&url)
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?
        .error_for_status()?;

    let health: Value = response.json().await?;
    println!("Gateway:     http://{}:{}", host, port);
    println!("Status:      {}", health["status"].as_str().unwrap_or("?"));
    println!("Version:     {}", health["version"].as_str().unwrap_or("?"));
    println!(
        "Uptime:      {}s",
        health["uptime_seconds"].as_u64().unwrap_or(0)
    );
    println!("Vaults:      {}", health["vaults"].as_u64().unwrap_or(0));
    println!(
        "Active jobs: {}",
        health["active_jobs"].as_u64().unwrap_or(0)
    );
    Ok(())
}

/// coldvault jobs
pub async fn cmd_jobs(host: &str, port: u16, json: bool) -> anyhow::Result<()> {
    let url = format!("{}/api/jobs", base_url(host, port));
    let response = Client::new()
        .get(&url)
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?
        .error_for_status()?;

    let jobs: Vec<Value> = response.json().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    if jobs.is_empty() {
        println!("No outstanding retrieval jobs.");
        return Ok(());
    }

    for job in jobs {
        let vault = job["vault"].as_str().unwrap_or("?");
        let resource = job["resource_id"].as_str().unwrap_or("?");
        let started = job["started_at"].as_str().unwrap_or("not started");
        println!("{}{}  (started: {})", vault, resource, started);
    }
    Ok(())
}
