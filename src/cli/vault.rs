// CLI vault commands: list, records, inventory

use reqwest::Client;
use serde_json::Value;

use super::{base_url, handle_request_error};

/// coldvault vault list
pub async fn cmd_list(host: &str, port: u16) -> anyhow::Result<()> {
    let url = format!("{}/api/vaults", base_url(host, port));
    let response = Client::new()
        .get(&url)
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?
        .error_for_status()?;

    let vaults: Vec<String> = response.json().await?;
    if vaults.is_empty() {
        println!("No vaults found.");
        return Ok(());
    }
    for vault in vaults {
        println!("{}", vault);
    }
    Ok(())
}

/// coldvault vault records <vault>
pub async fn cmd_records(host: &str, port: u16, vault: &str) -> anyhow::Result<()> {
    let url = format!("{}/api/vaults/{}/records", base_url(host, port), vault);
    let response = Client::new()
        .get(&url)
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        anyhow::bail!("No such vault: {}", vault);
    }
    let response = response.error_for_status()?;

    let records: Vec<String> = response.json().await?;
    if records.is_empty() {
        println!("Vault '{}' has no archived resources.", vault);
        return Ok(());
    }
    for record in records {
        println!("{}", record);
    }
    Ok(())
}

/// coldvault vault inventory <vault>
pub async fn cmd_inventory(host: &str, port: u16, vault: &str) -> anyhow::Result<()> {
    let url = format!("{}/api/vaults/{}/inventory", base_url(host, port), vault);
    let response = Client::new()
        .post(&url)
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?
        .error_for_status()?;

    let status = response.status();
    let body: Value = response.json().await?;
    let estimate = body["estimate_seconds"].as_i64().unwrap_or(-1);

    if status == reqwest::StatusCode::OK {
        println!("Inventory of vault '{}' is in the cache.", vault);
    } else {
        println!(
            "Inventory retrieval queued for vault '{}'. Estimated wait: {}",
            vault,
            format_duration(estimate)
        );
    }
    Ok(())
}

fn format_duration(secs: i64) -> String {
    if secs < 0 {
        return "unknown".to_string();
    }
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(14_400), "4h 0m");
        assert_eq!(format_duration(-1), "unknown");
    }
}
