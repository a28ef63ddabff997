pub mod jobs;
pub mod vault;

use clap::{Parser, Subcommand};

/// ColdVault - an asynchronous retrieval gateway for cold archival storage
#[derive(Parser, Debug)]
#[command(
    name = "coldvault",
    version,
    about = "ColdVault - an asynchronous retrieval gateway for cold archival storage"
)]
pub struct Cli {
    /// Gateway host
    #[arg(long, default_value = "127.0.0.1", global = true)]
    pub host: String,

    /// Gateway port
    #[arg(long, default_value_t = 8380, global = true)]
    pub port: u16,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the gateway server
    Serve {
        /// Path to configuration file
        #[arg(short = 'c', long = "config")]
        config: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short = 'p', long)]
        port: Option<u16>,

        /// Data directory path
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },

    /// Show gateway status
    Status,

    /// Inspect and manage vaults
    #[command(subcommand)]
    Vault(VaultCommands),

    /// List outstanding retrieval jobs
    Jobs {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum VaultCommands {
    /// List known vaults
    List,

    /// List the archived resources of a vault
    Records {
        /// Vault name
        vault: String,
    },

    /// Request retrieval of a vault's inventory document
    Inventory {
        /// Vault name
        vault: String,
    },
}

pub async fn dispatch(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Some(Commands::Serve {
            config,
            port,
            data_dir,
        }) => {
            crate::daemon::serve(
                config.as_deref().map(std::path::Path::new),
                data_dir.as_deref().map(std::path::Path::new),
                None,
                *port,
            )
            .await
        }
        Some(Commands::Status) => jobs::cmd_status(&cli.host, cli.port).await,
        Some(Commands::Vault(VaultCommands::List)) => vault::cmd_list(&cli.host, cli.port).await,
        Some(Commands::Vault(VaultCommands::Records { vault })) => {
            vault::cmd_records(&cli.host, cli.port, vault).await
        }
        Some(Commands::Vault(VaultCommands::Inventory { vault })) => {
            vault::cmd_inventory(&cli.host, cli.port, vault).await
        }
        Some(Commands::Jobs { json }) => jobs::cmd_jobs(&cli.host, cli.port, *json).await,
        None => {
            // No subcommand: print help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

/// Base URL of the gateway API.
pub fn base_url(host: &str, port: u16) -> String {
    format!("http://{}:{}", host, port)
}

pub fn connection_error_message(host: &str, port: u16) -> String {
    format!(
        "Could not connect to the gateway at {}:{}. Is it running? Start it with: coldvault serve",
        host, port
    )
}

/// Map a reqwest failure to a user-friendly error.
pub fn handle_request_error(err: reqwest::Error, host: &str, port: u16) -> anyhow::Error {
    if err.is_connect() || err.is_timeout() {
        anyhow::anyhow!("{}", connection_error_message(host, port))
    } else {
        anyhow::anyhow!("Request failed: {}", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_base_url() {
        assert_eq!(base_url("127.0.0.1", 8380), "http://127.0.0.1:8380");
    }

    #[test]
    fn test_serve_subcommand_flags() {
        let cli = Cli::parse_from([
            "coldvault",
            "serve",
            "--config",
            "/etc/coldvault.json",
            "-p",
            "9999",
        ]);
        match cli.command {
            Some(Commands::Serve { config, port, .. }) => {
                assert_eq!(config.as_deref(), Some("/etc/coldvault.json"));
                assert_eq!(port, Some(9999));
            }
            other => panic!("Expected Serve, got {:?}", other),
        }
    }

    #[test]
    fn test_vault_records_subcommand() {
        let cli = Cli::parse_from(["coldvault", "vault", "records", "noaa"]);
        match cli.command {
            Some(Commands::Vault(VaultCommands::Records { vault })) => {
                assert_eq!(vault, "noaa");
            }
            other => panic!("Expected Vault Records, got {:?}", other),
        }
    }
}
