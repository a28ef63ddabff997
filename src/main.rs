use clap::Parser;

use coldvault::cli::{self, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up tracing based on verbose flag
    if cli.verbose {
        tracing_subscriber::fmt().with_env_filter("debug").init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }

    if let Err(e) = cli::dispatch(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
