use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use shrlink_relay::client::{RelayClient, extract_filename_from_url, is_http_url};
use shrlink_relay::utils::validation::validate_stored_name;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "relay_cli", version, about = "Talk to a ShrLink HTTP relay")]
struct Cli {
    /// Relay base URL
    #[arg(long, env = "RELAY_URL", default_value = "http://localhost:8000", global = true)]
    relay: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30, global = true)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload a file and print its download URL
    Upload { file: PathBuf },

    /// Fetch a file by stored name or download URL
    Download {
        name_or_url: String,

        /// Output path (defaults to the stored name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show file count and total bytes
    Stats,

    /// Delete files older than the given age
    Cleanup {
        /// Age threshold in seconds (relay default when omitted)
        #[arg(long)]
        max_age: Option<u64>,
    },

    /// Check that the relay is up
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_cli=info,shrlink_relay=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let client =
        RelayClient::with_timeout(&cli.relay, std::time::Duration::from_secs(cli.timeout))?;

    match cli.command {
        Commands::Upload { file } => {
            let uploaded = client.upload_path(&file).await?;
            info!(
                "✅ Uploaded {} ({} bytes) as {}",
                file.display(),
                uploaded.size,
                uploaded.filename
            );
            println!("{}", uploaded.download_url);
        }
        Commands::Download {
            name_or_url,
            output,
        } => {
            let content = client.download(&name_or_url).await?;
            let output = match output {
                Some(path) => path,
                None if is_http_url(&name_or_url) => extract_filename_from_url(&name_or_url)
                    .filter(|name| validate_stored_name(name).is_ok())
                    .map(PathBuf::from)
                    .ok_or_else(|| anyhow::anyhow!("cannot derive a file name from {}", name_or_url))?,
                None => PathBuf::from(&name_or_url),
            };
            tokio::fs::write(&output, &content).await?;
            info!("✅ Saved {} bytes to {}", content.len(), output.display());
        }
        Commands::Stats => {
            let stats = client.stats().await?;
            println!("total_files: {}", stats.total_files);
            println!("total_bytes: {}", stats.total_bytes);
        }
        Commands::Cleanup { max_age } => {
            let deleted = client.cleanup(max_age).await?;
            println!("deleted_count: {}", deleted);
        }
        Commands::Health => {
            let health = client.health().await?;
            println!("{} ({})", health.status, health.upload_dir);
        }
    }

    Ok(())
}
