use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "tunnelctl")]
#[command(about = "Management CLI for the tunnel orchestrator", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long)]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status and the current configuration version
    Status,
    /// Print the current configuration
    Config,
    /// Submit a configuration file as a versioned update
    Push {
        /// Version of the update; must be newer than the current one to apply
        version: i32,
        /// JSON file in the update wire format
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = match cli.command {
        Commands::Status => {
            client
                .get(format!("{}/admin/status", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Config => {
            client
                .get(format!("{}/admin/config", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Push { version, file } => {
            let body = tokio::fs::read(&file).await?;
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            client
                .put(format!("{}/admin/config/{}", cli.url, version))
                .headers(headers)
                .body(body)
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }

    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        std::process::exit(1);
    }
    Ok(())
}
