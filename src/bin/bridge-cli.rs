use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "bridge-cli")]
#[command(about = "Control CLI for a running HA Bridge", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:80")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the bridge version and supervisor iteration
    Version,
    /// Print the current settings (password redacted)
    Settings,
    /// Reload settings and restart the listeners
    Reinit,
    /// Stop the bridge
    Stop,
    /// Create an ephemeral test credential
    TestUser {
        #[arg(long)]
        username: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Version => {
            client
                .get(format!("{base}/system/habridge/version"))
                .send()
                .await?
        }
        Commands::Settings => client.get(format!("{base}/system/settings")).send().await?,
        Commands::Reinit => {
            client
                .post(format!("{base}/system/control/reinit"))
                .send()
                .await?
        }
        Commands::Stop => {
            client
                .post(format!("{base}/system/control/stop"))
                .send()
                .await?
        }
        Commands::TestUser { username } => {
            client
                .post(format!("{base}/system/security/testuser"))
                .json(&serde_json::json!({ "username": username }))
                .send()
                .await?
        }
    };
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: system API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
