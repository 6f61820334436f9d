use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "tape-cli")]
#[command(about = "Switch tapes on a running tape-proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Control namespace prefix configured on the proxy
    #[arg(short, long, default_value = "/__control")]
    prefix: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Make the named tape active
    Load { name: String },
    /// Return to the default tape
    Unload,
    /// Show mode, active tape and remaining records
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = format!(
        "{}{}",
        cli.url.trim_end_matches('/'),
        cli.prefix.trim_end_matches('/')
    );

    let res = match cli.command {
        Commands::Load { name } => {
            client
                .post(format!("{base}/tape"))
                .json(&json!({ "tape": name }))
                .send()
                .await?
        }
        Commands::Unload => client.post(format!("{base}/tape")).json(&json!({})).send().await?,
        Commands::Status => client.get(format!("{base}/status")).send().await?,
    };

    if !print_response(res).await? {
        std::process::exit(1);
    }
    Ok(())
}

/// Print the reply; returns whether the proxy reported success.
async fn print_response(res: reqwest::Response) -> Result<bool, Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: control API returned status {}", status);
        if !text.is_empty() {
            eprintln!("Response: {}", text);
        }
        return Ok(false);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(true)
}
