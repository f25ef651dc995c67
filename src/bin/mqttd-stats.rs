use clap::Parser;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "mqttd-stats")]
#[command(about = "Print the diagnostics snapshot of a running mqttd", long_about = None)]
struct Cli {
    /// Base URL of the broker's stats listener.
    #[arg(short, long, default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Print a single field instead of the whole snapshot (e.g. clients_connected).
    #[arg(short, long)]
    field: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/", cli.url.trim_end_matches('/'))).send().await?;
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: stats listener returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    match cli.field {
        Some(field) => match json.get(&field) {
            Some(value) => println!("{}", value),
            None => {
                eprintln!("Error: no field '{}' in snapshot", field);
                std::process::exit(1);
            }
        },
        None => println!("{}", serde_json::to_string_pretty(&json)?),
    }
    Ok(())
}
