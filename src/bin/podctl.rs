use clap::{Parser, Subcommand};
use podwallet_client::RpcClient;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "podctl")]
#[command(about = "Command-line client for the podwallet RPC server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:11046")]
    url: String,

    /// Bearer token, if the listener requires one
    #[arg(short, long, env = "PODWALLET_RPC_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show wallet and chain connection status
    Status,
    /// Ask the wallet process to shut down
    Stop,
    /// Call an arbitrary RPC method
    Call {
        method: String,
        /// Parameters; each is parsed as JSON, falling back to a string
        params: Vec<String>,
    },
}

fn parse_param(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut client = RpcClient::new(&cli.url);
    if let Some(token) = cli.token {
        client = client.with_token(token);
    }

    match cli.command {
        Commands::Status => {
            let status = client.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Stop => {
            println!("{}", client.stop().await?);
        }
        Commands::Call { method, params } => {
            let params: Vec<Value> = params.iter().map(|p| parse_param(p)).collect();
            let result = client.call(&method, &params).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
