use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;

use portal_proxy::config::loader::{load_config, ConfigError};
use portal_proxy::session::{unix_now, Session, SessionCodec};

#[derive(Parser)]
#[command(name = "portal-cli")]
#[command(about = "Operator tooling for the portal proxy", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a signed session cookie value
    MintSession {
        #[arg(long, env = "PORTAL_SESSION_SECRET")]
        secret: String,
        /// Subject id of the user
        #[arg(long)]
        sub: String,
        /// Upstream access token
        #[arg(long)]
        token: String,
        #[arg(long, default_value_t = 3600)]
        ttl_secs: u64,
    },
    /// Validate a configuration file and print every problem found
    CheckConfig { path: PathBuf },
    /// Query a running proxy's liveness endpoint
    Health {
        #[arg(short, long, default_value = "http://localhost:3000")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::MintSession {
            secret,
            sub,
            token,
            ttl_secs,
        } => {
            let codec = SessionCodec::new(secret.as_bytes())?;
            let session = Session {
                access_token: token,
                subject: sub,
                expires_at: unix_now().saturating_add(ttl_secs),
            };
            println!("{}", codec.seal(&session));
        }
        Commands::CheckConfig { path } => match load_config(&path) {
            Ok(_) => println!("{}: ok", path.display()),
            Err(ConfigError::Validation(errors)) => {
                for error in &errors {
                    eprintln!("{}: {}", path.display(), error);
                }
                return Ok(ExitCode::FAILURE);
            }
            Err(e) => {
                eprintln!("{}: {}", path.display(), e);
                return Ok(ExitCode::FAILURE);
            }
        },
        Commands::Health { url } => {
            let client = reqwest::Client::builder().no_proxy().build()?;
            let res = client
                .get(format!("{}/healthz", url.trim_end_matches('/')))
                .send()
                .await?;
            let status = res.status();
            if !status.is_success() {
                eprintln!("Error: proxy returned status {}", status);
                return Ok(ExitCode::FAILURE);
            }
            let json: Value = res.json().await?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }

    Ok(ExitCode::SUCCESS)
}
