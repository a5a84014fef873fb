use anyhow::Result;
use clap::{Parser, Subcommand};
use northstar::app::build_state;
use northstar::gateway;
use northstar::Config;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "northstar", about = "AI conversation and sync engine for personal goal management", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP gateway.
    Serve {
        /// Bind host (overrides config).
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides config).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Classify a single message against the rule catalog and the local
    /// provider, printing the result as JSON. Useful for tuning patterns.
    Classify {
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let cli = Cli::parse();
    let config = Config::load_or_init()?;

    match cli.command {
        Command::Serve { host, port } => {
            let state = build_state(&config).await?;
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            let port = port.unwrap_or(config.gateway.port);
            gateway::run_gateway(&host, port, state).await
        }
        Command::Classify { message } => {
            let pool = sqlx::sqlite::SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await?;
            let state = northstar::app::build_state_with_pool(&config, pool).await?;
            let result = state
                .flow
                .classifier()
                .classify_intent(&message, None, None)
                .await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}
