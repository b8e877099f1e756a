use anyhow::Context;
use chunkgate_server::{Config, build_service, run_server};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "chunkgate")]
#[command(about = "Batched chunk storage gateway over pluggable object stores")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Server {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: String,

        /// Validate configuration and backend, then exit
        #[arg(long)]
        check: bool,
    },
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("chunkgate={},tower_http={}", level, level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server { config, check } => {
            let loaded = Config::from_file(&config);
            let level = loaded
                .as_ref()
                .map(|cfg| cfg.log.level.trim().to_ascii_lowercase())
                .unwrap_or_else(|_| "info".to_string());
            init_tracing(&level);

            let cfg = match loaded {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::error!("Failed to load config: {}", e);
                    std::process::exit(1);
                }
            };

            tracing::info!(
                "Starting Chunkgate server with config: {} (driver {}, parallel {}, min {})",
                config,
                cfg.store.driver,
                cfg.chunk.parallel,
                cfg.chunk.min
            );

            if let Err(error) = serve(cfg, check).await {
                tracing::error!("Server error: {:#}", error);
                std::process::exit(1);
            }
        }
    }
}

async fn serve(cfg: Config, check: bool) -> anyhow::Result<()> {
    let service = build_service(&cfg)
        .await
        .context("failed to build chunk service")?;

    if check {
        tracing::info!(
            configured = service.is_configured(),
            "Configuration check passed"
        );
        service.shutdown().await;
        return Ok(());
    }

    run_server(cfg, service)
        .await
        .context("server terminated")?;
    Ok(())
}
