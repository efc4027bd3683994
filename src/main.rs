use clap::Parser;
use sqlx::migrate::Migrator;
use std::net::SocketAddr;
use std::path::Path;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paygate_core::cli::{Cli, Commands, DbCommands, GatewayCommands};
use paygate_core::config::Config;
use paygate_core::gateway::GatewayHttpClient;
use paygate_core::services::{run_poller, TransactionOrchestrator};
use paygate_core::{AppState, cli, create_app, db, secrets, startup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.command {
        None | Some(Commands::Serve) => serve(config).await,
        Some(Commands::Db(DbCommands::Migrate)) => cli::handle_db_migrate(&config).await,
        Some(Commands::Gateway(GatewayCommands::EncryptCredential { value })) => {
            cli::handle_gateway_encrypt(&config, &value).await
        }
        Some(Commands::Config) => {
            cli::handle_config_validate(&config)?;
            let pool = db::create_pool(&config).await?;
            let report = startup::validate_environment(&config, &pool).await?;
            report.print();
            if !report.is_valid() {
                anyhow::bail!("startup validation failed");
            }
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;

    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    let master_key = secrets::resolve_master_key(&config).await?;
    tracing::info!("Credential master key resolved");

    let http = GatewayHttpClient::new(config.gateway_timeout_secs);
    let orchestrator = TransactionOrchestrator::new(pool.clone(), http, master_key);

    tokio::spawn(run_poller(
        pool.clone(),
        orchestrator.clone(),
        config.poll_interval_secs,
        config.stale_after_secs,
    ));

    let app = create_app(AppState {
        db: pool,
        orchestrator,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
