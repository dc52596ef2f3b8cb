use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parl_storage::{PgRecordStore, PoolConfig, RecordStore};
use parl_sync::{Ingestor, Scheduler, SyncConfig};
use parl_web::{AppState, WebConfig};
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "parlwatch")]
#[command(about = "Sync OpenParliament bills and MPs into Postgres and serve them")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the hourly ingestion scheduler and the read API until Ctrl-C.
    Serve,
    /// Run a single ingestion cycle and exit.
    Sync,
    /// Create the bills and mps tables if they are missing.
    InitDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::from_env().context("loading sync configuration")?;

    let mut pool_config = PoolConfig::new(config.database_url.clone());
    pool_config.max_connections = config.db_max_connections;
    let pg = PgRecordStore::connect(&pool_config)
        .await
        .context("connecting to postgres")?;

    let outcome = run(cli.command.unwrap_or(Commands::Serve), &config, &pg).await;
    pg.close().await;
    outcome
}

async fn run(command: Commands, config: &SyncConfig, pg: &PgRecordStore) -> Result<()> {
    match command {
        Commands::InitDb => {
            pg.ensure_schema().await.context("creating schema")?;
            info!("schema ready");
        }
        Commands::Sync => {
            pg.ensure_schema().await.context("creating schema")?;
            let store: Arc<dyn RecordStore> = Arc::new(pg.clone());
            let summary = Ingestor::from_config(config, store)?.run_cycle().await;
            println!(
                "sync complete: run_id={} started={} finished={}",
                summary.run_id, summary.started_at, summary.finished_at
            );
        }
        Commands::Serve => {
            let web = WebConfig::from_env().context("loading web configuration")?;
            pg.ensure_schema().await.context("creating schema")?;

            let store: Arc<dyn RecordStore> = Arc::new(pg.clone());
            let scheduler = Scheduler::from_config(Ingestor::from_config(config, store.clone())?, config);
            let listener = TcpListener::bind((web.host.as_str(), web.port))
                .await
                .with_context(|| format!("binding {}:{}", web.host, web.port))?;
            let api = parl_web::serve(listener, AppState::new(store), shutdown_signal());

            let served = tokio::select! {
                result = api => result,
                () = scheduler.run_forever() => Ok(()),
            };
            info!("shutting down");
            // In-flight cycles hold pool connections; the caller closes the
            // pool only after this returns.
            scheduler.shutdown(config.shutdown_grace).await;
            served?;
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
