use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::info;
use treasury_core::{EngineConfig, MirrorConfig, SweepConfig};
use treasury_service::tasks::{spawn_background_tasks, TaskConfig};
use treasury_service::{build_router, ServiceConfig, ServiceState};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MirrorMode {
    Auto,
    Disabled,
    Postgres,
}

#[derive(Debug, Parser)]
#[command(name = "treasuryd", version, about = "Community economy ledger service")]
struct Cli {
    /// REST socket address to bind, e.g. 127.0.0.1:8092
    #[arg(long, default_value = "127.0.0.1:8092")]
    listen: SocketAddr,
    /// Directory holding the local table snapshots.
    #[arg(long, default_value = "data", env = "TREASURY_DATA_DIR")]
    data_dir: PathBuf,
    /// Remote mirror backend. `auto` picks postgres when a database url is
    /// configured.
    #[arg(long, value_enum, default_value_t = MirrorMode::Auto, env = "TREASURY_MIRROR")]
    mirror: MirrorMode,
    /// PostgreSQL url for the remote table mirror.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
    /// Max PostgreSQL pool connections for the mirror.
    #[arg(long, default_value_t = 5, env = "TREASURY_PG_MAX_CONNECTIONS")]
    pg_max_connections: u32,
    /// Community scope id stamped on journal entries.
    #[arg(long, env = "TREASURY_SCOPE")]
    scope: Option<String>,
    /// Seconds between full-table autosaves.
    #[arg(long, default_value_t = 600)]
    flush_interval_secs: u64,
    /// Seconds between anomaly sweeps.
    #[arg(long, default_value_t = 43_200)]
    sweep_interval_secs: u64,
    /// Apply the magnitude heuristic (divide suspiciously large group
    /// balances) instead of only flagging suspects.
    #[arg(long, default_value_t = false)]
    apply_magnitude_heuristic: bool,
}

fn resolve_mirror(cli: &Cli) -> anyhow::Result<MirrorConfig> {
    let mirror = match cli.mirror {
        MirrorMode::Disabled => MirrorConfig::Disabled,
        MirrorMode::Postgres => {
            let database_url = cli.database_url.clone().ok_or_else(|| {
                anyhow::anyhow!("mirror=postgres requires --database-url or DATABASE_URL")
            })?;
            MirrorConfig::postgres(database_url, cli.pg_max_connections)
        }
        MirrorMode::Auto => match cli.database_url.clone() {
            Some(database_url) => MirrorConfig::postgres(database_url, cli.pg_max_connections),
            None => MirrorConfig::Disabled,
        },
    };
    Ok(mirror)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "treasury=info,info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let mirror = resolve_mirror(&cli)?;
    info!(mirror = mirror.label(), data_dir = %cli.data_dir.display(), "starting treasuryd");

    let config = ServiceConfig {
        engine: EngineConfig {
            data_dir: cli.data_dir.clone(),
            mirror,
            sweep: SweepConfig {
                apply_magnitude_corrections: cli.apply_magnitude_heuristic,
                ..SweepConfig::default()
            },
            scope_id: cli.scope.clone(),
            ..EngineConfig::default()
        },
    };
    let state = ServiceState::bootstrap(config).await?;

    let tasks = spawn_background_tasks(
        state.engine(),
        TaskConfig {
            flush_interval: Duration::from_secs(cli.flush_interval_secs),
            sweep_interval: Duration::from_secs(cli.sweep_interval_secs),
        },
    );

    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("treasuryd listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for task in tasks {
        task.abort();
    }

    // Final save: flush every table and wait on the remote leg before exit.
    info!("shutdown requested, flushing all tables");
    state.engine().lock().await.flush_all_sync().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler failed, shutting down");
    }
}
