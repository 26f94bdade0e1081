use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pledge_core::adapters::PostgresLedgerStore;
use pledge_core::cli::{Cli, Commands, DbCommands};
use pledge_core::config::{Config, LogFormat};
use pledge_core::services::{
    run_reconciler, BoundedIdempotencyGuard, IdempotencyGuard, RedisIdempotencyGuard, RetryPolicy,
};
use pledge_core::{create_app, db, AppParts, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => pledge_core::cli::handle_db_migrate(&config).await,
        Commands::Reconcile { cause_id, heal } => {
            pledge_core::cli::handle_reconcile(&config, cause_id, heal).await
        }
        Commands::Config => pledge_core::cli::handle_config_validate(&config),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn submission_guard(config: &Config) -> anyhow::Result<Arc<dyn IdempotencyGuard>> {
    match &config.redis_url {
        Some(url) => {
            tracing::info!("Using Redis-backed idempotency guard");
            Ok(Arc::new(RedisIdempotencyGuard::new(url, config.idempotency_ttl_secs)?))
        }
        None => {
            tracing::info!(
                capacity = config.idempotency_capacity,
                "Using in-process idempotency guard"
            );
            Ok(Arc::new(BoundedIdempotencyGuard::new(config.idempotency_capacity)))
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let store = Arc::new(PostgresLedgerStore::new(pool));
    let guard = submission_guard(&config)?;

    let state = AppState::new(AppParts {
        store: store.clone(),
        notifications: store,
        cause_guard: guard.clone(),
        donation_guard: config.donation_idempotency.then_some(guard),
        retry: RetryPolicy {
            max_attempts: config.ledger_max_attempts,
            base_delay: config.retry_base_delay(),
            commit_timeout: config.commit_timeout(),
        },
        admin_api_key: config.admin_api_key.clone(),
        log_request_body: config.log_request_body,
    });

    match config.reconcile_interval() {
        Some(interval) => {
            tokio::spawn(run_reconciler(state.aggregates.clone(), interval));
        }
        None => tracing::info!("Background reconciliation disabled"),
    }

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
