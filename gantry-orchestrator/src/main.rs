use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;

use config::{Config, StorageBackend};
use repository::{
    ExecutionRepository, MemoryExecutionRepository, MemoryPipelineRepository,
    PgExecutionRepository, PgPipelineRepository, PipelineRepository,
};
use service::ExecutionController;
use service::authz::{AllowAllAuthorizer, Authorizer, PolicyAuthorizer};
use service::canceler::Canceler;
use service::check::{HttpCheckReporter, LinkBuilder};
use service::commit::{HttpCommitService, RetryingCommitService};
use service::dispatch::{BuildDispatcher, HttpDispatcher, LogDispatcher};
use service::policy::PipelineRulesPolicy;
use service::signals::Signals;
use service::triggerer::Triggerer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gantry_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Gantry Orchestrator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let (executions, pipelines) = open_storage(&config).await?;
    let controller = build_controller(&config, executions, pipelines)?;

    // Build router with all API endpoints
    let app = api::create_router(controller);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")?;

    Ok(())
}

async fn open_storage(
    config: &Config,
) -> anyhow::Result<(Arc<dyn ExecutionRepository>, Arc<dyn PipelineRepository>)> {
    match config.storage {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; executions are lost on restart");

            let pipelines = MemoryPipelineRepository::new();
            if let Some(path) = &config.pipelines_file {
                let count = pipelines
                    .load_file(path)
                    .with_context(|| format!("Failed to load pipelines from {}", path.display()))?;
                tracing::info!("Loaded {} pipeline(s) from {}", count, path.display());
            }

            Ok((
                Arc::new(MemoryExecutionRepository::new()),
                Arc::new(pipelines),
            ))
        }
        StorageBackend::Postgres => {
            tracing::info!("Connecting to database...");

            let pool = db::create_pool(&config.database_url, config.max_connections)
                .await
                .context("Failed to create database pool")?;

            tracing::info!("Database connection pool created");

            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;

            Ok((
                Arc::new(PgExecutionRepository::new(pool.clone())),
                Arc::new(PgPipelineRepository::new(pool)),
            ))
        }
    }
}

fn build_controller(
    config: &Config,
    executions: Arc<dyn ExecutionRepository>,
    pipelines: Arc<dyn PipelineRepository>,
) -> anyhow::Result<Arc<ExecutionController>> {
    let dispatcher: Arc<dyn BuildDispatcher> = match &config.dispatch_url {
        Some(url) => {
            tracing::info!("Dispatching builds to {}", url);
            Arc::new(HttpDispatcher::new(url.clone()))
        }
        None => {
            tracing::warn!("GANTRY_DISPATCH_URL not set, dispatch messages will only be logged");
            Arc::new(LogDispatcher)
        }
    };

    let authorizer: Arc<dyn Authorizer> = match &config.authz_file {
        Some(path) => Arc::new(PolicyAuthorizer::from_file(path)?),
        None => {
            tracing::warn!("GANTRY_AUTHZ_FILE not set, every request is allowed");
            Arc::new(AllowAllAuthorizer)
        }
    };

    let signals = Signals::new(
        dispatcher,
        Arc::new(HttpCheckReporter::new(
            config.scm_url.clone(),
            config.scm_token.clone(),
        )),
        LinkBuilder::new(config.public_url.clone()),
    );

    let commits = Arc::new(RetryingCommitService::new(
        Arc::new(HttpCommitService::new(
            config.scm_url.clone(),
            config.scm_token.clone(),
        )),
        config.commit_retry,
    ));

    let canceler = Arc::new(Canceler::new(
        executions.clone(),
        signals.clone(),
        config.cancel_attempts,
    ));

    let triggerer = Arc::new(Triggerer::new(
        executions.clone(),
        pipelines.clone(),
        commits,
        Arc::new(PipelineRulesPolicy),
        signals.clone(),
        canceler.clone(),
        config.dedupe,
    ));

    tracing::info!("Services initialized (dedupe key: {})", config.dedupe);

    Ok(Arc::new(ExecutionController::new(
        executions, pipelines, authorizer, triggerer, canceler, signals,
    )))
}
