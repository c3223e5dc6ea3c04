//! # Translation Orchestrator Server
//!
//! Loads configuration, builds the store (PostgreSQL when `database.url` is set,
//! in-memory otherwise), starts the sweeper and serves the HTTP API until Ctrl-C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use translation_orchestrator::clock::SystemClock;
use translation_orchestrator::config::{self, OrchestratorConfig};
use translation_orchestrator::logging::init_structured_logging;
use translation_orchestrator::orchestration::{Orchestrator, OrchestratorComponents};
use translation_orchestrator::services::{HttpClientNotifier, HttpWorkerClient, UnlimitedQuota};
use translation_orchestrator::store::{CredentialStore, InMemoryStore, JobStore, PgStore};
use translation_orchestrator::web::{create_app, AppState};
use uuid::Uuid;

async fn build_stores(config: &OrchestratorConfig) -> Result<(Arc<dyn JobStore>, Arc<dyn CredentialStore>)> {
    match config.database.url.as_deref() {
        Some(url) => {
            let store = PgStore::connect(url, config.database.max_connections)
                .await
                .context("connecting to PostgreSQL")?;
            store.migrate().await.context("running migrations")?;
            for secret in &config.credential_seeds {
                store.add_credential(secret).await.context("seeding credentials")?;
            }
            info!(max_connections = config.database.max_connections, "🗄️ Using PostgreSQL store");
            let store = Arc::new(store);
            let jobs: Arc<dyn JobStore> = store.clone();
            let credentials: Arc<dyn CredentialStore> = store;
            Ok((jobs, credentials))
        }
        None => {
            warn!("No database.url configured, job state lives in memory only");
            let store = Arc::new(InMemoryStore::with_credentials(
                config.credential_seeds.iter().cloned(),
            ));
            let jobs: Arc<dyn JobStore> = store.clone();
            let credentials: Arc<dyn CredentialStore> = store;
            Ok((jobs, credentials))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_structured_logging();

    let config = config::load().context("loading orchestrator configuration")?;
    let instance_id = Uuid::new_v4().to_string();
    info!(
        instance_id = %instance_id,
        workers = config.workers.len(),
        bind_address = %config.web.bind_address,
        "🚀 Starting translation orchestrator"
    );

    let (jobs, credentials) = build_stores(&config).await?;
    let timeout = config.dispatch.request_timeout();
    let bind_address = config.web.bind_address.clone();

    let orchestrator = Orchestrator::new(
        config,
        OrchestratorComponents {
            jobs,
            credentials,
            worker_client: Arc::new(HttpWorkerClient::new(timeout, instance_id.clone())?),
            notifier: Arc::new(HttpClientNotifier::new(timeout)?),
            quota: Arc::new(UnlimitedQuota),
            clock: Arc::new(SystemClock),
            instance_id,
        },
    );

    let sweeper = orchestrator.spawn_sweeper();
    let app = create_app(AppState::new(orchestrator.clone()));

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {bind_address}"))?;
    info!(bind_address = %bind_address, "🌐 HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("🛑 Shutdown signal received");
        })
        .await
        .context("serving HTTP")?;

    orchestrator.stop_sweeper();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "Sweeper task ended abnormally");
    }
    info!("👋 Orchestrator stopped");
    Ok(())
}
