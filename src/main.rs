//! Service entry point
//!
//! Wires the retrieval stack, generation backend, and session registry
//! into the orchestrator, then serves the HTTP surface until shutdown.

use std::sync::Arc;

use tracing::{error, info, warn};

use support_router::agents::{GenerationBackend, OpenAiGeneration, Responder, Supervisor};
use support_router::api::{build_router, AppState};
use support_router::config::Config;
use support_router::orchestrator::{Orchestrator, RoleBundle};
use support_router::retrieval::{
    AlwaysFetch, CacheOnce, CorpusLoader, EmbeddingClient, FileCorpusLoader, Hybrid, QdrantSearch,
    SimilaritySearch,
};
use support_router::session::SessionRegistry;
use support_router::SupportRole;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        "starting support router"
    );

    let embeddings = Arc::new(EmbeddingClient::new(&config.models, &config.retrieval)?);
    let qdrant = QdrantSearch::connect(config.retrieval.clone(), embeddings)?;
    if let Err(e) = qdrant.healthcheck().await {
        warn!(error = %e, "vector store unreachable at startup, searches will degrade");
    }
    let search: Arc<dyn SimilaritySearch> = Arc::new(qdrant);
    let loader: Arc<dyn CorpusLoader> =
        Arc::new(FileCorpusLoader::new(&config.corpus.policies_path));

    let backend: Arc<dyn GenerationBackend> = Arc::new(OpenAiGeneration::new(&config.models)?);

    let policy_strategy = Arc::new(CacheOnce::new(loader));
    if let Err(e) = policy_strategy.preload().await {
        warn!(error = %e, "policy corpus preload failed, first policy request will retry");
    }

    let billing = RoleBundle {
        strategy: Arc::new(Hybrid::new(search.clone(), &config.retrieval)),
        responder: Responder::new(SupportRole::Billing, backend.clone(), &config.models)?,
    };
    let technical = RoleBundle {
        strategy: Arc::new(AlwaysFetch::new(search.clone(), &config.retrieval)),
        responder: Responder::new(SupportRole::Technical, backend.clone(), &config.models)?,
    };
    let policy = RoleBundle {
        strategy: policy_strategy,
        responder: Responder::new(SupportRole::Policy, backend.clone(), &config.models)?,
    };

    let supervisor = Supervisor::new(backend, &config.models);
    let registry = Arc::new(SessionRegistry::new(&config.session));

    let orchestrator = Arc::new(Orchestrator::new(
        registry.clone(),
        supervisor,
        billing,
        technical,
        policy,
        config.session.history_window,
    ));

    let idle_timeout = config.session.idle_timeout();
    let sweeper = {
        let registry = registry.clone();
        let interval = config.session.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; skip it so the loop
            // waits a full interval before the first sweep.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = registry.sweep_expired(idle_timeout);
                if removed > 0 {
                    info!(removed, "swept idle sessions");
                }
            }
        })
    };

    let state = AppState {
        orchestrator,
        registry: registry.clone(),
        idle_timeout,
    };
    let router = build_router(state, &config)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    let removed = registry.sweep_expired(idle_timeout);
    info!(removed, "shutdown sweep complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install shutdown handler");
        return;
    }
    info!("shutdown signal received");
}
