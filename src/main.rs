use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use devforge::agents::handlers::{Collaborators, KnowledgeStore};
use devforge::agents::{Registry, events};
use devforge::api;
use devforge::config::AppConfig;
use devforge::llm::create_generator;
use devforge::store::{Database, LibSqlBackend};
use devforge::templates::FsTemplateStore;
use devforge::vcs::GitCli;

/// How long in-flight tasks get to finish on Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    eprintln!("devforge v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({})", config.llm.model, config.llm.backend.as_str());
    eprintln!("   API: http://0.0.0.0:{}/api/agents", config.port);
    eprintln!("   Events: ws://0.0.0.0:{}/ws/events", config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Templates: {}", config.templates_dir.display());

    // ── Collaborators ────────────────────────────────────────────────────
    let collaborators = Collaborators {
        generator: create_generator(&config.llm)?,
        vcs: Arc::new(GitCli::new()),
        templates: Arc::new(FsTemplateStore::new(&config.templates_dir)),
        knowledge: Arc::new(KnowledgeStore::new()),
        commit_limit: config.orchestrator.commit_limit,
    };

    // ── Registry ─────────────────────────────────────────────────────────
    let registry = Arc::new(Registry::new(
        Arc::clone(&db),
        collaborators,
        events::channel(config.orchestrator.event_capacity),
    ));
    let started = registry.bootstrap().await?;
    tracing::info!(agents = started.len(), "Agents started");

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = api::routes(Arc::clone(&registry));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await?;

    if tokio::time::timeout(SHUTDOWN_GRACE, registry.shutdown())
        .await
        .is_err()
    {
        tracing::warn!("In-flight tasks did not finish before shutdown deadline");
    }
    Ok(())
}
