//! # Capsulr binary
//!
//! Assembles the application from the adapters selected at compile time,
//! runs the unlock sweep next to the HTTP server and stops both on Ctrl-C,
//! then drains mail still queued in the outbox.

use std::sync::Arc;

use anyhow::Context;
use api_adapters::{router, AppState, Metrics};
use auth_adapters::JwtVerifier;
use configs::{DatabaseSettings, LogFormat, LogSettings, Settings};
use domains::{
    CapsuleRepository, CommentRepository, MemoryRepository, ReactionRepository, SystemClock, UserDirectory,
};
use secrecy::ExposeSecret;
use services::{IntervalTrigger, LinkBuilder, Repositories, RetryPolicy, Services};
use storage_adapters::{InMemoryStore, LogNotifier};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "db-postgres")]
use storage_adapters::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load configuration")?;
    init_tracing(&settings.log);

    let repos = build_repositories(&settings.database).await?;
    let links = LinkBuilder::new(&settings.server.public_base_url).context("server.public_base_url is not a valid URL")?;
    let metrics = Arc::new(Metrics::new());
    let services = Arc::new(Services::new(
        repos,
        Arc::new(LogNotifier::new(settings.mail.from.clone())),
        Arc::new(SystemClock),
        links,
        RetryPolicy::default(),
        metrics.clone(),
    ));

    let secret = settings.auth.jwt_secret.as_ref().context("auth.jwt_secret is not set")?;
    let verifier = Arc::new(JwtVerifier::new(secret.expose_secret().as_bytes()));

    // background sweep
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep_task = if settings.sweep.enabled {
        let trigger = IntervalTrigger::every(settings.sweep.interval());
        info!(interval_secs = settings.sweep.interval_secs, "starting unlock sweep");
        Some(tokio::spawn(services.sweep().run(trigger, shutdown_rx)))
    } else {
        warn!("unlock sweep disabled; capsules unlock only when opened");
        None
    };

    let state = AppState { services: Arc::clone(&services), verifier, metrics };
    let app = router(state, &settings.server.cors_origins);

    let listener = TcpListener::bind(settings.server.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", settings.server.bind_addr()))?;
    info!(addr = %listener.local_addr()?, "🚀 Capsulr listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // the receiver may already be gone if the sweep stopped on its own
    let _ = shutdown_tx.send(true);
    if let Some(task) = sweep_task {
        task.await.context("sweep task panicked")?;
    }
    services.flush_notifications().await;
    info!("shutdown complete");
    Ok(())
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn build_repositories(database: &DatabaseSettings) -> anyhow::Result<Repositories> {
    #[cfg(feature = "db-postgres")]
    if let Some(url) = &database.url {
        let store = PgStore::connect(url.expose_secret(), database.max_connections)
            .await
            .context("failed to connect to postgres")?;
        store.migrate().await?;
        info!(max_connections = database.max_connections, "using postgres store");
        return Ok(repositories(Arc::new(store)));
    }

    #[cfg(not(feature = "db-postgres"))]
    if database.url.is_some() {
        warn!("database.url is set but this build has no postgres support");
    }
    warn!("using the in-memory store; data is lost on restart");
    Ok(repositories(Arc::new(InMemoryStore::new())))
}

fn repositories<S>(store: Arc<S>) -> Repositories
where
    S: CapsuleRepository + MemoryRepository + ReactionRepository + CommentRepository + UserDirectory + 'static,
{
    Repositories {
        capsules: store.clone(),
        memories: store.clone(),
        reactions: store.clone(),
        comments: store.clone(),
        users: store,
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "failed to listen for Ctrl-C; shutting down");
    }
    info!("shutdown signal received");
}
