//! # Forum Binary
//!
//! Assembles the engagement backend: configuration, logging, the SQLite
//! store, the in-memory session registry and the HTTP server.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use forum_api::{configure_routes, middleware, AppState, SessionCookie};
use forum_auth_session::{Argon2Credentials, SessionRegistry};
use forum_config::{LogConfig, LogFormat, Settings};
use forum_core::{AccountService, ReactionReconciler, ThreadAssembler};
use forum_db_sqlite::SqliteForumRepo;
use secrecy::ExposeSecret;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_tracing(&settings.log)?;

    // 1. Relational store
    let repo = Arc::new(
        SqliteForumRepo::connect(
            settings.database.url.expose_secret(),
            settings.database.max_connections,
        )
        .await?,
    );

    // 2. Session registry
    let registry = Arc::new(SessionRegistry::with_ttl(chrono::Duration::hours(
        settings.session.ttl_hours,
    )));
    if settings.session.sweep_interval_secs > 0 {
        spawn_sweeper(
            registry.clone(),
            Duration::from_secs(settings.session.sweep_interval_secs),
        );
    }

    // 3. Services over the ports
    let state = web::Data::new(AppState {
        sessions: registry,
        accounts: AccountService::new(repo.clone(), Arc::new(Argon2Credentials::new())),
        reactions: ReactionReconciler::new(repo.clone()),
        threads: ThreadAssembler::new(repo, settings.threads.orphan_policy),
        cookie: SessionCookie {
            name: settings.session.cookie_name.clone(),
            secure: settings.session.cookie_secure,
            max_age_hours: settings.session.ttl_hours,
        },
    });

    let (host, port) = settings.bind_addr();
    tracing::info!(%host, port, "forum starting");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::security_headers())
            .wrap(middleware::cors_policy())
            .wrap(middleware::request_logger())
            .configure(configure_routes)
    })
    .bind((host, port))?
    .run()
    .await?;

    Ok(())
}

/// `RUST_LOG` wins over `log.filter` when set.
fn init_tracing(log: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log.filter))?;
    let registry = tracing_subscriber::registry().with(filter);

    match log.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .try_init()?,
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_target(true))
            .try_init()?,
    }
    Ok(())
}

/// Periodically drops expired sessions. Reads still evict lazily.
fn spawn_sweeper(registry: Arc<SessionRegistry>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let purged = registry.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "expired sessions swept");
            }
        }
    });
}
