//! Scribe Server - Main entry point
//!
//! Serves the authorization core of the Scribe blog backend.

use std::sync::Arc;
use std::time::Duration;

use scribe_core::{
    api::{self, AppState},
    config::Config,
    db::Database,
    middleware::{
        Authenticator, ClaimIdentityResolver, DirectoryIdentityResolver, IdentityResolver,
        JwksCache,
    },
    observability,
    rbac::{
        self, AuthzStore, OwnershipRegistry, PgAuthzStore, PolicyEngine, RoleService,
        SelfOwnershipChecker, SqlOwnershipChecker,
    },
    users::{PgUserDirectory, UserDirectory},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    observability::init("scribe-server", &config.observability)?;
    let metrics = observability::install_metrics_recorder()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Scribe Server"
    );

    // Database
    let db = Database::new(&config.database).await?;
    if config.database.run_migrations {
        db.migrate().await?;
    }

    // Authorization store and catalog
    let store: Arc<dyn AuthzStore> = Arc::new(PgAuthzStore::new(db.pool().clone()));
    if config.authz.seed_on_startup {
        rbac::seed(store.as_ref()).await?;
    }

    // Ownership checkers
    let ownership = OwnershipRegistry::new();
    for source in &config.ownership.sources {
        let checker = SqlOwnershipChecker::new(db.pool().clone(), source)?;
        if !checker.table_exists().await? {
            tracing::warn!(
                resource_type = %source.resource_type,
                table = %source.table,
                "Ownership source table does not exist; skipping"
            );
            continue;
        }
        ownership.register(source.resource_type.clone(), Arc::new(checker));
    }
    ownership.register("users", Arc::new(SelfOwnershipChecker));
    tracing::info!(resource_types = ?ownership.resource_types(), "Ownership checkers registered");

    let engine = Arc::new(
        PolicyEngine::new(store.clone(), ownership).with_timeout(config.authz.decision_timeout()),
    );

    // Token verification
    let jwks = Arc::new(JwksCache::new(config.auth.jwks_url.clone()));
    if let Err(e) = jwks.refresh().await {
        tracing::warn!(error = %e.chain(), "Initial JWKS fetch failed; tokens are rejected until a refresh succeeds");
    }
    let refresh_task = jwks
        .clone()
        .spawn_refresh(Duration::from_secs(config.auth.jwks_refresh_secs));
    let authenticator = Arc::new(Authenticator::new(&config.auth, jwks)?);

    // Identity resolution
    let directory: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(db.pool().clone()));
    let identity: Arc<dyn IdentityResolver> = match &config.auth.user_id_claim {
        Some(claim) => Arc::new(ClaimIdentityResolver::new(claim.clone())),
        None => Arc::new(DirectoryIdentityResolver::new(directory.clone())),
    };

    let app_state = AppState {
        engine,
        roles: RoleService::new(store),
        directory,
        authenticator,
        identity,
        db: Some(db),
        metrics: Some(metrics),
    };

    let app = api::build_router(app_state);

    let addr = config.bind_addr();
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    refresh_task.abort();
    observability::shutdown();
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
