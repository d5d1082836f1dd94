use std::sync::Arc;

use parkway_common::Result;
use parkway_config::{AppConfig, DatabaseConfig};
use parkway_db::{
    DirectorySource, EmbeddedSource, MigrationReport, MigrationRunner, MigrationSource,
    SqliteExecutor, StatementExecutor, UserStore,
};
use tokio::net::TcpListener;
use tracing::info;

use crate::connection::HttpConnectionHandler;
use crate::lifecycle::{LifecycleSupervisor, ShutdownTrigger};
use crate::router::build_router;
use crate::state::AppState;

/// Open the configured SQLite database.
pub fn open_executor(config: &DatabaseConfig) -> Result<Arc<dyn StatementExecutor>> {
    Ok(Arc::new(SqliteExecutor::open(&config.path)?))
}

/// The configured migrations directory, or the embedded migrations.
pub fn migration_source(config: &DatabaseConfig) -> Box<dyn MigrationSource> {
    match &config.migrations_dir {
        Some(dir) => Box::new(DirectorySource::new(dir)),
        None => Box::new(EmbeddedSource),
    }
}

/// Bring the database up to date. Any failure must stop startup.
pub fn run_migrations(
    executor: &Arc<dyn StatementExecutor>,
    config: &DatabaseConfig,
) -> Result<MigrationReport> {
    let source = migration_source(config);
    let report = MigrationRunner::new(Arc::clone(executor)).run(source.as_ref())?;
    info!(
        applied = report.applied.len(),
        skipped = report.skipped.len(),
        "database migrations complete"
    );
    Ok(report)
}

/// Binds to the configured address and serves the HTTP API until shut down.
pub struct GatewayServer {
    config: AppConfig,
    trigger: ShutdownTrigger,
}

impl GatewayServer {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            trigger: ShutdownTrigger::new(),
        }
    }

    /// Fires the same shutdown sequence as SIGINT/SIGTERM.
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.trigger.clone()
    }

    /// Migrate, then serve until shutdown completes.
    pub async fn run(self) -> Result<()> {
        let executor = open_executor(&self.config.database)?;
        run_migrations(&executor, &self.config.database)?;
        self.serve(executor).await
    }

    /// Serve on an already migrated database.
    pub async fn serve(self, executor: Arc<dyn StatementExecutor>) -> Result<()> {
        let addr = self.config.server.bind_addr();
        let grace = self.config.server.shutdown_grace();
        let app_name = self.config.app_name.clone();

        let state = Arc::new(AppState::new(self.config, UserStore::new(executor)));
        let app = build_router(state);

        let listener = TcpListener::bind(&addr).await?;
        info!("{app_name} listening on {addr}");

        LifecycleSupervisor::new(listener, grace)
            .with_trigger(self.trigger)
            .run(HttpConnectionHandler::new(app))
            .await
    }
}
