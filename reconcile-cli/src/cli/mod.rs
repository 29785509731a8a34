//! Command-line front end

pub mod commands;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use log::debug;

use reconcile::api::ReqwestCaller;
use reconcile::config::{Settings, repository};
use reconcile::sync::{PathMapper, SqliteObjectStore, SqliteStore, SyncEngine, SyncStore};

/// Everything a command needs: settings, the database and an engine over it
pub struct Context {
    pub settings: Settings,
    pub store: Arc<dyn SyncStore>,
    pub engine: SyncEngine,
}

impl Context {
    pub async fn open(settings: Settings) -> Result<Self> {
        settings.ensure_database_dir()?;
        debug!("Opening database {}", settings.database_url);
        let pool = repository::connect(&settings.database_url).await?;

        let http = ReqwestCaller::new(settings.http_timeout(), &settings.user_agent)
            .context("Failed to build HTTP client")?;
        let store: Arc<dyn SyncStore> = Arc::new(SqliteStore::new(pool.clone()));
        let engine = SyncEngine::new(
            store.clone(),
            Arc::new(http),
            Arc::new(SqliteObjectStore::new(pool)),
            Arc::new(PathMapper),
            settings.engine_settings(),
        );

        Ok(Self {
            settings,
            store,
            engine,
        })
    }
}
