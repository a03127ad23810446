//! Tribe Server Library
//!
//! Community membership engine (join codes, role-gated administration,
//! atomic admin transfer) and the thin HTTP layer in front of it.

pub mod api;
pub mod auth;
pub mod authz;
pub mod db;
pub mod error;
pub mod join_code;
pub mod models;
pub mod services;
pub mod state;
pub mod store;

use anyhow::Result;
use std::sync::Arc;
use store::{CommunityStore, MemoryStore, PgStore};

/// Build the router on top of an already constructed store
pub fn build_app(config: state::Config, store: Arc<dyn CommunityStore>) -> Result<axum::Router> {
    let app_state = state::AppState::new(config, store)?;
    Ok(api::create_router(app_state))
}

/// Create and configure the server application
pub async fn create_app(config: state::Config) -> Result<axum::Router> {
    let store: Arc<dyn CommunityStore> = if config.uses_memory_store() {
        tracing::warn!("Using in-memory store, data will not survive a restart");
        Arc::new(MemoryStore::new())
    } else {
        let db_pool = db::init_pool(&config.database_url, config.max_connections).await?;
        db::run_migrations(&db_pool).await?;
        Arc::new(PgStore::new(db_pool))
    };

    build_app(config, store)
}
