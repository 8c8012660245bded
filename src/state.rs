//! Shared application state for all routes.

use crate::entities;
use crate::error::SpecError;
use crate::repo::PgRepository;
use crate::view::spec::FetchSpecRegistry;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub registry: Arc<FetchSpecRegistry>,
    pub repo: Arc<PgRepository>,
}

impl AppState {
    /// Build the fetch-spec registry and repository over one pool.
    pub fn new(pool: PgPool) -> Result<Self, SpecError> {
        let registry = Arc::new(entities::build_registry(&pool)?);
        let repo = Arc::new(PgRepository::new(pool.clone(), registry.clone()));
        Ok(AppState {
            pool,
            registry,
            repo,
        })
    }
}
