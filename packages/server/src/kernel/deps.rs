//! Migration dependencies (using traits for testability)
//!
//! This module provides the dependency container handed to every migration
//! step. Storage is reached only through the Base* traits so the same steps
//! run against Postgres in production and the in-memory store in tests.

use sqlx::PgPool;
use std::sync::Arc;

use crate::domains::applications::models::{Application, V2Application};
use crate::domains::users::models::{ExternalUser, NomisUser, UnifiedUser, V2User};
use crate::kernel::{BaseRepository, BaseTransactionManager, PgStore};

// =============================================================================
// MigrationDeps
// =============================================================================

/// Repositories for every table the migration touches, plus the transaction
/// manager they share.
#[derive(Clone)]
pub struct MigrationDeps {
    pub nomis_users: Arc<dyn BaseRepository<NomisUser>>,
    pub external_users: Arc<dyn BaseRepository<ExternalUser>>,
    pub v2_users: Arc<dyn BaseRepository<V2User>>,
    pub unified_users: Arc<dyn BaseRepository<UnifiedUser>>,
    pub applications: Arc<dyn BaseRepository<Application>>,
    pub v2_applications: Arc<dyn BaseRepository<V2Application>>,
    pub transactions: Arc<dyn BaseTransactionManager>,
}

impl MigrationDeps {
    /// Postgres-backed dependencies sharing one transaction slot.
    pub fn postgres(pool: PgPool) -> Self {
        let store = PgStore::new(pool);
        Self {
            nomis_users: Arc::new(store.repository::<NomisUser>()),
            external_users: Arc::new(store.repository::<ExternalUser>()),
            v2_users: Arc::new(store.repository::<V2User>()),
            unified_users: Arc::new(store.repository::<UnifiedUser>()),
            applications: Arc::new(store.repository::<Application>()),
            v2_applications: Arc::new(store.repository::<V2Application>()),
            transactions: Arc::new(store),
        }
    }
}
