use std::sync::Arc;

use tracing::info;

use crate::api::rate_limit::RateLimiter;
use crate::auth::registry::TokenRegistryFactory;
use crate::core::config::PostboardConfig;
use crate::core::error::Result;
use crate::core::events::BroadcastHub;
use crate::service::MutationService;
use crate::storage::backend::open_backend;
use crate::storage::persistence::StatePersistence;


/// Everything one server process owns. Built once by `init`, released by `teardown`.
pub struct AppState {

    pub config: PostboardConfig,

    pub service: MutationService,

    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// Opens storage and restores users, posts, sessions and pending deletes.
    /// Pending deletes past their deadline are dropped; the rest get fresh timers,
    /// so this must run inside a tokio runtime.
    pub fn init(config: PostboardConfig) -> Result<Arc<Self>> {
        let backend = open_backend(config.storage_backend, &config.data_dir)?;
        let persistence = Arc::new(StatePersistence::new(backend));
        info!(
            "Opened {} storage in {}",
            persistence.backend_name(),
            config.data_dir.display()
        );

        let tokens = TokenRegistryFactory::from_config(&config, Arc::clone(&persistence));
        let hub = Arc::new(BroadcastHub::new());
        let service = MutationService::load(persistence, tokens, hub, config.grace_period());
        let rate_limiter = RateLimiter::per_minute(config.rate_limit_max);

        Ok(Arc::new(Self {
            config,
            service,
            rate_limiter,
        }))
    }

    /// Cancels expiry timers, closes observers and writes final state.
    /// Pending deletes remain on disk and are re-armed by the next `init`.
    pub fn teardown(&self) {
        self.service.shutdown();
        info!("Shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::StorageBackendKind;
    use crate::service::NewUser;
    use std::time::Duration;

    #[tokio::test]
    async fn test_init_teardown_init_keeps_pending_delete() {
        for backend in [StorageBackendKind::Json, StorageBackendKind::Sqlite] {
            let dir = tempfile::tempdir().unwrap();
            let config = PostboardConfig {
                storage_backend: backend,
                ..PostboardConfig::new(dir.path())
            };

            let state = AppState::init(config.clone()).unwrap();
            let user = state.service.create_user(NewUser::named("ann")).unwrap();
            let outcome = state.service.delete_user(&user, user.id).unwrap();
            state.teardown();
            drop(state);

            let state = AppState::init(config).unwrap();
            assert_eq!(state.service.snapshots().len(), 1);
            state.service.undo(&outcome.undo_handle).unwrap();
            assert_eq!(state.service.get_user(user.id).unwrap().name, "ann");
            state.teardown();
        }
    }

    #[tokio::test]
    async fn test_teardown_cancels_timers() {
        let dir = tempfile::tempdir().unwrap();
        let config = PostboardConfig {
            pending_ttl_ms: 50,
            ..PostboardConfig::new(dir.path())
        };

        let state = AppState::init(config).unwrap();
        let user = state.service.create_user(NewUser::named("ann")).unwrap();
        let outcome = state.service.delete_user(&user, user.id).unwrap();
        state.teardown();

        tokio::time::sleep(Duration::from_millis(100)).await;
        // no timer fired after teardown, so the entry is still held in memory
        assert!(state.service.snapshots().contains(&outcome.undo_handle));
        assert!(!state.service.snapshots().is_armed(&outcome.undo_handle));
    }
}
