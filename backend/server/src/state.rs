use std::sync::Arc;

use anyhow::Result;
use ledger::{
    Mirror, Store,
    password::hash_password,
    records::{Category, Course, Department, NewAdmin},
    spawn_mirror_worker,
};
use tokio::task::JoinHandle;
use tracing::info;

use crate::{cache::TtlSlot, config::Config, lockout::LoginGuard, session::SessionKeys};

pub struct ReferenceCache {
    pub departments: TtlSlot<Vec<Department>>,
    pub courses: TtlSlot<Vec<Course>>,
    pub categories: TtlSlot<Vec<Category>>,
}

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub mirror: Arc<Mirror>,
    pub cache: ReferenceCache,
    pub sessions: SessionKeys,
    pub logins: LoginGuard,
    mirror_worker: JoinHandle<()>,
}

impl AppState {
    /// Opens the database, makes sure the configured administrator exists,
    /// replays anything left in the mirror outbox and starts the mirror worker.
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let store = Store::open(&config.database_path, config.pool_size, config.retry)?;
        let mirror = Arc::new(Mirror::new(&config.data_dir)?);

        let created = store
            .ensure_admin(NewAdmin {
                name: "System Administrator".to_string(),
                email: config.admin_email.clone(),
                password_hash: hash_password(&config.admin_password)?,
                designation: Some("Administrator".to_string()),
                department_id: None,
            })
            .await?;
        if created {
            info!("Created administrator {}", config.admin_email);
        }

        let replayed = mirror.drain(&store).await?;
        if replayed > 0 {
            info!("Replayed {replayed} pending mirror change(s)");
        }
        let mirror_worker =
            spawn_mirror_worker(Arc::clone(&mirror), store.clone(), config.mirror_interval);

        Ok(Arc::new(Self {
            cache: ReferenceCache {
                departments: TtlSlot::new(config.cache_ttl),
                courses: TtlSlot::new(config.cache_ttl),
                categories: TtlSlot::new(config.cache_ttl),
            },
            sessions: SessionKeys::new(&config.session_secret, config.session_ttl),
            logins: LoginGuard::new(config.login_max_failures, config.login_lockout),
            config,
            store,
            mirror,
            mirror_worker,
        }))
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        self.mirror_worker.abort();
    }
}
