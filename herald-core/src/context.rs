use std::sync::Arc;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::{create_pool, run_migrations};
use crate::pg_store::PgStore;
use crate::store::Store;

/// Shared handles every service is built from.
#[derive(Clone)]
pub struct HeraldContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
}

impl HeraldContext {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        run_migrations(&config.database).await?;
        let db_pool = create_pool(&config.database).await?;

        Ok(HeraldContext {
            config: Arc::new(config),
            store: Arc::new(PgStore::new(db_pool)),
            clock: Arc::new(SystemClock),
        })
    }

    /// Context over an arbitrary store and clock, e.g. an in-memory store in tests.
    pub fn with_parts(config: Config, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        HeraldContext {
            config: Arc::new(config),
            store,
            clock,
        }
    }
}
