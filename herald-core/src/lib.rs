pub mod clock;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod pg_store;
pub mod schema;
pub mod store;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use context::HeraldContext;
pub use db::DbPool;
pub use error::{StoreError, StoreResult};
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryStore;
pub use pg_store::PgStore;
pub use store::Store;
