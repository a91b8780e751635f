pub mod auth;
pub mod error;
pub mod events;
pub mod hub;
pub mod ledger;
pub mod lifecycle;
pub mod timer;

use classpulse_db::DbPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub event_bus: events::EventBus,
    pub timers: Arc<timer::TimerRegistry>,
    pub config: AppConfig,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    /// The public URL of this server, used for websocket origin checks.
    pub public_url: Option<String>,
    pub database_url: String,
}
