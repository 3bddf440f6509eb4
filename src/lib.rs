//! hookrelay: a self-hostable HTTP webhook queue. `POST` a payload with a
//! target URL embedded in the path, and it's delivered (immediately, after
//! a delay, or at an absolute instant) with bounded retries and a
//! dead-letter queue, durably surviving restarts.

pub mod config;
pub mod daily_activator;
pub mod delivery_worker;
pub mod error;
pub mod http;
pub mod mocks;
pub mod model;
pub mod production;
pub mod state_manager;
pub mod store_gateway;
pub mod stores;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

use config::{AppConfig, StorageType};
use error::ConfigError;
use http::AppState;
use production::ReqwestWebhookClient;
use store_gateway::StoreGateway;
use stores::{kv, sql, WalDurableQueue, WalJournal};
use traits::durable_queue::DurableQueue;
use traits::log_store::LogStore;
use traits::message_store::MessageStore;
use traits::stats::StatsService;
use traits::webhook_client::WebhookClient;

const STATE_MANAGER_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Everything the running process needs: the fully assembled gateway, the
/// queue it shares with the State Manager, and the address to bind to.
pub struct App {
    pub state: AppState,
    pub queue: Arc<dyn DurableQueue>,
    pub webhook: Arc<dyn WebhookClient>,
    pub bind_addr: std::net::SocketAddr,
}

/// Assembles the store backend selected by `config.storage_type`, the
/// shared Durable Queue, and the Store Gateway gluing them together, then
/// wraps it all into the `AppState` the HTTP router needs.
pub fn build_app(config: &AppConfig) -> Result<App, ConfigError> {
    std::fs::create_dir_all(&config.data_dir).map_err(|e| ConfigError::InvalidValue {
        key: "HOOKRELAY_DATA_DIR",
        reason: e.to_string(),
    })?;

    let journal = Arc::new(WalJournal::open(&config.data_dir).map_err(|e| ConfigError::InvalidValue {
        key: "HOOKRELAY_DATA_DIR",
        reason: e.to_string(),
    })?);

    let queue: Arc<dyn DurableQueue> = Arc::new(
        WalDurableQueue::open(journal.clone()).map_err(|e| ConfigError::InvalidValue {
            key: "HOOKRELAY_DATA_DIR",
            reason: e.to_string(),
        })?,
    );

    let (messages, logs, stats): (
        Arc<dyn MessageStore>,
        Arc<dyn LogStore>,
        Arc<dyn StatsService>,
    ) = match config.storage_type {
        StorageType::Kv => (
            Arc::new(kv::KvMessageStore::open(journal.clone()).map_err(|e| ConfigError::InvalidValue {
                key: "HOOKRELAY_DATA_DIR",
                reason: e.to_string(),
            })?),
            Arc::new(kv::KvLogStore::open(journal).map_err(|e| ConfigError::InvalidValue {
                key: "HOOKRELAY_DATA_DIR",
                reason: e.to_string(),
            })?),
            Arc::new(kv::KvStatsService::new()),
        ),
        StorageType::Turso => {
            let conn = sql::open(&config.turso_db_url).map_err(|e| ConfigError::InvalidValue {
                key: "TURSO_DB_URL",
                reason: e.to_string(),
            })?;
            (
                Arc::new(sql::SqlMessageStore::new(conn.clone())),
                Arc::new(sql::SqlLogStore::new(conn.clone())),
                Arc::new(sql::SqlStatsService::new(conn)),
            )
        }
    };

    let gateway = Arc::new(StoreGateway::new(messages, logs, stats, queue.clone(), config.enable_logs));
    let webhook: Arc<dyn WebhookClient> = Arc::new(ReqwestWebhookClient::new());

    let state = AppState {
        gateway,
        auth_token: Arc::new(config.auth_token.clone()),
    };

    Ok(App {
        state,
        queue,
        webhook,
        bind_addr: config.bind_addr,
    })
}

/// Starts the State Manager and Daily Activator background loops. Returns
/// their join handles so a caller (tests, graceful shutdown) can manage
/// their lifetime; under normal operation the process just runs forever.
pub fn spawn_workers(app: &App) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
    let state_manager = state_manager::spawn_state_manager(
        app.queue.clone(),
        app.state.gateway.clone(),
        app.webhook.clone(),
        STATE_MANAGER_POLL_INTERVAL,
    );
    let daily_activator = daily_activator::spawn_daily_activator(app.state.gateway.clone());
    (state_manager, daily_activator)
}
