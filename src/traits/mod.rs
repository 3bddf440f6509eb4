pub mod durable_queue;
pub mod log_store;
pub mod message_store;
pub mod stats;
pub mod webhook_client;

pub use durable_queue::DurableQueue;
pub use log_store::LogStore;
pub use message_store::MessageStore;
pub use stats::StatsService;
pub use webhook_client::WebhookClient;
