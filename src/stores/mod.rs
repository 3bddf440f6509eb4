pub mod kv;
pub mod sql;
pub mod wal_journal;
pub mod wal_queue;

pub use wal_journal::WalJournal;
pub use wal_queue::WalDurableQueue;
