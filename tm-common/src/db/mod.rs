//! Database initialization shared by tm services

pub mod init;

pub use init::{init_database, DEFAULT_BUSY_TIMEOUT_MS};
