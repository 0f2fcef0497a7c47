//! Utility modules for tm-trainer

pub mod db_retry;
pub mod retry;

pub use db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
pub use retry::{retry_transient, RetryPolicy};
