//! # TM Common Library
//!
//! Shared code for the tm training services including:
//! - Error and result types
//! - Job lifecycle events and the EventBus
//! - Configuration loading and root folder resolution
//! - Database initialization
//! - SSE helpers

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
