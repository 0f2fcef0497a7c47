//! HTTP API handlers for tm-trainer

pub mod health;
pub mod predict;
pub mod sse;
pub mod training;
pub mod upload;

pub use health::health_routes;
pub use predict::predict_routes;
pub use sse::event_stream;
pub use training::training_routes;
pub use upload::upload_routes;
