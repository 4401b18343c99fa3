//! Service layer for the scrim-room match lifecycle service
//!
//! Application state, health checks and background task management for the
//! production service.

pub mod app;
pub mod health;

pub use app::{AppState, ServiceError};
pub use health::{HealthCheck, HealthStatus, ServiceProbe};
