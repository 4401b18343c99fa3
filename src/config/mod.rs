//! Configuration management for the scrim-room service
//!
//! This module handles configuration loading from TOML files and environment
//! variables, validation, and default values for the match lifecycle.

pub mod app;
pub mod persistence;
pub mod queue;
pub mod rating;
pub mod series;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, ServiceSettings};
pub use persistence::PersistenceSettings;
pub use queue::QueueConfig;
pub use rating::{DeltaFormula, RatingConfig};
pub use series::SeriesConfig;
