// Core modules
pub mod aggregation;
pub mod config;
pub mod db;
pub mod error;
pub mod execution;
pub mod feed;
pub mod indicators;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod registry;
pub mod session;
pub mod simulation;
pub mod strategy;
pub mod window;

// Re-export commonly used types
pub use error::{PipelineError, TickError};
pub use models::*;
pub use pipeline::{Pipeline, PipelineConfig, SubscriptionState};
pub use registry::{EventConsumer, PipelineEvent, SubscriptionRegistry, Tag};
pub use strategy::Strategy;

// Error handling for storage collaborators
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
