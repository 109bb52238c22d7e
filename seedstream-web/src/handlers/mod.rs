//! HTTP request handlers organized by endpoint

pub mod health;
pub mod play;
pub mod streams;

// Re-export handler functions
pub use health::{HealthResponse, health};
pub use play::play;
pub use streams::{EpisodeQuery, StreamDescriptor, StreamsResponse, list_streams};
