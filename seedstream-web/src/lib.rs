//! Seedstream Web - stream listing and playback API

#![warn(missing_docs)]
#![warn(clippy::too_many_lines)]
//!
//! JSON stream listing for a title and a range-serving play endpoint that
//! turns torrents into progressively playable HTTP responses.

pub mod error;
pub mod handlers;
pub mod server;

// Re-export main types
pub use error::ApiError;
pub use server::{AppState, ServerError, create_router, run_server, spawn_cleanup_task};
