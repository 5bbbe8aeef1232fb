pub mod backend;
pub mod client;
pub mod config;
pub mod display;
pub mod error;
pub mod location;
pub mod models;

// Re-export main types for convenience
pub use backend::Backend;
pub use client::ChatClient;
pub use config::ChatConfig;
pub use error::{ChatError, Result};
pub use location::MapPlatform;
pub use models::*;
