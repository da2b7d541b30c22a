//! Core configuration model and shared helpers for certsync crates

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use config::*;
pub use error::*;
pub use utils::*;

// Re-export standard datetime type for use across all crates
pub use types::UtcDateTime;
