//! Core module containing fundamental identifier types and resource handles

pub mod types;

// Re-export commonly used items
pub use types::*;
