//! Process management interface
//!
//! The process core drives five collaborating subsystems (threads, address
//! spaces, file tables, the VFS, and the user-mode transition) exclusively
//! through the traits defined here, so hosted test suites can substitute
//! doubles for all of them.

pub mod interface;
pub mod types;

// Re-export commonly used items
pub use interface::*;
pub use types::*;
