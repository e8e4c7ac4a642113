//! Synchronization primitives
//!
//! The process table is a classic monitor: one mutex guarding the shared
//! state and one condition variable announcing exits. The mutex and its
//! guard come from `spin`; the condition variable is built here on top of
//! the thread layer's park/unpark tokens.

pub mod condvar;

// Re-export commonly used items
pub use condvar::CondVar;
pub use spin::{Mutex, MutexGuard, Once};
