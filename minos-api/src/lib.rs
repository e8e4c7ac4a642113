//! MinOS API - Core interfaces and types for the MinOS teaching kernel
//!
//! This crate provides the shared vocabulary of the MinOS kernel: identifier
//! types, the common error type, and the interfaces through which the
//! process-management core talks to the rest of the system.
//!
//! # Architecture
//!
//! The API is organized into three modules:
//!
//! - **Core**: Fundamental identifier types and resource handles
//! - **Error**: The common error type and result alias
//! - **Process**: Process-management interfaces and the trap context
//!
//! # Design Principles
//!
//! - **Dependency Inversion**: The process core depends on these interfaces,
//!   never on concrete subsystems
//! - **Interface Segregation**: One small trait per collaborator
//! - **Narrow contracts**: Handles are opaque; their meaning belongs to the
//!   subsystem that issued them

#![no_std]

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod core;
pub mod error;
pub mod process;

pub use error::{Error, ErrorContext, Result};
