//! MinOS Kernel Library
//!
//! This crate provides the process-management core of the MinOS teaching
//! kernel: control blocks, the PID table, and the fork/exit/waitpid/getpid
//! protocol. It is built to be exercised from hosted test suites, so the
//! surrounding machinery (threads, address spaces, file tables, the VFS,
//! and the user-mode transition) is reached only through the trait
//! interfaces defined in `minos-api`.
//!
//! # Architecture
//!
//! - **Process Management** (`process`): control blocks, the PID table,
//!   and the process lifecycle protocol
//! - **Synchronization** (`sync`): the spinlock re-exports and the
//!   condition variable the table's monitor discipline is built on
//!
//! # Usage
//!
//! ```no_run
//! use kernel::process;
//!
//! # fn wire_up() -> minos_api::Result<()> {
//! // After process::install_subsystems(..):
//! process::bootstrap()?;
//! let pid = process::sys_getpid();
//! # Ok(())
//! # }
//! ```

#![no_std]
#![allow(dead_code)]

extern crate alloc;

/// Process management and lifecycle protocol
pub mod process;

/// Synchronization primitives
pub mod sync;
