//! Process management subsystem
//!
//! Everything a PID means lives here: the control blocks ([`pcb`]), the
//! table mapping PIDs to processes and lifecycle statuses ([`table`]),
//! and the fork/exit/waitpid/getpid protocol on top ([`syscalls`]).
//!
//! The subsystem drives threads, address spaces, file tables, the VFS,
//! and the user-mode transition purely through the `minos-api` traits,
//! installed once at boot via [`install_subsystems`].

pub mod pcb;
pub mod syscalls;
pub mod table;

// Re-export commonly used items
pub use pcb::Proc;
pub use syscalls::{do_exit, sys_exit, sys_fork, sys_getpid, sys_waitpid};
pub use table::{PidStatus, PidTable, TableStats};

use alloc::sync::Arc;

use minos_api::core::types::Pid;
use minos_api::error::{self, Result};
use minos_api::process::interface::{
    AddressSpaceOps, FileTableOps, ThreadOps, UserModeOps, VfsOps,
};
use static_assertions::const_assert;

use crate::sync::Once;

/// Reserved PID of the kernel process, pinned at bootstrap
pub const KERNEL_PID: Pid = 1;
/// Lowest PID handed out to other processes
pub const PID_MIN: Pid = 2;
/// Exclusive upper bound of the PID space
pub const PID_MAX: Pid = 64;
/// Slots in the PID table: the kernel PID plus every allocatable PID
pub const TABLE_CAPACITY: usize = (PID_MAX - KERNEL_PID) as usize;

const_assert!(KERNEL_PID < PID_MIN);
const_assert!(PID_MIN < PID_MAX);

/// The collaborating subsystems the process core drives
#[derive(Clone, Copy)]
pub struct Subsystems {
    pub threads: &'static dyn ThreadOps,
    pub address_spaces: &'static dyn AddressSpaceOps,
    pub file_tables: &'static dyn FileTableOps,
    pub vfs: &'static dyn VfsOps,
    pub user_mode: &'static dyn UserModeOps,
}

static SUBSYSTEMS: Once<Subsystems> = Once::new();

/// Wire up the collaborating subsystems
///
/// Must run before [`bootstrap`] and at most once; everything in this
/// module panics if used earlier.
pub fn install_subsystems(subsystems: Subsystems) -> Result<()> {
    let mut fresh = false;
    SUBSYSTEMS.call_once(|| {
        fresh = true;
        subsystems
    });
    if fresh {
        Ok(())
    } else {
        Err(error::invalid_state("process subsystems already installed"))
    }
}

pub(crate) fn subsystems() -> &'static Subsystems {
    match SUBSYSTEMS.get() {
        Some(subsystems) => subsystems,
        None => panic!("process core used before its subsystems were installed"),
    }
}

/// Initialize process management
///
/// Creates the kernel process, pins it at [`KERNEL_PID`], and adopts the
/// calling thread into it. Must run exactly once, after
/// [`install_subsystems`] and before any fork.
pub fn bootstrap() -> Result<()> {
    if SUBSYSTEMS.get().is_none() {
        return Err(error::invalid_state("process subsystems not installed"));
    }

    let kproc = pcb::create("[kernel]")?;
    if let Err(err) = table::bootstrap(kproc.clone()) {
        pcb::destroy(kproc);
        return Err(err);
    }
    pcb::attach_thread(&kproc, subsystems().threads.current())?;

    log::info!("process: kernel process created (pid={})", KERNEL_PID);
    Ok(())
}

/// PID of the calling thread's process
pub fn current_pid() -> Pid {
    let threads = subsystems().threads;
    match threads.owner_of(threads.current()) {
        Some(pid) => pid,
        None => panic!("current thread belongs to no process"),
    }
}

/// Control block of the calling thread's process
pub fn current_proc() -> Arc<Proc> {
    let pid = current_pid();
    match table::lookup(pid) {
        Some(proc) => proc,
        None => panic!("current pid {} is not in the table", pid),
    }
}
