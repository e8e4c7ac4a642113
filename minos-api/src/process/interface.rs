//! Collaborator traits for the process core
//!
//! Each trait covers one subsystem the process core delegates to. All of
//! them are object-safe and `Send + Sync` so the kernel can hold them as
//! `&'static dyn` references installed once at boot.

use crate::core::types::{AddrSpaceId, FileTableId, Pid, Tid, VnodeId};
use crate::error::Result;
use crate::process::types::TrapContext;

#[cfg(feature = "alloc")]
use alloc::boxed::Box;

/// Trait for the address-space subsystem
pub trait AddressSpaceOps: Send + Sync {
    /// Copies an address space, duplicating its mappings for a forked child
    fn copy(&self, src: AddrSpaceId) -> Result<AddrSpaceId>;

    /// Destroys an address space and releases its frames
    fn destroy(&self, space: AddrSpaceId);

    /// Loads the current thread's address space into the MMU
    fn activate(&self);

    /// Unloads the current thread's address space from the MMU
    fn deactivate(&self);
}

/// Trait for the file-table subsystem
pub trait FileTableOps: Send + Sync {
    /// Creates an empty file table
    fn create(&self) -> Result<FileTableId>;

    /// Attaches the standard console descriptors to a file table
    fn init_standard(&self, table: FileTableId) -> Result<()>;

    /// Copies every open handle from `src` into `dst`, sharing offsets
    fn copy(&self, src: FileTableId, dst: FileTableId);

    /// Destroys a file table, closing its handles
    fn destroy(&self, table: FileTableId);
}

/// Trait for the virtual filesystem layer
pub trait VfsOps: Send + Sync {
    /// Takes an additional reference on a vnode; atomic against concurrent callers
    fn increment_reference(&self, vnode: VnodeId);

    /// Drops a reference on a vnode, reclaiming it at zero
    fn decrement_reference(&self, vnode: VnodeId);
}

/// Trait for the thread subsystem
pub trait ThreadOps: Send + Sync {
    /// Returns the calling thread's ID
    fn current(&self) -> Tid;

    /// Returns the process a thread currently belongs to, if any
    fn owner_of(&self, tid: Tid) -> Option<Pid>;

    /// Publishes a thread's owning process with a single atomic store
    fn set_owner(&self, tid: Tid, owner: Option<Pid>);

    /// Spawns a kernel thread running `body`, returning its ID
    #[cfg(feature = "alloc")]
    fn spawn(&self, name: &str, body: Box<dyn FnOnce() + Send>) -> Result<Tid>;

    /// Blocks the calling thread until a wake token arrives
    fn park(&self);

    /// Delivers a wake token to `tid`, unblocking a pending or future park
    fn unpark(&self, tid: Tid);

    /// Terminates the calling thread
    fn exit_current(&self) -> !;
}

/// Trait for the user-mode transition
pub trait UserModeOps: Send + Sync {
    /// Drops to user mode with the given register state; never returns
    fn enter(&self, ctx: TrapContext) -> !;
}
