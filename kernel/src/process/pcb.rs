//! Process control blocks
//!
//! A [`Proc`] owns the per-process resources: its name, its PID once the
//! table assigns one, a file table, an optional address space, an optional
//! working directory, and the set of threads running inside it. The
//! mutable state sits behind a leaf spinlock that is never held across a
//! call into another subsystem, except where a reference count must move
//! together with the field it covers.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use minos_api::core::types::{AddrSpaceId, FileTableId, Pid, Tid, VnodeId};
use minos_api::error::{self, Error, Result};

use crate::process::{subsystems, table, KERNEL_PID};
use crate::sync::Mutex;

/// Process control block
#[derive(Debug)]
pub struct Proc {
    /// Process name, for debugging and thread naming
    name: String,
    /// Assigned PID; holds the kernel's as a placeholder until the table
    /// hands out a real one
    pid: AtomicU32,
    /// Mutable state behind the per-process leaf lock
    inner: Mutex<ProcInner>,
}

/// State guarded by the PCB lock
#[derive(Debug)]
struct ProcInner {
    files: Option<FileTableId>,
    addrspace: Option<AddrSpaceId>,
    cwd: Option<VnodeId>,
    threads: Vec<Tid>,
}

impl Proc {
    /// Assigned PID; [`KERNEL_PID`] before the table has assigned one
    pub fn pid(&self) -> Pid {
        self.pid.load(Ordering::SeqCst)
    }

    pub(crate) fn set_pid(&self, pid: Pid) {
        self.pid.store(pid, Ordering::SeqCst);
    }

    /// Process name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current address space, if one is attached
    pub fn addrspace(&self) -> Option<AddrSpaceId> {
        self.inner.lock().addrspace
    }

    /// Swap the attached address space, returning the previous one
    pub(crate) fn set_addrspace(&self, space: Option<AddrSpaceId>) -> Option<AddrSpaceId> {
        core::mem::replace(&mut self.inner.lock().addrspace, space)
    }

    /// File table handle; every live process has one
    pub fn files(&self) -> FileTableId {
        match self.inner.lock().files {
            Some(files) => files,
            None => panic!("process {} has no file table", self.pid()),
        }
    }

    /// Current working directory, if one is set
    pub fn cwd(&self) -> Option<VnodeId> {
        self.inner.lock().cwd
    }

    /// Number of threads currently attached
    pub fn thread_count(&self) -> usize {
        self.inner.lock().threads.len()
    }
}

/// Allocate a fresh PCB with an empty file table
///
/// The new process has no PID yet; `table::allocate` assigns one. Both
/// the name copy and the file table report allocation failure as
/// `OutOfMemory` instead of taking the kernel down.
pub fn create(name: &str) -> Result<Arc<Proc>> {
    let mut owned_name = String::new();
    owned_name
        .try_reserve_exact(name.len())
        .map_err(|_| error::out_of_memory())?;
    owned_name.push_str(name);

    let files = subsystems().file_tables.create()?;

    Ok(Arc::new(Proc {
        name: owned_name,
        pid: AtomicU32::new(KERNEL_PID),
        inner: Mutex::new(ProcInner {
            files: Some(files),
            addrspace: None,
            cwd: None,
            threads: Vec::new(),
        }),
    }))
}

/// Create a process set up to run a user program
///
/// On top of [`create`], attaches the standard console descriptors and
/// inherits the caller's working directory. Used by the program loader;
/// `fork` instead copies the parent's descriptors wholesale.
pub fn create_user_process(name: &str) -> Result<Arc<Proc>> {
    let proc = create(name)?;

    if let Err(err) = subsystems().file_tables.init_standard(proc.files()) {
        destroy(proc);
        return Err(err);
    }

    inherit_cwd(&super::current_proc(), &proc);
    Ok(proc)
}

/// Copy `parent`'s working directory into `child`
///
/// The vnode reference is taken while `parent`'s lock is held, so the
/// count can never lag behind the copy.
pub(crate) fn inherit_cwd(parent: &Proc, child: &Proc) {
    let inherited = {
        let inner = parent.inner.lock();
        if let Some(cwd) = inner.cwd {
            subsystems().vfs.increment_reference(cwd);
        }
        inner.cwd
    };
    if let Some(cwd) = inherited {
        child.inner.lock().cwd = Some(cwd);
    }
}

/// Tear down a PCB and release every resource it still holds
///
/// The caller must hold the last reference; anything else means some part
/// of the kernel still thinks the process is alive, and continuing would
/// free state out from under it.
pub fn destroy(proc: Arc<Proc>) {
    let proc = match Arc::try_unwrap(proc) {
        Ok(proc) => proc,
        Err(still_shared) => panic!(
            "process {} ({}) destroyed while still referenced",
            still_shared.pid(),
            still_shared.name()
        ),
    };
    let pid = proc.pid();
    let subsystems = subsystems();
    let mut state = proc.inner.into_inner();

    if !state.threads.is_empty() {
        panic!(
            "process {} destroyed with {} threads still attached",
            pid,
            state.threads.len()
        );
    }
    if let Some(cwd) = state.cwd.take() {
        subsystems.vfs.decrement_reference(cwd);
    }
    if let Some(space) = state.addrspace.take() {
        subsystems.address_spaces.destroy(space);
    }
    if let Some(files) = state.files.take() {
        subsystems.file_tables.destroy(files);
    }

    log::debug!("process {} destroyed", pid);
}

/// Bind a thread to `proc`
///
/// The owner back-reference is published with a single atomic store while
/// the PCB lock is held, so no thread is ever owned by a process whose
/// thread list does not name it.
pub fn attach_thread(proc: &Proc, tid: Tid) -> Result<()> {
    let threads = subsystems().threads;
    if threads.owner_of(tid).is_some() {
        return Err(Error::AlreadyAttached);
    }

    let mut inner = proc.inner.lock();
    inner
        .threads
        .try_reserve(1)
        .map_err(|_| error::out_of_memory())?;
    inner.threads.push(tid);
    threads.set_owner(tid, Some(proc.pid()));
    Ok(())
}

/// Unbind a thread from the process that owns it
pub fn detach_thread(tid: Tid) {
    let threads = subsystems().threads;
    let pid = match threads.owner_of(tid) {
        Some(pid) => pid,
        None => panic!("thread {} detached but belongs to no process", tid),
    };
    // Transient table lookup; the table lock is already released by the
    // time the PCB lock is taken.
    let proc = match table::lookup(pid) {
        Some(proc) => proc,
        None => panic!("thread {} owned by pid {} which is not in the table", tid, pid),
    };

    let mut inner = proc.inner.lock();
    match inner.threads.iter().position(|&t| t == tid) {
        Some(idx) => {
            inner.threads.remove(idx);
        }
        None => panic!("thread {} has escaped from process {}", tid, pid),
    }
    threads.set_owner(tid, None);
}

/// Address space of the calling thread's process
pub fn current_addrspace() -> Option<AddrSpaceId> {
    super::current_proc().addrspace()
}

/// Swap the calling process's address space, returning the previous one
pub fn set_current_addrspace(space: Option<AddrSpaceId>) -> Option<AddrSpaceId> {
    super::current_proc().set_addrspace(space)
}

/// Swap the calling process's working directory, returning the previous one
///
/// Only the references move; the filesystem layer settles the vnode counts
/// for both directions of the swap.
pub fn set_current_cwd(cwd: Option<VnodeId>) -> Option<VnodeId> {
    let proc = super::current_proc();
    let mut inner = proc.inner.lock();
    core::mem::replace(&mut inner.cwd, cwd)
}
