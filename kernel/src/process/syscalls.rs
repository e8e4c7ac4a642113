//! Process syscalls: fork, exit, waitpid, getpid
//!
//! `fork` is the only multi-step operation here, and every one of its
//! failure points rolls the world back to the pre-call state before the
//! error reaches the caller. The exit path is split so the teardown
//! half returns and the syscall half diverges into the thread layer.

use alloc::boxed::Box;

use minos_api::core::types::{Pid, WaitCode};
use minos_api::error::Result;
use minos_api::process::types::TrapContext;

use crate::process::{current_pid, pcb, subsystems, table};

/// Duplicate the calling process
///
/// The child gets a copy of the address space, the open-file handles
/// (sharing offsets with the parent), the working directory, and a copy
/// of `ctx` rewritten so it observes a zero return value. Returns the
/// child's PID to the caller; the child itself resumes in user mode and
/// never passes through here.
pub fn sys_fork(ctx: &mut TrapContext) -> Result<Pid> {
    let subsystems = subsystems();
    let parent = super::current_proc();
    let parent_pid = parent.pid();

    let child = pcb::create(parent.name())?;

    if let Some(space) = parent.addrspace() {
        match subsystems.address_spaces.copy(space) {
            Ok(copy) => {
                child.set_addrspace(Some(copy));
            }
            Err(err) => {
                pcb::destroy(child);
                return Err(err);
            }
        }
    }

    pcb::inherit_cwd(&parent, &child);
    subsystems.file_tables.copy(parent.files(), child.files());

    let child_pid = match table::allocate(parent_pid, child.clone()) {
        Ok(pid) => pid,
        Err(err) => {
            pcb::destroy(child);
            return Err(err);
        }
    };

    let mut child_ctx = *ctx;
    child_ctx.prepare_child_return();

    let spawned = subsystems
        .threads
        .spawn(child.name(), Box::new(move || child_entry(child_pid, child_ctx)));
    if let Err(err) = spawned {
        // Surrender our reference first; the table then holds the last
        // one and rollback hands it back for teardown.
        drop(child);
        let orphaned = table::rollback(parent_pid, child_pid);
        pcb::destroy(orphaned);
        return Err(err);
    }

    ctx.signal_success();
    Ok(child_pid)
}

/// First code a forked child's thread runs
fn child_entry(pid: Pid, ctx: TrapContext) {
    let subsystems = subsystems();
    let proc = match table::lookup(pid) {
        Some(proc) => proc,
        None => panic!("forked child {} vanished before its first run", pid),
    };
    if let Err(err) = pcb::attach_thread(&proc, subsystems.threads.current()) {
        panic!("forked child {} could not adopt its thread: {}", pid, err);
    }
    // enter() never returns; holding the reference across it would pin
    // the count above the table's own copy forever.
    drop(proc);

    subsystems.address_spaces.activate();
    subsystems.user_mode.enter(ctx);
}

/// Tear down the calling process, recording `code` for its parent
///
/// Split out of [`sys_exit`] so the teardown can be driven to completion
/// and the table inspected afterwards; only the final thread exit is
/// missing.
pub fn do_exit(code: WaitCode) {
    let subsystems = subsystems();
    let pid = current_pid();

    // Shed the address space while the thread still owns the process.
    if let Some(space) = pcb::set_current_addrspace(None) {
        subsystems.address_spaces.deactivate();
        subsystems.address_spaces.destroy(space);
    }

    pcb::detach_thread(subsystems.threads.current());

    // No reference to our own PCB is held here: the table's copy is the
    // last one, so recycled slots can be destroyed immediately.
    for proc in table::mark_exited(pid, code) {
        pcb::destroy(proc);
    }
}

/// Terminate the calling process with `code`; never returns
pub fn sys_exit(code: WaitCode) -> ! {
    do_exit(code);
    subsystems().threads.exit_current()
}

/// Wait for the direct child `pid` to exit and collect its waitcode
pub fn sys_waitpid(pid: Pid) -> Result<WaitCode> {
    table::wait_for(pid)
}

/// PID of the calling thread's process
pub fn sys_getpid() -> Pid {
    current_pid()
}
