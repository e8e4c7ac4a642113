//! PID table: the registry behind fork, exit, and waitpid
//!
//! A fixed-capacity slot array maps every PID to an optional process
//! reference, a lifecycle status, and the waitcode an exited process left
//! behind. One global mutex guards the whole table and one condition
//! variable announces exits, so waiters never poll.
//!
//! Slot lifecycle: `Ready` (free) -> `Running` -> `Zombie` (exited,
//! parent may still collect the waitcode) -> `Ready` again once reaped.
//! A process whose parent exits first becomes `Orphan` and is recycled
//! the moment it exits, since nobody is left to wait for it.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::hash::{BuildHasher, Hasher};

use hashbrown::HashMap;
use minos_api::core::types::{Pid, WaitCode};
use minos_api::error::{self, Result};

use crate::process::pcb::{self, Proc};
use crate::process::{KERNEL_PID, PID_MAX, PID_MIN, TABLE_CAPACITY};
use crate::sync::{CondVar, Mutex};

// ============================================================================
// PID-keyed hashing
// ============================================================================

/// Build hasher usable in static initializers
#[derive(Clone, Copy, Debug, Default)]
pub struct PidHasherBuilder;

impl BuildHasher for PidHasherBuilder {
    type Hasher = PidHasher;

    fn build_hasher(&self) -> PidHasher {
        PidHasher { state: FNV_OFFSET }
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a hasher; keys are small PIDs, so cheapness beats distribution
#[derive(Clone, Copy, Debug)]
pub struct PidHasher {
    state: u64,
}

impl Hasher for PidHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state = (self.state ^ byte as u64).wrapping_mul(FNV_PRIME);
        }
    }
}

// ============================================================================
// Slots
// ============================================================================

/// Lifecycle status of one PID slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidStatus {
    /// Free for allocation
    Ready,
    /// Occupied by a live process
    Running,
    /// Process exited; waitcode held for its parent
    Zombie,
    /// Live process whose parent has already exited
    Orphan,
}

/// One PID's slot: process reference, status, and parked waitcode
struct Slot {
    proc: Option<Arc<Proc>>,
    status: PidStatus,
    waitcode: Option<WaitCode>,
}

/// Occupancy snapshot returned by [`PidTable::stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableStats {
    pub available: usize,
    pub ready: usize,
    pub running: usize,
    pub zombie: usize,
    pub orphan: usize,
}

// ============================================================================
// PID Table
// ============================================================================

/// Fixed-capacity table mapping PIDs to processes
///
/// Covers PIDs `KERNEL_PID..PID_MAX`; the kernel's slot is pinned
/// `Running` at bootstrap and never recycled. `available` always equals
/// the number of `Ready` slots, and `next_free` is only a hint: it is
/// re-validated on every allocation and rebuilt by a scan when stale.
pub struct PidTable {
    slots: [Slot; TABLE_CAPACITY],
    available: usize,
    next_free: Option<Pid>,
    parent_to_children: HashMap<Pid, Vec<Pid>, PidHasherBuilder>,
}

impl PidTable {
    /// Create an empty table for static initialization
    pub const fn const_new() -> Self {
        const EMPTY: Slot = Slot {
            proc: None,
            status: PidStatus::Ready,
            waitcode: None,
        };
        Self {
            slots: [EMPTY; TABLE_CAPACITY],
            available: 0,
            next_free: None,
            parent_to_children: HashMap::with_hasher(PidHasherBuilder),
        }
    }

    fn index(pid: Pid) -> usize {
        (pid - KERNEL_PID) as usize
    }

    /// Pin the kernel process into its reserved slot and open the table
    ///
    /// Must run exactly once, before any other process exists.
    pub fn bootstrap(&mut self, kproc: Arc<Proc>) -> Result<()> {
        if self.slots[Self::index(KERNEL_PID)].proc.is_some() {
            return Err(error::invalid_state("pid table already bootstrapped"));
        }

        kproc.set_pid(KERNEL_PID);
        let slot = &mut self.slots[Self::index(KERNEL_PID)];
        slot.proc = Some(kproc);
        slot.status = PidStatus::Running;
        slot.waitcode = None;

        self.available = TABLE_CAPACITY - 1;
        self.next_free = Some(PID_MIN);
        Ok(())
    }

    /// Assign a free PID to `child` and register it under `parent`
    ///
    /// On error nothing is mutated, so a failed fork leaves no residue.
    pub fn allocate(&mut self, parent: Pid, child: Arc<Proc>) -> Result<Pid> {
        if self.available == 0 {
            log::warn!("pid table: exhausted, refusing allocation for parent {}", parent);
            return Err(error::table_full());
        }

        let pid = match self.next_free {
            Some(cursor) if self.is_ready(cursor) => cursor,
            _ => match self.find_ready_from(PID_MIN) {
                Some(pid) => pid,
                None => panic!(
                    "pid table: {} slots recorded available but none READY",
                    self.available
                ),
            },
        };

        // Reserve child-list space up front so no step after the slot is
        // claimed can fail.
        self.parent_to_children
            .try_reserve(1)
            .map_err(|_| error::out_of_memory())?;
        let children = self.parent_to_children.entry(parent).or_default();
        children.try_reserve(1).map_err(|_| error::out_of_memory())?;
        children.push(pid);

        child.set_pid(pid);
        let slot = &mut self.slots[Self::index(pid)];
        slot.proc = Some(child);
        slot.status = PidStatus::Running;
        slot.waitcode = None;
        self.available -= 1;
        self.next_free = self.find_ready_from(pid + 1);

        log::debug!(
            "pid table: allocated pid {} under parent {} ({} slots left)",
            pid,
            parent,
            self.available
        );
        Ok(pid)
    }

    /// Record that `pid` exited with `code`, reclassifying its children
    ///
    /// Live children become `Orphan`; already-zombie children lose their
    /// last chance of being reaped and are recycled here. The exiting
    /// process itself turns `Zombie` (parent still alive) or is recycled
    /// outright (already orphaned). Returns every process reference freed
    /// from a recycled slot; the caller destroys them once the table lock
    /// is released.
    pub fn mark_exited(&mut self, pid: Pid, code: WaitCode) -> Vec<Arc<Proc>> {
        if pid == KERNEL_PID {
            panic!("kernel process cannot exit");
        }

        let mut reaped = Vec::new();

        if let Some(children) = self.parent_to_children.remove(&pid) {
            for child in children.into_iter().rev() {
                match self.status(child) {
                    Some(PidStatus::Running) => {
                        self.slots[Self::index(child)].status = PidStatus::Orphan;
                    }
                    Some(PidStatus::Zombie) => reaped.push(self.recycle(child)),
                    status => panic!(
                        "pid {} exiting: child {} in impossible status {:?}",
                        pid, child, status
                    ),
                }
            }
        }

        match self.status(pid) {
            Some(PidStatus::Running) => {
                let slot = &mut self.slots[Self::index(pid)];
                slot.status = PidStatus::Zombie;
                slot.waitcode = Some(code);
            }
            Some(PidStatus::Orphan) => reaped.push(self.recycle(pid)),
            status => panic!("pid {} exiting in impossible status {:?}", pid, status),
        }

        log::debug!("pid table: pid {} exited with code {}", pid, code);
        reaped
    }

    /// Collect a zombie child's waitcode and recycle its slot
    pub fn reap(&mut self, parent: Pid, child: Pid) -> (WaitCode, Arc<Proc>) {
        match self.status(child) {
            Some(PidStatus::Zombie) => {}
            status => panic!("reaping pid {} in impossible status {:?}", child, status),
        }
        let code = match self.slots[Self::index(child)].waitcode {
            Some(code) => code,
            None => panic!("zombie pid {} has no waitcode", child),
        };
        self.unlink_child(parent, child);
        (code, self.recycle(child))
    }

    /// Undo an allocation after a later fork step failed
    pub fn rollback(&mut self, parent: Pid, child: Pid) -> Arc<Proc> {
        match self.status(child) {
            Some(PidStatus::Running) => {}
            status => panic!("rolling back pid {} in impossible status {:?}", child, status),
        }
        self.unlink_child(parent, child);
        self.recycle(child)
    }

    /// Reset a slot to `Ready` and surrender its process reference
    fn recycle(&mut self, pid: Pid) -> Arc<Proc> {
        let slot = &mut self.slots[Self::index(pid)];
        let proc = match slot.proc.take() {
            Some(proc) => proc,
            None => panic!("recycling pid {} with no process attached", pid),
        };
        slot.status = PidStatus::Ready;
        slot.waitcode = None;
        self.available += 1;
        // A recycled slot repairs a table-full cursor.
        if self.next_free.is_none() {
            self.next_free = Some(pid);
        }
        proc
    }

    fn unlink_child(&mut self, parent: Pid, child: Pid) {
        let children = match self.parent_to_children.get_mut(&parent) {
            Some(children) => children,
            None => panic!("pid {} has no child list to drop {} from", parent, child),
        };
        match children.iter().position(|&pid| pid == child) {
            Some(idx) => {
                children.remove(idx);
            }
            None => panic!("pid {} is not registered as a child of {}", child, parent),
        }
        if children.is_empty() {
            self.parent_to_children.remove(&parent);
        }
    }

    fn is_ready(&self, pid: Pid) -> bool {
        (PID_MIN..PID_MAX).contains(&pid) && self.slots[Self::index(pid)].status == PidStatus::Ready
    }

    /// First `Ready` PID at or after `start`, wrapping around once
    fn find_ready_from(&self, start: Pid) -> Option<Pid> {
        let start = if (PID_MIN..PID_MAX).contains(&start) {
            start
        } else {
            PID_MIN
        };
        (start..PID_MAX)
            .find(|&pid| self.is_ready(pid))
            .or_else(|| (PID_MIN..start).find(|&pid| self.is_ready(pid)))
    }

    /// Status of `pid`, or `None` when it is outside the table's range
    pub fn status(&self, pid: Pid) -> Option<PidStatus> {
        if !(KERNEL_PID..PID_MAX).contains(&pid) {
            return None;
        }
        Some(self.slots[Self::index(pid)].status)
    }

    /// Process reference registered for `pid`
    pub fn process(&self, pid: Pid) -> Option<&Arc<Proc>> {
        if !(KERNEL_PID..PID_MAX).contains(&pid) {
            return None;
        }
        self.slots[Self::index(pid)].proc.as_ref()
    }

    /// Whether `child` currently sits in `parent`'s child list
    pub fn is_child_of(&self, parent: Pid, child: Pid) -> bool {
        self.parent_to_children
            .get(&parent)
            .is_some_and(|children| children.contains(&child))
    }

    /// Number of slots the table covers, the kernel's included
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Count every status across the table
    pub fn stats(&self) -> TableStats {
        let mut stats = TableStats {
            available: self.available,
            ..TableStats::default()
        };
        for slot in &self.slots {
            match slot.status {
                PidStatus::Ready => stats.ready += 1,
                PidStatus::Running => stats.running += 1,
                PidStatus::Zombie => stats.zombie += 1,
                PidStatus::Orphan => stats.orphan += 1,
            }
        }
        stats
    }
}

// ============================================================================
// Global State
// ============================================================================

/// Global PID table
pub static PID_TABLE: Mutex<PidTable> = Mutex::new(PidTable::const_new());

/// Announces every exit; wait_for() blocks here
static EXIT_EVENT: CondVar = CondVar::new();

// ============================================================================
// Public API
// ============================================================================

/// Pin the kernel process and open the table for allocation
pub fn bootstrap(kproc: Arc<Proc>) -> Result<()> {
    PID_TABLE.lock().bootstrap(kproc)?;
    log::info!(
        "pid table: bootstrapped, kernel pinned at pid {}, {} slots free",
        KERNEL_PID,
        TABLE_CAPACITY - 1
    );
    Ok(())
}

/// Register a forked child under `parent` and hand out a PID
pub fn allocate(parent: Pid, child: Arc<Proc>) -> Result<Pid> {
    PID_TABLE.lock().allocate(parent, child)
}

/// Record an exit and wake every thread blocked in [`wait_for`]
///
/// Returns the processes freed from recycled slots; the caller destroys
/// them after this function has released the table lock.
pub fn mark_exited(pid: Pid, code: WaitCode) -> Vec<Arc<Proc>> {
    let mut table = PID_TABLE.lock();
    let reaped = table.mark_exited(pid, code);
    // Broadcast under the lock: a waiter is either already registered on
    // the condition or will re-check the table before blocking.
    EXIT_EVENT.broadcast();
    reaped
}

/// Block until the child `pid` exits, then reap it and return its waitcode
///
/// Only the direct parent may wait, and only once per child: a PID that
/// is not a child of the caller, or whose waitcode was already collected,
/// reports `NotFound`.
pub fn wait_for(child: Pid) -> Result<WaitCode> {
    let caller = super::current_pid();
    let mut table = PID_TABLE.lock();

    loop {
        if !table.is_child_of(caller, child) {
            return Err(error::not_found());
        }
        match table.status(child) {
            Some(PidStatus::Running) => {
                // Releases the table lock while blocked, re-acquires on
                // wakeup; exits elsewhere in the table wake us spuriously
                // and the loop re-checks.
                table = EXIT_EVENT.wait(&PID_TABLE, table);
            }
            Some(PidStatus::Zombie) => {
                let (code, proc) = table.reap(caller, child);
                drop(table);
                pcb::destroy(proc);
                return Ok(code);
            }
            status => panic!(
                "pid {} listed as child of {} but in impossible status {:?}",
                child, caller, status
            ),
        }
    }
}

/// Undo a fork whose later steps failed, returning the orphaned reference
pub fn rollback(parent: Pid, child: Pid) -> Arc<Proc> {
    PID_TABLE.lock().rollback(parent, child)
}

/// Lifecycle status of a PID
pub fn status_of(pid: Pid) -> Option<PidStatus> {
    PID_TABLE.lock().status(pid)
}

/// Clone the process reference registered for a PID
pub fn lookup(pid: Pid) -> Option<Arc<Proc>> {
    PID_TABLE.lock().process(pid).cloned()
}

/// Snapshot of the table's occupancy counters
pub fn stats() -> TableStats {
    PID_TABLE.lock().stats()
}
