//! Shared hosted-kernel harness for integration tests
//!
//! Implements the collaborator traits on top of std threads so the process
//! core can be driven end to end: [`HostThreads`] maps kernel threads onto
//! OS threads with real park/unpark tokens, and [`HostUserMode`] turns the
//! never-returning user-mode transition into a scriptable loop. The
//! remaining collaborators are counting stubs with switchable failure
//! injection.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{self, catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use kernel::process::{self, pcb, Proc, Subsystems, KERNEL_PID};
use minos_api::core::types::{AddrSpaceId, FileTableId, Pid, Tid, VnodeId};
use minos_api::error::{self, Result};
use minos_api::process::interface::{
    AddressSpaceOps, FileTableOps, ThreadOps, UserModeOps, VfsOps,
};
use minos_api::process::types::TrapContext;

/// Panic payload used to unwind a host thread standing in for a kernel
/// thread exit; the harness swallows it silently.
pub struct ThreadExit;

thread_local! {
    static SELF_TID: std::cell::Cell<Option<Tid>> = const { std::cell::Cell::new(None) };
}

/// Lock a std mutex, shrugging off poison left by a panicked thread
pub fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Thread double
// ============================================================================

#[derive(Default)]
struct ThreadRecord {
    owner: Option<Pid>,
    handle: Option<thread::Thread>,
}

/// Thread subsystem double backed by OS threads
pub struct HostThreads {
    next_tid: AtomicU32,
    records: Mutex<HashMap<Tid, ThreadRecord>>,
    refuse_next_spawn: AtomicBool,
}

impl HostThreads {
    fn new() -> Self {
        Self {
            next_tid: AtomicU32::new(1),
            records: Mutex::new(HashMap::new()),
            refuse_next_spawn: AtomicBool::new(false),
        }
    }

    /// Make the next spawn fail, exercising fork's rollback path
    pub fn refuse_next_spawn(&self) {
        self.refuse_next_spawn.store(true, Ordering::SeqCst);
    }

    /// Deliver a wake token to every registered thread
    pub fn unpark_all(&self) {
        let handles: Vec<thread::Thread> = relock(&self.records)
            .values()
            .filter_map(|record| record.handle.clone())
            .collect();
        for handle in handles {
            handle.unpark();
        }
    }
}

impl ThreadOps for HostThreads {
    fn current(&self) -> Tid {
        SELF_TID.with(|cell| {
            if let Some(tid) = cell.get() {
                return tid;
            }
            // First call on this OS thread; register it on the fly.
            let tid = self.next_tid.fetch_add(1, Ordering::SeqCst);
            relock(&self.records).insert(
                tid,
                ThreadRecord {
                    owner: None,
                    handle: Some(thread::current()),
                },
            );
            cell.set(Some(tid));
            tid
        })
    }

    fn owner_of(&self, tid: Tid) -> Option<Pid> {
        relock(&self.records).get(&tid).and_then(|record| record.owner)
    }

    fn set_owner(&self, tid: Tid, owner: Option<Pid>) {
        relock(&self.records).entry(tid).or_default().owner = owner;
    }

    fn spawn(&self, name: &str, body: Box<dyn FnOnce() + Send>) -> Result<Tid> {
        if self.refuse_next_spawn.swap(false, Ordering::SeqCst) {
            return Err(error::out_of_memory());
        }

        let tid = self.next_tid.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                SELF_TID.with(|cell| cell.set(Some(tid)));
                relock(&host_threads().records).entry(tid).or_default().handle =
                    Some(thread::current());

                if let Err(payload) = catch_unwind(AssertUnwindSafe(body)) {
                    if !payload.is::<ThreadExit>() {
                        resume_unwind(payload);
                    }
                }
            });

        match spawned {
            Ok(_join_handle) => Ok(tid),
            Err(_) => Err(error::out_of_memory()),
        }
    }

    fn park(&self) {
        thread::park();
    }

    fn unpark(&self, tid: Tid) {
        let handle = relock(&self.records)
            .get(&tid)
            .and_then(|record| record.handle.clone());
        if let Some(handle) = handle {
            handle.unpark();
        }
    }

    fn exit_current(&self) -> ! {
        panic::panic_any(ThreadExit)
    }
}

static THREADS: OnceLock<HostThreads> = OnceLock::new();

/// The process-wide thread double
pub fn host_threads() -> &'static HostThreads {
    THREADS.get_or_init(|| {
        // Keep simulated thread exits out of the test output.
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if info.payload().downcast_ref::<ThreadExit>().is_some() {
                return;
            }
            previous(info);
        }));
        HostThreads::new()
    })
}

// ============================================================================
// User-mode double
// ============================================================================

type Script = Box<dyn FnOnce() + Send>;

/// User-mode transition double
///
/// `enter` records the context it was handed, then serves scripted actions
/// posted for its PID, parking between them. Scripts run on the process's
/// own thread, so a script calling `sys_exit` behaves exactly like the
/// process requesting its own termination.
pub struct HostUserMode {
    scripts: Mutex<HashMap<Pid, VecDeque<Script>>>,
    entries: Mutex<Vec<(Pid, TrapContext)>>,
}

impl HostUserMode {
    fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Queue `action` to run on the thread of process `pid`
    pub fn run_in_process(&self, pid: Pid, action: impl FnOnce() + Send + 'static) {
        relock(&self.scripts)
            .entry(pid)
            .or_default()
            .push_back(Box::new(action));
        host_threads().unpark_all();
    }

    /// Context the process entered user mode with, if it got there
    pub fn entered(&self, pid: Pid) -> Option<TrapContext> {
        relock(&self.entries)
            .iter()
            .rev()
            .find(|(entered_pid, _)| *entered_pid == pid)
            .map(|(_, ctx)| *ctx)
    }

    /// Forget all recorded entries and undelivered scripts
    pub fn reset(&self) {
        relock(&self.scripts).clear();
        relock(&self.entries).clear();
    }
}

impl UserModeOps for HostUserMode {
    fn enter(&self, ctx: TrapContext) -> ! {
        let pid = process::sys_getpid();
        relock(&self.entries).push((pid, ctx));

        loop {
            let action = {
                let mut scripts = relock(&self.scripts);
                scripts.get_mut(&pid).and_then(|queue| queue.pop_front())
            };
            match action {
                Some(action) => action(),
                None => host_threads().park(),
            }
        }
    }
}

static USER_MODE: OnceLock<HostUserMode> = OnceLock::new();

/// The process-wide user-mode double
pub fn host_user_mode() -> &'static HostUserMode {
    USER_MODE.get_or_init(HostUserMode::new)
}

// ============================================================================
// Counting stubs
// ============================================================================

/// Address-space double handing out numbered spaces
pub struct StubAddressSpaces {
    next: AtomicU64,
    live: Mutex<HashSet<u64>>,
    activations: AtomicUsize,
    deactivations: AtomicUsize,
    refuse_next_copy: AtomicBool,
}

impl StubAddressSpaces {
    fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            live: Mutex::new(HashSet::new()),
            activations: AtomicUsize::new(0),
            deactivations: AtomicUsize::new(0),
            refuse_next_copy: AtomicBool::new(false),
        }
    }

    /// Mint a live address space without going through `copy`
    pub fn adopt(&self) -> AddrSpaceId {
        let raw = self.next.fetch_add(1, Ordering::SeqCst);
        relock(&self.live).insert(raw);
        AddrSpaceId(raw)
    }

    /// Make the next copy fail, exercising fork's earliest failure path
    pub fn refuse_next_copy(&self) {
        self.refuse_next_copy.store(true, Ordering::SeqCst);
    }

    /// Number of spaces created and not yet destroyed
    pub fn live_count(&self) -> usize {
        relock(&self.live).len()
    }

    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    pub fn deactivations(&self) -> usize {
        self.deactivations.load(Ordering::SeqCst)
    }
}

impl AddressSpaceOps for StubAddressSpaces {
    fn copy(&self, src: AddrSpaceId) -> Result<AddrSpaceId> {
        if self.refuse_next_copy.swap(false, Ordering::SeqCst) {
            return Err(error::out_of_memory());
        }
        if !relock(&self.live).contains(&src.0) {
            panic!("copying address space {:?} which does not exist", src);
        }
        Ok(self.adopt())
    }

    fn destroy(&self, space: AddrSpaceId) {
        if !relock(&self.live).remove(&space.0) {
            panic!("address space {:?} destroyed twice or never created", space);
        }
    }

    fn activate(&self) {
        self.activations.fetch_add(1, Ordering::SeqCst);
    }

    fn deactivate(&self) {
        self.deactivations.fetch_add(1, Ordering::SeqCst);
    }
}

static SPACES: OnceLock<StubAddressSpaces> = OnceLock::new();

/// The process-wide address-space stub
pub fn stub_spaces() -> &'static StubAddressSpaces {
    SPACES.get_or_init(StubAddressSpaces::new)
}

/// File-table double handing out numbered tables
pub struct StubFileTables {
    next: AtomicU64,
    live: Mutex<HashSet<u64>>,
    standard: Mutex<HashSet<u64>>,
    copies: Mutex<Vec<(FileTableId, FileTableId)>>,
    refuse_next_create: AtomicBool,
}

impl StubFileTables {
    fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            live: Mutex::new(HashSet::new()),
            standard: Mutex::new(HashSet::new()),
            copies: Mutex::new(Vec::new()),
            refuse_next_create: AtomicBool::new(false),
        }
    }

    /// Make the next create fail, exercising the PCB out-of-memory path
    pub fn refuse_next_create(&self) {
        self.refuse_next_create.store(true, Ordering::SeqCst);
    }

    /// Number of tables created and not yet destroyed
    pub fn live_count(&self) -> usize {
        relock(&self.live).len()
    }

    /// Whether `table` had the standard descriptors attached
    pub fn has_standard(&self, table: FileTableId) -> bool {
        relock(&self.standard).contains(&table.0)
    }

    /// Every (src, dst) pair handed to `copy`, oldest first
    pub fn copies(&self) -> Vec<(FileTableId, FileTableId)> {
        relock(&self.copies).clone()
    }
}

impl FileTableOps for StubFileTables {
    fn create(&self) -> Result<FileTableId> {
        if self.refuse_next_create.swap(false, Ordering::SeqCst) {
            return Err(error::out_of_memory());
        }
        let raw = self.next.fetch_add(1, Ordering::SeqCst);
        relock(&self.live).insert(raw);
        Ok(FileTableId(raw))
    }

    fn init_standard(&self, table: FileTableId) -> Result<()> {
        relock(&self.standard).insert(table.0);
        Ok(())
    }

    fn copy(&self, src: FileTableId, dst: FileTableId) {
        relock(&self.copies).push((src, dst));
    }

    fn destroy(&self, table: FileTableId) {
        if !relock(&self.live).remove(&table.0) {
            panic!("file table {:?} destroyed twice or never created", table);
        }
    }
}

static FILES: OnceLock<StubFileTables> = OnceLock::new();

/// The process-wide file-table stub
pub fn stub_files() -> &'static StubFileTables {
    FILES.get_or_init(StubFileTables::new)
}

/// VFS double tracking net vnode reference movement
#[derive(Default)]
pub struct StubVfs {
    references: Mutex<HashMap<u64, i64>>,
}

impl StubVfs {
    /// Net reference count movement for `vnode` since the stub was built
    pub fn net_references(&self, vnode: VnodeId) -> i64 {
        relock(&self.references).get(&vnode.0).copied().unwrap_or(0)
    }
}

impl VfsOps for StubVfs {
    fn increment_reference(&self, vnode: VnodeId) {
        *relock(&self.references).entry(vnode.0).or_insert(0) += 1;
    }

    fn decrement_reference(&self, vnode: VnodeId) {
        *relock(&self.references).entry(vnode.0).or_insert(0) -= 1;
    }
}

static VFS: OnceLock<StubVfs> = OnceLock::new();

/// The process-wide VFS stub
pub fn stub_vfs() -> &'static StubVfs {
    VFS.get_or_init(StubVfs::default)
}

// ============================================================================
// Harness entry points
// ============================================================================

/// The full stub wiring for protocol-level tests
pub fn stub_subsystems() -> Subsystems {
    Subsystems {
        threads: host_threads(),
        address_spaces: stub_spaces(),
        file_tables: stub_files(),
        vfs: stub_vfs(),
        user_mode: host_user_mode(),
    }
}

/// Install `subsystems`, bootstrap, and adopt the calling test thread
///
/// Tests share one process, so repeat installs and bootstraps are expected
/// and ignored; the first call does the real work.
pub fn init_process_core(subsystems: Subsystems) {
    let _ = process::install_subsystems(subsystems);
    let _ = process::bootstrap();
    adopt_into_kernel();
}

/// Attach the calling OS thread to the kernel process if it is unowned
///
/// Each test runs on its own harness thread, but only the bootstrapping
/// thread was adopted by `bootstrap`; everyone else joins here.
pub fn adopt_into_kernel() {
    let threads = host_threads();
    let tid = threads.current();
    if threads.owner_of(tid).is_none() {
        let kproc = kernel::process::table::lookup(KERNEL_PID)
            .expect("Failed to find kernel process after bootstrap");
        pcb::attach_thread(&kproc, tid).expect("Failed to adopt test thread into kernel process");
    }
}

/// Allocate a detached control block for table-level tests
pub fn new_proc(name: &str) -> Arc<Proc> {
    pcb::create(name).expect("Failed to create process control block")
}

/// Serialize tests that touch the shared kernel statics
pub fn serial() -> MutexGuard<'static, ()> {
    static GUARD: Mutex<()> = Mutex::new(());
    relock(&GUARD)
}

/// Spin until `cond` holds, failing the test after a few seconds
pub fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        thread::sleep(Duration::from_millis(1));
    }
}
