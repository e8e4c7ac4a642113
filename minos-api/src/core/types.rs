//! Core types used throughout the MinOS kernel

/// Process identifier type
pub type Pid = u32;

/// Kernel thread identifier type
pub type Tid = u32;

/// Exit payload delivered from a child to a waiting parent
pub type WaitCode = i32;

/// Opaque handle to a virtual address space.
///
/// Issued and interpreted by the memory-management subsystem; the process
/// core only stores, copies, and destroys it through [`crate::process::AddressSpaceOps`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddrSpaceId(pub u64);

/// Opaque handle to a per-process open-file table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileTableId(pub u64);

/// Opaque handle to a shared filesystem node (e.g. a current directory).
///
/// The node's reference count lives with the VFS; holders bump it through
/// [`crate::process::VfsOps`] when they copy or drop the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VnodeId(pub u64);
