//! Process-related types shared between the kernel and its collaborators

/// Width of one encoded instruction, used to step the program counter past
/// the trapping syscall instruction before a forked child resumes.
pub const INSTRUCTION_SIZE: usize = 4;

/// Saved user-mode register state carried across a trap.
///
/// A forked child receives a copy of its parent's context with the return
/// registers rewritten by [`TrapContext::prepare_child_return`], so both
/// processes resume from the same syscall site with distinguishable results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapContext {
    /// Program counter at the trap site.
    pub pc: usize,
    /// User stack pointer.
    pub sp: usize,
    /// Primary return value register.
    pub ret0: usize,
    /// Secondary return value register.
    pub ret1: usize,
    /// Error flag register; zero signals success to the user-mode stub.
    pub err: usize,
    /// Syscall argument registers.
    pub arg: [usize; 4],
}

impl TrapContext {
    /// Rewrites the context so the forked child observes a zero return
    /// value and resumes at the instruction after the syscall.
    pub fn prepare_child_return(&mut self) {
        self.ret0 = 0;
        self.ret1 = 0;
        self.err = 0;
        self.pc += INSTRUCTION_SIZE;
    }

    /// Clears the error flag and secondary return register so the parent
    /// path reports success; the primary return value is set separately.
    pub fn signal_success(&mut self) {
        self.ret1 = 0;
        self.err = 0;
    }
}
