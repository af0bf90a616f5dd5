//! Kernel-internal error types.
//!
//! Class-4 "kernel invariant violation" errors from the specification are
//! intentionally *not* represented here: those are unreachable-by-design and
//! surface as `assert!`/`panic!` at the invariant site rather than a
//! recoverable `Result`, matching how the teacher crate treats its own
//! "should never happen" conditions.

use thiserror::Error;

use crate::process::Pid;

#[derive(Debug, Clone, Error)]
pub enum NoffError {
    #[error("bad NOFF magic number: {0:#x}")]
    BadMagic(u32),
    #[error("executable too short to contain a NOFF header")]
    Truncated,
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error(transparent)]
    Noff(#[from] NoffError),
    #[error("physical frame pool exhausted (replacement disabled)")]
    FramePoolExhausted,
    #[error("virtual address {0:#x} is outside the address space")]
    AddressOutOfRange(usize),
    #[error("unopenable executable: {0}")]
    UnopenableExecutable(String),
}

#[derive(Debug, Clone, Error)]
pub enum ScenarioError {
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("unknown scheduling algorithm number {0}")]
    UnknownAlgorithm(u8),
    #[error("scenario file is empty")]
    Empty,
}

#[derive(Debug, Clone, Error)]
pub enum KernelError {
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error("invalid syscall number {0}")]
    InvalidSyscall(u16),
    #[error("register index {0} is out of range")]
    InvalidRegister(usize),
    #[error("pid {0} does not name a child of the calling thread")]
    NotAChild(Pid),
    #[error("no such process {0}")]
    NoSuchProcess(Pid),
}

pub type Result<T, E = KernelError> = core::result::Result<T, E>;
