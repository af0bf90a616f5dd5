//! A single simulated thread's execution context and lifecycle state.

use crate::machine::UserRegisters;
use crate::memory::AddressSpace;
use crate::process::Pid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Created,
    Ready,
    Running,
    BlockedSleeping,
    BlockedJoining(Pid),
    Finished,
}

/// Held by the parent for each child ever forked. Outlives the child so
/// `Join` can return status after the child has already died.
#[derive(Debug, Clone)]
pub struct ChildLink {
    pub child_pid: Pid,
    pub alive: bool,
    pub exit_status: i64,
    pub parent_is_waiting: bool,
}

impl ChildLink {
    pub fn new(child_pid: Pid) -> Self {
        Self {
            child_pid,
            alive: true,
            exit_status: 0,
            parent_is_waiting: false,
        }
    }
}

#[derive(Debug)]
pub struct Thread {
    pub pid: Pid,
    pub ppid: Option<Pid>,
    pub name: String,
    pub state: ThreadState,

    pub user_regs: UserRegisters,
    pub address_space: Option<AddressSpace>,

    /// Fixed priority assigned at creation (or by the scenario file).
    pub base_priority: i64,
    /// Effective scheduling key: `base_priority + cpu_usage/2` under the
    /// priority policy, or the predicted next burst length under SJF.
    pub thread_priority: i64,
    /// Decaying CPU-usage figure fed by the priority policy's aging step.
    pub cpu_usage: i64,

    pub wait_start_tick: u64,
    pub burst_start_tick: u64,
    /// Monotonic counter stamped at ready-queue insertion, used to break
    /// ties between threads with equal scheduling key in insertion order.
    pub insertion_seq: u64,

    pub created_tick: u64,

    pub children: Vec<ChildLink>,
}

impl Thread {
    pub fn new(pid: Pid, ppid: Option<Pid>, name: String, priority: i64, now: u64) -> Self {
        Self {
            pid,
            ppid,
            name,
            state: ThreadState::Created,
            user_regs: UserRegisters::default(),
            address_space: None,
            base_priority: priority,
            thread_priority: priority,
            cpu_usage: 0,
            wait_start_tick: now,
            burst_start_tick: now,
            insertion_seq: 0,
            created_tick: now,
            children: Vec::new(),
        }
    }

    pub fn find_child_mut(&mut self, child_pid: Pid) -> Option<&mut ChildLink> {
        self.children.iter_mut().find(|c| c.child_pid == child_pid)
    }
}
