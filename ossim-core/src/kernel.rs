//! Top-level orchestration: owns every subsystem table and exposes the
//! thread-lifecycle operations ([`Kernel::spawn`], [`Kernel::fork`],
//! [`Kernel::exec`], [`Kernel::join`], [`Kernel::exit`], [`Kernel::sleep`],
//! [`Kernel::yield_cpu`]) that the syscall dispatcher drives.

use crate::batch::Scenario;
use crate::error::{KernelError, MemoryError, ScenarioError};
use crate::machine::{ExecutableSource, REG_RESULT};
use crate::memory::{AddressSpace, MemoryManager, PageReplacer};
use crate::noff::{NoffHeader, HEADER_BYTES};
use crate::process::table::ProcessTable;
use crate::process::{ChildLink, Pid, ThreadState};
use crate::scheduler::{Scheduler, SchedulingPolicy};
use crate::stats::Statistics;

pub enum JoinOutcome {
    Done(i64),
    Blocked,
}

pub struct Kernel {
    pub process_table: ProcessTable,
    pub memory: MemoryManager,
    pub scheduler: Scheduler,
    pub stats: Statistics,
}

impl Kernel {
    pub fn new(num_frames: usize, replacer: PageReplacer, policy: SchedulingPolicy) -> Self {
        Self {
            process_table: ProcessTable::new(),
            memory: MemoryManager::new(num_frames, replacer),
            scheduler: Scheduler::new(policy),
            stats: Statistics::new(),
        }
    }

    /// Loads an executable, builds its address space, and places the new
    /// thread on the ready queue. `ppid` is `None` for scenario/top-level
    /// processes and `Some` for children spawned by the loader on their
    /// parent's behalf (the loader itself never calls `Fork`).
    pub fn spawn(
        &mut self,
        exec: &dyn ExecutableSource,
        path: &str,
        ppid: Option<Pid>,
        priority: i64,
        now: u64,
    ) -> Result<Pid, KernelError> {
        exec.open(path)?;
        let header_bytes = exec.read_at(path, 0, HEADER_BYTES)?;
        let noff = NoffHeader::parse(&header_bytes).map_err(MemoryError::from)?;

        let pid = self.process_table.allocate(path.to_string(), ppid, priority, now);
        let mut space = AddressSpace::from_executable(pid, path, noff);
        let stack_top = space.stack_top();
        space.owner = pid;

        let thread = self.process_table.get_mut(pid).expect("just allocated");
        thread.user_regs.init_for_entry(0, stack_top);
        thread.address_space = Some(space);

        self.scheduler
            .move_to_ready(&mut self.process_table, &mut self.stats, pid, now);
        Ok(pid)
    }

    /// Replaces the active scheduling policy and spawns every program named
    /// in a parsed scenario file.
    pub fn load_scenario(
        &mut self,
        scenario: &Scenario,
        exec: &dyn ExecutableSource,
        quantum: u64,
        alpha: f64,
        now: u64,
    ) -> Result<(), KernelError> {
        let policy = SchedulingPolicy::from_number(scenario.policy_number, quantum, alpha)
            .ok_or(ScenarioError::UnknownAlgorithm(scenario.policy_number))?;
        self.scheduler = Scheduler::new(policy);
        for entry in &scenario.entries {
            self.spawn(exec, &entry.path, None, entry.priority, now)?;
        }
        Ok(())
    }

    /// Duplicates `parent_pid`'s address space into a fresh child thread.
    /// The parent's `AddressSpace` is temporarily taken out of the process
    /// table so `fork_duplicate` (which needs `&mut ProcessTable` to service
    /// any eviction the duplication triggers) never has to alias a borrow
    /// still live on the parent's own record. `fork_duplicate` takes `&mut
    /// self` because a full frame pool can force it to evict one of the
    /// parent's *other* pages while copying this one; it is handed back to
    /// `parent.address_space` as soon as it returns, detached-owner or not.
    pub fn fork(&mut self, parent_pid: Pid, now: u64) -> Result<Pid, KernelError> {
        let parent = self
            .process_table
            .get_mut(parent_pid)
            .ok_or(KernelError::NoSuchProcess(parent_pid))?;
        let parent_priority = parent.base_priority;
        let parent_name = parent.name.clone();
        let parent_regs = parent.user_regs;
        let mut parent_space = parent
            .address_space
            .take()
            .expect("forking thread has an address space");

        let child_pid = self.process_table.allocate(
            format!("{parent_name}(fork)"),
            Some(parent_pid),
            parent_priority,
            now,
        );

        let duplicated = parent_space.fork_duplicate(&mut self.memory, &mut self.process_table, child_pid, now);

        self.process_table
            .get_mut(parent_pid)
            .expect("parent still present")
            .address_space = Some(parent_space);

        let child_space = duplicated?;

        let child = self.process_table.get_mut(child_pid).expect("just allocated");
        child.address_space = Some(child_space);
        child.user_regs = parent_regs;
        // The reference implementation advances PrevPC/PC/NextPC *before*
        // copying the register file into the child, so both parent and
        // child resume at the instruction after the fork syscall rather
        // than re-executing it. The parent's own registers are advanced
        // separately, by the generic post-dispatch step in `syscall::dispatch`.
        child.user_regs.advance_pc();
        child.user_regs.set(REG_RESULT, 0);

        self.process_table
            .get_mut(parent_pid)
            .expect("parent still present")
            .children
            .push(ChildLink::new(child_pid));

        self.scheduler
            .move_to_ready(&mut self.process_table, &mut self.stats, child_pid, now);
        Ok(child_pid)
    }

    /// Replaces `pid`'s address space in place: releases every frame the
    /// old one held before mapping the new one in, so frame bookkeeping
    /// cannot leak.
    pub fn exec(&mut self, pid: Pid, exec: &dyn ExecutableSource, path: &str) -> Result<(), KernelError> {
        exec.open(path)?;
        let header_bytes = exec.read_at(path, 0, HEADER_BYTES)?;
        let noff = NoffHeader::parse(&header_bytes).map_err(MemoryError::from)?;

        let old_space = self
            .process_table
            .get_mut(pid)
            .ok_or(KernelError::NoSuchProcess(pid))?
            .address_space
            .take();
        if let Some(mut old_space) = old_space {
            old_space.destroy(&mut self.memory);
        }

        let new_space = AddressSpace::from_executable(pid, path, noff);
        let stack_top = new_space.stack_top();

        let thread = self.process_table.get_mut(pid).expect("pid still present");
        thread.name = path.to_string();
        thread.address_space = Some(new_space);
        // Exec never advances the syscall-return PC sequence: the new
        // address space's registers are initialized directly at entry 0
        // rather than derived from the old PC/NextPC, since control never
        // returns into the old instruction stream.
        thread.user_regs.init_for_entry(0, stack_top);
        Ok(())
    }

    /// `child_pid` must already be a recorded child of `caller_pid`; always
    /// re-resolves the `ChildLink` by `(caller_pid, child_pid)` rather than
    /// trusting any binding captured before a prior block, so a stale
    /// exit-status read is impossible.
    pub fn join(&mut self, caller_pid: Pid, child_pid: Pid) -> Result<JoinOutcome, KernelError> {
        let caller = self
            .process_table
            .get_mut(caller_pid)
            .ok_or(KernelError::NoSuchProcess(caller_pid))?;
        let link = caller
            .find_child_mut(child_pid)
            .ok_or(KernelError::NotAChild(child_pid))?;

        if !link.alive {
            return Ok(JoinOutcome::Done(link.exit_status));
        }

        link.parent_is_waiting = true;
        caller.state = ThreadState::BlockedJoining(child_pid);
        Ok(JoinOutcome::Blocked)
    }

    /// Records `status` in the parent's `ChildLink`, wakes the parent
    /// directly (writing its result register) if it was waiting, orphans
    /// every still-live child by walking the full list to completion
    /// (the reference implementation's loop never advances past the head),
    /// and marks this thread for destruction on the next context switch.
    /// Returns `true` if this was the last live thread (the machine should
    /// halt).
    pub fn exit(&mut self, pid: Pid, status: i64, now: u64) -> bool {
        let ppid = self.process_table.get(pid).and_then(|t| t.ppid);

        if let Some(parent_pid) = ppid {
            let mut wake_parent = false;
            if let Some(parent) = self.process_table.get_mut(parent_pid) {
                if let Some(link) = parent.find_child_mut(pid) {
                    link.alive = false;
                    link.exit_status = status;
                    if link.parent_is_waiting {
                        link.parent_is_waiting = false;
                        wake_parent = true;
                    }
                }
            }
            if wake_parent {
                if let Some(parent) = self.process_table.get_mut(parent_pid) {
                    parent.user_regs.set(REG_RESULT, status);
                }
                self.scheduler
                    .move_to_ready(&mut self.process_table, &mut self.stats, parent_pid, now);
            }
        }

        let live_children: Vec<Pid> = self
            .process_table
            .get(pid)
            .map(|t| t.children.iter().filter(|c| c.alive).map(|c| c.child_pid).collect())
            .unwrap_or_default();
        for child_pid in live_children {
            if let Some(child) = self.process_table.get_mut(child_pid) {
                child.ppid = None;
            }
        }

        let thread = self.process_table.get_mut(pid).expect("pid still present");
        thread.state = ThreadState::Finished;
        self.stats
            .record_thread_completion(now.saturating_sub(thread.created_tick));
        self.scheduler.mark_for_reap(pid);

        self.process_table.count_live() == 0
    }

    pub fn sleep(&mut self, pid: Pid, ticks: u64, now: u64) {
        if ticks == 0 {
            self.yield_cpu(pid, now);
            return;
        }
        if let Some(thread) = self.process_table.get_mut(pid) {
            thread.state = ThreadState::BlockedSleeping;
        }
        self.scheduler.enqueue_sleep(pid, now + ticks);
    }

    pub fn yield_cpu(&mut self, pid: Pid, now: u64) {
        self.scheduler
            .move_to_ready(&mut self.process_table, &mut self.stats, pid, now);
    }

    pub fn translate(&self, pid: Pid, vaddr: usize) -> Option<usize> {
        self.process_table
            .get(pid)?
            .address_space
            .as_ref()?
            .translate(vaddr)
    }

    /// Services a page fault, temporarily taking the faulting thread's
    /// address space out of the process table for the same reason
    /// [`Kernel::fork`] does. Returns the fault-service delay in ticks.
    pub fn fix_fault(
        &mut self,
        pid: Pid,
        exec: &dyn ExecutableSource,
        vaddr: usize,
        now: u64,
    ) -> Result<u64, KernelError> {
        let mut space = self
            .process_table
            .get_mut(pid)
            .ok_or(KernelError::NoSuchProcess(pid))?
            .address_space
            .take()
            .expect("faulting thread has an address space");

        let result = space.fix_fault(&mut self.memory, &mut self.process_table, exec, vaddr, now);

        self.process_table
            .get_mut(pid)
            .expect("pid still present")
            .address_space = Some(space);

        let ticks = result?;
        self.stats.num_page_faults += 1;
        Ok(ticks)
    }

    /// Drains the sleep queue and moves every due thread back to ready.
    pub fn wake_due_sleepers(&mut self, now: u64) {
        for pid in self.scheduler.drain_due_sleepers(now) {
            self.scheduler
                .move_to_ready(&mut self.process_table, &mut self.stats, pid, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ReplacementPolicy;

    struct FixedExecutable(Vec<u8>);
    impl ExecutableSource for FixedExecutable {
        fn open(&self, _path: &str) -> Result<(), MemoryError> {
            Ok(())
        }
        fn read_at(&self, _path: &str, offset: u32, len: usize) -> Result<Vec<u8>, MemoryError> {
            let offset = offset as usize;
            let mut buf = vec![0u8; len];
            for (i, b) in buf.iter_mut().enumerate() {
                *b = self.0.get(offset + i).copied().unwrap_or(0);
            }
            Ok(buf)
        }
    }

    fn noff_bytes(code_size: u32) -> Vec<u8> {
        let mut bytes = vec![0u8; 40 + code_size as usize];
        bytes[0..4].copy_from_slice(&0xbadfad_u32.to_le_bytes());
        bytes[4..8].copy_from_slice(&0u32.to_le_bytes());
        bytes[8..12].copy_from_slice(&40u32.to_le_bytes());
        bytes[12..16].copy_from_slice(&code_size.to_le_bytes());
        bytes
    }

    fn test_kernel() -> Kernel {
        Kernel::new(16, PageReplacer::new(ReplacementPolicy::Random, 1), SchedulingPolicy::Fcfs)
    }

    #[test]
    fn fork_then_child_exit_then_parent_join_returns_status() {
        let mut kernel = test_kernel();
        let exec = FixedExecutable(noff_bytes(64));
        let parent = kernel.spawn(&exec, "prog", None, 100, 0).unwrap();
        let child = kernel.fork(parent, 1).unwrap();

        assert!(matches!(kernel.join(parent, child).unwrap(), JoinOutcome::Blocked));
        kernel.exit(child, 42, 2);

        match kernel.join(parent, child).unwrap() {
            JoinOutcome::Done(status) => assert_eq!(status, 42),
            JoinOutcome::Blocked => panic!("child already exited, join should not block"),
        }
    }

    #[test]
    fn join_on_non_child_is_rejected() {
        let mut kernel = test_kernel();
        let exec = FixedExecutable(noff_bytes(64));
        let a = kernel.spawn(&exec, "a", None, 100, 0).unwrap();
        let b = kernel.spawn(&exec, "b", None, 100, 0).unwrap();
        assert!(matches!(kernel.join(a, b), Err(KernelError::NotAChild(_))));
    }

    #[test]
    fn exit_orphans_every_live_child_not_just_the_first() {
        let mut kernel = test_kernel();
        let exec = FixedExecutable(noff_bytes(64));
        let parent = kernel.spawn(&exec, "p", None, 100, 0).unwrap();
        let c1 = kernel.fork(parent, 1).unwrap();
        let c2 = kernel.fork(parent, 1).unwrap();
        let c3 = kernel.fork(parent, 1).unwrap();

        kernel.exit(parent, 0, 2);

        for child in [c1, c2, c3] {
            assert_eq!(kernel.process_table.get(child).unwrap().ppid, None);
        }
    }

    #[test]
    fn exit_of_last_thread_signals_halt() {
        let mut kernel = test_kernel();
        let exec = FixedExecutable(noff_bytes(64));
        let only = kernel.spawn(&exec, "solo", None, 100, 0).unwrap();
        assert!(kernel.exit(only, 0, 10));
    }

    /// Regression for the self-eviction bug: `fix_fault` takes the faulting
    /// thread's `AddressSpace` out of the process table before asking for a
    /// frame, so once the pool is smaller than the process, eviction must
    /// still flush and invalidate *that same process's* other pages rather
    /// than silently leaving their page-table entries stale.
    #[test]
    fn fix_fault_through_kernel_evicts_own_frame_and_round_trips() {
        let mut kernel = Kernel::new(1, PageReplacer::new(ReplacementPolicy::Random, 1), SchedulingPolicy::Fcfs);
        let exec = FixedExecutable(noff_bytes(256));
        let pid = kernel.spawn(&exec, "prog", None, 100, 0).unwrap();

        kernel.fix_fault(pid, &exec, 0, 1).unwrap();
        {
            let space = kernel.process_table.get_mut(pid).unwrap().address_space.as_mut().unwrap();
            let frame = space.page_table[0].physical_frame.unwrap();
            kernel.memory.frame_table.bytes_mut(frame)[5] = 0xCD;
            space.page_table[0].dirty = true;
        }

        // Forces eviction of vpn 0's own frame to service vpn 1's fault.
        kernel.fix_fault(pid, &exec, crate::memory::PAGE_SIZE, 2).unwrap();
        {
            let space = kernel.process_table.get(pid).unwrap().address_space.as_ref().unwrap();
            assert!(!space.page_table[0].valid, "victim entry must be invalidated on eviction");
        }

        kernel.fix_fault(pid, &exec, 0, 3).unwrap();
        let space = kernel.process_table.get(pid).unwrap().address_space.as_ref().unwrap();
        let frame = space.page_table[0].physical_frame.unwrap();
        assert_eq!(kernel.memory.frame_table.bytes(frame)[5], 0xCD);
    }

    /// Regression for the same self-eviction bug on the fork path: with a
    /// frame pool too small to hold both copies of every page, duplicating
    /// one page must be able to evict one of the *parent's own* other pages
    /// without losing its dirty bytes.
    #[test]
    fn fork_evicts_parents_own_frame_without_losing_dirty_bytes() {
        let mut kernel = Kernel::new(2, PageReplacer::new(ReplacementPolicy::Random, 1), SchedulingPolicy::Fcfs);
        let exec = FixedExecutable(noff_bytes(256));
        let parent = kernel.spawn(&exec, "prog", None, 100, 0).unwrap();

        kernel.fix_fault(parent, &exec, 0, 1).unwrap();
        kernel.fix_fault(parent, &exec, crate::memory::PAGE_SIZE, 2).unwrap();
        {
            let space = kernel.process_table.get_mut(parent).unwrap().address_space.as_mut().unwrap();
            let frame = space.page_table[1].physical_frame.unwrap();
            kernel.memory.frame_table.bytes_mut(frame)[9] = 0xEF;
            space.page_table[1].dirty = true;
        }

        // Both of the parent's pages are resident and the pool holds only 2
        // frames. Duplicating vpn 0 excludes its own frame from victim
        // selection (so parent and child can coexist during the copy),
        // which leaves the parent's *other* resident page, vpn 1, as the
        // only eligible victim.
        let child = kernel.fork(parent, 3).unwrap();

        let parent_space = kernel.process_table.get(parent).unwrap().address_space.as_ref().unwrap();
        assert!(
            !parent_space.page_table[1].valid,
            "parent's own vpn 1 should have been evicted to make room"
        );
        drop(parent_space);

        kernel.fix_fault(parent, &exec, crate::memory::PAGE_SIZE, 4).unwrap();
        let parent_space = kernel.process_table.get(parent).unwrap().address_space.as_ref().unwrap();
        let frame = parent_space.page_table[1].physical_frame.unwrap();
        assert_eq!(kernel.memory.frame_table.bytes(frame)[9], 0xEF);

        // The child never took ownership of vpn 0, so it still exists.
        assert!(kernel.process_table.get(child).is_some());
    }

    #[test]
    fn fork_child_resumes_after_the_fork_instruction() {
        use crate::machine::{REG_NEXT_PC, REG_PC, REG_PREV_PC};

        let mut kernel = test_kernel();
        let exec = FixedExecutable(noff_bytes(64));
        let parent = kernel.spawn(&exec, "prog", None, 100, 0).unwrap();
        {
            let regs = &mut kernel.process_table.get_mut(parent).unwrap().user_regs;
            regs.set(REG_PC, 100);
            regs.set(REG_NEXT_PC, 104);
        }

        let child = kernel.fork(parent, 1).unwrap();

        let child_regs = kernel.process_table.get(child).unwrap().user_regs;
        assert_eq!(child_regs.get(REG_PREV_PC), 100);
        assert_eq!(child_regs.get(REG_PC), 104);
        assert_eq!(child_regs.get(REG_NEXT_PC), 108);
    }
}
