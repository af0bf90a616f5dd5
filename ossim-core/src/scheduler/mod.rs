//! Ready queue, policy dispatcher, burst accounting, and context-switch
//! mechanics. Threads themselves live in the [`crate::process::table::ProcessTable`];
//! the scheduler only ever holds `Pid` handles, per the "deep pointer
//! aliasing" design note.

pub mod policy;

pub use policy::SchedulingPolicy;

use crate::memory::MemoryManager;
use crate::process::table::ProcessTable;
use crate::process::{Pid, ThreadState};
use crate::stats::Statistics;

pub struct Scheduler {
    policy: SchedulingPolicy,
    ready_queue: Vec<Pid>,
    sleep_queue: Vec<(u64, Pid)>,
    running: Option<Pid>,
    next_insertion_seq: u64,
    /// Set by `Exit` on the outgoing thread; drained by [`Scheduler::tail`]
    /// once the successor has taken the CPU, since the outgoing stack is
    /// still "live" during the switch itself.
    pending_reap: Option<Pid>,
}

impl Scheduler {
    pub fn new(policy: SchedulingPolicy) -> Self {
        Self {
            policy,
            ready_queue: Vec::new(),
            sleep_queue: Vec::new(),
            running: None,
            next_insertion_seq: 0,
            pending_reap: None,
        }
    }

    pub fn policy(&self) -> SchedulingPolicy {
        self.policy
    }

    pub fn running(&self) -> Option<Pid> {
        self.running
    }

    pub fn ready_is_empty(&self) -> bool {
        self.ready_queue.is_empty()
    }

    pub fn has_sleepers(&self) -> bool {
        !self.sleep_queue.is_empty()
    }

    /// Applies the classic UNIX decay to every live thread: the thread that
    /// just ran gets `cpu_usage := (cpu_usage + run_time) / 2`; every other
    /// live thread gets `cpu_usage := cpu_usage / 2`. Then recomputes
    /// `thread_priority := base_priority + cpu_usage / 2`. Applied
    /// atomically with the burst close-out that triggered it.
    fn age_priorities(process_table: &mut ProcessTable, ran_pid: Pid, run_time: u64) {
        for thread in process_table.iter_mut() {
            if thread.state == ThreadState::Finished {
                continue;
            }
            if thread.pid == ran_pid {
                thread.cpu_usage = (thread.cpu_usage + run_time as i64) / 2;
            } else {
                thread.cpu_usage /= 2;
            }
            thread.thread_priority = thread.base_priority + thread.cpu_usage / 2;
        }
    }

    /// Closes out `pid`'s CPU burst if it was running, updates burst/SJF/
    /// priority bookkeeping, then moves it to the ready queue.
    pub fn move_to_ready(
        &mut self,
        process_table: &mut ProcessTable,
        stats: &mut Statistics,
        pid: Pid,
        now: u64,
    ) {
        let was_running = process_table
            .get(pid)
            .map(|t| t.state == ThreadState::Running)
            .unwrap_or(false);

        if was_running {
            let run_time = {
                let thread = process_table.get(pid).expect("pid valid");
                now.saturating_sub(thread.burst_start_tick)
            };
            stats.record_cpu_burst(run_time);

            if run_time > 0 {
                if let SchedulingPolicy::ShortestJobFirst { alpha } = self.policy {
                    let thread = process_table.get_mut(pid).expect("pid valid");
                    let predicted = thread.thread_priority;
                    stats.burst_estimate_error += (run_time as i64 - predicted).abs();
                    thread.thread_priority =
                        (alpha * run_time as f64 + (1.0 - alpha) * predicted as f64).round()
                            as i64;
                }
                if matches!(self.policy, SchedulingPolicy::Priority { .. }) {
                    Self::age_priorities(process_table, pid, run_time);
                }
            }
        }

        let thread = process_table.get_mut(pid).expect("pid valid");
        thread.state = ThreadState::Ready;
        thread.wait_start_tick = now;
        self.next_insertion_seq += 1;
        thread.insertion_seq = self.next_insertion_seq;
        self.ready_queue.push(pid);

        if self.running == Some(pid) {
            self.running = None;
        }

        crate::debug!(
            crate::logging::DebugMask::SCHEDULER,
            "pid {pid} -> ready at tick {now}, key {}",
            process_table.get(pid).expect("pid valid").thread_priority
        );
    }

    /// Dispatches the next thread to run per the active policy: FCFS/RR
    /// take the queue head; SJF/Priority take the minimum `thread_priority`,
    /// ties broken by insertion order.
    pub fn select_next_ready(&mut self, process_table: &ProcessTable) -> Option<Pid> {
        if self.ready_queue.is_empty() {
            return None;
        }

        if !self.policy.dispatch_by_key() {
            return Some(self.ready_queue.remove(0));
        }

        let mut best_idx = 0;
        let mut best_key = process_table
            .get(self.ready_queue[0])
            .expect("ready pid valid")
            .thread_priority;
        let mut best_seq = process_table
            .get(self.ready_queue[0])
            .expect("ready pid valid")
            .insertion_seq;

        for (i, &pid) in self.ready_queue.iter().enumerate().skip(1) {
            let t = process_table.get(pid).expect("ready pid valid");
            if t.thread_priority < best_key
                || (t.thread_priority == best_key && t.insertion_seq < best_seq)
            {
                best_idx = i;
                best_key = t.thread_priority;
                best_seq = t.insertion_seq;
            }
        }

        Some(self.ready_queue.remove(best_idx))
    }

    /// Dispatches `next`: stamps wait time, starts its burst clock, and
    /// marks it running. The caller is responsible for calling
    /// [`Scheduler::tail`] immediately after, which is the "on return, reap
    /// any thread marked for destruction" half of the primitive switch.
    pub fn schedule_thread(&mut self, process_table: &mut ProcessTable, stats: &mut Statistics, next: Pid, now: u64) {
        let thread = process_table.get_mut(next).expect("pid valid");
        stats.total_wait_time += now.saturating_sub(thread.wait_start_tick);
        thread.burst_start_tick = now;
        thread.state = ThreadState::Running;
        self.running = Some(next);
        crate::debug!(crate::logging::DebugMask::SCHEDULER, "dispatching pid {next} at tick {now}");
    }

    pub fn mark_for_reap(&mut self, pid: Pid) {
        self.pending_reap = Some(pid);
    }

    /// The post-switch portion of `schedule_thread`: reaps whatever thread
    /// was marked finished before the switch (its stack was still live
    /// during the switch primitive itself), releasing its address space.
    /// This is also conceptually where a freshly forked thread's very
    /// first instruction executes "after" the switch.
    pub fn tail(&mut self, process_table: &mut ProcessTable, memory: &mut MemoryManager) -> Option<Pid> {
        let pid = self.pending_reap.take()?;
        if let Some(mut thread) = process_table.reap(pid) {
            if let Some(space) = thread.address_space.as_mut() {
                space.destroy(memory);
            }
        }
        Some(pid)
    }

    pub fn enqueue_sleep(&mut self, pid: Pid, wake_tick: u64) {
        self.sleep_queue.push((wake_tick, pid));
    }

    /// Removes and returns every thread whose wake tick has arrived.
    pub fn drain_due_sleepers(&mut self, now: u64) -> Vec<Pid> {
        let mut due = Vec::new();
        self.sleep_queue.retain(|&(wake, pid)| {
            if wake <= now {
                due.push(pid);
                false
            } else {
                true
            }
        });
        due
    }

    pub fn next_wake_tick(&self) -> Option<u64> {
        self.sleep_queue.iter().map(|&(wake, _)| wake).min()
    }

    /// Whether the timer interrupt should preempt the currently running
    /// thread: RR at quantum expiry, or Priority when a strictly
    /// higher-priority thread is ready. Non-preemptive policies never do.
    pub fn should_preempt(&self, process_table: &ProcessTable, now: u64) -> bool {
        let Some(running_pid) = self.running else {
            return false;
        };
        let running = process_table.get(running_pid).expect("running pid valid");

        match self.policy {
            SchedulingPolicy::RoundRobin { quantum } => {
                now.saturating_sub(running.burst_start_tick) >= quantum
            }
            SchedulingPolicy::Priority { .. } => self.ready_queue.iter().any(|&pid| {
                process_table
                    .get(pid)
                    .map(|t| t.thread_priority < running.thread_priority)
                    .unwrap_or(false)
            }),
            _ => false,
        }
    }
}
