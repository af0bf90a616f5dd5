//! PID-indexed global thread table: the only owner of [`Thread`] values.
//! Every other subsystem holds a `Pid` handle and looks up through here,
//! per the "deep pointer aliasing" design note.

use slab::Slab;

use crate::process::thread::{Thread, ThreadState};
use crate::process::Pid;

/// PID-indexed table backed by a [`Slab`], the same structure the teacher
/// uses for its own process list: freed slots are recycled by later
/// `allocate` calls rather than left as permanent holes.
pub struct ProcessTable {
    slots: Slab<Thread>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self { slots: Slab::new() }
    }

    fn key(pid: Pid) -> usize {
        (pid - 1) as usize
    }

    /// Creates a new thread record in the `Created` state and returns its
    /// freshly assigned pid. Does not touch the scheduler's ready queue —
    /// the caller moves it to ready once it is fully set up.
    pub fn allocate(&mut self, name: String, ppid: Option<Pid>, priority: i64, now: u64) -> Pid {
        let entry = self.slots.vacant_entry();
        let pid = (entry.key() + 1) as Pid;
        entry.insert(Thread::new(pid, ppid, name, priority, now));
        pid
    }

    pub fn get(&self, pid: Pid) -> Option<&Thread> {
        self.slots.get(Self::key(pid))
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Thread> {
        self.slots.get_mut(Self::key(pid))
    }

    /// Removes and returns a thread's record. Used once a `Finished`
    /// thread has been reaped by its successor after the context switch.
    pub fn reap(&mut self, pid: Pid) -> Option<Thread> {
        if self.slots.contains(Self::key(pid)) {
            Some(self.slots.remove(Self::key(pid)))
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Thread> {
        self.slots.iter().map(|(_, t)| t)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Thread> {
        self.slots.iter_mut().map(|(_, t)| t)
    }

    pub fn count_live(&self) -> usize {
        self.iter()
            .filter(|t| t.state != ThreadState::Finished)
            .count()
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_assigns_increasing_pids_starting_at_one() {
        let mut table = ProcessTable::new();
        let a = table.allocate("a".into(), None, 100, 0);
        let b = table.allocate("b".into(), Some(a), 100, 0);
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(table.get(b).unwrap().ppid, Some(a));
    }

    #[test]
    fn reap_removes_the_slot() {
        let mut table = ProcessTable::new();
        let pid = table.allocate("a".into(), None, 100, 0);
        assert!(table.reap(pid).is_some());
        assert!(table.get(pid).is_none());
    }
}
