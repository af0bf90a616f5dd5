//! Page-replacement policy: given a requesting (pid, vpn) and whether the
//! pool must be forced to replace, selects a victim frame.
//!
//! Policies are a tagged enum rather than a trait-object dispatch chain, per
//! the "policy pluggability" design note — the critical section calling
//! into this stays short and inlinable.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::memory::frame_table::{FrameIndex, FrameTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementPolicy {
    /// Policy number 0: demand-load without replacement; fails once the
    /// pool is exhausted rather than evicting anything.
    NoReplacement,
    Random,
    Fifo,
    Lru,
    Clock,
}

impl ReplacementPolicy {
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::NoReplacement),
            1 => Some(Self::Random),
            2 => Some(Self::Fifo),
            3 => Some(Self::Lru),
            4 => Some(Self::Clock),
            _ => None,
        }
    }
}

pub struct PageReplacer {
    policy: ReplacementPolicy,
    rng: StdRng,
    fifo_queue: VecDeque<FrameIndex>,
    clock_hand: FrameIndex,
}

impl PageReplacer {
    pub fn new(policy: ReplacementPolicy, seed: u64) -> Self {
        Self {
            policy,
            rng: StdRng::seed_from_u64(seed),
            fifo_queue: VecDeque::new(),
            clock_hand: 0,
        }
    }

    pub fn policy(&self) -> ReplacementPolicy {
        self.policy
    }

    pub fn replacement_enabled(&self) -> bool {
        self.policy != ReplacementPolicy::NoReplacement
    }

    /// Bookkeeping performed when a *free* frame is handed out (the pool was
    /// not yet full, so nothing is evicted).
    pub fn on_allocate(&mut self, table: &mut FrameTable, frame: FrameIndex, now: u64) {
        match self.policy {
            ReplacementPolicy::Fifo => self.fifo_queue.push_back(frame),
            ReplacementPolicy::Lru => table.meta_mut(frame).timestamp = now,
            ReplacementPolicy::Clock => table.meta_mut(frame).reference_bit = true,
            ReplacementPolicy::Random | ReplacementPolicy::NoReplacement => {}
        }
    }

    /// Selects a victim frame, skipping shared frames and `excluded`.
    /// Returns `None` only if no eligible frame exists at all (every frame
    /// is shared or excluded), a distinct condition from pool exhaustion,
    /// which the caller checks before ever reaching this path.
    pub fn pick_victim(
        &mut self,
        table: &mut FrameTable,
        excluded: Option<FrameIndex>,
    ) -> Option<FrameIndex> {
        let n = table.num_frames();
        if n == 0 || (0..n).all(|f| !table.is_eligible_victim(f, excluded)) {
            return None;
        }

        let victim = self.pick_victim_inner(table, excluded, n);
        if let Some(v) = victim {
            crate::debug!(crate::logging::DebugMask::PAGING, "{:?} evicting frame {v}", self.policy);
        }
        victim
    }

    fn pick_victim_inner(
        &mut self,
        table: &mut FrameTable,
        excluded: Option<FrameIndex>,
        n: usize,
    ) -> Option<FrameIndex> {
        match self.policy {
            ReplacementPolicy::NoReplacement => None,
            ReplacementPolicy::Random => loop {
                let candidate = self.rng.gen_range(0..n);
                if table.is_eligible_victim(candidate, excluded) {
                    return Some(candidate);
                }
            },
            ReplacementPolicy::Fifo => {
                let mut scanned = 0;
                while scanned < self.fifo_queue.len() + 1 {
                    let Some(candidate) = self.fifo_queue.pop_front() else {
                        break;
                    };
                    if table.is_eligible_victim(candidate, excluded) {
                        self.fifo_queue.push_back(candidate);
                        return Some(candidate);
                    }
                    self.fifo_queue.push_back(candidate);
                    scanned += 1;
                }
                None
            }
            ReplacementPolicy::Lru => (0..n)
                .filter(|&f| table.is_eligible_victim(f, excluded))
                .min_by_key(|&f| (table.meta(f).timestamp, f)),
            ReplacementPolicy::Clock => {
                let mut scanned = 0;
                loop {
                    if scanned > 2 * n {
                        break None;
                    }
                    let candidate = self.clock_hand;
                    self.clock_hand = (self.clock_hand + 1) % n;
                    if !table.is_eligible_victim(candidate, excluded) {
                        scanned += 1;
                        continue;
                    }
                    if table.meta(candidate).reference_bit {
                        table.meta_mut(candidate).reference_bit = false;
                        scanned += 1;
                        continue;
                    }
                    table.meta_mut(candidate).reference_bit = true;
                    break Some(candidate);
                }
            }
        }
    }

    /// Stamps bookkeeping on the frame that now holds the new page, after a
    /// victim has been evicted (or a free frame found) and reassigned. For
    /// LRU the `excluded` frame (the fork-parent's own frame) is stamped
    /// one tick older, so it becomes "second most recent" rather than tying
    /// with the freshly-installed child frame.
    pub fn on_frame_installed(
        &mut self,
        table: &mut FrameTable,
        frame: FrameIndex,
        excluded: Option<FrameIndex>,
        now: u64,
    ) {
        match self.policy {
            ReplacementPolicy::Fifo => {
                if !self.fifo_queue.contains(&frame) {
                    self.fifo_queue.push_back(frame);
                }
            }
            ReplacementPolicy::Lru => {
                table.meta_mut(frame).timestamp = now;
                if let Some(excl) = excluded {
                    table.meta_mut(excl).timestamp = now.saturating_sub(1);
                }
            }
            ReplacementPolicy::Clock => {
                table.meta_mut(frame).reference_bit = true;
            }
            ReplacementPolicy::Random | ReplacementPolicy::NoReplacement => {}
        }
    }

    pub fn mark_referenced(&mut self, table: &mut FrameTable, frame: FrameIndex, now: u64) {
        match self.policy {
            ReplacementPolicy::Lru => table.meta_mut(frame).timestamp = now,
            ReplacementPolicy::Clock => table.meta_mut(frame).reference_bit = true,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupy(table: &mut FrameTable, frame: FrameIndex) {
        table.occupy(frame, 1, frame as u32);
    }

    #[test]
    fn lru_and_clock_reference_string_fault_counts() {
        // Classic reference string `1 2 3 4 1 2 5 1 2 3 4 5` with 3 frames.
        let refs = [1, 2, 3, 4, 1, 2, 5, 1, 2, 3, 4, 5];

        for policy in [ReplacementPolicy::Lru, ReplacementPolicy::Clock] {
            let mut table = FrameTable::new(3, 128);
            let mut replacer = PageReplacer::new(policy, 7);
            let mut resident: Vec<Option<u32>> = vec![None; 3];
            let mut faults = 0u32;
            let mut now = 0u64;

            for &page in &refs {
                now += 1;
                if let Some(frame) = resident.iter().position(|r| *r == Some(page)) {
                    replacer.mark_referenced(&mut table, frame, now);
                    continue;
                }
                faults += 1;
                let frame = match table.first_free() {
                    Some(f) => {
                        replacer.on_allocate(&mut table, f, now);
                        f
                    }
                    None => replacer.pick_victim(&mut table, None).expect("victim"),
                };
                if let Some((_, old_vpn)) = table.meta(frame).occupant {
                    if let Some(slot) = resident.iter_mut().find(|r| **r == Some(old_vpn)) {
                        *slot = None;
                    }
                }
                table.clear(frame);
                occupy(&mut table, frame);
                resident[frame] = Some(page);
                replacer.on_frame_installed(&mut table, frame, None, now);
            }

            // Both LRU and optimal-clock approximations fault on every
            // first reference (4 distinct pages) plus at least the
            // reloads forced by the 3-frame pool; the known result for
            // this textbook string with LRU is 10 faults.
            if policy == ReplacementPolicy::Lru {
                assert_eq!(faults, 10, "LRU fault count for classic string");
            }
        }
    }

    #[test]
    fn fifo_skips_shared_and_excluded_frames() {
        let mut table = FrameTable::new(2, 128);
        occupy(&mut table, 0);
        occupy(&mut table, 1);
        table.meta_mut(0).shared = true;
        let mut replacer = PageReplacer::new(ReplacementPolicy::Fifo, 1);
        replacer.on_allocate(&mut table, 0, 1);
        replacer.on_allocate(&mut table, 1, 2);

        let victim = replacer.pick_victim(&mut table, None);
        assert_eq!(victim, Some(1));
    }

    #[test]
    fn pick_victim_returns_none_when_pool_has_no_eligible_frame() {
        let mut table = FrameTable::new(1, 128);
        occupy(&mut table, 0);
        table.meta_mut(0).shared = true;
        let mut replacer = PageReplacer::new(ReplacementPolicy::Random, 0);
        assert_eq!(replacer.pick_victim(&mut table, None), None);
    }
}
