//! Owns the physical frame pool shared by every process's page table.

use crate::process::Pid;

pub type FrameIndex = usize;
pub type Vpn = u32;

/// Per-frame bookkeeping. The frame's bytes themselves live in
/// [`FrameTable::memory`], one contiguous slab so a frame's address is
/// simply `index * PAGE_SIZE`.
#[derive(Debug, Clone)]
pub struct FrameMeta {
    pub occupant: Option<(Pid, Vpn)>,
    pub shared: bool,
    /// Number of page-table entries (across all address spaces) currently
    /// mapping this frame as shared. Zero for non-shared frames. The frame
    /// is only returned to the free pool once this drops to zero — see the
    /// "shared-memory leak" redesign flag.
    pub shared_refcount: u32,
    pub reference_bit: bool,
    pub timestamp: u64,
}

impl Default for FrameMeta {
    fn default() -> Self {
        Self {
            occupant: None,
            shared: false,
            shared_refcount: 0,
            reference_bit: false,
            timestamp: 0,
        }
    }
}

pub struct FrameTable {
    pub page_size: usize,
    memory: Vec<u8>,
    meta: Vec<FrameMeta>,
}

impl FrameTable {
    pub fn new(num_frames: usize, page_size: usize) -> Self {
        Self {
            page_size,
            memory: vec![0u8; num_frames * page_size],
            meta: vec![FrameMeta::default(); num_frames],
        }
    }

    pub fn num_frames(&self) -> usize {
        self.meta.len()
    }

    pub fn meta(&self, frame: FrameIndex) -> &FrameMeta {
        &self.meta[frame]
    }

    pub fn meta_mut(&mut self, frame: FrameIndex) -> &mut FrameMeta {
        &mut self.meta[frame]
    }

    /// The whole physical memory slab, indexable by the absolute physical
    /// address `translate()` computes (`frame * page_size + offset`).
    pub fn as_bytes(&self) -> &[u8] {
        &self.memory
    }

    pub fn bytes(&self, frame: FrameIndex) -> &[u8] {
        let start = frame * self.page_size;
        &self.memory[start..start + self.page_size]
    }

    pub fn bytes_mut(&mut self, frame: FrameIndex) -> &mut [u8] {
        let start = frame * self.page_size;
        &mut self.memory[start..start + self.page_size]
    }

    pub fn zero(&mut self, frame: FrameIndex) {
        self.bytes_mut(frame).fill(0);
    }

    pub fn copy_frame(&mut self, from: FrameIndex, to: FrameIndex) {
        let page_size = self.page_size;
        let (lo, hi) = if from < to { (from, to) } else { (to, from) };
        let split = hi * page_size;
        let (left, right) = self.memory.split_at_mut(split);
        if from < to {
            right[..page_size].copy_from_slice(&left[lo * page_size..lo * page_size + page_size]);
        } else {
            left[lo * page_size..lo * page_size + page_size].copy_from_slice(&right[..page_size]);
        }
    }

    /// First unoccupied frame, if any, used when the pool is not yet full.
    pub fn first_free(&self) -> Option<FrameIndex> {
        self.meta.iter().position(|m| m.occupant.is_none())
    }

    pub fn occupy(&mut self, frame: FrameIndex, pid: Pid, vpn: Vpn) {
        self.meta[frame].occupant = Some((pid, vpn));
    }

    pub fn clear(&mut self, frame: FrameIndex) {
        let meta = &mut self.meta[frame];
        meta.occupant = None;
        meta.shared = false;
        meta.shared_refcount = 0;
        meta.reference_bit = false;
    }

    /// A frame is eligible as an eviction victim iff it is occupied,
    /// not flagged shared, and not the caller's excluded frame.
    pub fn is_eligible_victim(&self, frame: FrameIndex, excluded: Option<FrameIndex>) -> bool {
        if Some(frame) == excluded {
            return false;
        }
        let meta = &self.meta[frame];
        meta.occupant.is_some() && !meta.shared
    }

    pub fn num_allocated(&self) -> usize {
        self.meta
            .iter()
            .filter(|m| m.occupant.is_some() && !m.shared)
            .count()
    }
}
