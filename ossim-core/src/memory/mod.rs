pub mod address_space;
pub mod frame_table;
pub mod replacer;

pub use address_space::{AddressSpace, PageTableEntry};
pub use frame_table::{FrameIndex, FrameTable, Vpn};
pub use replacer::{PageReplacer, ReplacementPolicy};

use crate::error::MemoryError;
use crate::process::table::ProcessTable;
use crate::process::Pid;

/// Historical NachOS page size: small enough that a modest test program
/// demand-faults many pages, which is the point of a teaching simulator.
pub const PAGE_SIZE: usize = 128;
pub const USER_STACK_SIZE: usize = 1024;
/// Ticks the faulting thread sleeps to model paging I/O latency.
pub const FAULT_SERVICE_TICKS: u64 = 50;

/// The facade tying [`FrameTable`] and [`PageReplacer`] together: the only
/// thing address spaces talk to when they need a physical frame. Eviction
/// needs to reach into the *other* process's [`AddressSpace`] to flush
/// dirty bytes to backup before the frame is reused, so `obtain_frame`
/// takes the process table as well — this is the cross-subsystem
/// coordination the specification calls out in section 2.
pub struct MemoryManager {
    pub frame_table: FrameTable,
    pub replacer: PageReplacer,
}

impl MemoryManager {
    pub fn new(num_frames: usize, replacer: PageReplacer) -> Self {
        Self {
            frame_table: FrameTable::new(num_frames, PAGE_SIZE),
            replacer,
        }
    }

    /// The whole physical memory slab, for syscalls that need to read a
    /// byte string out of user memory via a translated physical address.
    pub fn frame_table_bytes(&self) -> &[u8] {
        self.frame_table.as_bytes()
    }

    /// Obtains a physical frame for `(pid, vpn)`. If `must_replace` is
    /// false and a free frame exists, hands that out. Otherwise selects and
    /// evicts a victim (flushing its dirty bytes to the owning process's
    /// backup store first), excluding `excluded` (the caller's own frame,
    /// used during fork so parent and child coexist during the copy).
    ///
    /// `detached_owner` names the `AddressSpace` the caller is *currently
    /// operating on but has removed from `process_table`* (`Kernel::fix_fault`
    /// and `AddressSpace::fork_duplicate` both take a thread's space out of
    /// the table for the duration of the call). When the eviction victim
    /// belongs to that same pid, `process_table.get_mut(occupant_pid)` would
    /// find the thread but see `address_space == None` and silently skip the
    /// backup flush — so the victim's own page table is reached directly
    /// through `detached_owner` instead in that case.
    pub fn obtain_frame(
        &mut self,
        process_table: &mut ProcessTable,
        requesting_pid: Pid,
        vpn: Vpn,
        must_replace: bool,
        excluded: Option<FrameIndex>,
        detached_owner: Option<(Pid, &mut AddressSpace)>,
        now: u64,
    ) -> Result<FrameIndex, MemoryError> {
        if !must_replace {
            if let Some(frame) = self.frame_table.first_free() {
                self.replacer.on_allocate(&mut self.frame_table, frame, now);
                self.frame_table.occupy(frame, requesting_pid, vpn);
                return Ok(frame);
            }
        }

        if !self.replacer.replacement_enabled() {
            return Err(MemoryError::FramePoolExhausted);
        }

        let victim = self
            .replacer
            .pick_victim(&mut self.frame_table, excluded)
            .ok_or(MemoryError::FramePoolExhausted)?;

        if let Some((occupant_pid, occupant_vpn)) = self.frame_table.meta(victim).occupant {
            if !self.frame_table.meta(victim).shared {
                match detached_owner {
                    Some((owner_pid, owner_space)) if owner_pid == occupant_pid => {
                        owner_space.take_backup(occupant_vpn, &self.frame_table);
                    }
                    _ => {
                        if let Some(thread) = process_table.get_mut(occupant_pid) {
                            if let Some(space) = thread.address_space.as_mut() {
                                space.take_backup(occupant_vpn, &self.frame_table);
                            }
                        }
                    }
                }
            }
        }

        self.frame_table.clear(victim);
        self.frame_table.occupy(victim, requesting_pid, vpn);
        self.replacer
            .on_frame_installed(&mut self.frame_table, victim, excluded, now);
        Ok(victim)
    }

    /// Releases a frame back to the free pool, decrementing the shared
    /// refcount first if the frame is shared.
    pub fn release_frame(&mut self, frame: FrameIndex) {
        let meta = self.frame_table.meta_mut(frame);
        if meta.shared {
            meta.shared_refcount = meta.shared_refcount.saturating_sub(1);
            if meta.shared_refcount > 0 {
                return;
            }
        }
        self.frame_table.clear(frame);
    }
}
