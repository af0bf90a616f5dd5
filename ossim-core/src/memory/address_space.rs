//! Per-process page table, backup store, and demand-fault handling.

use crate::error::MemoryError;
use crate::machine::ExecutableSource;
use crate::memory::frame_table::{FrameTable, Vpn};
use crate::memory::{MemoryManager, FAULT_SERVICE_TICKS, PAGE_SIZE, USER_STACK_SIZE};
use crate::noff::NoffHeader;
use crate::process::table::ProcessTable;
use crate::process::Pid;

fn div_round_up(n: usize, d: usize) -> usize {
    (n + d - 1) / d
}

/// A single page-table entry.
///
/// Invariants (enforced by every mutator in this module, never by an
/// external caller poking the fields directly):
/// - `valid` implies `physical_frame.is_some()`.
/// - `shared` implies the frame is flagged shared in the frame table and is
///   never chosen as an eviction victim.
/// - On eviction, a dirty entry's bytes are flushed to backup before
///   `valid`/`physical_frame` are cleared.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageTableEntry {
    pub vpn: Vpn,
    pub physical_frame: Option<usize>,
    pub valid: bool,
    pub shared: bool,
    pub read_only: bool,
    pub dirty: bool,
    pub used: bool,
    pub backed_up: bool,
}

#[derive(Debug, Clone)]
pub struct AddressSpace {
    pub owner: Pid,
    pub executable_path: String,
    pub noff: NoffHeader,
    pub num_virtual_pages: usize,
    pub page_table: Vec<PageTableEntry>,
    pub backup: Vec<u8>,
}

impl AddressSpace {
    /// Builds the address space for a freshly-loaded executable. No
    /// physical frames are taken eagerly — every page starts invalid and
    /// will demand-fault in.
    pub fn from_executable(owner: Pid, path: &str, noff: NoffHeader) -> Self {
        let size = noff.total_size() as usize + USER_STACK_SIZE;
        let num_virtual_pages = div_round_up(size, PAGE_SIZE);
        let backup_len = num_virtual_pages * PAGE_SIZE;
        let page_table = (0..num_virtual_pages)
            .map(|vpn| PageTableEntry {
                vpn: vpn as Vpn,
                ..Default::default()
            })
            .collect();

        Self {
            owner,
            executable_path: path.to_string(),
            noff,
            num_virtual_pages,
            page_table,
            backup: vec![0u8; backup_len],
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.num_virtual_pages * PAGE_SIZE
    }

    /// Top of the user stack, leaving 16 bytes of slack per the classic
    /// convention of never letting the stack pointer reference off the end.
    pub fn stack_top(&self) -> u32 {
        self.size_bytes() as u32 - 16
    }

    pub fn vpn_of(vaddr: usize) -> Vpn {
        (vaddr / PAGE_SIZE) as Vpn
    }

    /// Translates a virtual address to a physical one, or `None` if the
    /// containing page is not currently resident (the caller decides
    /// whether that means "fault it in" or "this is an error").
    pub fn translate(&self, vaddr: usize) -> Option<usize> {
        let vpn = Self::vpn_of(vaddr) as usize;
        let entry = self.page_table.get(vpn)?;
        if !entry.valid {
            return None;
        }
        let frame = entry.physical_frame?;
        Some(frame * PAGE_SIZE + vaddr % PAGE_SIZE)
    }

    /// Called by the replacer before a frame is stolen from this address
    /// space: if dirty, flush to backup; always clear residency.
    pub fn take_backup(&mut self, vpn: Vpn, frame_table: &FrameTable) {
        let entry = &mut self.page_table[vpn as usize];
        if entry.dirty {
            if let Some(frame) = entry.physical_frame {
                let start = vpn as usize * PAGE_SIZE;
                self.backup[start..start + PAGE_SIZE].copy_from_slice(frame_table.bytes(frame));
            }
            entry.dirty = false;
        }
        entry.valid = false;
        entry.physical_frame = None;
        entry.backed_up = true;
    }

    /// Services a demand-page fault at `vaddr`: obtains a frame (forcing
    /// replacement if the pool is full), fills it from backup or from the
    /// executable image, and marks the entry resident. Returns the number
    /// of ticks the faulting thread should sleep to model paging latency.
    pub fn fix_fault(
        &mut self,
        memory: &mut MemoryManager,
        process_table: &mut ProcessTable,
        exec: &dyn ExecutableSource,
        vaddr: usize,
        now: u64,
    ) -> Result<u64, MemoryError> {
        if vaddr >= self.size_bytes() {
            return Err(MemoryError::AddressOutOfRange(vaddr));
        }
        let vpn = Self::vpn_of(vaddr);
        let must_replace = memory.frame_table.first_free().is_none();
        let owner = self.owner;
        let frame = memory.obtain_frame(
            process_table,
            owner,
            vpn,
            must_replace,
            None,
            Some((owner, &mut *self)),
            now,
        )?;
        memory.frame_table.zero(frame);

        let entry = &mut self.page_table[vpn as usize];
        if entry.backed_up {
            let start = vpn as usize * PAGE_SIZE;
            memory
                .frame_table
                .bytes_mut(frame)
                .copy_from_slice(&self.backup[start..start + PAGE_SIZE]);
        } else {
            let offset = self.noff.code.in_file_addr + vpn * PAGE_SIZE as u32;
            let bytes = exec
                .read_at(&self.executable_path, offset, PAGE_SIZE)
                .map_err(|_| MemoryError::UnopenableExecutable(self.executable_path.clone()))?;
            let dst = memory.frame_table.bytes_mut(frame);
            let n = bytes.len().min(dst.len());
            dst[..n].copy_from_slice(&bytes[..n]);
            entry.dirty = true;
        }

        entry.valid = true;
        entry.backed_up = true;
        entry.physical_frame = Some(frame);
        crate::debug!(
            crate::logging::DebugMask::ADDRESS_SPACE,
            "pid {} faulted vpn {vpn} into frame {frame}",
            self.owner
        );
        Ok(FAULT_SERVICE_TICKS)
    }

    /// Duplicates this address space for `Fork`. Shared entries are copied
    /// verbatim (refcounted); valid non-shared entries get a fresh frame,
    /// excluding the parent's own frame from victim selection so both
    /// copies coexist during the memcpy; invalid entries stay invalid, and
    /// the whole backup buffer is copied so their eventual fault sees the
    /// parent's contents.
    pub fn fork_duplicate(
        &mut self,
        memory: &mut MemoryManager,
        process_table: &mut ProcessTable,
        child_pid: Pid,
        now: u64,
    ) -> Result<AddressSpace, MemoryError> {
        let mut child = AddressSpace {
            owner: child_pid,
            executable_path: self.executable_path.clone(),
            noff: self.noff,
            num_virtual_pages: self.num_virtual_pages,
            page_table: vec![PageTableEntry::default(); self.num_virtual_pages],
            backup: self.backup.clone(),
        };

        // A full frame pool may force eviction of one of the parent's *own*
        // other pages while duplicating this one (the parent's
        // `AddressSpace` is taken out of the process table for the duration
        // of `Kernel::fork`, per the "deep pointer aliasing" design note).
        // Each entry is read fresh (not snapshotted) so that if an earlier
        // iteration's eviction already invalidated a later vpn, this loop
        // sees that and leaves the child's entry correctly invalid rather
        // than duplicating a frame that no longer holds that vpn's data.
        let parent_owner = self.owner;

        for vpn in 0..self.num_virtual_pages {
            let parent_entry = self.page_table[vpn];
            let mut child_entry = PageTableEntry {
                vpn: vpn as Vpn,
                read_only: parent_entry.read_only,
                backed_up: parent_entry.backed_up,
                ..Default::default()
            };

            if parent_entry.shared {
                child_entry.shared = true;
                child_entry.valid = parent_entry.valid;
                child_entry.physical_frame = parent_entry.physical_frame;
                if let Some(frame) = parent_entry.physical_frame {
                    memory.frame_table.meta_mut(frame).shared_refcount += 1;
                }
            } else if parent_entry.valid {
                let parent_frame = parent_entry
                    .physical_frame
                    .expect("valid entry always has a frame");
                let must_replace = memory.frame_table.first_free().is_none();
                let child_frame = memory.obtain_frame(
                    process_table,
                    child_pid,
                    vpn as Vpn,
                    must_replace,
                    Some(parent_frame),
                    Some((parent_owner, &mut *self)),
                    now,
                )?;
                memory.frame_table.copy_frame(parent_frame, child_frame);
                child_entry.valid = true;
                child_entry.dirty = parent_entry.dirty;
                child_entry.physical_frame = Some(child_frame);
            }

            child.page_table[vpn] = child_entry;
        }

        Ok(child)
    }

    /// Extends the page table by `ceil(bytes / PAGE_SIZE)` shared, valid
    /// entries, each backed by a fresh zeroed frame, and returns the virtual
    /// address the new region starts at.
    pub fn grow_shared(
        &mut self,
        memory: &mut MemoryManager,
        process_table: &mut ProcessTable,
        bytes: usize,
        now: u64,
    ) -> Result<usize, MemoryError> {
        let old_num_pages = self.num_virtual_pages;
        let base = old_num_pages * PAGE_SIZE;
        let extra_pages = div_round_up(bytes, PAGE_SIZE);

        let owner = self.owner;
        for i in 0..extra_pages {
            let vpn = (old_num_pages + i) as Vpn;
            let must_replace = memory.frame_table.first_free().is_none();
            let frame = memory.obtain_frame(
                process_table,
                owner,
                vpn,
                must_replace,
                None,
                Some((owner, &mut *self)),
                now,
            )?;
            memory.frame_table.zero(frame);
            let meta = memory.frame_table.meta_mut(frame);
            meta.shared = true;
            meta.shared_refcount = 1;

            self.page_table.push(PageTableEntry {
                vpn,
                physical_frame: Some(frame),
                valid: true,
                shared: true,
                backed_up: true,
                ..Default::default()
            });
        }

        self.num_virtual_pages += extra_pages;
        self.backup.resize(self.num_virtual_pages * PAGE_SIZE, 0);
        Ok(base)
    }

    /// Releases every valid non-shared frame (and decrements refcounts on
    /// shared ones) back to the pool. Called on `Exit` and before `Exec`
    /// rebuilds the address space in place.
    pub fn destroy(&mut self, memory: &mut MemoryManager) {
        for entry in &mut self.page_table {
            if entry.valid {
                if let Some(frame) = entry.physical_frame {
                    memory.release_frame(frame);
                }
                entry.valid = false;
                entry.physical_frame = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::replacer::{PageReplacer, ReplacementPolicy};
    use crate::noff::{NoffHeader, Segment};
    use crate::process::table::ProcessTable;

    struct FixedExecutable(Vec<u8>);
    impl ExecutableSource for FixedExecutable {
        fn open(&self, _path: &str) -> Result<(), MemoryError> {
            Ok(())
        }
        fn read_at(&self, _path: &str, offset: u32, len: usize) -> Result<Vec<u8>, MemoryError> {
            let offset = offset as usize;
            let mut buf = vec![0u8; len];
            for (i, b) in buf.iter_mut().enumerate() {
                let src = offset + i;
                *b = self.0.get(src).copied().unwrap_or(0);
            }
            Ok(buf)
        }
    }

    fn noff(code_size: u32) -> NoffHeader {
        NoffHeader {
            code: Segment {
                virtual_addr: 0,
                in_file_addr: 0,
                size: code_size,
            },
            init_data: Segment::default(),
            uninit_data: Segment::default(),
        }
    }

    #[test]
    fn evict_dirty_then_fault_back_reproduces_bytes() {
        // Mirrors `Kernel::fix_fault`: `process_table`'s record for `pid`
        // never holds an `AddressSpace` here, exactly like the real thread
        // record during the call (`Kernel::fix_fault` takes it out for the
        // duration). With a single physical frame, the second fault below
        // evicts a page owned by this very `pid` — the case that used to
        // slip past `take_backup` when eviction only looked the occupant up
        // through `process_table`.
        let mut process_table = ProcessTable::new();
        let pid = process_table.allocate("prog".into(), None, 100, 0);
        let mut space = AddressSpace::from_executable(pid, "prog", noff(256));
        let mut memory = MemoryManager::new(1, PageReplacer::new(ReplacementPolicy::Random, 1));
        let exec = FixedExecutable((0..256).map(|i| i as u8).collect());

        space
            .fix_fault(&mut memory, &mut process_table, &exec, 0, 1)
            .unwrap();
        memory.frame_table.bytes_mut(0)[3] = 0xAB;
        space.page_table[0].dirty = true;

        // Evict by forcing a second page into the single-frame pool.
        space
            .fix_fault(&mut memory, &mut process_table, &exec, PAGE_SIZE, 2)
            .unwrap();
        assert!(!space.page_table[0].valid);

        space
            .fix_fault(&mut memory, &mut process_table, &exec, 0, 3)
            .unwrap();
        let frame = space.page_table[0].physical_frame.unwrap();
        assert_eq!(memory.frame_table.bytes(frame)[3], 0xAB);
    }

    #[test]
    fn fork_then_child_exit_parent_join_returns_status() {
        // Address-space duplication itself: verify the child's invalid
        // entries share the parent's backup bytes and valid entries get a
        // distinct, independently-written frame.
        let mut process_table = ProcessTable::new();
        let parent_pid = process_table.allocate("parent".into(), None, 100, 0);
        let mut parent_space = AddressSpace::from_executable(parent_pid, "prog", noff(128));
        let mut memory = MemoryManager::new(4, PageReplacer::new(ReplacementPolicy::Random, 1));
        let exec = FixedExecutable(vec![7u8; 128]);
        parent_space
            .fix_fault(&mut memory, &mut process_table, &exec, 0, 1)
            .unwrap();

        let child_pid = process_table.allocate("child".into(), Some(parent_pid), 100, 0);
        let child_space = parent_space
            .fork_duplicate(&mut memory, &mut process_table, child_pid, 2)
            .unwrap();

        let parent_frame = parent_space.page_table[0].physical_frame.unwrap();
        let child_frame = child_space.page_table[0].physical_frame.unwrap();
        assert_ne!(parent_frame, child_frame);
        assert_eq!(
            memory.frame_table.bytes(parent_frame),
            memory.frame_table.bytes(child_frame)
        );
    }

    #[test]
    fn grow_shared_returns_old_size_and_maps_fresh_zeroed_frames() {
        let mut process_table = ProcessTable::new();
        let pid = process_table.allocate("prog".into(), None, 100, 0);
        let mut space = AddressSpace::from_executable(pid, "prog", noff(0));
        let mut memory = MemoryManager::new(8, PageReplacer::new(ReplacementPolicy::Random, 1));
        let old_size = space.size_bytes();

        let base = space
            .grow_shared(&mut memory, &mut process_table, PAGE_SIZE + 1, 5)
            .unwrap();
        assert_eq!(base, old_size);
        assert_eq!(space.num_virtual_pages, old_size / PAGE_SIZE + 2);
        let last = space.page_table.last().unwrap();
        assert!(last.shared && last.valid);
    }
}
