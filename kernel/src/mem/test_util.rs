//! Stand-ins for physical memory and the page tables, for unit tests.

use super::frame_table::CoreMapEntry;
use super::{FrameMapper, PageOwner, PteRef};
use crate::swapping::SwapSlot;
use crate::sync::mutex::Mutex;
use std::collections::BTreeMap;
use std::vec;
use std::vec::Vec;
use swapcore_shared::mem::PAGE_FRAME_SIZE;
use swapcore_shared::paging::PageTableEntry;

#[repr(C, align(4096))]
#[derive(Clone, Copy)]
struct Page([u8; PAGE_FRAME_SIZE]);

/// Fresh descriptors for a coremap of `frames` frames. Leaked, like the
/// real coremap.
pub fn leak_entries(frames: usize) -> &'static mut [CoreMapEntry] {
    vec![CoreMapEntry::FREE; frames].leak()
}

/// Heap memory posing as the physical frames `base..base + frames * PAGE_FRAME_SIZE`.
pub struct PhysArena {
    base: usize,
    frames: usize,
    memory: *mut Page,
}

// SAFETY: the arena is leaked, and callers coordinate access to frames the
// same way they would for real memory.
unsafe impl Send for PhysArena {}
unsafe impl Sync for PhysArena {}

impl PhysArena {
    pub fn new(base: usize, frames: usize) -> Self {
        let memory = vec![Page([0; PAGE_FRAME_SIZE]); frames].leak();
        Self {
            base,
            frames,
            memory: memory.as_mut_ptr(),
        }
    }

    pub fn fill(&self, paddr: usize, byte: u8) {
        // SAFETY: `frame_ptr` points at a whole frame of the arena.
        unsafe { self.frame_ptr(paddr).write_bytes(byte, PAGE_FRAME_SIZE) }
    }

    pub fn contents(&self, paddr: usize) -> Vec<u8> {
        // SAFETY: as in `fill`.
        unsafe { core::slice::from_raw_parts(self.frame_ptr(paddr), PAGE_FRAME_SIZE) }.to_vec()
    }
}

unsafe impl FrameMapper for PhysArena {
    fn frame_ptr(&self, paddr: usize) -> *mut u8 {
        let frame = paddr
            .checked_sub(self.base)
            .filter(|offset| offset % PAGE_FRAME_SIZE == 0)
            .map(|offset| offset / PAGE_FRAME_SIZE)
            .filter(|&frame| frame < self.frames);
        let Some(frame) = frame else {
            panic!("{paddr:#x} is not a frame of the arena");
        };
        // SAFETY: `frame` is in bounds of the leaked allocation.
        unsafe { self.memory.add(frame).cast::<u8>() }
    }
}

/// A page table reduced to a map from page to entry, recording what the
/// frame allocator tells it about evictions.
#[derive(Default)]
pub struct RecordingPager {
    entries: Mutex<BTreeMap<PteRef, PageTableEntry>>,
    evictions: Mutex<Vec<(PteRef, SwapSlot)>>,
}

impl RecordingPager {
    pub fn map(&self, page: PteRef, paddr: usize) {
        let Some(entry) = PageTableEntry::user_mapping(paddr) else {
            panic!("{paddr:#x} does not fit in a page-table entry");
        };
        self.entries.lock().insert(page, entry);
    }

    pub fn entry(&self, page: PteRef) -> Option<PageTableEntry> {
        self.entries.lock().get(&page).copied()
    }

    pub fn evictions(&self) -> Vec<(PteRef, SwapSlot)> {
        self.evictions.lock().clone()
    }
}

impl PageOwner for RecordingPager {
    fn on_evicted(&self, page: PteRef, slot: SwapSlot) {
        if let Some(entry) = self.entries.lock().get_mut(&page) {
            if let Some(swapped) = entry.swapped_out(slot.get()) {
                *entry = swapped;
            }
        }
        self.evictions.lock().push((page, slot));
    }
}
