//! Physical frames: the coremap, the frame allocator built on it, and the
//! handles other subsystems use to refer to the page-table entries that own
//! user frames.

pub mod bootstrap;
pub mod frame_allocator;
mod frame_error;
pub mod frame_table;
#[cfg(test)]
pub(crate) mod test_util;

pub use frame_error::FrameError;

use crate::swapping::SwapSlot;
use alloc::sync::Arc;
use core::fmt;
use swapcore_shared::mem::{paddr_to_kvaddr, PAGE_FRAME_SIZE};

/// Position of a frame in the coremap. Frame `i` lives at `base + i * PAGE_FRAME_SIZE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameIndex(usize);

impl FrameIndex {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for FrameIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Who a frame is handed out to. Kernel frames are never evicted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnerKind {
    Kernel,
    User,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddressSpaceId(pub u32);

/// Names the page-table entry that maps a user frame: the address space and
/// the virtual page number within it.
///
/// This is a lookup key, not a pointer. The page-table side resolves it when
/// it is told about an eviction, and may find the entry gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PteRef {
    pub space: AddressSpaceId,
    pub vpn: usize,
}

impl PteRef {
    pub const fn new(space: AddressSpaceId, vpn: usize) -> Self {
        Self { space, vpn }
    }

    pub const fn for_vaddr(space: AddressSpaceId, vaddr: usize) -> Self {
        Self::new(space, vaddr / PAGE_FRAME_SIZE)
    }

    pub const fn vaddr(self) -> usize {
        self.vpn * PAGE_FRAME_SIZE
    }
}

/// The page-table side of eviction.
pub trait PageOwner: Send + Sync {
    /// Called once the contents of the frame mapped by `entry` are safely in
    /// swap slot `slot`, before the frame is reused. The implementation must
    /// mark the translation non-resident, remember `slot`, and invalidate any
    /// cached translation on every CPU. It is called without any frame-table
    /// lock held.
    fn on_evicted(&self, entry: PteRef, slot: SwapSlot);
}

impl<T: PageOwner + ?Sized> PageOwner for Arc<T> {
    fn on_evicted(&self, entry: PteRef, slot: SwapSlot) {
        (**self).on_evicted(entry, slot);
    }
}

/// Gives the kernel a pointer through which it can touch a physical frame.
///
/// # Safety
///
/// For every frame-aligned `paddr` managed by the allocator, `frame_ptr` must
/// return a pointer valid for reads and writes of `PAGE_FRAME_SIZE` bytes,
/// and distinct frames must not overlap.
pub unsafe trait FrameMapper: Send + Sync {
    fn frame_ptr(&self, paddr: usize) -> *mut u8;
}

unsafe impl<T: FrameMapper + ?Sized> FrameMapper for Arc<T> {
    fn frame_ptr(&self, paddr: usize) -> *mut u8 {
        (**self).frame_ptr(paddr)
    }
}

/// Physical memory mapped one-to-one at `OFFSET`, as set up by the boot
/// trampoline.
pub struct DirectMap;

unsafe impl FrameMapper for DirectMap {
    fn frame_ptr(&self, paddr: usize) -> *mut u8 {
        paddr_to_kvaddr(paddr) as *mut u8
    }
}
