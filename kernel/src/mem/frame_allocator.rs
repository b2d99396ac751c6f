//! Hands out runs of physical frames. When no run is free, the oldest user
//! frame is written to swap and its frame reused.

pub mod placement_algorithms;

use super::bootstrap::BootstrapAllocator;
use super::frame_table::{CoreMap, FrameOwner, FrameStats, FrameTable, Release};
use super::{AddressSpaceId, FrameError, FrameIndex, FrameMapper, OwnerKind, PageOwner, PteRef};
use crate::block::Block;
use crate::config::MemoryConfig;
use crate::swapping::page_replacement::{FifoReplacement, PageReplacementPolicy};
use crate::swapping::{EvictError, SwapError, SwapSlot, SwapSpace};
use alloc::boxed::Box;
use arbitrary_int::u6;
use core::slice;
use core::sync::atomic::{AtomicUsize, Ordering};
use log::{debug, info, trace, warn};
use swapcore_shared::mem::{kvaddr_to_paddr, paddr_to_kvaddr, PAGE_FRAME_SIZE};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub frames: FrameStats,
    pub swap_slots: usize,
    pub swap_used: usize,
    pub evictions: usize,
    pub restores: usize,
}

/// What [`FrameAllocator::release_owner`] gave back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Teardown {
    pub frames: usize,
    pub slots: usize,
}

pub struct FrameAllocator {
    frames: FrameTable,
    swap: SwapSpace,
    replacement: FifoReplacement,
    mapper: Box<dyn FrameMapper>,
    pager: Box<dyn PageOwner>,
    evictions: AtomicUsize,
    restores: AtomicUsize,
}

impl FrameAllocator {
    pub fn new(
        frames: FrameTable,
        swap: SwapSpace,
        mapper: Box<dyn FrameMapper>,
        pager: Box<dyn PageOwner>,
    ) -> Self {
        Self {
            frames,
            swap,
            replacement: FifoReplacement,
            mapper,
            pager,
            evictions: AtomicUsize::new(0),
            restores: AtomicUsize::new(0),
        }
    }

    /// Builds the memory system over `config.first_free..config.ram_end`,
    /// with `swap_block` as backing store. `pager` is told about every
    /// eviction.
    pub fn bootstrap(
        config: &MemoryConfig,
        mapper: Box<dyn FrameMapper>,
        swap_block: Block,
        pager: Box<dyn PageOwner>,
    ) -> Result<Self, FrameError> {
        let mut boot = BootstrapAllocator::new(config.first_free, config.ram_end);
        let frames = FrameTable::bootstrap(&mut boot, mapper.as_ref(), config.placement)?;
        let swap = SwapSpace::new(swap_block, &config.swap);

        info!(
            "memory: {} frames, {} swap slots, {:?} placement",
            frames.len(),
            swap.capacity(),
            config.placement
        );
        Ok(Self::new(frames, swap, mapper, pager))
    }

    fn request_owner(
        kind: OwnerKind,
        count: usize,
        owning_entry: Option<PteRef>,
    ) -> Result<FrameOwner, FrameError> {
        if count == 0 {
            return Err(FrameError::InvalidArgument("zero frames requested"));
        }
        match (kind, owning_entry) {
            (OwnerKind::Kernel, None) => Ok(FrameOwner::Kernel),
            (OwnerKind::Kernel, Some(_)) => Err(FrameError::InvalidArgument(
                "kernel frames have no owning entry",
            )),
            (OwnerKind::User, None) => Err(FrameError::InvalidArgument(
                "user frames need an owning entry",
            )),
            (OwnerKind::User, Some(_)) if count != 1 => Err(FrameError::InvalidArgument(
                "user frames are allocated one at a time",
            )),
            (OwnerKind::User, Some(entry)) => Ok(FrameOwner::User(entry)),
        }
    }

    /// Allocates `count` contiguous frames and returns the physical address
    /// of the first. User frames come one at a time and must name the
    /// page-table entry that will map them.
    pub fn alloc_frame(
        &self,
        kind: OwnerKind,
        count: usize,
        owning_entry: Option<PteRef>,
    ) -> Result<usize, FrameError> {
        let owner = Self::request_owner(kind, count, owning_entry)?;
        let idx = self.claim_or_evict(count, |core_map| core_map.claim(owner, count))?;
        let paddr = self.frames.address_of(idx);
        trace!("allocated {count} {kind:?} frame(s) at {paddr:#x}");
        Ok(paddr)
    }

    /// Runs `claim` under the table lock. If it finds nothing, evicts one
    /// frame with the lock dropped and tries exactly once more.
    fn claim_or_evict<F>(&self, count: usize, claim: F) -> Result<FrameIndex, FrameError>
    where
        F: Fn(&mut CoreMap) -> Option<FrameIndex>,
    {
        if count > self.frames.len() {
            return Err(FrameError::OutOfMemory);
        }

        let claimed = claim(&mut *self.frames.lock());
        if let Some(idx) = claimed {
            return Ok(idx);
        }

        match self.evict_one() {
            Ok(_) => {}
            Err(EvictError::NoVictim) => return Err(FrameError::OutOfMemory),
            Err(err) => return Err(FrameError::EvictionFailed(err)),
        }

        let claimed = claim(&mut *self.frames.lock());
        claimed.ok_or(FrameError::OutOfMemory)
    }

    /// Frees the run of frames starting at `paddr`.
    pub fn free_frame(&self, paddr: usize) -> Result<(), FrameError> {
        let idx = self.frames.index_of(paddr)?;
        let released = self.frames.lock().release(idx)?;
        match released {
            Release::Freed(count) => trace!("freed {count} frame(s) at {paddr:#x}"),
            Release::Deferred => debug!("frame {paddr:#x} freed while in transit, release deferred"),
        }
        Ok(())
    }

    /// Writes the oldest user frame out to swap and frees it. The owner is
    /// told where its page went before the frame becomes reusable.
    ///
    /// On failure the frame goes back to the front of the chain and any slot
    /// reserved for it is released. If the owner's address space is torn
    /// down during the write, the frame and slot are both freed and the
    /// owner is not told.
    pub fn evict_one(&self) -> Result<(FrameIndex, SwapSlot), EvictError> {
        let (victim, page) = self.replacement.select_victim(&mut self.frames.lock())?;
        let paddr = self.frames.address_of(victim);

        let slot = match self.swap.reserve_slot(page) {
            Ok(slot) => slot,
            Err(err) => {
                warn!("cannot evict frame {paddr:#x}: {err}");
                self.abort_eviction(victim);
                return Err(err.into());
            }
        };

        // SAFETY: the victim stays allocated while it is evicting, so its
        // memory is not handed to anyone else under us.
        let frame = unsafe { slice::from_raw_parts(self.mapper.frame_ptr(paddr), PAGE_FRAME_SIZE) };
        if let Err(err) = self.swap.write_block(slot, frame) {
            warn!("cannot write frame {paddr:#x} to swap slot {slot}: {err}");
            self.swap.release_slot_if_owned(slot, page);
            self.abort_eviction(victim);
            return Err(err.into());
        }

        let live = self.swap.settle_slot(slot, page);
        let orphaned = self.frames.lock().entry(victim).is_orphaned();
        if !live || orphaned {
            self.frames.lock().finish_eviction(victim);
            self.swap.release_slot_if_owned(slot, page);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!("evicted frame {victim} ({paddr:#x}) of released {page:?}");
            return Ok((victim, slot));
        }

        self.pager.on_evicted(page, slot);

        let orphaned = self.frames.lock().finish_eviction(victim);
        if orphaned {
            // Nobody is left to restore the page.
            self.swap.release_slot_if_owned(slot, page);
        }
        self.evictions.fetch_add(1, Ordering::Relaxed);
        debug!("evicted frame {victim} ({paddr:#x}) of {page:?} to swap slot {slot}");
        Ok((victim, slot))
    }

    fn abort_eviction(&self, victim: FrameIndex) {
        let requeued = self.frames.lock().abort_eviction(victim);
        if !requeued {
            debug!("frame {victim} was freed by its owner during a failed eviction");
        }
    }

    /// Copies swap slot `slot` into the frame at `paddr` and releases the
    /// slot. The slot is kept if the copy fails.
    pub fn restore(&self, slot: SwapSlot, paddr: usize) -> Result<(), SwapError> {
        self.frames
            .index_of(paddr)
            .map_err(|_| SwapError::InvalidFrame(paddr))?;
        if !self.swap.is_reserved(slot) {
            return Err(SwapError::InvalidSlot(slot.get()));
        }

        self.read_slot(slot, paddr)?;
        self.swap.release_slot(slot)?;
        self.restores.fetch_add(1, Ordering::Relaxed);
        debug!("restored swap slot {slot} into {paddr:#x}");
        Ok(())
    }

    /// Reads `slot` into the frame at `paddr`, then scrubs the slot if
    /// configured to.
    fn read_slot(&self, slot: SwapSlot, paddr: usize) -> Result<(), SwapError> {
        // SAFETY: the caller owns the destination frame and has not mapped
        // it anywhere yet.
        let frame =
            unsafe { slice::from_raw_parts_mut(self.mapper.frame_ptr(paddr), PAGE_FRAME_SIZE) };
        if let Err(err) = self.swap.read_block(slot, frame) {
            warn!("cannot read swap slot {slot} into {paddr:#x}: {err}");
            return Err(err);
        }

        if self.swap.scrub_on_restore() {
            if let Err(err) = self.swap.scrub_block(slot) {
                warn!("cannot scrub swap slot {slot}: {err}");
            }
        }
        Ok(())
    }

    /// Brings `page` back from `slot` into a fresh user frame and returns
    /// its physical address. The frame joins the chain only once it is
    /// filled. The slot stays busy for the whole copy, so a teardown of the
    /// page's address space cannot hand it to anyone else.
    pub fn swap_in_page(&self, page: PteRef, slot: SwapSlot) -> Result<usize, FrameError> {
        if !self.swap.hold_slot(slot, page) {
            return Err(FrameError::RestoreFailed(SwapError::InvalidSlot(slot.get())));
        }

        let idx = match self.claim_or_evict(1, |core_map| core_map.claim_pinned(page)) {
            Ok(idx) => idx,
            Err(err) => {
                self.swap.settle_slot(slot, page);
                return Err(err);
            }
        };
        let paddr = self.frames.address_of(idx);

        if let Err(err) = self.read_slot(slot, paddr) {
            self.frames.lock().discard_pinned(idx);
            self.swap.settle_slot(slot, page);
            return Err(FrameError::RestoreFailed(err));
        }
        self.swap.release_slot_if_owned(slot, page);
        self.restores.fetch_add(1, Ordering::Relaxed);
        debug!("restored swap slot {slot} into {paddr:#x} for {page:?}");

        if self.frames.lock().unpin(idx) {
            Ok(paddr)
        } else {
            Err(FrameError::OwnerReleased)
        }
    }

    /// Frees every frame and swap slot held for pages of `space`.
    pub fn release_owner(&self, space: AddressSpaceId) -> Teardown {
        let frames = self.frames.lock().release_owned_by(space);
        let slots = self.swap.release_owned_by(space);
        debug!("released {frames} frame(s) and {slots} swap slot(s) of {space:?}");
        Teardown { frames, slots }
    }

    /// Allocates `pages` contiguous kernel frames and returns their address
    /// in the kernel's direct map.
    pub fn alloc_kpages(&self, pages: usize) -> Result<usize, FrameError> {
        self.alloc_frame(OwnerKind::Kernel, pages, None)
            .map(paddr_to_kvaddr)
    }

    pub fn free_kpages(&self, kvaddr: usize) -> Result<(), FrameError> {
        let paddr = kvaddr_to_paddr(kvaddr).ok_or(FrameError::InvalidAddress(kvaddr))?;
        self.free_frame(paddr)
    }

    /// Remembers which TLB slot last held a translation to the frame at
    /// `paddr`. Forgotten when the frame is freed.
    pub fn record_translation_slot(&self, paddr: usize, slot: Option<u6>) -> Result<(), FrameError> {
        let idx = self.frames.index_of(paddr)?;
        self.frames.lock().set_translation_slot(idx, slot)
    }

    pub fn translation_slot(&self, paddr: usize) -> Result<Option<u6>, FrameError> {
        let idx = self.frames.index_of(paddr)?;
        let core_map = self.frames.lock();
        let entry = core_map.entry(idx);
        if !entry.is_allocated() {
            return Err(FrameError::InvalidAddress(paddr));
        }
        Ok(entry.translation_slot())
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn swap(&self) -> &SwapSpace {
        &self.swap
    }

    pub fn stats(&self) -> MemoryStats {
        let frames = self.frames.lock().stats();
        MemoryStats {
            frames,
            swap_slots: self.swap.capacity(),
            swap_used: self.swap.used(),
            evictions: self.evictions.load(Ordering::Relaxed),
            restores: self.restores.load(Ordering::Relaxed),
        }
    }

    /// Checks the coremap's chain against its descriptors.
    pub fn verify(&self) -> Result<(), &'static str> {
        self.frames.lock().verify()
    }
}
