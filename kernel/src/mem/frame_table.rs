//! The coremap: one descriptor per physical frame, plus the chain that
//! orders resident user frames by allocation time.

use super::bootstrap::BootstrapAllocator;
use super::frame_allocator::placement_algorithms::{self, PlacementAlgorithm};
use super::{FrameError, FrameIndex, FrameMapper, OwnerKind, PteRef};
use crate::config::PlacementPolicy;
use crate::sync::irq::{MutexGuardIrq, MutexIrq};
use alloc::boxed::Box;
use arbitrary_int::u6;
use bitbybit::bitfield;
use core::{fmt, iter, mem::size_of, slice};
use swapcore_shared::mem::{frames_for, is_frame_aligned, PAGE_FRAME_SIZE};

#[bitfield(u8, default = 0)]
struct FrameFlags {
    #[bit(0, rw)]
    allocated: bool,
    #[bit(1, rw)]
    user: bool,
    /// The next frame belongs to the same kernel run.
    #[bit(2, rw)]
    contiguous_tail: bool,
    /// Taken off the chain by the eviction selector; its contents are on the
    /// way to swap.
    #[bit(3, rw)]
    evicting: bool,
    /// Freed by its owner while evicting or pinned. Whoever holds the frame
    /// finishes the release.
    #[bit(4, rw)]
    orphaned: bool,
    /// A user frame that is not yet on the chain because a page-in is still
    /// filling it.
    #[bit(5, rw)]
    pinned: bool,
}

/// Descriptor of a single physical frame.
#[derive(Clone, Copy)]
pub struct CoreMapEntry {
    flags: FrameFlags,
    owning_entry: Option<PteRef>,
    chain_prev: Option<FrameIndex>,
    chain_next: Option<FrameIndex>,
    translation_slot: Option<u6>,
}

impl CoreMapEntry {
    pub const FREE: Self = Self {
        flags: FrameFlags::DEFAULT,
        owning_entry: None,
        chain_prev: None,
        chain_next: None,
        translation_slot: None,
    };

    fn claimed(owner: FrameOwner, contiguous_tail: bool, pinned: bool) -> Self {
        let flags = FrameFlags::DEFAULT
            .with_allocated(true)
            .with_user(owner.kind() == OwnerKind::User)
            .with_contiguous_tail(contiguous_tail)
            .with_pinned(pinned);
        Self {
            flags,
            owning_entry: owner.entry(),
            ..Self::FREE
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.flags.allocated()
    }

    pub fn owner_kind(&self) -> Option<OwnerKind> {
        match (self.flags.allocated(), self.flags.user()) {
            (false, _) => None,
            (true, false) => Some(OwnerKind::Kernel),
            (true, true) => Some(OwnerKind::User),
        }
    }

    pub fn owning_entry(&self) -> Option<PteRef> {
        self.owning_entry
    }

    pub fn has_contiguous_tail(&self) -> bool {
        self.flags.contiguous_tail()
    }

    pub fn is_evicting(&self) -> bool {
        self.flags.evicting()
    }

    pub fn is_orphaned(&self) -> bool {
        self.flags.orphaned()
    }

    pub fn is_pinned(&self) -> bool {
        self.flags.pinned()
    }

    pub fn chain_prev(&self) -> Option<FrameIndex> {
        self.chain_prev
    }

    pub fn chain_next(&self) -> Option<FrameIndex> {
        self.chain_next
    }

    pub fn translation_slot(&self) -> Option<u6> {
        self.translation_slot
    }

    /// Allocated user frames that may sit on the chain.
    fn is_chainable(&self) -> bool {
        self.owner_kind() == Some(OwnerKind::User) && !self.is_evicting() && !self.is_pinned()
    }

    #[cfg(test)]
    pub(crate) fn kernel_frame(contiguous_tail: bool) -> Self {
        Self::claimed(FrameOwner::Kernel, contiguous_tail, false)
    }
}

impl Default for CoreMapEntry {
    fn default() -> Self {
        Self::FREE
    }
}

impl fmt::Debug for CoreMapEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CoreMapEntry")
            .field("owner", &self.owner_kind())
            .field("contiguous_tail", &self.has_contiguous_tail())
            .field("evicting", &self.is_evicting())
            .field("orphaned", &self.is_orphaned())
            .field("pinned", &self.is_pinned())
            .field("owning_entry", &self.owning_entry)
            .field("chain_prev", &self.chain_prev)
            .field("chain_next", &self.chain_next)
            .field("translation_slot", &self.translation_slot.map(u6::value))
            .finish()
    }
}

/// The party a run of frames is claimed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOwner {
    Kernel,
    User(PteRef),
}

impl FrameOwner {
    pub fn kind(self) -> OwnerKind {
        match self {
            FrameOwner::Kernel => OwnerKind::Kernel,
            FrameOwner::User(_) => OwnerKind::User,
        }
    }

    pub fn entry(self) -> Option<PteRef> {
        match self {
            FrameOwner::Kernel => None,
            FrameOwner::User(entry) => Some(entry),
        }
    }
}

/// What a call to [`CoreMap::release`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Release {
    /// This many frames are free again.
    Freed(usize),
    /// The frame is being evicted or paged in; it was marked orphaned and
    /// will be freed when that finishes.
    Deferred,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub total: usize,
    pub free: usize,
    pub kernel: usize,
    /// Includes evicting and pinned frames.
    pub user: usize,
    pub evicting: usize,
}

/// Coremap state. Only reachable through the [`FrameTable`] lock.
pub struct CoreMap {
    entries: &'static mut [CoreMapEntry],
    base: usize,
    oldest: Option<FrameIndex>,
    newest: Option<FrameIndex>,
    placement: Box<dyn PlacementAlgorithm>,
    kernel_frames: usize,
    user_frames: usize,
    evicting_frames: usize,
}

impl CoreMap {
    fn new(
        entries: &'static mut [CoreMapEntry],
        base: usize,
        placement: Box<dyn PlacementAlgorithm>,
    ) -> Self {
        Self {
            entries,
            base,
            oldest: None,
            newest: None,
            placement,
            kernel_frames: 0,
            user_frames: 0,
            evicting_frames: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, idx: FrameIndex) -> &CoreMapEntry {
        &self.entries[idx.get()]
    }

    pub fn oldest(&self) -> Option<FrameIndex> {
        self.oldest
    }

    pub fn newest(&self) -> Option<FrameIndex> {
        self.newest
    }

    fn address_of(&self, idx: FrameIndex) -> usize {
        self.base + idx.get() * PAGE_FRAME_SIZE
    }

    /// Claims a run of `count` free frames for `owner`. User frames are
    /// appended at the newest end of the chain.
    pub fn claim(&mut self, owner: FrameOwner, count: usize) -> Option<FrameIndex> {
        let first = self.claim_run(owner, count, false)?;
        if let FrameOwner::User(_) = owner {
            self.push_newest(first);
        }
        Some(first)
    }

    /// Claims a single user frame that stays off the chain until
    /// [`CoreMap::unpin`], so it cannot be picked for eviction while it is
    /// still being filled.
    pub fn claim_pinned(&mut self, entry: PteRef) -> Option<FrameIndex> {
        self.claim_run(FrameOwner::User(entry), 1, true)
    }

    fn claim_run(&mut self, owner: FrameOwner, count: usize, pinned: bool) -> Option<FrameIndex> {
        debug_assert!(count > 0);
        let range = self.placement.place(self.entries, count)?;
        let last = range.end - 1;

        for i in range.clone() {
            assert!(
                !self.entries[i].is_allocated(),
                "placement returned allocated frame {i}"
            );
            self.entries[i] = CoreMapEntry::claimed(owner, i != last, pinned);
        }

        match owner {
            FrameOwner::Kernel => self.kernel_frames += count,
            FrameOwner::User(_) => self.user_frames += count,
        }
        Some(FrameIndex::new(range.start))
    }

    fn push_newest(&mut self, idx: FrameIndex) {
        let entry = &mut self.entries[idx.get()];
        debug_assert!(entry.chain_prev.is_none() && entry.chain_next.is_none());
        entry.chain_prev = self.newest;
        entry.chain_next = None;

        match self.newest {
            Some(newest) => self.entries[newest.get()].chain_next = Some(idx),
            None => self.oldest = Some(idx),
        }
        self.newest = Some(idx);
    }

    fn push_oldest(&mut self, idx: FrameIndex) {
        let entry = &mut self.entries[idx.get()];
        debug_assert!(entry.chain_prev.is_none() && entry.chain_next.is_none());
        entry.chain_prev = None;
        entry.chain_next = self.oldest;

        match self.oldest {
            Some(oldest) => self.entries[oldest.get()].chain_prev = Some(idx),
            None => self.newest = Some(idx),
        }
        self.oldest = Some(idx);
    }

    fn unlink(&mut self, idx: FrameIndex) {
        let entry = &mut self.entries[idx.get()];
        let prev = entry.chain_prev.take();
        let next = entry.chain_next.take();

        match prev {
            Some(prev) => self.entries[prev.get()].chain_next = next,
            None => {
                debug_assert_eq!(self.oldest, Some(idx));
                self.oldest = next;
            }
        }
        match next {
            Some(next) => self.entries[next.get()].chain_prev = prev,
            None => {
                debug_assert_eq!(self.newest, Some(idx));
                self.newest = prev;
            }
        }
    }

    /// Takes the oldest user frame off the chain and marks it evicting. It
    /// stays allocated until [`CoreMap::finish_eviction`] or
    /// [`CoreMap::abort_eviction`].
    ///
    /// # Panics
    ///
    /// If the frame has no owning page-table entry.
    pub fn detach_oldest(&mut self) -> Option<(FrameIndex, PteRef)> {
        let victim = self.oldest?;
        self.unlink(victim);

        let entry = &mut self.entries[victim.get()];
        let Some(owner) = entry.owning_entry else {
            panic!("user frame {victim} on the chain has no owning page-table entry");
        };
        entry.flags = entry.flags.with_evicting(true);
        self.evicting_frames += 1;
        Some((victim, owner))
    }

    /// Undoes [`CoreMap::detach_oldest`] after a failed eviction: the frame
    /// goes back to the head of the chain, still the oldest. If its owner
    /// freed it in the meantime it is released instead. Returns whether the
    /// frame is back on the chain.
    pub fn abort_eviction(&mut self, idx: FrameIndex) -> bool {
        let entry = &mut self.entries[idx.get()];
        assert!(entry.is_evicting(), "frame {idx} is not being evicted");
        entry.flags = entry.flags.with_evicting(false);
        self.evicting_frames -= 1;

        if entry.is_orphaned() {
            self.clear_user(idx);
            false
        } else {
            self.push_oldest(idx);
            true
        }
    }

    /// Frees a frame whose contents made it to swap. Returns whether the
    /// owner had already released it.
    pub fn finish_eviction(&mut self, idx: FrameIndex) -> bool {
        let entry = &self.entries[idx.get()];
        assert!(entry.is_evicting(), "frame {idx} is not being evicted");
        let orphaned = entry.is_orphaned();
        self.evicting_frames -= 1;
        self.clear_user(idx);
        orphaned
    }

    /// Puts a pinned frame on the chain. An orphaned frame is released
    /// instead, and `false` is returned.
    pub fn unpin(&mut self, idx: FrameIndex) -> bool {
        let entry = &mut self.entries[idx.get()];
        assert!(entry.is_pinned(), "frame {idx} is not pinned");
        entry.flags = entry.flags.with_pinned(false);

        if entry.is_orphaned() {
            self.clear_user(idx);
            false
        } else {
            self.push_newest(idx);
            true
        }
    }

    /// Releases a pinned frame whose page-in failed.
    pub fn discard_pinned(&mut self, idx: FrameIndex) {
        assert!(self.entries[idx.get()].is_pinned(), "frame {idx} is not pinned");
        self.clear_user(idx);
    }

    /// Frees the run starting at `idx`.
    pub fn release(&mut self, idx: FrameIndex) -> Result<Release, FrameError> {
        let i = idx.get();
        let entry = self.entries[i];
        let inside_run = i > 0 && self.entries[i - 1].has_contiguous_tail();
        if !entry.is_allocated() || inside_run || entry.is_orphaned() {
            return Err(FrameError::InvalidAddress(self.address_of(idx)));
        }

        if entry.is_evicting() || entry.is_pinned() {
            self.entries[i].flags = entry.flags.with_orphaned(true);
            return Ok(Release::Deferred);
        }

        if entry.owner_kind() == Some(OwnerKind::User) {
            self.unlink(idx);
            self.clear_user(idx);
            return Ok(Release::Freed(1));
        }

        let mut freed = 0;
        loop {
            let tail = self.entries[i + freed].has_contiguous_tail();
            self.entries[i + freed] = CoreMapEntry::FREE;
            freed += 1;
            if !tail {
                break;
            }
        }
        self.kernel_frames -= freed;
        Ok(Release::Freed(freed))
    }

    fn clear_user(&mut self, idx: FrameIndex) {
        debug_assert_eq!(self.entries[idx.get()].owner_kind(), Some(OwnerKind::User));
        self.entries[idx.get()] = CoreMapEntry::FREE;
        self.user_frames -= 1;
    }

    /// Releases every user frame mapped in `space`. Frames that are being
    /// evicted or paged in are orphaned and freed by the thread holding
    /// them. Returns the number freed right away.
    pub fn release_owned_by(&mut self, space: super::AddressSpaceId) -> usize {
        let mut freed = 0;
        for i in 0..self.entries.len() {
            let idx = FrameIndex::new(i);
            let entry = self.entries[i];
            if entry.owning_entry.map(|owner| owner.space) != Some(space) {
                continue;
            }

            if entry.is_evicting() || entry.is_pinned() {
                self.entries[i].flags = entry.flags.with_orphaned(true);
            } else {
                self.unlink(idx);
                self.clear_user(idx);
                freed += 1;
            }
        }
        freed
    }

    pub fn set_translation_slot(
        &mut self,
        idx: FrameIndex,
        slot: Option<u6>,
    ) -> Result<(), FrameError> {
        if !self.entries[idx.get()].is_allocated() {
            return Err(FrameError::InvalidAddress(self.address_of(idx)));
        }
        self.entries[idx.get()].translation_slot = slot;
        Ok(())
    }

    /// Chained frames from oldest to newest.
    pub fn chain(&self) -> impl Iterator<Item = FrameIndex> + '_ {
        iter::successors(self.oldest, |idx| self.entries[idx.get()].chain_next)
    }

    /// Chained frames from newest to oldest.
    pub fn chain_rev(&self) -> impl Iterator<Item = FrameIndex> + '_ {
        iter::successors(self.newest, |idx| self.entries[idx.get()].chain_prev)
    }

    pub fn stats(&self) -> FrameStats {
        let total = self.entries.len();
        FrameStats {
            total,
            free: total - self.kernel_frames - self.user_frames,
            kernel: self.kernel_frames,
            user: self.user_frames,
            evicting: self.evicting_frames,
        }
    }

    /// Walks the chain in both directions and checks it against the
    /// descriptors.
    pub fn verify(&self) -> Result<(), &'static str> {
        let limit = self.entries.len() + 1;

        let mut expected_prev = None;
        let mut forward = 0;
        for idx in self.chain().take(limit) {
            let entry = self.entry(idx);
            if !entry.is_chainable() {
                return Err("chain holds a frame that is not a resident user frame");
            }
            if entry.chain_prev != expected_prev {
                return Err("chain back link does not match forward walk");
            }
            expected_prev = Some(idx);
            forward += 1;
        }
        if forward == limit {
            return Err("chain has a cycle");
        }
        if expected_prev != self.newest {
            return Err("forward walk does not end at newest");
        }

        let backward = self.chain_rev().take(limit).count();
        if backward != forward {
            return Err("forward and backward walks differ in length");
        }

        let mut chainable = 0;
        let (mut kernel, mut user, mut evicting) = (0, 0, 0);
        for entry in self.entries.iter() {
            match entry.owner_kind() {
                Some(OwnerKind::Kernel) => {
                    kernel += 1;
                    if entry.chain_prev.is_some() || entry.chain_next.is_some() {
                        return Err("kernel frame is linked into the chain");
                    }
                }
                Some(OwnerKind::User) => {
                    user += 1;
                    if entry.owning_entry.is_none() {
                        return Err("user frame without an owning entry");
                    }
                    if entry.is_evicting() {
                        evicting += 1;
                    }
                    if entry.is_chainable() {
                        chainable += 1;
                    }
                }
                None => {
                    if entry.flags.raw_value() != 0 || entry.owning_entry.is_some() {
                        return Err("free frame has stale descriptor state");
                    }
                }
            }
        }
        if chainable != forward {
            return Err("chain does not cover every resident user frame");
        }
        if (kernel, user, evicting)
            != (self.kernel_frames, self.user_frames, self.evicting_frames)
        {
            return Err("frame counters out of sync with descriptors");
        }
        Ok(())
    }
}

/// The coremap behind the lock that guards it.
pub struct FrameTable {
    core_map: MutexIrq<CoreMap>,
    base: usize,
    frames: usize,
}

impl FrameTable {
    /// Manages `entries.len()` frames starting at physical address `base`.
    pub fn new(
        entries: &'static mut [CoreMapEntry],
        base: usize,
        placement: Box<dyn PlacementAlgorithm>,
    ) -> Self {
        assert!(is_frame_aligned(base), "frame table base {base:#x} is not aligned");
        let frames = entries.len();
        Self {
            core_map: MutexIrq::new(CoreMap::new(entries, base, placement)),
            base,
            frames,
        }
    }

    /// Sizes the coremap for the RAM between the bootstrap allocator's next
    /// free frame and its end, steals frames for the descriptors, and leaves
    /// every frame above them free.
    pub fn bootstrap(
        boot: &mut BootstrapAllocator,
        mapper: &dyn FrameMapper,
        policy: PlacementPolicy,
    ) -> Result<Self, FrameError> {
        let entry_size = size_of::<CoreMapEntry>();
        let available = boot.end().saturating_sub(boot.next_free());
        let wanted = available / (entry_size + PAGE_FRAME_SIZE);
        if wanted == 0 {
            return Err(FrameError::BootstrapExhausted);
        }

        let table = boot.steal(frames_for(wanted * entry_size))?;
        let base = boot.next_free();
        // Rounding the descriptor area up to whole frames can cost one frame.
        let frames = wanted.min(boot.remaining_frames());
        if frames == 0 {
            return Err(FrameError::BootstrapExhausted);
        }

        let ptr = mapper.frame_ptr(table).cast::<CoreMapEntry>();
        assert!(ptr.is_aligned(), "coremap storage at {table:#x} is misaligned");
        // SAFETY: `table` is the start of `frames_for(wanted * entry_size)`
        // frames that nothing else will ever use, and the mapper makes them
        // writable.
        let entries = unsafe {
            for i in 0..frames {
                ptr.add(i).write(CoreMapEntry::FREE);
            }
            slice::from_raw_parts_mut(ptr, frames)
        };

        log::info!(
            "coremap: {} frames at {:#x}..{:#x}, {} descriptor bytes at {:#x}",
            frames,
            base,
            base + frames * PAGE_FRAME_SIZE,
            frames * entry_size,
            table
        );
        Ok(Self::new(entries, base, placement_algorithms::for_policy(policy)))
    }

    pub fn lock(&self) -> MutexGuardIrq<CoreMap> {
        self.core_map.lock()
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn len(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Index of the frame at `paddr`, which must be frame-aligned and inside
    /// the managed region.
    pub fn index_of(&self, paddr: usize) -> Result<FrameIndex, FrameError> {
        let offset = paddr
            .checked_sub(self.base)
            .filter(|&offset| is_frame_aligned(offset))
            .ok_or(FrameError::InvalidAddress(paddr))?;
        let index = offset / PAGE_FRAME_SIZE;
        if index >= self.frames {
            return Err(FrameError::InvalidAddress(paddr));
        }
        Ok(FrameIndex::new(index))
    }

    pub fn address_of(&self, idx: FrameIndex) -> usize {
        debug_assert!(idx.get() < self.frames);
        self.base + idx.get() * PAGE_FRAME_SIZE
    }
}
