//! Which swap slots hold live data, and for whom.

use super::SwapError;
use crate::mem::{AddressSpaceId, PteRef};
use alloc::boxed::Box;
use alloc::vec;
use swapcore_shared::bit_array::BitArray;

type Word = BitArray<u64>;

/// One bit per slot.
struct Bits(Box<[Word]>);

impl Bits {
    fn new(slots: usize) -> Self {
        Self(vec![Word::default(); slots.div_ceil(Word::BITS)].into_boxed_slice())
    }

    fn get(&self, slot: usize) -> bool {
        self.0[slot / Word::BITS].get(slot % Word::BITS)
    }

    fn set(&mut self, slot: usize, value: bool) {
        let word = &mut self.0[slot / Word::BITS];
        *word = word.with(value, slot % Word::BITS);
    }
}

/// A set bit in `used` means the slot holds a page that has not been
/// restored yet. Every used slot also remembers the page it was written for.
///
/// A slot is `busy` while a thread is moving its page to or from the device.
/// Teardown leaves busy slots alone and marks them `orphaned`. The thread
/// holding the slot clears it when it settles.
pub struct SlotMap {
    used: Bits,
    busy: Bits,
    orphaned: Bits,
    owners: Box<[Option<PteRef>]>,
    count: usize,
}

impl SlotMap {
    pub fn new(slots: usize) -> Self {
        Self {
            used: Bits::new(slots),
            busy: Bits::new(slots),
            orphaned: Bits::new(slots),
            owners: vec![None; slots].into_boxed_slice(),
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.owners.len()
    }

    pub fn used(&self) -> usize {
        self.count
    }

    pub fn is_set(&self, slot: usize) -> bool {
        slot < self.capacity() && self.used.get(slot)
    }

    pub fn is_busy(&self, slot: usize) -> bool {
        slot < self.capacity() && self.busy.get(slot)
    }

    pub fn owner(&self, slot: usize) -> Option<PteRef> {
        self.owners.get(slot).copied().flatten()
    }

    /// Takes the lowest free slot for `owner` and returns its index. The slot
    /// starts out busy, for the write that is about to fill it. Leaves the
    /// map untouched when every slot is taken.
    pub fn reserve(&mut self, owner: PteRef) -> Result<usize, SwapError> {
        let (word, bit) = self
            .used
            .0
            .iter()
            .enumerate()
            .find_map(|(w, word)| word.first_clear().map(|bit| (w, bit)))
            .ok_or(SwapError::SwapFull)?;

        // Bits past the last slot in the final word are never handed out.
        let slot = word * Word::BITS + bit;
        if slot >= self.capacity() {
            return Err(SwapError::SwapFull);
        }

        self.used.set(slot, true);
        self.busy.set(slot, true);
        self.owners[slot] = Some(owner);
        self.count += 1;
        Ok(slot)
    }

    /// Marks `slot` busy for a read on behalf of `owner`. Fails if the slot
    /// is not held for `owner` or is already busy.
    pub fn hold(&mut self, slot: usize, owner: PteRef) -> bool {
        if self.owner(slot) != Some(owner) || self.busy.get(slot) {
            return false;
        }
        self.busy.set(slot, true);
        true
    }

    /// Ends the transfer on a busy slot held for `owner`. Returns whether the
    /// slot is still live. A slot orphaned by a teardown in the meantime is
    /// cleared instead.
    pub fn settle(&mut self, slot: usize, owner: PteRef) -> bool {
        if self.owner(slot) != Some(owner) {
            return false;
        }
        if self.orphaned.get(slot) {
            self.clear(slot);
            return false;
        }
        self.busy.set(slot, false);
        true
    }

    /// Clears `slot`. Clearing a slot that is not set is not an error.
    pub fn release(&mut self, slot: usize) -> Result<(), SwapError> {
        if slot >= self.capacity() {
            return Err(SwapError::InvalidSlot(slot));
        }
        self.clear(slot);
        Ok(())
    }

    /// Clears `slot` only if it is still held for `owner`.
    pub fn release_if_owned(&mut self, slot: usize, owner: PteRef) -> bool {
        if self.owner(slot) != Some(owner) {
            return false;
        }
        self.clear(slot);
        true
    }

    /// Clears every idle slot held for a page of `space` and returns how
    /// many. Busy slots of `space` are orphaned instead.
    pub fn release_owned_by(&mut self, space: AddressSpaceId) -> usize {
        let mut released = 0;
        for slot in 0..self.capacity() {
            if !self.owners[slot].is_some_and(|owner| owner.space == space) {
                continue;
            }
            if self.busy.get(slot) {
                self.orphaned.set(slot, true);
            } else {
                self.clear(slot);
                released += 1;
            }
        }
        released
    }

    fn clear(&mut self, slot: usize) {
        if self.used.get(slot) {
            self.used.set(slot, false);
            self.count -= 1;
        }
        self.busy.set(slot, false);
        self.orphaned.set(slot, false);
        self.owners[slot] = None;
    }
}
