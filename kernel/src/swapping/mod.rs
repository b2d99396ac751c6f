//! The swap area: a slot map saying which slots are live, and the device
//! the slots live on.
//!
//! The two halves have separate locks and no operation here holds both at
//! once. Neither is ever taken with the frame-table lock held.

pub mod page_replacement;
pub mod slot_map;
pub mod swap_device;
mod swap_error;

pub use swap_error::{EvictError, SwapError};

use crate::block::Block;
use crate::config::SwapConfig;
use crate::mem::{AddressSpaceId, PteRef};
use crate::sync::mutex::Mutex;
use core::fmt;
use slot_map::SlotMap;
use swap_device::SwapDevice;

/// Index of a page-sized slot in the swap area.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapSlot(usize);

impl SwapSlot {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for SwapSlot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct SwapSpace {
    slots: Mutex<SlotMap>,
    device: Mutex<SwapDevice>,
    capacity: usize,
    scrub_on_restore: bool,
}

impl SwapSpace {
    pub fn new(block: Block, config: &SwapConfig) -> Self {
        let device = SwapDevice::new(block, config);
        let capacity = device.slots();
        log::info!(
            "swap: {} slots on {}, starting at sector {}",
            capacity,
            device.block().get_name(),
            config.first_sector
        );
        Self {
            slots: Mutex::new(SlotMap::new(capacity)),
            device: Mutex::new(device),
            capacity,
            scrub_on_restore: config.scrub_on_restore,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        self.slots.lock().used()
    }

    pub fn scrub_on_restore(&self) -> bool {
        self.scrub_on_restore
    }

    pub fn is_reserved(&self, slot: SwapSlot) -> bool {
        self.slots.lock().is_set(slot.get())
    }

    pub fn owner_of(&self, slot: SwapSlot) -> Option<PteRef> {
        self.slots.lock().owner(slot.get())
    }

    /// Claims the lowest free slot for the page `owner`. The slot stays busy
    /// until [`SwapSpace::settle_slot`].
    pub fn reserve_slot(&self, owner: PteRef) -> Result<SwapSlot, SwapError> {
        self.slots.lock().reserve(owner).map(SwapSlot)
    }

    /// Marks `slot` busy for a read on behalf of `owner`, so a teardown
    /// cannot free it mid-transfer.
    pub fn hold_slot(&self, slot: SwapSlot, owner: PteRef) -> bool {
        self.slots.lock().hold(slot.get(), owner)
    }

    /// Ends a transfer started by [`SwapSpace::reserve_slot`] or
    /// [`SwapSpace::hold_slot`]. Returns `false`, with the slot released, if
    /// the owner's address space was torn down in the meantime.
    pub fn settle_slot(&self, slot: SwapSlot, owner: PteRef) -> bool {
        self.slots.lock().settle(slot.get(), owner)
    }

    pub fn release_slot(&self, slot: SwapSlot) -> Result<(), SwapError> {
        self.slots.lock().release(slot.get())
    }

    /// Releases `slot` unless it has since been handed to another page.
    pub fn release_slot_if_owned(&self, slot: SwapSlot, owner: PteRef) -> bool {
        self.slots.lock().release_if_owned(slot.get(), owner)
    }

    pub fn release_owned_by(&self, space: AddressSpaceId) -> usize {
        self.slots.lock().release_owned_by(space)
    }

    pub fn write_block(&self, slot: SwapSlot, frame: &[u8]) -> Result<(), SwapError> {
        self.device.lock().write_block(slot.get(), frame)
    }

    pub fn read_block(&self, slot: SwapSlot, frame: &mut [u8]) -> Result<(), SwapError> {
        self.device.lock().read_block(slot.get(), frame)
    }

    pub fn scrub_block(&self, slot: SwapSlot) -> Result<(), SwapError> {
        self.device.lock().scrub_block(slot.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockSector, BlockType};
    use crate::drivers::ram_disk::RamDisk;
    use std::boxed::Box;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::vec::Vec;
    use swap_device::SECTORS_PER_SLOT;
    use swapcore_shared::mem::PAGE_FRAME_SIZE;

    fn swap_space(slots: usize) -> SwapSpace {
        let sectors = slots * SECTORS_PER_SLOT;
        let disk = RamDisk::new(sectors);
        let block = Block::new(BlockType::Swap, "swap0", sectors as BlockSector, Box::new(disk));
        let config = SwapConfig {
            capacity: slots * PAGE_FRAME_SIZE,
            ..SwapConfig::default()
        };
        SwapSpace::new(block, &config)
    }

    #[test]
    fn n_reservations_fit_and_the_next_fails() {
        let swap = swap_space(3);
        assert_eq!(swap.capacity(), 3);
        for vpn in 0..3 {
            swap.reserve_slot(PteRef::new(AddressSpaceId(1), vpn)).unwrap();
        }
        assert_eq!(
            swap.reserve_slot(PteRef::new(AddressSpaceId(1), 3)),
            Err(SwapError::SwapFull)
        );
        assert_eq!(swap.used(), 3);
    }

    #[test]
    fn concurrent_reservations_are_distinct() {
        const THREADS: usize = 4;
        const PER_THREAD: usize = 8;
        let swap = Arc::new(swap_space(THREADS * PER_THREAD));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let swap = Arc::clone(&swap);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    (0..PER_THREAD)
                        .map(|i| {
                            let owner = PteRef::new(AddressSpaceId(t as u32), i);
                            swap.reserve_slot(owner).unwrap().get()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut slots: Vec<usize> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len(), THREADS * PER_THREAD);
        assert_eq!(swap.used(), THREADS * PER_THREAD);
    }
}
