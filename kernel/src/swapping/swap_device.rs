//! Moves one frame at a time between memory and a slot on the swap device.

use super::SwapError;
use crate::block::{Block, BlockSector, BLOCK_SECTOR_SIZE};
use crate::config::SwapConfig;
use swapcore_shared::mem::PAGE_FRAME_SIZE;

pub const SECTORS_PER_SLOT: usize = PAGE_FRAME_SIZE / BLOCK_SECTOR_SIZE;

/// The swap area of a block device: `slots` consecutive runs of
/// [`SECTORS_PER_SLOT`] sectors starting at `first_sector`.
pub struct SwapDevice {
    block: Block,
    first_sector: BlockSector,
    slots: usize,
}

impl SwapDevice {
    /// Fits as many slots as both the configured capacity and the space
    /// behind `config.first_sector` allow.
    pub fn new(block: Block, config: &SwapConfig) -> Self {
        let usable = block.get_size().saturating_sub(config.first_sector) as usize;
        let slots = (config.capacity / PAGE_FRAME_SIZE).min(usable / SECTORS_PER_SLOT);
        if slots == 0 {
            log::warn!("swap device {} has no room for a single slot", block.get_name());
        }
        Self {
            block,
            first_sector: config.first_sector,
            slots,
        }
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    fn first_sector_of(&self, slot: usize) -> Result<BlockSector, SwapError> {
        if slot >= self.slots {
            return Err(SwapError::InvalidSlot(slot));
        }
        // `new` keeps every slot inside the device, so this cannot overflow.
        Ok(self.first_sector + (slot * SECTORS_PER_SLOT) as BlockSector)
    }

    fn check_frame(frame: &[u8]) -> Result<(), SwapError> {
        if frame.len() != PAGE_FRAME_SIZE {
            return Err(SwapError::InvalidFrame(frame.len()));
        }
        Ok(())
    }

    /// Writes `frame` to `slot`, sector by sector. Returns after the device
    /// has taken every sector.
    pub fn write_block(&mut self, slot: usize, frame: &[u8]) -> Result<(), SwapError> {
        let first = self.first_sector_of(slot)?;
        Self::check_frame(frame)?;

        for (sector, chunk) in (first..).zip(frame.chunks_exact(BLOCK_SECTOR_SIZE)) {
            self.block.write(sector, chunk)?;
        }
        Ok(())
    }

    /// Fills `frame` from `slot`. On error `frame` may be partly overwritten.
    pub fn read_block(&mut self, slot: usize, frame: &mut [u8]) -> Result<(), SwapError> {
        let first = self.first_sector_of(slot)?;
        Self::check_frame(frame)?;

        for (sector, chunk) in (first..).zip(frame.chunks_exact_mut(BLOCK_SECTOR_SIZE)) {
            self.block.read(sector, chunk)?;
        }
        Ok(())
    }

    /// Overwrites `slot` with zeros.
    pub fn scrub_block(&mut self, slot: usize) -> Result<(), SwapError> {
        let first = self.first_sector_of(slot)?;
        let zeros = [0u8; BLOCK_SECTOR_SIZE];

        for i in 0..SECTORS_PER_SLOT {
            self.block.write(first + i as BlockSector, &zeros)?;
        }
        Ok(())
    }
}
