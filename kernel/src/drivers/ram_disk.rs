use crate::block::block_core::{BlockOp, BlockSector, BLOCK_SECTOR_SIZE};
use crate::block::block_error::BlockError;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

/// Fails a [`RamDisk`]'s reads or writes on demand, from outside the block
/// layer that owns the disk.
#[derive(Clone, Default)]
pub struct FaultSwitch {
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl FaultSwitch {
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

/// A block device backed by kernel memory. Used as swap when no disk is
/// attached, and by the tests.
pub struct RamDisk {
    data: Vec<u8>,
    faults: FaultSwitch,
}

impl RamDisk {
    pub fn new(sectors: usize) -> Self {
        Self {
            data: vec![0; sectors * BLOCK_SECTOR_SIZE],
            faults: FaultSwitch::default(),
        }
    }

    pub fn fault_switch(&self) -> FaultSwitch {
        self.faults.clone()
    }

    fn sector_range(&self, sector: BlockSector) -> Result<core::ops::Range<usize>, BlockError> {
        let start = sector as usize * BLOCK_SECTOR_SIZE;
        let end = start + BLOCK_SECTOR_SIZE;
        if end > self.data.len() {
            return Err(BlockError::SectorOutOfBounds(sector));
        }
        Ok(start..end)
    }
}

impl BlockOp for RamDisk {
    fn read(&mut self, sector: BlockSector, buf: &mut [u8]) -> Result<(), BlockError> {
        if self.faults.fail_reads.load(Ordering::SeqCst) {
            return Err(BlockError::ReadError);
        }
        let range = self.sector_range(sector)?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write(&mut self, sector: BlockSector, buf: &[u8]) -> Result<(), BlockError> {
        if self.faults.fail_writes.load(Ordering::SeqCst) {
            return Err(BlockError::WriteError);
        }
        let range = self.sector_range(sector)?;
        self.data[range].copy_from_slice(buf);
        Ok(())
    }
}
