use crate::block::BlockSector;
use swapcore_shared::mem::UPPER_MEMORY_START;
use swapcore_shared::sizes::{MB, SWAP_SIZE};

/// Where the frame allocator looks for a free run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementPolicy {
    /// Lowest-numbered run that fits.
    #[default]
    FirstFit,
    /// First run that fits after the previous allocation, wrapping once.
    NextFit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapConfig {
    /// Bytes of the swap device given over to slots. Rounded down to whole
    /// frames and clamped to the device size.
    pub capacity: usize,
    /// First sector of the swap area on the device.
    pub first_sector: BlockSector,
    /// Overwrite a slot with zeros once its contents have been read back.
    pub scrub_on_restore: bool,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            capacity: SWAP_SIZE,
            first_sector: 0,
            scrub_on_restore: true,
        }
    }
}

/// Boot-time parameters of the memory system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Exclusive upper bound of physical RAM.
    pub ram_end: usize,
    /// First physical address not used by the kernel image or boot data.
    pub first_free: usize,
    pub placement: PlacementPolicy,
    pub swap: SwapConfig,
}

impl MemoryConfig {
    /// `mem_upper` is the size of upper memory in kilobytes, as reported by
    /// the bootloader.
    pub fn from_mem_upper(mem_upper: usize, first_free: usize) -> Self {
        Self {
            ram_end: UPPER_MEMORY_START + mem_upper * 1024,
            first_free,
            ..Self::default()
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            ram_end: 32 * MB,
            first_free: 2 * MB,
            placement: PlacementPolicy::default(),
            swap: SwapConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_upper_counts_from_one_megabyte() {
        let config = MemoryConfig::from_mem_upper(15 * 1024, 3 * MB);
        assert_eq!(config.ram_end, 16 * MB);
        assert_eq!(config.first_free, 3 * MB);
        assert_eq!(config.placement, PlacementPolicy::FirstFit);
        assert!(config.swap.scrub_on_restore);
    }
}
