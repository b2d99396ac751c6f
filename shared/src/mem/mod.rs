use crate::sizes::{KB, MB};

// Page size is 4KB. This is a property of x86 processors.
pub const PAGE_FRAME_SIZE: usize = 4 * KB;

// Any virtual address at or above OFFSET is a kernel address. Physical memory
// is mapped one-to-one starting there.
pub const OFFSET: usize = 0x80000000;

// Memory below 1MB is left to firmware and the boot trampoline.
pub const UPPER_MEMORY_START: usize = MB;

pub const fn is_frame_aligned(addr: usize) -> bool {
    addr % PAGE_FRAME_SIZE == 0
}

pub const fn frames_for(bytes: usize) -> usize {
    bytes.div_ceil(PAGE_FRAME_SIZE)
}

#[inline]
pub const fn paddr_to_kvaddr(paddr: usize) -> usize {
    paddr + OFFSET
}

/// Returns [`None`] for addresses below the kernel half.
#[inline]
pub const fn kvaddr_to_paddr(kvaddr: usize) -> Option<usize> {
    kvaddr.checked_sub(OFFSET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_map_round_trips() {
        let paddr = 0x0040_3000;
        assert_eq!(kvaddr_to_paddr(paddr_to_kvaddr(paddr)), Some(paddr));
        assert_eq!(kvaddr_to_paddr(0x1000), None);
    }

    #[test]
    fn frame_counts_round_up() {
        assert_eq!(frames_for(0), 0);
        assert_eq!(frames_for(1), 1);
        assert_eq!(frames_for(PAGE_FRAME_SIZE), 1);
        assert_eq!(frames_for(PAGE_FRAME_SIZE + 1), 2);
        assert!(is_frame_aligned(3 * PAGE_FRAME_SIZE));
        assert!(!is_frame_aligned(3 * PAGE_FRAME_SIZE + 8));
    }
}
