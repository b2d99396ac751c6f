// https://wiki.osdev.org/Paging

use crate::mem::PAGE_FRAME_SIZE;
use arbitrary_int::u20;
use bitbybit::bitfield;

/// A second-level page table entry.
///
/// While `present` is set, bits 12..=31 hold the frame number. When a page has
/// been evicted, `present` is clear, `swapped` (one of the bits the MMU leaves
/// to the OS) is set, and the same bits hold the swap slot instead.
#[bitfield(u32, default = 0)]
pub struct PageTableEntry {
    #[bit(0, rw)]
    present: bool,
    #[bit(1, rw)]
    read_write: bool,
    #[bit(2, rw)]
    user_supervisor: bool,
    #[bit(5, rw)]
    accessed: bool,
    #[bit(6, rw)]
    dirty: bool,
    #[bit(9, rw)]
    swapped: bool,
    #[bits(12..=31, rw)]
    page_frame_address: u20,
}

/// The 20-bit field value for `value`, if it fits.
fn field(value: usize) -> Option<u20> {
    u32::try_from(value).ok().and_then(|value| u20::try_new(value).ok())
}

impl PageTableEntry {
    /// A writable user mapping of the frame at `paddr`. `None` if the frame
    /// lies at or above 4GiB.
    pub fn user_mapping(paddr: usize) -> Option<Self> {
        let frame = field(paddr / PAGE_FRAME_SIZE)?;
        Some(
            Self::DEFAULT
                .with_present(true)
                .with_read_write(true)
                .with_user_supervisor(true)
                .with_page_frame_address(frame),
        )
    }

    /// A non-present entry whose contents live in swap slot `slot`. `None` if
    /// the slot number does not fit in 20 bits.
    pub fn swapped_out(self, slot: usize) -> Option<Self> {
        let slot = field(slot)?;
        Some(
            self.with_present(false)
                .with_accessed(false)
                .with_dirty(false)
                .with_swapped(true)
                .with_page_frame_address(slot),
        )
    }

    pub fn frame_address(self) -> Option<usize> {
        self.present()
            .then(|| self.page_frame_address().value() as usize * PAGE_FRAME_SIZE)
    }

    pub fn swap_slot(self) -> Option<usize> {
        (!self.present() && self.swapped()).then(|| self.page_frame_address().value() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resident_entry_reports_frame() {
        let entry = PageTableEntry::user_mapping(0x0012_3000).unwrap();
        assert!(entry.present());
        assert!(entry.user_supervisor());
        assert_eq!(entry.frame_address(), Some(0x0012_3000));
        assert_eq!(entry.swap_slot(), None);
    }

    #[test]
    fn swapped_entry_keeps_permissions() {
        let entry = PageTableEntry::user_mapping(0x0012_3000)
            .unwrap()
            .with_dirty(true)
            .swapped_out(17)
            .unwrap();
        assert!(!entry.present());
        assert!(!entry.dirty());
        assert!(entry.read_write());
        assert_eq!(entry.frame_address(), None);
        assert_eq!(entry.swap_slot(), Some(17));
    }

    #[test]
    fn empty_entry_is_neither() {
        let entry = PageTableEntry::DEFAULT;
        assert_eq!(entry.frame_address(), None);
        assert_eq!(entry.swap_slot(), None);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let top = (1 << 20) - 1;
        let entry = PageTableEntry::user_mapping(top * PAGE_FRAME_SIZE).unwrap();
        assert_eq!(entry.frame_address(), Some(top * PAGE_FRAME_SIZE));
        assert_eq!(entry.swapped_out(top).unwrap().swap_slot(), Some(top));

        assert!(PageTableEntry::user_mapping((top + 1) * PAGE_FRAME_SIZE).is_none());
        assert!(entry.swapped_out(top + 1).is_none());
        assert!(entry.swapped_out(usize::MAX).is_none());
    }
}
