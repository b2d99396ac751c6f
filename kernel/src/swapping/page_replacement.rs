use super::EvictError;
use crate::mem::frame_table::CoreMap;
use crate::mem::{FrameIndex, PteRef};

/// Chooses which resident user frame gives way when memory runs out.
pub trait PageReplacementPolicy: Send + Sync {
    /// Detaches the victim from the coremap's chain and marks it evicting.
    /// Called with the frame-table lock held.
    fn select_victim(&self, core_map: &mut CoreMap) -> Result<(FrameIndex, PteRef), EvictError>;
}

/// Evicts in allocation order: the user frame that has been resident the
/// longest goes first, however recently it was touched.
#[derive(Clone, Copy, Debug, Default)]
pub struct FifoReplacement;

impl PageReplacementPolicy for FifoReplacement {
    fn select_victim(&self, core_map: &mut CoreMap) -> Result<(FrameIndex, PteRef), EvictError> {
        core_map.detach_oldest().ok_or(EvictError::NoVictim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::frame_allocator::placement_algorithms::FirstFit;
    use crate::mem::frame_table::{FrameOwner, FrameTable};
    use crate::mem::test_util::leak_entries;
    use crate::mem::AddressSpaceId;
    use std::boxed::Box;

    #[test]
    fn victims_come_out_oldest_first() {
        let table = FrameTable::new(leak_entries(4), 0, Box::new(FirstFit));
        let mut core_map = table.lock();
        let pages: [PteRef; 3] = core::array::from_fn(|vpn| PteRef::new(AddressSpaceId(1), vpn));
        let mut frames = [FrameIndex::new(0); 3];
        for (frame, page) in frames.iter_mut().zip(pages) {
            *frame = core_map.claim(FrameOwner::User(page), 1).unwrap();
        }
        core_map.claim(FrameOwner::Kernel, 1).unwrap();

        for (frame, page) in frames.into_iter().zip(pages) {
            assert_eq!(FifoReplacement.select_victim(&mut core_map), Ok((frame, page)));
        }
        assert_eq!(
            FifoReplacement.select_victim(&mut core_map),
            Err(EvictError::NoVictim)
        );
        core_map.verify().unwrap();
    }
}
