use super::FrameError;
use swapcore_shared::mem::PAGE_FRAME_SIZE;

/// Hands out frames from the bottom of free RAM before the coremap exists.
///
/// Everything it gives away is permanent: the coremap lives until the kernel
/// stops running, so there is no way to give frames back.
pub struct BootstrapAllocator {
    next_free: usize,
    end: usize,
}

impl BootstrapAllocator {
    /// `first_free` is rounded up to a frame boundary.
    pub const fn new(first_free: usize, end: usize) -> Self {
        Self {
            next_free: first_free.next_multiple_of(PAGE_FRAME_SIZE),
            end,
        }
    }

    /// Takes `frames` whole frames and returns the physical address of the
    /// first one.
    pub fn steal(&mut self, frames: usize) -> Result<usize, FrameError> {
        let bytes = frames
            .checked_mul(PAGE_FRAME_SIZE)
            .ok_or(FrameError::BootstrapExhausted)?;
        let new_next = self
            .next_free
            .checked_add(bytes)
            .filter(|&next| next <= self.end)
            .ok_or(FrameError::BootstrapExhausted)?;

        let start = self.next_free;
        self.next_free = new_next;
        Ok(start)
    }

    pub fn next_free(&self) -> usize {
        self.next_free
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn remaining_frames(&self) -> usize {
        self.end.saturating_sub(self.next_free) / PAGE_FRAME_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steals_from_the_bottom() {
        let mut boot = BootstrapAllocator::new(0x1_0010, 0x2_0000);
        assert_eq!(boot.next_free(), 0x1_1000);
        assert_eq!(boot.steal(2), Ok(0x1_1000));
        assert_eq!(boot.next_free(), 0x1_3000);
        assert_eq!(boot.remaining_frames(), 13);
    }

    #[test]
    fn refuses_to_run_past_the_end() {
        let mut boot = BootstrapAllocator::new(0x1000, 0x4000);
        assert_eq!(boot.steal(4), Err(FrameError::BootstrapExhausted));
        assert_eq!(boot.steal(usize::MAX), Err(FrameError::BootstrapExhausted));
        assert_eq!(boot.next_free(), 0x1000);
        assert_eq!(boot.steal(3), Ok(0x1000));
        assert_eq!(boot.remaining_frames(), 0);
    }
}
