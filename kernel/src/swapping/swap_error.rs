use crate::block::BlockError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SwapError {
    #[error("no free swap slot")]
    SwapFull,
    #[error("swap slot {0} is out of range or not in use")]
    InvalidSlot(usize),
    #[error("{0:#x} is not a frame the swap area can transfer")]
    InvalidFrame(usize),
    #[error("swap device I/O failed: {0}")]
    Io(#[from] BlockError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EvictError {
    /// Every frame is a kernel frame, or every user frame is already on its
    /// way to swap.
    #[error("no user frame to evict")]
    NoVictim,
    #[error(transparent)]
    Swap(#[from] SwapError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_errors_convert_upward() {
        let swap: SwapError = BlockError::WriteError.into();
        let evict: EvictError = swap.into();
        assert_eq!(evict, EvictError::Swap(SwapError::Io(BlockError::WriteError)));
    }
}
