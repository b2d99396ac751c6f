use crate::swapping::{EvictError, SwapError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("out of physical frames")]
    OutOfMemory,
    /// No free run and the eviction that should have made one failed.
    #[error("out of physical frames, eviction failed: {0}")]
    EvictionFailed(#[source] EvictError),
    #[error("invalid frame request: {0}")]
    InvalidArgument(&'static str),
    #[error("{0:#x} is not the base of an allocated frame run")]
    InvalidAddress(usize),
    /// A page-in read the slot back but could not complete.
    #[error("could not restore page from swap: {0}")]
    RestoreFailed(#[source] SwapError),
    /// The address space was torn down while one of its pages was being
    /// brought back in.
    #[error("owner released while its page was being restored")]
    OwnerReleased,
    #[error("not enough memory to hold the coremap")]
    BootstrapExhausted,
}

impl FrameError {
    /// Both plain exhaustion and a failed eviction mean the request could not
    /// be met for lack of memory.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, FrameError::OutOfMemory | FrameError::EvictionFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_failure_is_out_of_memory_class() {
        let err = FrameError::EvictionFailed(EvictError::Swap(SwapError::SwapFull));
        assert!(err.is_out_of_memory());
        assert!(FrameError::OutOfMemory.is_out_of_memory());
        assert!(!FrameError::InvalidAddress(0x1000).is_out_of_memory());
    }
}
