//! Physical frame management for the kernel: the coremap, the frame allocator,
//! FIFO eviction of user frames and the swap area that backs them.

#![no_std]

extern crate alloc;
#[cfg(test)]
extern crate std;

pub mod block;
pub mod config;
pub mod drivers;
pub mod mem;
pub mod swapping;
pub mod sync;
pub mod system;

pub use config::{MemoryConfig, PlacementPolicy, SwapConfig};
pub use mem::frame_allocator::{FrameAllocator, MemoryStats, Teardown};
pub use mem::{AddressSpaceId, DirectMap, FrameError, FrameIndex, FrameMapper, OwnerKind, PageOwner, PteRef};
pub use swapping::{EvictError, SwapError, SwapSlot};
