//! The kernel-wide memory system, reachable once boot has built it.

use crate::block::Block;
use crate::config::MemoryConfig;
use crate::mem::frame_allocator::FrameAllocator;
use crate::mem::{FrameError, FrameMapper, PageOwner};
use alloc::boxed::Box;
use once_cell::race::OnceBox;
use swapcore_shared::logger::KernelLogger;

static MEMORY: OnceBox<FrameAllocator> = OnceBox::new();

/// Makes `allocator` the kernel's frame allocator.
///
/// # Panics
///
/// If a frame allocator has already been installed.
pub fn install(allocator: FrameAllocator) -> &'static FrameAllocator {
    if MEMORY.set(Box::new(allocator)).is_err() {
        panic!("install called while the memory system was already initialized");
    }
    memory()
}

/// Brings up the memory system: routes `log` output to `logger`, builds the
/// frame allocator over the RAM described by `config`, and installs it.
pub fn boot(
    logger: &'static KernelLogger,
    config: &MemoryConfig,
    mapper: Box<dyn FrameMapper>,
    swap_block: Block,
    pager: Box<dyn PageOwner>,
) -> Result<&'static FrameAllocator, FrameError> {
    // A logger installed earlier in boot keeps the output.
    let _ = logger.init();
    let allocator = FrameAllocator::bootstrap(config, mapper, swap_block, pager)?;
    Ok(install(allocator))
}

pub fn memory() -> &'static FrameAllocator {
    MEMORY.get().expect("Memory system not initialized.")
}

/// For paths that may run before boot has finished, such as panic handlers.
pub fn try_memory() -> Option<&'static FrameAllocator> {
    MEMORY.get()
}
