//! Interrupt masking around short critical sections.
//!
//! On the kernel target this is `cli`/`sti` with the previous level restored
//! on drop. Hosted builds (unit tests) have no interrupts to mask, so the
//! guard only tracks nesting.

use core::sync::atomic::{AtomicUsize, Ordering};

static INTR_DISABLE_COUNT: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrLevel {
    IntrOn,
    IntrOff,
}

#[cfg(all(target_os = "none", target_arch = "x86"))]
mod arch {
    use super::IntrLevel;
    use core::arch::asm;

    pub fn intr_disable() {
        // SAFETY: masking interrupts has no memory effects.
        unsafe { asm!("cli", options(nomem, nostack)) }
    }

    pub fn intr_enable() {
        // SAFETY: see above.
        unsafe { asm!("sti", options(nomem, nostack)) }
    }

    pub fn intr_get_level() -> IntrLevel {
        let flags: u32;
        // SAFETY: reads EFLAGS through the stack and restores it.
        unsafe {
            asm!(
                "pushfd",
                "mov {0:e}, [esp]",
                "popfd",
                out(reg) flags
            );
        }

        if flags & (1 << 9) != 0 {
            IntrLevel::IntrOn
        } else {
            IntrLevel::IntrOff
        }
    }
}

#[cfg(not(all(target_os = "none", target_arch = "x86")))]
mod arch {
    use super::IntrLevel;

    pub fn intr_disable() {}

    pub fn intr_enable() {}

    pub fn intr_get_level() -> IntrLevel {
        IntrLevel::IntrOff
    }
}

pub use arch::intr_get_level;

/// Holds interrupts off until dropped.
pub struct InterruptsGuard {
    previous: IntrLevel,
}

pub fn hold_interrupts() -> InterruptsGuard {
    let previous = arch::intr_get_level();
    arch::intr_disable();
    INTR_DISABLE_COUNT.fetch_add(1, Ordering::SeqCst);
    InterruptsGuard { previous }
}

/// Number of live [`InterruptsGuard`]s across all CPUs.
pub fn held_count() -> usize {
    INTR_DISABLE_COUNT.load(Ordering::SeqCst)
}

impl Drop for InterruptsGuard {
    fn drop(&mut self) {
        INTR_DISABLE_COUNT.fetch_sub(1, Ordering::SeqCst);
        if self.previous == IntrLevel::IntrOn {
            arch::intr_enable();
        }
    }
}
