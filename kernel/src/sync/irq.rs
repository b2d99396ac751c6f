use core::{
    fmt,
    ops::{Deref, DerefMut},
};

use super::intr::{hold_interrupts, InterruptsGuard};

use crate::sync::mutex::{Mutex, MutexGuard};

/// A [`Mutex`] that also keeps interrupts off while held, so an interrupt
/// handler on the same CPU can never spin on a lock its own thread holds.
pub struct MutexIrq<T> {
    lock: Mutex<T>,
}

pub struct MutexGuardIrq<'a, T: 'a> {
    guard: MutexGuard<'a, T>,
    // Dropped after `guard`, so the lock is released before interrupts return.
    _held_irq: InterruptsGuard,
}

unsafe impl<T: Send> Sync for MutexIrq<T> {}
unsafe impl<T: Send> Send for MutexIrq<T> {}

impl<T> MutexIrq<T> {
    pub const fn new(data: T) -> MutexIrq<T> {
        MutexIrq {
            lock: Mutex::new(data),
        }
    }

    #[inline(always)]
    pub fn into_inner(self) -> T {
        self.lock.into_inner()
    }

    #[inline(always)]
    pub fn lock(&self) -> MutexGuardIrq<T> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            core::hint::spin_loop();
        }
    }

    #[inline(always)]
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// Interrupts are only masked while actually holding the lock; a waiter
    /// spins with them enabled.
    #[inline(always)]
    pub fn try_lock(&self) -> Option<MutexGuardIrq<T>> {
        if self.lock.is_locked() {
            return None;
        }
        let held_irq = hold_interrupts();
        self.lock.try_lock().map(|guard| MutexGuardIrq {
            guard,
            _held_irq: held_irq,
        })
    }

    #[inline(always)]
    pub fn get_mut(&mut self) -> &mut T {
        self.lock.get_mut()
    }
}

impl<T: fmt::Debug> fmt::Debug for MutexIrq<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.lock.try_lock() {
            Some(guard) => write!(f, "MutexIrq {{ data: {:?} }}", &*guard),
            None => write!(f, "MutexIrq {{ <locked> }}"),
        }
    }
}

impl<'a, T> Deref for MutexGuardIrq<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<'a, T> DerefMut for MutexGuardIrq<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::MutexIrq;
    use crate::sync::intr::held_count;

    #[test]
    fn guard_holds_interrupts_until_dropped() {
        let lock = MutexIrq::new(5usize);
        {
            let mut guard = lock.lock();
            *guard += 1;
            assert!(held_count() >= 1);
            assert!(lock.is_locked());
            assert!(lock.try_lock().is_none());
        }
        assert!(!lock.is_locked());
        assert_eq!(*lock.lock(), 6);
    }
}
