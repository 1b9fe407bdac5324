//! # Synchronization Primitives
//!
//! Interrupt-safe access to the kernel's single global scheduler. Thread-mode
//! callers (yield, block, sleep) and the SysTick/PendSV handlers all reach it
//! through [`Shared::with`], which runs inside a critical section.

use core::cell::RefCell;

use cortex_m::interrupt::{self, Mutex};

/// Execute a closure within a critical section (interrupts disabled).
///
/// Interrupts are disabled on entry and the previous PRIMASK state is
/// restored on exit, so nesting inside an already-masked handler is safe.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&interrupt::CriticalSection) -> R,
{
    interrupt::free(f)
}

/// A value installed once at startup and then only touched inside critical
/// sections.
pub struct Shared<T> {
    inner: Mutex<RefCell<Option<T>>>,
}

impl<T> Shared<T> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Install the value. Hands it back if one is already installed.
    pub fn install(&self, value: T) -> Result<(), T> {
        critical_section(|cs| {
            let mut slot = self.inner.borrow(cs).borrow_mut();
            if slot.is_some() {
                return Err(value);
            }
            *slot = Some(value);
            Ok(())
        })
    }

    /// Run `f` on the installed value, or return `None` before `install`.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        critical_section(|cs| self.inner.borrow(cs).borrow_mut().as_mut().map(f))
    }
}
