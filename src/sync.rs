//! # Synchronization Primitives
//!
//! Interrupt-safe access to the kernel's shared state. On the target the
//! critical section is provided by `cortex-m`'s single-core implementation
//! (PRIMASK); host tests use the `critical-section` std implementation.

use core::cell::RefCell;

pub use critical_section::CriticalSection;
use critical_section::Mutex;

/// Execute a closure within a critical section (interrupts disabled).
///
/// Interrupts are disabled on entry and the previous PRIMASK state is
/// restored on exit, so nesting is safe.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|_cs| {
///     // Access shared state safely
/// });
/// ```
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}

/// A value shared between task context and interrupt handlers.
///
/// Every access goes through [`Shared::lock`], which masks interrupts for
/// the duration of the closure.
pub struct Shared<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> Shared<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Run `f` with exclusive access to the value.
    ///
    /// # Panics
    /// If called re-entrantly from inside `f`.
    #[inline]
    pub fn lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }
}
