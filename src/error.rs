//! Errors reported by the kernel during bring-up.
//!
//! Once the scheduler is running nothing in it can fail; the only errors
//! come from misuse of task registration and `start()`.

use core::fmt;

/// Errors returned by task registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum KernelError {
    /// Every slot of the task table is already in use.
    TaskTableFull,
    /// The scheduler has started; the task set is frozen.
    AlreadyStarted,
    /// `start()` was called before an idle task was registered.
    IdleTaskMissing,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::TaskTableFull => f.write_str("task table is full"),
            KernelError::AlreadyStarted => f.write_str("scheduler already started"),
            KernelError::IdleTaskMissing => f.write_str("no idle task registered"),
        }
    }
}
