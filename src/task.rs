//! # Task Control Block
//!
//! Defines the per-task record kept in the scheduler's task table.
//!
//! A task is either Ready or Blocked. "Running" is not stored: the running
//! task is whichever index the scheduler holds as `current_task`.

use core::fmt;

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Scheduling state of a task.
///
/// ```text
///   ┌──────────┐    block_until()    ┌──────────┐
///   │  Ready   │ ──────────────────► │ Blocked  │
///   └──────────┘                     └──────────┘
///        ▲                                │
///        │    wake_if_due() at wake_tick  │
///        └────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum TaskState {
    /// Eligible for selection by the scheduler.
    Ready,
    /// Waiting for the tick counter to reach `wake_tick`.
    Blocked,
}

// ---------------------------------------------------------------------------
// Task entry point
// ---------------------------------------------------------------------------

/// A task's top-level function.
///
/// The function is entered once, through a synthesized exception frame, and
/// must never return: its stacked LR is the EXC_RETURN sentinel, so a return
/// ends in a fault.
#[derive(Clone, Copy)]
pub struct TaskEntry(extern "C" fn() -> !);

impl TaskEntry {
    /// Wrap a task function.
    pub const fn new(entry: extern "C" fn() -> !) -> Self {
        Self(entry)
    }

    /// Address of the entry function, including the Thumb bit on Arm.
    #[inline]
    pub fn address(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TaskEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskEntry({:#x})", self.address())
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block (TCB).
///
/// TCBs are stored in a fixed array inside the scheduler. The task's stack
/// lives elsewhere (see [`crate::stack::Stack`]); the TCB only holds the
/// saved process stack pointer into it.
pub struct TaskControlBlock {
    /// Saved process stack pointer. Points at the saved context frame
    /// (R4 first) while the task is suspended; stale while it runs.
    pub stack_pointer: *mut u32,

    /// Tick counter value at which a Blocked task becomes Ready.
    /// Meaningless while the task is Ready.
    pub wake_tick: u32,

    /// Current scheduling state.
    pub state: TaskState,

    /// Entry function. `None` marks a slot that has not been registered.
    pub entry: Option<TaskEntry>,
}

// Safety: `stack_pointer` points into the task's own static stack. It is
// only dereferenced by the context switch, with the scheduler locked.
unsafe impl Send for TaskControlBlock {}

impl TaskControlBlock {
    /// An unregistered slot, used to fill the static table.
    pub const EMPTY: Self = Self {
        stack_pointer: core::ptr::null_mut(),
        wake_tick: 0,
        state: TaskState::Ready,
        entry: None,
    };

    /// Register the slot with its entry function and synthesized frame.
    pub fn init(&mut self, entry: TaskEntry, stack_pointer: *mut u32) {
        self.stack_pointer = stack_pointer;
        self.wake_tick = 0;
        self.state = TaskState::Ready;
        self.entry = Some(entry);
    }

    /// Ready → Blocked until the tick counter equals `wake_tick`.
    pub fn block_until(&mut self, wake_tick: u32) {
        self.wake_tick = wake_tick;
        self.state = TaskState::Blocked;
    }

    /// Blocked → Ready if `now` is this task's wake tick.
    ///
    /// Returns `true` if the task was woken.
    pub fn wake_if_due(&mut self, now: u32) -> bool {
        if self.state == TaskState::Blocked && self.wake_tick == now {
            self.state = TaskState::Ready;
            true
        } else {
            false
        }
    }

    /// Whether the slot holds a registered task.
    #[inline]
    pub fn is_registered(&self) -> bool {
        self.entry.is_some()
    }

    /// Whether the task may be selected.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.is_registered() && self.state == TaskState::Ready
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
