//! # Task Stacks and Initial Frames
//!
//! Each task owns one [`Stack`] for its whole lifetime. Before the task first
//! runs, [`build_initial_frame`] writes a context frame at the top of the
//! stack so that the first PendSV "return" into the task lands on its entry
//! function.

use core::cell::UnsafeCell;

use crate::config::STACK_SIZE;
use crate::context::{
    self, ExceptionFrame, SavedContext, CONTEXT_FRAME_BYTES, EXC_RETURN_THREAD_PSP, INITIAL_XPSR,
};
use crate::task::TaskEntry;

/// Bytes consumed at the top of a stack by the synthesized frame.
pub const INITIAL_FRAME_BYTES: usize = CONTEXT_FRAME_BYTES;

const STACK_WORDS: usize = STACK_SIZE / 4;

const _: () = assert!(STACK_SIZE > INITIAL_FRAME_BYTES, "stack cannot hold the initial frame");

/// A private task stack. Aligned to 8 bytes as required by the AAPCS.
#[repr(C, align(8))]
pub struct Stack {
    words: UnsafeCell<[u32; STACK_WORDS]>,
}

// Safety: a stack is only written by the task that owns it, by the frame
// builder before that task first runs, and by the context switch while the
// task is suspended. Those never overlap.
unsafe impl Sync for Stack {}

impl Stack {
    pub const fn new() -> Self {
        Self {
            words: UnsafeCell::new([0; STACK_WORDS]),
        }
    }

    /// One past the highest word of the stack (full-descending initial SP).
    pub fn top(&self) -> *mut u32 {
        self.words.get().cast::<u32>().wrapping_add(STACK_WORDS)
    }

    /// Lowest word of the stack.
    pub fn bottom(&self) -> *const u32 {
        self.words.get().cast::<u32>()
    }

    /// Write the initial frame for `entry` at the top of this stack.
    ///
    /// # Safety
    /// The task owning this stack must not be running.
    pub unsafe fn init_frame(&self, entry: TaskEntry) -> *mut u32 {
        build_initial_frame(self.top(), entry)
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

/// Synthesize the first-run frame for `entry` below `top`.
///
/// Layout, high to low: xPSR, PC = `entry`, LR = EXC_RETURN, R12, R3–R0,
/// then R11–R4. Everything except xPSR, PC and LR is zero. Returns the
/// pointer to hand to the context switch's restore path.
///
/// # Safety
/// `top` must be the 8-byte aligned top of a stack with at least
/// [`INITIAL_FRAME_BYTES`] writable bytes below it, and no code may be
/// running on that stack.
pub unsafe fn build_initial_frame(top: *mut u32, entry: TaskEntry) -> *mut u32 {
    let hardware = ExceptionFrame {
        lr: EXC_RETURN_THREAD_PSP,
        // Exception return expects a halfword-aligned PC; the Thumb state
        // comes from xPSR.T instead of bit 0.
        pc: (entry.address() as u32) & !1,
        xpsr: INITIAL_XPSR,
        ..ExceptionFrame::default()
    };
    let sp = context::push_exception_frame(top, &hardware);
    context::push_saved_context(sp, &SavedContext::default())
}
