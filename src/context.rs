//! # Context Frames
//!
//! Layout of the register state a suspended task keeps on its own stack.
//!
//! ```text
//!   high address
//!   ┌───────────────────────────────┐
//!   │ xPSR PC LR R12 R3 R2 R1 R0    │  ExceptionFrame (stacked by hardware)
//!   ├───────────────────────────────┤
//!   │ R11 R10 R9 R8 R7 R6 R5 R4     │  SavedContext (stacked by PendSV)
//!   └───────────────────────────────┘  <- saved stack pointer
//!   low address
//! ```
//!
//! PendSV does the save/restore with `stmdb`/`ldmia`. The functions here are
//! the same operations written against memory, used by bring-up to unwrap
//! a synthesized frame and by the host tests to drive the scheduler through
//! full suspend/resume cycles.

use core::ptr;

/// EXC_RETURN value: return to Thread mode, use the process stack, no FPU
/// state.
pub const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

/// Initial xPSR: only the Thumb bit set, no active exception.
pub const INITIAL_XPSR: u32 = 0x0100_0000;

/// Registers pushed by PendSV below the hardware frame, R4 at the lowest
/// address.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SavedContext {
    pub r4: u32,
    pub r5: u32,
    pub r6: u32,
    pub r7: u32,
    pub r8: u32,
    pub r9: u32,
    pub r10: u32,
    pub r11: u32,
}

impl SavedContext {
    pub const WORDS: usize = 8;
}

/// Registers stacked by the processor on exception entry, R0 at the lowest
/// address.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExceptionFrame {
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r12: u32,
    pub lr: u32,
    pub pc: u32,
    pub xpsr: u32,
}

impl ExceptionFrame {
    pub const WORDS: usize = 8;
}

/// Bytes a suspended task holds on its stack for its full context.
pub const CONTEXT_FRAME_BYTES: usize = (SavedContext::WORDS + ExceptionFrame::WORDS) * 4;

const _: () = assert!(core::mem::size_of::<SavedContext>() == SavedContext::WORDS * 4);
const _: () = assert!(core::mem::size_of::<ExceptionFrame>() == ExceptionFrame::WORDS * 4);

/// Push `ctx` below `sp`, the way `stmdb sp!, {r4-r11}` does.
///
/// # Safety
/// The `SavedContext::WORDS` words below `sp` must be writable and belong
/// to the same stack.
pub unsafe fn push_saved_context(sp: *mut u32, ctx: &SavedContext) -> *mut u32 {
    let sp = sp.sub(SavedContext::WORDS);
    ptr::write(sp.cast::<SavedContext>(), *ctx);
    sp
}

/// Pop a saved context from `sp`, the way `ldmia sp!, {r4-r11}` does.
///
/// Returns the registers and the pointer to the hardware frame above them.
///
/// # Safety
/// `sp` must point at a saved context frame.
pub unsafe fn pop_saved_context(sp: *mut u32) -> (SavedContext, *mut u32) {
    let ctx = ptr::read(sp.cast::<SavedContext>());
    (ctx, sp.add(SavedContext::WORDS))
}

/// Write a hardware exception frame below `sp`.
///
/// # Safety
/// The `ExceptionFrame::WORDS` words below `sp` must be writable.
pub unsafe fn push_exception_frame(sp: *mut u32, frame: &ExceptionFrame) -> *mut u32 {
    let sp = sp.sub(ExceptionFrame::WORDS);
    ptr::write(sp.cast::<ExceptionFrame>(), *frame);
    sp
}

/// Read the hardware exception frame at `sp`.
///
/// # Safety
/// `sp` must point at an exception frame.
pub unsafe fn read_exception_frame(sp: *const u32) -> ExceptionFrame {
    ptr::read(sp.cast::<ExceptionFrame>())
}
