//! # RROS Configuration
//!
//! Compile-time constants governing the kernel. The task set, stack sizes
//! and tick rate are all fixed at build time — no dynamic allocation.

/// Number of task slots, including the idle task at index 0.
///
/// The demo firmware uses four user tasks plus idle.
pub const MAX_TASKS: usize = 5;

/// Index reserved for the idle task.
pub const IDLE_TASK: usize = 0;

/// SysTick frequency in Hz. One tick is one time slice.
pub const TICK_HZ: u32 = 1000;

/// SysTick input clock in Hz (STM32F303 HSI, no PLL configured).
pub const SYSTICK_CLOCK_HZ: u32 = 8_000_000;

/// Per-task stack size in bytes. Must cover the deepest call chain of the
/// task plus the 64-byte context frame kept on the stack while suspended.
pub const STACK_SIZE: usize = 1024;

/// PendSV priority: lowest, so a context switch never preempts another
/// handler.
pub const PENDSV_PRIORITY: u8 = 0xFF;

/// SysTick priority: above PendSV so tick bookkeeping completes before the
/// pended switch is serviced.
pub const SYSTICK_PRIORITY: u8 = 0x80;

const _: () = assert!(MAX_TASKS >= 1, "the idle slot is mandatory");
const _: () = assert!(STACK_SIZE % 8 == 0, "AAPCS requires 8-byte stack alignment");
