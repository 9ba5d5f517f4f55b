//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor.
//! Implements context switching via PendSV, SysTick configuration, first
//! task launch and processor fault reporting.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): used by bring-up and interrupt handlers
//! - **PSP** (Process Stack Pointer): used by tasks in Thread mode
//!
//! On exception entry, the hardware automatically stacks R0–R3, R12, LR, PC,
//! and xPSR onto the process stack. The PendSV handler manually saves and
//! restores R4–R11, which completes the full context save/restore.
//!
//! ## Interrupt Priorities
//!
//! - SysTick: `SYSTICK_PRIORITY` (0x80)
//! - PendSV: `PENDSV_PRIORITY` (0xFF, lowest) — runs only after SysTick and
//!   every other ISR has finished
//!
//! Tasks must not use the FPU: the switch assumes the basic (non-FP)
//! exception frame. Build for `thumbv7em-none-eabi`.

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::scb::{Exception, SystemHandler};
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};
use cortex_m::register::control::{self, Spsel};
use cortex_m_rt::{exception, ExceptionFrame};

use crate::config::{PENDSV_PRIORITY, SYSTICK_CLOCK_HZ, SYSTICK_PRIORITY};
use crate::context::EXC_RETURN_THREAD_PSP;
use crate::kernel;

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// SysTick reload value for `tick_hz` interrupts per second.
pub const fn systick_reload(tick_hz: u32) -> u32 {
    SYSTICK_CLOCK_HZ / tick_hz - 1
}

/// Configure SysTick to interrupt at `tick_hz` from the processor clock.
pub fn configure_systick(syst: &mut SYST, tick_hz: u32) {
    let reload = systick_reload(tick_hz);
    // SysTick has a 24-bit reload register
    assert!(reload <= 0x00FF_FFFF, "tick rate too low for SysTick");

    syst.set_clock_source(SystClkSource::Core);
    syst.set_reload(reload);
    syst.clear_current();
    syst.enable_interrupt();
    syst.enable_counter();
}

// ---------------------------------------------------------------------------
// PendSV trigger
// ---------------------------------------------------------------------------

/// Request a context switch by pending PendSV.
///
/// The switch runs as soon as no higher-priority exception is active and
/// interrupts are unmasked: immediately from task context, after the
/// current handler returns from an ISR.
#[inline]
pub fn request_switch() {
    SCB::set_pendsv();
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

// ---------------------------------------------------------------------------
// Bring-up
// ---------------------------------------------------------------------------

/// Enable the configurable fault exceptions so MemManage, BusFault and
/// UsageFault get their own handlers instead of escalating to HardFault.
pub fn enable_processor_faults(scb: &mut SCB) {
    scb.enable(Exception::MemoryManagement);
    scb.enable(Exception::BusFault);
    scb.enable(Exception::UsageFault);
}

/// Set SysTick above PendSV so tick bookkeeping always completes before a
/// pended switch runs.
pub fn set_interrupt_priorities(scb: &mut SCB) {
    // Safety: called before the scheduler starts, when no priority-based
    // critical section is in use.
    unsafe {
        scb.set_priority(SystemHandler::PendSV, PENDSV_PRIORITY);
        scb.set_priority(SystemHandler::SysTick, SYSTICK_PRIORITY);
    }
}

/// Whether the processor runs Thread mode on the main (scheduler) stack,
/// as it does from reset.
pub fn on_scheduler_stack() -> bool {
    control::read().spsel() == Spsel::Msp
}

/// Start the first task: switch Thread mode to PSP and branch to its entry.
///
/// `psp` is the task's empty stack top (its synthesized frame already
/// unwrapped by the caller). Interrupts are unmasked as the last step, so
/// no tick can land while Thread mode is still on MSP.
///
/// # Safety
/// Must only be called once, from bring-up, with interrupts masked, a valid
/// task stack and the address of a function that never returns.
pub unsafe fn start_first_task(psp: *mut u32, entry: u32) -> ! {
    asm!(
        "msr psp, r0",
        // CONTROL.SPSEL = 1: Thread mode uses PSP, stays privileged
        "movs r2, #2",
        "msr control, r2",
        "isb",
        "cpsie i",
        "bx r1",
        in("r0") psp,
        in("r1") entry | 1,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler — performs the actual context switch.
///
/// ## Sequence
/// 1. Read PSP (just below the hardware-stacked frame)
/// 2. Push R4–R11 onto the task stack
/// 3–5. `pendsv_switch`: store that PSP in the current TCB, select the next
///    task, return its saved PSP
/// 6. Pop R4–R11 from the new task stack
/// 7. Set PSP and return to Thread mode on PSP; hardware restores R0–R3,
///    R12, LR, PC and xPSR
///
/// # Safety
/// Naked handler entered only by the NVIC. Nothing between the push and
/// the pop may touch R4–R11 other than through AAPCS-preserving calls.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "bl {switch}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "ldr lr, ={exc_return}",
        "bx lr",
        switch = sym pendsv_switch,
        exc_return = const EXC_RETURN_THREAD_PSP,
    );
}

/// Called from PendSV with the suspended task's PSP, returns the next one.
extern "C" fn pendsv_switch(saved_sp: *mut u32) -> *mut u32 {
    kernel::switch_context(saved_sp)
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler — one time slice has elapsed.
#[exception]
fn SysTick() {
    kernel::on_tick();
    request_switch();
}

// ---------------------------------------------------------------------------
// Fault handlers
// ---------------------------------------------------------------------------

/// Stop the system for good. Faults are not recoverable.
pub fn halt() -> ! {
    cortex_m::interrupt::disable();
    loop {
        cortex_m::asm::wfi();
    }
}

#[exception]
unsafe fn HardFault(frame: &ExceptionFrame) -> ! {
    defmt::error!(
        "HardFault! pc={=u32:#010x} lr={=u32:#010x} xpsr={=u32:#010x}",
        frame.pc(),
        frame.lr(),
        frame.xpsr()
    );
    halt()
}

#[exception]
fn MemoryManagement() -> ! {
    defmt::error!("MemManage fault!");
    halt()
}

#[exception]
fn BusFault() -> ! {
    defmt::error!("BusFault!");
    halt()
}

#[exception]
fn UsageFault() -> ! {
    defmt::error!("UsageFault!");
    halt()
}

const _: () = assert!(systick_reload(crate::config::TICK_HZ) <= 0x00FF_FFFF);
