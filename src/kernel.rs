//! # Kernel
//!
//! Top-level kernel initialization and public API for RROS.
//!
//! The kernel owns the one global [`Scheduler`] and the static task stacks.
//! Every access to the scheduler from task context, SysTick or PendSV goes
//! through [`Shared::lock`], i.e. with interrupts masked.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt, MSP = _stack_start)
//!   └─► main()
//!         ├─► kernel::init()        ← Register the idle task
//!         ├─► kernel::create_task() ← Register tasks (×N)
//!         └─► kernel::start()       ← Launch scheduler (no return)
//!               ├─► Enable MemManage/BusFault/UsageFault
//!               ├─► Set PendSV/SysTick priorities
//!               ├─► Configure SysTick
//!               └─► Switch to PSP and jump into the first task
//! ```

use crate::arch::cortex_m4;
use crate::config::{MAX_TASKS, TICK_HZ};
use crate::context::{self, ExceptionFrame};
use crate::error::KernelError;
use crate::scheduler::Scheduler;
use crate::stack::Stack;
use crate::sync::Shared;
use crate::task::TaskEntry;

// ---------------------------------------------------------------------------
// Global state
// ---------------------------------------------------------------------------

/// The task table and tick counter.
static SCHEDULER: Shared<Scheduler> = Shared::new(Scheduler::new());

/// One private stack per task slot; slot 0 belongs to idle.
static STACKS: [Stack; MAX_TASKS] = [const { Stack::new() }; MAX_TASKS];

/// Body of the idle task: sleep until the next interrupt.
extern "C" fn idle_task() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Initialize the kernel by registering the idle task.
///
/// Must be called before [`create_task`].
pub fn init() -> Result<(), KernelError> {
    SCHEDULER.lock(|s| s.register_idle(TaskEntry::new(idle_task), &STACKS[0]))?;
    defmt::debug!("idle task registered, stack top @ {=usize:#010x}", STACKS[0].top() as usize);
    Ok(())
}

/// Register a new task.
///
/// # Parameters
/// - `entry`: task entry function. Must be `extern "C" fn() -> !` (never
///   returns).
///
/// # Returns
/// - `Ok(task_id)`: the task's slot index
/// - `Err(KernelError::TaskTableFull)`: all `MAX_TASKS` slots are used
/// - `Err(KernelError::AlreadyStarted)`: called after [`start`]
///
/// # Example
/// ```ignore
/// kernel::create_task(blink_green).unwrap();
/// ```
pub fn create_task(entry: extern "C" fn() -> !) -> Result<usize, KernelError> {
    let id = SCHEDULER.lock(|s| {
        let stack = STACKS.get(s.task_count()).ok_or(KernelError::TaskTableFull)?;
        s.create_task(TaskEntry::new(entry), stack)
    })?;
    defmt::info!("task {=usize} created", id);
    Ok(id)
}

/// Start the scheduler. **Does not return.**
///
/// Enables fault reporting, sets the PendSV/SysTick priorities, starts the
/// SysTick timer and launches the first task on its own process stack.
/// Halts if the kernel was not initialized or was already started.
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> ! {
    // Nothing may preempt bring-up: a tick before the PSP switch would make
    // PendSV save a task context that does not exist yet.
    cortex_m::interrupt::disable();

    if !cortex_m4::on_scheduler_stack() {
        defmt::error!("start() called from process stack");
        cortex_m4::halt();
    }

    cortex_m4::enable_processor_faults(&mut core_peripherals.SCB);
    cortex_m4::set_interrupt_priorities(&mut core_peripherals.SCB);

    let started = SCHEDULER.lock(|s| s.start().map(|id| (id, s.current_stack_pointer())));
    let (first, first_sp) = match started {
        Ok(started) => started,
        Err(err) => {
            defmt::error!("scheduler start failed: {}", err);
            cortex_m4::halt();
        }
    };

    // The first task is not resumed by PendSV: unwrap its synthesized frame
    // here and branch to the entry with an empty stack.
    // Safety: `first_sp` was produced by the frame builder and the task has
    // not run.
    let (psp, entry) = unsafe {
        let (_, hw_sp) = context::pop_saved_context(first_sp);
        let frame = context::read_exception_frame(hw_sp);
        (hw_sp.add(ExceptionFrame::WORDS), frame.pc)
    };

    cortex_m4::configure_systick(&mut core_peripherals.SYST, TICK_HZ);
    defmt::info!("scheduler started at {=u32} Hz, first task {=usize}", TICK_HZ, first);

    // Safety: single call from bring-up, interrupts masked, valid stack.
    unsafe { cortex_m4::start_first_task(psp, entry) }
}

/// Block the calling task for `ticks` scheduler ticks.
///
/// Returns once the task has been selected again, at least `ticks` ticks
/// later. `task_delay(0)` gives up the rest of the current slice without
/// blocking. Called from the idle task it does nothing.
pub fn task_delay(ticks: u32) {
    let switch = SCHEDULER.lock(|s| {
        let switch = s.block_current(ticks);
        if switch {
            // Pended under the lock; PendSV fires when interrupts unmask.
            cortex_m4::request_switch();
        }
        switch
    });
    if switch {
        defmt::trace!("task resumed after {=u32}-tick delay", ticks);
    } else {
        defmt::warn!("task_delay ignored in idle task");
    }
}

/// Ticks elapsed since [`start`].
pub fn tick_count() -> u32 {
    SCHEDULER.lock(|s| s.tick_count())
}

/// Index of the running task.
pub fn current_task() -> usize {
    SCHEDULER.lock(|s| s.current_task())
}

// ---------------------------------------------------------------------------
// Handler entry points
// ---------------------------------------------------------------------------

/// SysTick: advance the tick counter and wake due tasks.
pub(crate) fn on_tick() {
    SCHEDULER.lock(|s| s.tick());
}

/// PendSV: record `saved_sp` for the suspended task, return the next PSP.
pub(crate) fn switch_context(saved_sp: *mut u32) -> *mut u32 {
    SCHEDULER.lock(|s| s.switch_context(saved_sp))
}
