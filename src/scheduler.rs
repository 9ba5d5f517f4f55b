//! # Scheduler
//!
//! The task table plus the round-robin policy that drives it. This module
//! is hardware-independent: the SysTick and PendSV handlers in the arch
//! port call into a [`Scheduler`] value and do nothing else with task state.
//!
//! ## Scheduling Algorithm
//!
//! At each SysTick interrupt ([`Scheduler::tick`]):
//! 1. Increment the tick counter
//! 2. Move every Blocked non-idle task whose wake tick is now to Ready
//! 3. The caller pends PendSV, so every tick is a preemption point
//!
//! In PendSV ([`Scheduler::switch_context`]):
//! 1. Record the suspended task's stack pointer
//! 2. Select the next task: scan forward from `current_task + 1`, wrapping,
//!    and take the first Ready task that is not idle; fall back to idle
//! 3. Hand back the selected task's stack pointer
//!
//! ## Idle Task
//!
//! Slot 0 is reserved for the idle task. It is always Ready, is never
//! blocked, and is only selected when no other task is Ready.

use crate::config::{IDLE_TASK, MAX_TASKS};
use crate::error::KernelError;
use crate::stack::Stack;
use crate::task::{TaskControlBlock, TaskEntry, TaskState};

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The task table: all TCBs, the running task index and the tick counter.
///
/// ## Design Notes
///
/// - All tasks are stored inline in a fixed-size array (no heap)
/// - `current_task` is the running task; there is no Running state
/// - The task set is frozen once [`Scheduler::start`] succeeds
pub struct Scheduler {
    /// Fixed-size array of TCBs. Index 0 is reserved for the idle task.
    tasks: [TaskControlBlock; MAX_TASKS],

    /// Index of the currently running task.
    current_task: usize,

    /// Number of occupied slots, counting the reserved idle slot.
    task_count: usize,

    /// Ticks since start. Wraps at `u32::MAX`.
    tick_count: u32,

    /// Set by `start()`; registration is refused afterwards.
    started: bool,
}

impl Scheduler {
    /// Create an empty table with the idle slot reserved.
    pub const fn new() -> Self {
        Self {
            tasks: [TaskControlBlock::EMPTY; MAX_TASKS],
            current_task: IDLE_TASK,
            task_count: 1,
            tick_count: 0,
            started: false,
        }
    }

    // -----------------------------------------------------------------------
    // Registration (bring-up only)
    // -----------------------------------------------------------------------

    /// Install the idle task in slot 0 and synthesize its first frame.
    pub fn register_idle(
        &mut self,
        entry: TaskEntry,
        stack: &'static Stack,
    ) -> Result<(), KernelError> {
        if self.started {
            return Err(KernelError::AlreadyStarted);
        }
        // Safety: nothing runs on a task stack before the scheduler starts.
        let sp = unsafe { stack.init_frame(entry) };
        self.tasks[IDLE_TASK].init(entry, sp);
        Ok(())
    }

    /// Register a new task and synthesize its first frame.
    ///
    /// # Returns
    /// - `Ok(task_id)` — the slot index of the new task (never 0)
    /// - `Err(TaskTableFull)` — all `MAX_TASKS` slots are in use
    /// - `Err(AlreadyStarted)` — the task set is frozen
    pub fn create_task(
        &mut self,
        entry: TaskEntry,
        stack: &'static Stack,
    ) -> Result<usize, KernelError> {
        if self.started {
            return Err(KernelError::AlreadyStarted);
        }
        if self.task_count >= MAX_TASKS {
            return Err(KernelError::TaskTableFull);
        }

        let id = self.task_count;
        // Safety: nothing runs on a task stack before the scheduler starts.
        let sp = unsafe { stack.init_frame(entry) };
        self.tasks[id].init(entry, sp);
        self.task_count += 1;
        Ok(id)
    }

    /// Freeze the task set and choose the first task to run.
    ///
    /// The first task is the lowest-numbered non-idle task, or idle if no
    /// other task was registered.
    pub fn start(&mut self) -> Result<usize, KernelError> {
        if self.started {
            return Err(KernelError::AlreadyStarted);
        }
        if !self.tasks[IDLE_TASK].is_registered() {
            return Err(KernelError::IdleTaskMissing);
        }
        self.started = true;
        self.current_task = IDLE_TASK;
        Ok(self.select_next())
    }

    // -----------------------------------------------------------------------
    // Selection policy
    // -----------------------------------------------------------------------

    /// The task that would run next, without changing any state.
    ///
    /// Scans every index exactly once starting one past `current_task`,
    /// wrapping, and returns the first Ready non-idle task. Returns
    /// [`IDLE_TASK`] when there is none.
    pub fn next_ready(&self) -> usize {
        (1..=self.task_count)
            .map(|offset| (self.current_task + offset) % self.task_count)
            .find(|&i| i != IDLE_TASK && self.tasks[i].is_ready())
            .unwrap_or(IDLE_TASK)
    }

    /// Advance `current_task` to [`Scheduler::next_ready`] and return it.
    pub fn select_next(&mut self) -> usize {
        self.current_task = self.next_ready();
        self.current_task
    }

    // -----------------------------------------------------------------------
    // Tick driver
    // -----------------------------------------------------------------------

    /// Account for one SysTick interrupt.
    ///
    /// Increments the tick counter and readies every non-idle task whose
    /// wake tick has been reached. The caller must then request a context
    /// switch.
    pub fn tick(&mut self) {
        self.tick_count = self.tick_count.wrapping_add(1);

        let now = self.tick_count;
        for tcb in &mut self.tasks[1..self.task_count] {
            tcb.wake_if_due(now);
        }
    }

    // -----------------------------------------------------------------------
    // Blocking
    // -----------------------------------------------------------------------

    /// Block the current task for `ticks` ticks.
    ///
    /// - From idle: no effect; returns `false` (no switch must be requested).
    /// - `ticks == 0`: the task stays Ready; returns `true` so the caller
    ///   yields the rest of its slice.
    /// - Otherwise: the task is Blocked until the counter reaches
    ///   `tick_count + ticks` (wrapping); returns `true`.
    ///
    /// Must be called with the scheduler locked against the tick handler.
    pub fn block_current(&mut self, ticks: u32) -> bool {
        let current = self.current_task;
        if current == IDLE_TASK {
            return false;
        }
        if ticks > 0 {
            let wake_tick = self.tick_count.wrapping_add(ticks);
            self.tasks[current].block_until(wake_tick);
        }
        true
    }

    // -----------------------------------------------------------------------
    // Context switch support
    // -----------------------------------------------------------------------

    /// Steps 3–5 of the PendSV protocol.
    ///
    /// `saved_sp` is the suspended task's PSP after R4–R11 were pushed.
    /// Returns the PSP of the selected task, pointing at its saved R4.
    pub fn switch_context(&mut self, saved_sp: *mut u32) -> *mut u32 {
        self.set_current_stack_pointer(saved_sp);
        self.select_next();
        self.current_stack_pointer()
    }

    /// Saved stack pointer of the current task.
    #[inline]
    pub fn current_stack_pointer(&self) -> *mut u32 {
        self.tasks[self.current_task].stack_pointer
    }

    /// Overwrite the saved stack pointer of the current task.
    #[inline]
    pub fn set_current_stack_pointer(&mut self, sp: *mut u32) {
        self.tasks[self.current_task].stack_pointer = sp;
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Index of the running task.
    #[inline]
    pub fn current_task(&self) -> usize {
        self.current_task
    }

    /// Ticks since start.
    #[inline]
    pub fn tick_count(&self) -> u32 {
        self.tick_count
    }

    /// Occupied slots, including idle.
    #[inline]
    pub fn task_count(&self) -> usize {
        self.task_count
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// The TCB at `id`, if that slot is registered.
    pub fn task(&self, id: usize) -> Option<&TaskControlBlock> {
        self.tasks.get(id).filter(|tcb| tcb.is_registered())
    }

    /// State of the task at `id`, if registered.
    pub fn state(&self, id: usize) -> Option<TaskState> {
        self.task(id).map(|tcb| tcb.state)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::context::{
        pop_saved_context, push_saved_context, read_exception_frame, SavedContext,
    };
    use std::boxed::Box;
    use std::vec::Vec;

    extern "C" fn idle() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    extern "C" fn task_a() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    extern "C" fn task_b() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn leak_stack() -> &'static Stack {
        Box::leak(Box::new(Stack::new()))
    }

    /// Idle plus `n` user tasks, not started.
    fn scheduler_with(n: usize) -> Scheduler {
        let mut s = Scheduler::new();
        s.register_idle(TaskEntry::new(idle), leak_stack()).unwrap();
        for _ in 0..n {
            s.create_task(TaskEntry::new(task_a), leak_stack()).unwrap();
        }
        s
    }

    /// Run one PendSV cycle against memory: push `regs` below `psp`, switch,
    /// pop the next task's registers. Returns the new PSP and registers.
    unsafe fn pendsv(
        s: &mut Scheduler,
        psp: *mut u32,
        regs: &SavedContext,
    ) -> (*mut u32, SavedContext) {
        let saved = push_saved_context(psp, regs);
        let next = s.switch_context(saved);
        let (restored, psp) = pop_saved_context(next);
        (psp, restored)
    }

    fn snapshot(from: *const u32, words: usize) -> Vec<u32> {
        unsafe { core::slice::from_raw_parts(from, words) }.to_vec()
    }

    // --- Registration ------------------------------------------------------

    #[test]
    fn test_create_task_assigns_sequential_ids() {
        let mut s = scheduler_with(0);
        assert_eq!(s.create_task(TaskEntry::new(task_a), leak_stack()), Ok(1));
        assert_eq!(s.create_task(TaskEntry::new(task_b), leak_stack()), Ok(2));
        assert_eq!(s.task_count(), 3);
        assert_eq!(s.state(2), Some(TaskState::Ready));
        assert!(s.task(3).is_none());
    }

    #[test]
    fn test_create_task_rejects_when_full() {
        let mut s = scheduler_with(MAX_TASKS - 1);
        assert_eq!(
            s.create_task(TaskEntry::new(task_a), leak_stack()),
            Err(KernelError::TaskTableFull)
        );
    }

    #[test]
    fn test_task_set_frozen_after_start() {
        let mut s = scheduler_with(1);
        s.start().unwrap();
        assert_eq!(
            s.create_task(TaskEntry::new(task_b), leak_stack()),
            Err(KernelError::AlreadyStarted)
        );
        assert_eq!(
            s.register_idle(TaskEntry::new(idle), leak_stack()),
            Err(KernelError::AlreadyStarted)
        );
        assert_eq!(s.start(), Err(KernelError::AlreadyStarted));
    }

    #[test]
    fn test_start_requires_idle() {
        let mut s = Scheduler::new();
        s.create_task(TaskEntry::new(task_a), leak_stack()).unwrap();
        assert_eq!(s.start(), Err(KernelError::IdleTaskMissing));
    }

    #[test]
    fn test_start_picks_first_user_task() {
        let mut s = scheduler_with(3);
        assert_eq!(s.start(), Ok(1));
        assert_eq!(s.current_task(), 1);
    }

    #[test]
    fn test_start_with_only_idle() {
        let mut s = scheduler_with(0);
        assert_eq!(s.start(), Ok(IDLE_TASK));
    }

    // --- Selection ---------------------------------------------------------

    #[test]
    fn test_round_robin_visits_every_ready_task_in_order() {
        let mut s = scheduler_with(4);
        s.start().unwrap();
        let order: Vec<usize> = (0..8).map(|_| s.select_next()).collect();
        assert_eq!(order, [2, 3, 4, 1, 2, 3, 4, 1]);
    }

    #[test]
    fn test_selection_skips_blocked_tasks() {
        let mut s = scheduler_with(4);
        s.start().unwrap();
        s.tasks[2].block_until(100);
        s.tasks[4].block_until(100);
        let order: Vec<usize> = (0..4).map(|_| s.select_next()).collect();
        assert_eq!(order, [3, 1, 3, 1]);
    }

    #[test]
    fn test_single_ready_task_is_reselected() {
        let mut s = scheduler_with(2);
        s.start().unwrap();
        s.tasks[2].block_until(100);
        assert_eq!(s.select_next(), 1);
        assert_eq!(s.select_next(), 1);
    }

    #[test]
    fn test_idle_selected_when_all_blocked() {
        let mut s = scheduler_with(3);
        s.start().unwrap();
        for id in 1..=3 {
            s.tasks[id].block_until(50);
        }
        for _ in 0..5 {
            assert_eq!(s.select_next(), IDLE_TASK);
        }

        // Leaving idle resumes the rotation from the lowest index
        s.tasks[2].state = TaskState::Ready;
        assert_eq!(s.select_next(), 2);
    }

    #[test]
    fn test_selection_always_returns_ready_task() {
        // Every blocked/ready combination of four user tasks, from every
        // possible current index
        let mut s = scheduler_with(4);
        s.start().unwrap();
        for mask in 0u32..16 {
            for id in 1..=4 {
                s.tasks[id].state = if mask & (1 << (id - 1)) != 0 {
                    TaskState::Ready
                } else {
                    TaskState::Blocked
                };
            }
            for current in 0..=4 {
                s.current_task = current;
                let next = s.next_ready();
                assert!(s.tasks[next].is_ready());
                if mask == 0 {
                    assert_eq!(next, IDLE_TASK);
                } else {
                    assert_ne!(next, IDLE_TASK);
                }
            }
        }
    }

    #[test]
    fn test_next_ready_does_not_mutate() {
        let mut s = scheduler_with(2);
        s.start().unwrap();
        assert_eq!(s.next_ready(), 2);
        assert_eq!(s.current_task(), 1);
    }

    // --- Tick driver and blocking -----------------------------------------

    #[test]
    fn test_delay_blocks_until_exact_tick() {
        let mut s = scheduler_with(2);
        s.start().unwrap();
        for _ in 0..5 {
            s.tick();
        }

        // Task 1 delays 3 at tick 5
        assert!(s.block_current(3));
        assert_eq!(s.state(1), Some(TaskState::Blocked));

        s.tick(); // 6
        assert_eq!(s.state(1), Some(TaskState::Blocked));
        s.tick(); // 7
        assert_eq!(s.state(1), Some(TaskState::Blocked));
        s.tick(); // 8
        assert_eq!(s.state(1), Some(TaskState::Ready));
    }

    #[test]
    fn test_delay_across_tick_wraparound() {
        let mut s = scheduler_with(1);
        s.start().unwrap();
        s.tick_count = u32::MAX - 1;

        assert!(s.block_current(4));
        assert_eq!(s.task(1).unwrap().wake_tick, 2);

        s.tick(); // u32::MAX
        s.tick(); // 0
        s.tick(); // 1
        assert_eq!(s.state(1), Some(TaskState::Blocked));
        s.tick(); // 2
        assert_eq!(s.state(1), Some(TaskState::Ready));
    }

    #[test]
    fn test_zero_delay_yields_without_blocking() {
        let mut s = scheduler_with(2);
        s.start().unwrap();
        assert!(s.block_current(0));
        assert_eq!(s.state(1), Some(TaskState::Ready));
        assert_eq!(s.select_next(), 2);
    }

    #[test]
    fn test_delay_from_idle_is_ignored() {
        let mut s = scheduler_with(1);
        s.start().unwrap();
        s.tasks[1].block_until(10);
        assert_eq!(s.select_next(), IDLE_TASK);

        assert!(!s.block_current(5));
        assert_eq!(s.state(IDLE_TASK), Some(TaskState::Ready));
        assert_eq!(s.task(IDLE_TASK).unwrap().wake_tick, 0);
    }

    #[test]
    fn test_tick_never_touches_idle() {
        let mut s = scheduler_with(1);
        s.tasks[IDLE_TASK].wake_tick = 1;
        s.tasks[IDLE_TASK].state = TaskState::Blocked;
        s.tick();
        assert_eq!(s.tasks[IDLE_TASK].state, TaskState::Blocked);
    }

    #[test]
    fn test_delay_scenario_two_tasks() {
        // A (1) delays 2 at tick 0, B (2) never blocks
        let mut s = scheduler_with(2);
        let mut trace = Vec::new();
        trace.push(s.start().unwrap());

        assert!(s.block_current(2));
        trace.push(s.select_next()); // switch requested by the delay

        for _ in 1..=3 {
            s.tick();
            trace.push(s.select_next());
        }

        // A runs, B takes over for ticks 0 and 1, A rejoins at tick 2
        assert_eq!(trace, [1, 2, 2, 1, 2]);
    }

    // --- Context switch ----------------------------------------------------

    #[test]
    fn test_switch_records_and_returns_stack_pointers() {
        let mut s = scheduler_with(2);
        s.start().unwrap();
        let b_initial = s.task(2).unwrap().stack_pointer;

        let fake_sp = 0x2000_1000usize as *mut u32;
        let next = s.switch_context(fake_sp);

        assert_eq!(s.current_task(), 2);
        assert_eq!(next, b_initial);
        assert_eq!(s.task(1).unwrap().stack_pointer, fake_sp);
    }

    #[test]
    fn test_first_switch_enters_task_at_its_entry() {
        let mut s = Scheduler::new();
        s.register_idle(TaskEntry::new(idle), leak_stack()).unwrap();
        s.create_task(TaskEntry::new(task_a), leak_stack()).unwrap();
        let b_stack = leak_stack();
        s.create_task(TaskEntry::new(task_b), b_stack).unwrap();
        s.start().unwrap();

        // Task A is running somewhere on its stack
        let a_psp = unsafe { s.current_stack_pointer().add(SavedContext::WORDS) };
        let (psp, regs) = unsafe { pendsv(&mut s, a_psp, &SavedContext::default()) };

        assert_eq!(s.current_task(), 2);
        assert_eq!(regs, SavedContext::default());
        let frame = unsafe { read_exception_frame(psp) };
        assert_eq!(frame.pc, (TaskEntry::new(task_b).address() as u32) & !1);
        assert_eq!(psp.wrapping_add(8), b_stack.top());
    }

    #[test]
    fn test_suspend_resume_preserves_registers() {
        let mut s = scheduler_with(2);
        s.start().unwrap();

        let a_regs = SavedContext {
            r4: 0xA4, r5: 0xA5, r6: 0xA6, r7: 0xA7, r8: 0xA8, r9: 0xA9, r10: 0xAA, r11: 0xAB,
        };
        let b_regs = SavedContext {
            r4: 0xB4, r5: 0xB5, r6: 0xB6, r7: 0xB7, r8: 0xB8, r9: 0xB9, r10: 0xBA, r11: 0xBB,
        };

        // A suspended with its registers, B starts from its initial frame
        let a_psp = unsafe { s.current_stack_pointer().add(SavedContext::WORDS) };
        let (b_psp, _) = unsafe { pendsv(&mut s, a_psp, &a_regs) };
        assert_eq!(s.current_task(), 2);

        // B suspended, A comes back with exactly what it left
        let (psp, regs) = unsafe { pendsv(&mut s, b_psp, &b_regs) };
        assert_eq!(s.current_task(), 1);
        assert_eq!(psp, a_psp);
        assert_eq!(regs, a_regs);

        // And B in turn
        let (psp, regs) = unsafe { pendsv(&mut s, psp, &regs) };
        assert_eq!(s.current_task(), 2);
        assert_eq!(psp, b_psp);
        assert_eq!(regs, b_regs);
    }

    #[test]
    fn test_repeated_suspend_resume_is_byte_identical() {
        let mut s = scheduler_with(1);
        s.start().unwrap();

        let regs = SavedContext { r4: 1, r5: 2, r6: 3, r7: 4, r8: 5, r9: 6, r10: 7, r11: 8 };
        let mut psp = unsafe { s.current_stack_pointer().add(SavedContext::WORDS) };
        let mut regs = regs;
        let frame_base = unsafe { psp.sub(SavedContext::WORDS) };

        // Only one user task: each switch resumes the same task
        let mut snapshots = Vec::new();
        for _ in 0..5 {
            let (next_psp, next_regs) = unsafe { pendsv(&mut s, psp, &regs) };
            assert_eq!(s.current_task(), 1);
            snapshots.push(snapshot(frame_base, 16));
            psp = next_psp;
            regs = next_regs;
        }
        assert!(snapshots.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(regs.r11, 8);
    }

    #[test]
    fn test_blocked_task_frame_untouched_while_others_run() {
        let mut s = scheduler_with(2);
        s.start().unwrap();

        let a_regs = SavedContext { r4: 0xDEAD, r11: 0xBEEF, ..SavedContext::default() };
        let a_psp = unsafe { s.current_stack_pointer().add(SavedContext::WORDS) };

        assert!(s.block_current(3));
        let (mut psp, mut regs) = unsafe { pendsv(&mut s, a_psp, &a_regs) };
        let a_saved = s.task(1).unwrap().stack_pointer;
        let before = snapshot(a_saved, 16);

        // B runs alone until A's wake tick
        for _ in 0..2 {
            s.tick();
            let (p, r) = unsafe { pendsv(&mut s, psp, &regs) };
            assert_eq!(s.current_task(), 2);
            psp = p;
            regs = r;
        }
        assert_eq!(snapshot(a_saved, 16), before);

        s.tick();
        let (psp, regs) = unsafe { pendsv(&mut s, psp, &regs) };
        assert_eq!(s.current_task(), 1);
        assert_eq!(psp, a_psp);
        assert_eq!(regs, a_regs);
    }
}
