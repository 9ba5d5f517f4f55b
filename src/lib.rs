//! # RROS — Round-Robin Operating System
//!
//! A minimal preemptive, priority-flat, round-robin Real-Time Operating
//! System kernel for ARM Cortex-M4 microcontrollers.
//!
//! ## Overview
//!
//! A fixed set of tasks, each with a private stack, share one core. The
//! SysTick interrupt marks every time slice; each tick wakes tasks whose
//! delay has expired and pends PendSV, which switches to the next Ready
//! task in round-robin order. An idle task at index 0 runs only when every
//! other task is blocked.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                   │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                 │
//! │     init() · create_task() · start() · task_delay()    │
//! ├───────────────────────────────┬────────────────────────┤
//! │  Scheduler (scheduler.rs)     │  Sync (sync.rs)        │
//! │  ─ tick()                     │  ─ Shared<T>           │
//! │  ─ select_next()              │  ─ critical_section    │
//! │  ─ block_current()            │                        │
//! │  ─ switch_context()           │                        │
//! ├───────────────────────────────┴────────────────────────┤
//! │  Task Model (task.rs) · Stacks & Frames (stack.rs,     │
//! │  context.rs)                                           │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch Port (arch/cortex_m4.rs)               │
//! │    PendSV · SysTick · First task launch · Faults       │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)               │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically allocated
//! - **Fixed-size TCB array**: `[TaskControlBlock; MAX_TASKS]`
//! - **Per-task stack**: one static [`stack::Stack`] per slot
//! - **Scheduler stack**: MSP, set up by `cortex-m-rt` from `memory.x`
//! - **Critical sections**: `critical_section::with()` for shared state
//!
//! ## Host Testing
//!
//! Everything except `kernel` and `arch` is hardware-independent and is
//! unit-tested on the host. Those two modules are only built for bare-metal
//! targets.

#![no_std]

pub mod config;
pub mod context;
pub mod error;
pub mod scheduler;
pub mod stack;
pub mod sync;
pub mod task;

#[cfg(target_os = "none")]
pub mod arch;
#[cfg(target_os = "none")]
pub mod kernel;

pub use error::KernelError;
pub use scheduler::Scheduler;
pub use task::{TaskEntry, TaskState};
