//! # rrkernel — a preemptive round-robin kernel
//!
//! A minimal real-time kernel for single-core ARM Cortex-M4
//! microcontrollers. A fixed set of tasks is multiplexed onto the CPU by
//! the SysTick interrupt; each tick saves the running task's registers on its
//! private stack, picks the next Ready task in index order and resumes it
//! through the processor's own exception-return mechanism.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │   init() · start() · yield_now() · block() · sleep()   │
//! ├──────────────────────────┬─────────────────────────────┤
//! │  Scheduler (scheduler.rs)│  TCB table (task.rs)        │
//! │  ─ on_tick()             │  ─ Ready/Running/Blocked    │
//! │  ─ switch()              │  ─ saved sp, region, entry  │
//! ├──────────────────────────┴─────────────────────────────┤
//! │  Stack layout (layout.rs) · Saved context (context.rs) │
//! ├────────────────────────────────────────────────────────┤
//! │  Port trait (port.rs) ◄── Arch port (arch/cortex_m4.rs) │
//! │                           SysTick · PendSV · SVCall     │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: every table is fixed-size and statically sized
//! - **Stacks**: `MAX_TASKS + 1` equal regions carved top-down from a
//!   reserved SRAM range, one per task plus the idle context
//! - **Shared state**: one scheduler behind a `cortex_m` critical-section
//!   mutex, mutated only with interrupts masked
//!
//! The scheduling policy never touches hardware directly: it talks to a
//! [`port::Port`], so everything except `arch`, `kernel` and `sync` runs
//! and is tested on the host.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod config;
pub mod context;
pub mod error;
pub mod layout;
pub mod port;
pub mod scheduler;
pub mod task;
pub mod tick;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod arch;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod kernel;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod sync;
