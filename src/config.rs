//! # Kernel Configuration
//!
//! Compile-time constants governing stack layout and the scheduler tick.
//! All limits are fixed at build time; there is no runtime reconfiguration.
//! Invalid combinations are rejected by the `const` assertions at the bottom
//! of this file, so a bad configuration never reaches the target.

/// Number of user tasks. Bounds the static TCB table.
pub const MAX_TASKS: usize = 4;

/// Per-task stack size in bytes. Must hold the deepest call chain plus the
/// saved context (32 bytes hardware frame, 32 bytes for R4–R11).
pub const SIZE_TASK_STACK: usize = 512;

/// Stack size of the scheduler's own idle context. The allocator hands out
/// equal-size regions, so this must match `SIZE_TASK_STACK`.
pub const SIZE_SCHED_STACK: usize = 512;

/// Start of the SRAM range reserved for task and idle stacks.
pub const SRAM_START: usize = 0x2000_0000;

/// Size of the reserved SRAM range (16 KiB). `memory.x` keeps the linker
/// out of `SRAM_START..SRAM_END`.
pub const SIZE_SRAM: usize = 16 * 1024;

/// One past the highest reserved address. Stacks are carved downward from here.
pub const SRAM_END: usize = SRAM_START + SIZE_SRAM;

/// Scheduler tick frequency in Hz.
pub const TICK_HZ: u32 = 1000;

/// Internal high-speed oscillator frequency (STM32F3 HSI, the reset clock).
pub const HSI_CLOCK: u32 = 8_000_000;

/// Clock feeding the SysTick counter.
pub const SYSTICK_TIM_CLK: u32 = HSI_CLOCK;

/// SysTick reload value producing one interrupt every `1 / TICK_HZ` seconds.
pub const SYSTICK_RELOAD: u32 = SYSTICK_TIM_CLK / TICK_HZ - 1;

/// Core clock cycles between two SysTick wraps.
pub const TICK_PERIOD_CYCLES: u32 = SYSTICK_RELOAD + 1;

/// xPSR written into every fresh frame: only the Thumb bit (T, bit 24) set.
/// Exception return faults if T is clear, so a never-run task must look
/// exactly like one that was interrupted in Thumb state.
pub const DUMMY_XPSR: u32 = 0x0100_0000;

// ---------------------------------------------------------------------------
// Static configuration checks
// ---------------------------------------------------------------------------

const _: () = assert!(MAX_TASKS > 0, "at least one task is required");
const _: () = assert!(
    SIZE_SCHED_STACK == SIZE_TASK_STACK,
    "idle stack must be the same size as a task stack"
);
const _: () = assert!(
    (MAX_TASKS + 1) * SIZE_TASK_STACK <= SIZE_SRAM,
    "task and idle stacks do not fit in the reserved SRAM range"
);
const _: () = assert!(TICK_HZ > 0 && TICK_HZ <= SYSTICK_TIM_CLK);
const _: () = assert!(
    SYSTICK_RELOAD <= 0x00FF_FFFF,
    "SysTick reload must fit the 24-bit counter"
);
