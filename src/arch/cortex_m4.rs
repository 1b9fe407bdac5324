//! # Cortex-M4 Port Layer
//!
//! Tick source, switch trampoline and first-context launch for the ARM
//! Cortex-M4 (Thumb-2).
//!
//! ## Context Switch Mechanism
//!
//! - **MSP** (Main Stack Pointer): used by exception handlers.
//! - **PSP** (Process Stack Pointer): used by every task and the idle context.
//!
//! On exception entry the hardware stacks R0–R3, R12, LR, PC and xPSR onto
//! the PSP. PendSV pushes R4–R11 below that, which completes the
//! [`SavedContext`] record, hands the resulting pointer to the scheduler and
//! unwinds the same record from whichever stack pointer comes back.
//!
//! ## Interrupt Priorities
//!
//! SysTick and PendSV both run at the lowest priority. They cannot preempt
//! each other, so a switch decision never overlaps a tick, and neither
//! delays application interrupts. The first context is entered through SVC,
//! which runs the restore half of the trampoline alone.
//!
//! ## Missed Ticks
//!
//! The DWT cycle counter runs from the same core clock as SysTick. Each
//! SysTick entry samples both, and [`TickClock`](crate::tick::TickClock)
//! turns the samples into the number of wraps the hardware merged.

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{DCB, DWT, SCB, SYST};
use cortex_m_rt::exception;

use crate::config::SYSTICK_RELOAD;
use crate::context::SavedContext;
use crate::error::Fault;
use crate::kernel;
use crate::port::Port;

/// Lowest configurable priority (upper nibble on a 4-bit implementation).
const LOWEST_PRIORITY: u8 = 0xFF;

// ---------------------------------------------------------------------------
// Port implementation
// ---------------------------------------------------------------------------

/// Zero-sized handle on the core peripherals the scheduler needs.
pub struct CortexM4;

impl Port for CortexM4 {
    unsafe fn write_context(&mut self, sp: usize, ctx: &SavedContext) {
        let base = sp as *mut u32;
        for (i, word) in ctx.to_words().into_iter().enumerate() {
            // SAFETY: the caller guarantees `sp..sp + SIZE` is a reserved,
            // idle stack region.
            unsafe { core::ptr::write_volatile(base.add(i), word) };
        }
    }

    fn pend_switch(&mut self) {
        SCB::set_pendsv();
        // Take PendSV as soon as interrupts are unmasked.
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }

    fn exit_address(&self) -> usize {
        task_exit as *const () as usize
    }
}

/// Where a task lands if its entry point returns.
extern "C" fn task_exit() -> ! {
    kernel::fatal(Fault::TaskExited)
}

/// Body of the idle context: sleep until the next interrupt.
pub extern "C" fn idle_loop() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// Tick source
// ---------------------------------------------------------------------------

/// Configure SysTick to interrupt at `TICK_HZ` from the core clock.
pub fn configure_systick(syst: &mut SYST) {
    syst.disable_counter();
    syst.set_clock_source(SystClkSource::Core);
    syst.set_reload(SYSTICK_RELOAD);
    syst.clear_current();
    syst.enable_interrupt();
    syst.enable_counter();
}

/// Start the free-running cycle counter used to detect missed ticks.
pub fn enable_cycle_counter(dcb: &mut DCB, dwt: &mut DWT) {
    dcb.enable_trace();
    dwt.enable_cycle_counter();
}

/// Put SysTick and PendSV at the lowest exception priority.
pub fn set_interrupt_priorities(scb: &mut SCB) {
    // SAFETY: equal, lowest priorities for both handlers only ever delay
    // them; no priority-based critical section depends on these values.
    unsafe {
        scb.set_priority(SystemHandler::PendSV, LOWEST_PRIORITY);
        scb.set_priority(SystemHandler::SysTick, LOWEST_PRIORITY);
    }
}

/// Scheduler tick.
///
/// The exception's pending state is cleared by exception entry. COUNTFLAG is
/// cleared here by reading CSR, first thing, so no path out of the handler
/// leaves it set. The counter samples follow immediately.
#[exception]
fn SysTick() {
    // SAFETY: read-only access to SysTick CSR; reading clears COUNTFLAG.
    let _ = unsafe { (*SYST::PTR).csr.read() };
    let since_wrap = SYSTICK_RELOAD.saturating_sub(SYST::get_current());
    kernel::on_tick(DWT::cycle_count(), since_wrap);
}

// ---------------------------------------------------------------------------
// Switch trampoline
// ---------------------------------------------------------------------------

/// PendSV exception handler: the context switch.
///
/// 1. Push R4–R11 onto the outgoing PSP
/// 2. Pass that PSP to the scheduler, receive the incoming one
/// 3. Pop R4–R11 from the incoming stack, install it as PSP
/// 4. Exception-return to thread mode on PSP; hardware unstacks the rest
///
/// The handler knows nothing about which contexts are involved, only the two
/// stack pointers.
///
/// # Safety
/// Entered only by the NVIC. Must not touch R4–R11 before they are stacked.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "bl {switch}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "isb",
        "cpsie i",
        // EXC_RETURN: thread mode, process stack, basic frame.
        "mov lr, #0xFFFFFFFD",
        "bx lr",
        switch = sym switch_context,
    );
}

/// Rust half of the trampoline.
extern "C" fn switch_context(live_sp: *mut u32) -> *mut u32 {
    kernel::switch_context(live_sp as usize) as *mut u32
}

// ---------------------------------------------------------------------------
// First context launch
// ---------------------------------------------------------------------------

/// SVC exception handler: restore-only half of the trampoline.
///
/// Resumes the first context from its initial frame exactly the way PendSV
/// resumes a preempted one. The MSP frame stacked by the `svc` is abandoned.
///
/// # Safety
/// Entered only through [`start_first_context`].
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn SVCall() {
    naked_asm!(
        "bl {launch}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "isb",
        "mov lr, #0xFFFFFFFD",
        "bx lr",
        launch = sym launch_context,
    );
}

extern "C" fn launch_context() -> *mut u32 {
    kernel::launch() as *mut u32
}

/// Leave the reset context for good and enter the first scheduled context.
pub fn start_first_context() -> ! {
    // SAFETY: SVC escalates to HardFault with PRIMASK set, so interrupts must
    // be on. The scheduler is installed, and SVCall never returns here.
    unsafe {
        cortex_m::interrupt::enable();
        asm!("svc 0", options(noreturn));
    }
}
