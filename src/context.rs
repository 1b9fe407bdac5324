//! # Saved Context
//!
//! The fixed-layout record a suspended context leaves on its stack, and the
//! Context Initializer that forges one for a task that has never run.
//!
//! ## Layout (low address first, 16 words)
//!
//! ```text
//! sp ──► +0x00  R4  ┐
//!        +0x04  R5  │
//!        +0x08  R6  │
//!        +0x0C  R7  │ software frame:
//!        +0x10  R8  │ pushed/popped by the PendSV trampoline
//!        +0x14  R9  │
//!        +0x18  R10 │
//!        +0x1C  R11 ┘
//!        +0x20  R0  ┐
//!        +0x24  R1  │
//!        +0x28  R2  │
//!        +0x2C  R3  │ hardware frame:
//!        +0x30  R12 │ stacked by exception entry,
//!        +0x34  LR  │ unstacked by exception return
//!        +0x38  PC  │
//!        +0x3C  xPSR┘
//! ```
//!
//! A fresh frame carries `DUMMY_XPSR` so that the first exception return into
//! a task is indistinguishable from resuming one that was preempted.

use crate::config::DUMMY_XPSR;
use crate::layout::StackRegion;
use crate::port::Port;

/// Task entry point. Tasks never return.
pub type TaskEntry = extern "C" fn() -> !;

/// Exception return ignores bit 0 of the stacked PC; keep it clear.
const START_ADDRESS_MASK: u32 = !1;

/// Registers saved by software (R4–R11).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoftwareFrame {
    pub r4: u32,
    pub r5: u32,
    pub r6: u32,
    pub r7: u32,
    pub r8: u32,
    pub r9: u32,
    pub r10: u32,
    pub r11: u32,
}

/// Registers stacked by the Cortex-M exception entry sequence.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HardwareFrame {
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r12: u32,
    pub lr: u32,
    pub pc: u32,
    pub xpsr: u32,
}

/// A complete saved context as it sits in memory at a saved stack pointer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SavedContext {
    pub software: SoftwareFrame,
    pub hardware: HardwareFrame,
}

const _: () = assert!(core::mem::size_of::<SavedContext>() == SavedContext::SIZE);
const _: () = assert!(core::mem::size_of::<SoftwareFrame>() == 32);

impl SavedContext {
    pub const WORDS: usize = 16;
    pub const SIZE: usize = Self::WORDS * 4;

    /// Word index of the stacked PC.
    pub const PC_WORD: usize = 14;
    /// Word index of the stacked xPSR.
    pub const XPSR_WORD: usize = 15;

    /// The frame of a task that has not run yet: all general-purpose
    /// registers zero, PC at `entry`, LR at `exit`, xPSR at the sentinel.
    pub fn initial(entry: usize, exit: usize) -> Self {
        Self {
            software: SoftwareFrame::default(),
            hardware: HardwareFrame {
                lr: exit as u32,
                pc: entry as u32 & START_ADDRESS_MASK,
                xpsr: DUMMY_XPSR,
                ..HardwareFrame::default()
            },
        }
    }

    pub fn to_words(&self) -> [u32; Self::WORDS] {
        let s = &self.software;
        let h = &self.hardware;
        [
            s.r4, s.r5, s.r6, s.r7, s.r8, s.r9, s.r10, s.r11, //
            h.r0, h.r1, h.r2, h.r3, h.r12, h.lr, h.pc, h.xpsr,
        ]
    }

    pub fn from_words(w: &[u32; Self::WORDS]) -> Self {
        Self {
            software: SoftwareFrame {
                r4: w[0],
                r5: w[1],
                r6: w[2],
                r7: w[3],
                r8: w[4],
                r9: w[5],
                r10: w[6],
                r11: w[7],
            },
            hardware: HardwareFrame {
                r0: w[8],
                r1: w[9],
                r2: w[10],
                r3: w[11],
                r12: w[12],
                lr: w[13],
                pc: w[14],
                xpsr: w[15],
            },
        }
    }
}

/// Write the initial saved context for `entry` at the top of `region`.
///
/// Returns the stack pointer to store in the task's control block: the
/// address of the frame's lowest word.
pub fn init_context<P: Port>(port: &mut P, region: &StackRegion, entry: TaskEntry) -> usize {
    let sp = region.top() - SavedContext::SIZE;
    let frame = SavedContext::initial(entry as *const () as usize, port.exit_address());
    // SAFETY: `sp..region.top()` lies inside `region`, which the layout
    // guarantees is reserved, aligned and owned by exactly one context.
    unsafe { port.write_context(sp, &frame) };
    sp
}
