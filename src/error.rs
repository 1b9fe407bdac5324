//! # Error Taxonomy
//!
//! Two kinds of failure exist at this layer:
//!
//! - [`ConfigError`]: the stack layout or task table cannot be built. Detected
//!   during initialization, before the tick is enabled.
//! - [`Fault`]: the scheduler observed a state that can only come from a
//!   programming defect or memory corruption. There is no recovery; the
//!   kernel reports it and halts.
//!
//! Tick overruns are neither. They are counted in
//! [`SchedulerStats`](crate::scheduler::SchedulerStats).

use core::fmt;

use crate::scheduler::ContextId;

/// Stack layout or initialization problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(test), derive(defmt::Format))]
pub enum ConfigError {
    /// Requested stack size is zero.
    ZeroStackSize,
    /// Stack size is not a multiple of the 8-byte AAPCS stack alignment.
    MisalignedStackSize(usize),
    /// A region is too small to hold even the initial saved context.
    StackTooSmall { size: usize, min: usize },
    /// The reserved range does not start and end on an 8-byte boundary.
    MisalignedReservedRange,
    /// `base + size` of the reserved range overflows the address space.
    AddressOverflow,
    /// The regions need more bytes than the reserved range provides.
    ReservedRangeTooSmall { required: usize, available: usize },
    /// `kernel::init` was called twice.
    AlreadyInitialized,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroStackSize => write!(f, "stack size is zero"),
            Self::MisalignedStackSize(size) => {
                write!(f, "stack size {} is not a multiple of 8", size)
            }
            Self::StackTooSmall { size, min } => {
                write!(f, "stack size {} is below the minimum of {}", size, min)
            }
            Self::MisalignedReservedRange => write!(f, "reserved range is not 8-byte aligned"),
            Self::AddressOverflow => write!(f, "reserved range overflows the address space"),
            Self::ReservedRangeTooSmall { required, available } => write!(
                f,
                "stacks need {} bytes but only {} are reserved",
                required, available
            ),
            Self::AlreadyInitialized => write!(f, "kernel already initialized"),
        }
    }
}

/// Fatal scheduler condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(test), derive(defmt::Format))]
pub enum Fault {
    /// A task index outside `0..MAX_TASKS`.
    InvalidTask(usize),
    /// A saved stack pointer lies outside its context's region or is not
    /// word aligned.
    StackCorrupted { context: ContextId, sp: usize },
    /// The kernel was started without a successful `init`.
    NotInitialized,
    /// A switch or block was requested before the first context launched.
    NotStarted,
    /// The first-context launch path was entered a second time.
    AlreadyStarted,
    /// Only tasks may block or sleep; the idle context must stay runnable.
    IdleCannotBlock,
    /// A task returned from its entry point.
    TaskExited,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTask(id) => write!(f, "task index {} out of range", id),
            Self::StackCorrupted { context, sp } => {
                write!(f, "saved sp {:#010x} invalid for {:?}", sp, context)
            }
            Self::NotInitialized => write!(f, "kernel not initialized"),
            Self::NotStarted => write!(f, "scheduler not started"),
            Self::AlreadyStarted => write!(f, "scheduler already started"),
            Self::IdleCannotBlock => write!(f, "idle context cannot block"),
            Self::TaskExited => write!(f, "task returned from its entry point"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_display_names_the_context() {
        let fault = Fault::StackCorrupted {
            context: ContextId::Task(2),
            sp: 0x2000_1000,
        };
        let mut buf = String::new();
        fmt::write(&mut buf, format_args!("{}", fault)).unwrap();
        assert_eq!(buf, "saved sp 0x20001000 invalid for Task(2)");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::ReservedRangeTooSmall {
            required: 2560,
            available: 2048,
        };
        assert_eq!(
            err.to_string(),
            "stacks need 2560 bytes but only 2048 are reserved"
        );
    }
}
