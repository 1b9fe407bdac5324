//! # Architecture Port
//!
//! Hardware boundary of the kernel: tick source, switch trampoline and the
//! [`Port`](crate::port::Port) implementation. Only the Cortex-M4 port
//! exists; it is built for bare-metal ARM targets only.

pub mod cortex_m4;
