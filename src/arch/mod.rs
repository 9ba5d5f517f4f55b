//! # Architecture Abstraction Layer
//!
//! Hardware boundary of the kernel. Only the Cortex-M4 port exists; the
//! scheduler itself never touches registers.

#[cfg(target_arch = "arm")]
pub mod cortex_m4;
