//! Protocol implementations
//!
//! Command sequences for on-chip peripherals that backends drive through
//! plain memory accesses, such as the non-volatile memory controller.

mod nvmc;

pub use nvmc::*;
