//! Probe driver abstraction

mod traits;

pub use traits::*;
