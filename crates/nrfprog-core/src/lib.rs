//! nrfprog-core - Device session and memory operation engine
//!
//! This crate holds everything needed to program an nRF51/nRF52 device
//! through a debug probe, independent of the probe transport:
//!
//! - [`device`] - device families, variant identifiers and the descriptor
//!   table mapping variants to memory geometry
//! - [`probe`] - the [`ProbeDriver`](probe::ProbeDriver) capability every
//!   backend implements
//! - [`session`] - family auto-detection and ownership of the one open probe
//! - [`memory`] - erase/program/verify/read/dump on top of a session
//! - [`reset`] - reset variants and the run sequencer
//! - [`protocol`] - NVMC command sequences for backends that only have raw
//!   memory access
//!
//! The crate is `no_std` (with `alloc`). The `std` feature adds RON loading
//! of extra device descriptors and `std::error::Error` impls.
//!
//! # Example
//!
//! ```ignore
//! use nrfprog_core::device::DeviceDatabase;
//! use nrfprog_core::memory::{EraseMode, Memory};
//! use nrfprog_core::session::{ConnectParams, DeviceSession};
//!
//! let db = DeviceDatabase::builtin();
//! let mut session = DeviceSession::connect(ConnectParams::default(), &mut factory, &db)?;
//! session.memory()?.erase(EraseMode::All)?;
//! session.disconnect()?;
//! ```

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

pub mod device;
pub mod error;
pub mod memory;
pub mod probe;
pub mod protocol;
pub mod reset;
pub mod session;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
