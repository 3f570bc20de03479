//! Device families, variant identifiers and memory geometry

mod database;
mod family;
mod types;

pub use database::*;
pub use family::*;
pub use types::*;
