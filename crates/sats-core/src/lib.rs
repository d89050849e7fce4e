//! # sats-core
//! Foundation types, address handling and collaborator traits for the Sats
//! wallet engine.

pub mod address;
pub mod constants;
pub mod error;
pub mod stub;
pub mod taproot;
pub mod traits;
pub mod types;
