#![allow(missing_docs)]
//! Wire-format types for the TLS 1.0-1.2 record and handshake protocols.
//!
//! Everything here is pure parsing and encoding over byte slices; no state
//! machine logic lives in this module.

#[macro_use]
mod macros;

pub mod alert;
pub mod base;
pub mod ccs;
pub mod codec;
pub mod deframer;
pub mod enums;
pub mod fragmenter;
pub mod handshake;
pub mod hsjoiner;
pub mod message;
