//! # dlt645-core
//!
//! Core protocol implementation for DL/T 645 electricity meters.
//!
//! This crate provides the low-level protocol primitives:
//! - Address encoding (12 decimal digits ⇄ 6 BCD bytes)
//! - Frame structure and encoding/decoding
//! - Checksum calculation
//! - Control code definitions
//! - Protocol constants
//! - Connection state tracking

pub mod address;
pub mod checksum;
pub mod constants;
pub mod control;
pub mod error;
pub mod frame;
pub mod session;

pub use control::ControlCode;
pub use error::{Error, Result};
pub use frame::Frame;
pub use session::{ConnectionState, Session};
