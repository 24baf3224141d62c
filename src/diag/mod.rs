//! Diagnostics HTTP interface
//!
//! Hot-path errors never unwind; they end up in counters. This module is
//! where those counters become visible: a small HTTP server serving
//! status and statistics snapshots out-of-band.

pub mod handlers;
pub mod server;

pub use server::{DiagServer, DiagState};
