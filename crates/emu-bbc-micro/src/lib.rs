//! BBC Micro Model B / Model B+ emulator core.
//!
//! Wires a 6502 CPU, a CRTC, a Video ULA/SAA5050 teletext decoder, two 6522
//! VIAs, and the keyboard matrix into one bus and scheduler. The binary
//! crate drives this headlessly over a JSON-RPC debug service; there is no
//! windowed front end here.

mod bus;
mod config;
mod irq;
mod keyboard;
mod machine;
mod memory;

#[cfg(feature = "mcp")]
pub mod rpc;

pub use bus::BbcBus;
pub use config::{BbcConfig, BbcModel, SidewaysRom};
pub use keyboard::{KeyboardMatrix, SystemViaPeripheral};
pub use machine::{HaltReason, Machine};
pub use memory::BbcMemory;
