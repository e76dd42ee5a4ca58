//! This crate drives Cytec RF/relay switch matrices over their serial command protocol.
//!
//! The instrument is told what state every relay should be in and the crate
//! works out the rest: it reads the current relay states, computes the
//! latch/unlatch commands needed, packs them into frames small enough for the
//! instrument's input buffer, sends them, waits for the relays to settle and
//! reads the matrix back to check it.
//!
//! Any interface which implements [embedded_io::Read] & [embedded_io::Write]
//! can be used. [`asynch::AsyncInstrument`] wraps a session for use from tokio
//! with per-call timeouts.
//!
//! The serial port used for instrument comms should be configured like so:
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None
//! * Flow control: RTS/CTS
//! * Read timeout: around 500 ms
//!
//! ```no_run
//! # fn demo<S: embedded_io::Read + embedded_io::Write>(port: S) -> cytec_switch::error::Result<(), S::Error> {
//! use cytec_switch::{config::InstrumentConfig, session::InstrumentSession};
//!
//! let mut matrix: InstrumentSession<S> = InstrumentSession::connect(port, InstrumentConfig::new(8, 16))?;
//! let target = matrix.matrix().latch(3, 7)?;
//! matrix.switch(&target, true)?;
//! # Ok(())
//! # }
//! ```

pub mod asynch;
pub mod command;
pub mod config;
pub mod error;
pub mod matrix;
pub mod packer;
pub mod session;
pub mod status;
mod transport;

#[cfg(test)]
mod mock_serial;
