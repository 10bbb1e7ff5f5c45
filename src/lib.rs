//-----------------------------------------------------------------------------
// Crate xcp_master
// Path: src/lib.rs

//! Master-side ASAM XCP (MCD-1) core.
//!
//! This crate implements the four subsystems a master-side XCP stack needs to talk to an ECU
//! slave: the per-transport framing codec and channel ([`transport`], [`framing`]), the
//! command/session state machine ([`session`], [`pdu`], [`command`]), the error-recovery policy
//! engine ([`errorhandler`]), and the DAQ planner/decoder plus the `.xmraw` recorder
//! ([`daq`], [`recorder`]).
//!
//! The crate does not parse A2L files, drive concrete CAN/USB hardware, or derive seed-and-key
//! responses itself -- those are external collaborators reached through narrow traits
//! ([`seedkey::SeedNKeyDriver`], [`transport::Transport`]) or accepted as already-decoded data
//! ([`types::Measurement`]).
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use xcp_master::config::Config;
//! use xcp_master::policy::NoOpPolicy;
//! use xcp_master::session::XcpSession;
//! use xcp_master::transport::eth::EthTransport;
//!
//! # fn main() -> xcp_master::error::Result<()> {
//! let cfg = Config::default();
//! let timeout_ms = (cfg.transport.timeout_seconds * 1000.0) as u64;
//! let transport = EthTransport::connect(&cfg.transport.eth, timeout_ms, Arc::new(NoOpPolicy), 255, 1500)?;
//! let session = XcpSession::new(Arc::new(transport), cfg.general.max_retries, None);
//! session.connect(0)?;
//! let id = session.get_id_string(1)?;
//! session.disconnect()?;
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod daq;
pub mod error;
pub mod errorhandler;
pub mod framing;
pub mod pdu;
pub mod policy;
pub mod recorder;
pub mod seedkey;
pub mod session;
pub mod timestamp;
pub mod transport;
pub mod types;

pub use error::{Result, XcpCoreError};
pub use session::XcpSession;
pub use types::{ByteOrder, Capabilities, Measurement, SlaveProperties};
