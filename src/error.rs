//----------------------------------------------------------------------------------------------
// Module error
// Error kinds for the master core. Only XcpResponseError and XcpTimeoutError are recoverable,
// and only through the error handler (errorhandler module); every other variant aborts the
// current operation and surfaces to the caller.

use thiserror::Error;

use crate::command::XcpCommand;

/// Top level error type returned by every fallible operation in this crate.
#[derive(Error, Debug)]
pub enum XcpCoreError {
    /// The on-wire byte stream could not be parsed into a PDU. Fatal to the session.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Transport-level checksum (SxI tail) failed. Fatal to the session.
    #[error("checksum error: {0}")]
    Checksum(#[from] ChecksumError),

    /// No response within deadline.
    #[error("{0}")]
    Timeout(#[from] XcpTimeoutError),

    /// The slave returned a well-formed ERR response.
    #[error("{0}")]
    Response(#[from] XcpResponseError),

    /// The slave violated the protocol (wrong length, counter mismatch, PID out of range). Fatal.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The DAQ planner could not fit a measurement into the slave's resource limits.
    #[error("DAQ plan error: {0}")]
    Plan(#[from] crate::daq::planner::PlanError),

    /// Seed-and-key derivation failed or the library/helper could not be invoked.
    #[error("seed & key error: {0}")]
    SeedAndKey(#[from] crate::seedkey::SeedNKeyError),

    /// The transport closed (locally via close(), or the peer went away).
    #[error("transport disconnected")]
    Disconnected,

    /// The recorder's on-disk format was violated, or disk I/O failed.
    #[error("recorder error: {0}")]
    Recorder(#[from] crate::recorder::RecorderError),

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, XcpCoreError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("malformed frame length {length} (bound {bound})")]
    MalformedLength { length: usize, bound: usize },
    #[error("frame length is zero")]
    ZeroLength,
    #[error("short read: need {need} bytes, have {have}")]
    ShortRead { need: usize, have: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("checksum mismatch: expected 0x{expected:04X}, computed 0x{computed:04X}")]
pub struct ChecksumError {
    pub expected: u16,
    pub computed: u16,
}

/// Carries transport diagnostics as required by spec scenario S6: the literal substring
/// "timed out", the command name, frames sent/received, and transport-specific hints.
#[derive(Error, Debug, Clone)]
#[error("{command:?}: command response timed out (timeout={timeout_ms}ms, frames_sent={frames_sent}, frames_received={frames_received}){hint}")]
pub struct XcpTimeoutError {
    pub command: XcpCommand,
    pub timeout_ms: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub hint: String,
}

impl XcpTimeoutError {
    pub fn new(command: XcpCommand, timeout_ms: u64, frames_sent: u64, frames_received: u64, hints: &[&str]) -> Self {
        let hint = if hints.is_empty() { String::new() } else { format!(" -- try: {}", hints.join("; ")) };
        XcpTimeoutError { command, timeout_ms, frames_sent, frames_received, hint }
    }
}

/// A well-formed ERR response from the slave, not yet handed to the error handler.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{command:?}: XCP error 0x{code:02X}")]
pub struct XcpResponseError {
    pub code: u8,
    pub command: XcpCommand,
}

impl XcpResponseError {
    pub fn new(code: u8, command: XcpCommand) -> Self {
        XcpResponseError { code, command }
    }
    pub fn code(&self) -> u8 {
        self.code
    }
}
