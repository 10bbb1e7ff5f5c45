//----------------------------------------------------------------------------------------------
// Module transport
// Transport channel (C2): owns the wire connection, runs a background reader loop that
// classifies incoming frames by PID and routes them to either the pending command-response slot
// or the configured acquisition policy, and tracks frames_sent/frames_received for diagnostics.
// Grounded in xcp_client/src/xcp_client.rs's XcpClient (receive_task, send_command, the counters
// implicit in its ctr/ctr_lost bookkeeping); see spec.md section 4.2.

#[cfg(feature = "transport-eth")]
pub mod eth;
#[cfg(any(feature = "transport-sxi", feature = "transport-can", feature = "transport-usb"))]
pub mod generic;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::command::{pid, XcpCommand};
use crate::error::{Result, XcpCoreError, XcpTimeoutError};
use crate::policy::AcquisitionPolicy;
use crate::types::FrameCategory;

/// Running counters every transport maintains for timeout diagnostics (spec scenario S6) and for
/// basic link-health observability.
#[derive(Default)]
pub struct Counters {
    pub frames_sent: AtomicU64,
    pub frames_received: AtomicU64,
}

impl Counters {
    pub fn sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }
    pub fn received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }
    pub fn note_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }
    pub fn note_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }
}

/// Classifies one received, de-framed payload (the CTO/DTO content, with any transport header
/// already stripped) by its leading PID byte and dispatches it to the command-response slot or
/// the acquisition policy. Shared by every transport's reader loop so PID semantics live in one
/// place, mirroring receive_task's inlined `match pid` -- generalized to own CTO plus DAQ/STIM.
pub fn route_frame(payload: &[u8], counter: u16, timestamp_ns: u64, policy: &dyn AcquisitionPolicy) -> Option<Vec<u8>> {
    if payload.is_empty() {
        return None;
    }
    let leading = payload[0];
    match leading {
        pid::OK => Some(payload.to_vec()),
        pid::ERR => Some(payload.to_vec()),
        pid::EVENT => {
            policy.feed(FrameCategory::Event, counter, timestamp_ns, payload);
            None
        }
        pid::SERV => {
            policy.feed(FrameCategory::Serv, counter, timestamp_ns, payload);
            None
        }
        p if pid::is_daq_or_stim(p) => {
            policy.feed(FrameCategory::Daq, counter, timestamp_ns, payload);
            None
        }
        _ => None,
    }
}

/// Builds the timeout error with the hints a caller can act on, shared by every transport so the
/// wording (and the required "timed out" substring from scenario S6) stays consistent.
pub fn timeout_error(command: XcpCommand, timeout_ms: u64, counters: &Counters, hints: &[&str]) -> XcpCoreError {
    XcpCoreError::Timeout(XcpTimeoutError::new(command, timeout_ms, counters.sent(), counters.received(), hints))
}

/// Gathers `n` payload bytes (PID stripped) from back-to-back response PDUs already queued on
/// `rx`, for block-mode UPLOAD/PROGRAM_NEXT transfers where the slave sends several responses to
/// one command without the master re-sending in between. Shared by every transport's
/// `block_receive` so the ERR/timeout handling matches `send_command`'s.
pub fn block_receive_loop(
    rx: &std::sync::mpsc::Receiver<Vec<u8>>,
    command: XcpCommand,
    n: usize,
    timeout_ms: u64,
    counters: &Counters,
) -> Result<Vec<u8>> {
    let mut collected = Vec::with_capacity(n);
    while collected.len() < n {
        match rx.recv_timeout(std::time::Duration::from_millis(timeout_ms)) {
            Ok(data) => {
                counters.note_received();
                if data.first() == Some(&pid::ERR) {
                    let code = *data.get(1).unwrap_or(&0);
                    return Err(XcpCoreError::Response(crate::error::XcpResponseError::new(code, command)));
                }
                collected.extend_from_slice(data.get(1..).unwrap_or(&[]));
            }
            Err(_) => {
                return Err(timeout_error(command, timeout_ms, counters, &[
                    "block transfer interrupted mid-sequence",
                    "slave stopped sending consecutive UPLOAD/PROGRAM_NEXT responses",
                ]))
            }
        }
    }
    collected.truncate(n);
    Ok(collected)
}

/// Abstraction the session (C6) programs against, independent of the underlying wire. Each
/// concrete transport (`eth`, `generic` for SxI/CAN/USB) implements this with its own framing and
/// reader-loop strategy, but exposes the same request/response and DAQ-subscription surface.
///
/// Deliberately synchronous: the session issues one CTO command at a time and blocks for its
/// response (XCP's CTO channel is half-duplex, spec.md section 2), so there is no benefit to an
/// async interface here even though `eth` uses tokio internally for the socket.
pub trait Transport: Send + Sync {
    /// Sends one CTO command and waits for its matching response or error, honoring the
    /// configured timeout.
    fn send_command(&self, command: XcpCommand, payload: &[u8]) -> Result<Vec<u8>>;

    /// Gathers `n` additional payload bytes from responses following a block-mode command that
    /// has already been sent (slave-block-mode UPLOAD, PROGRAM_NEXT). Does not send anything
    /// itself; the caller is responsible for issuing the triggering command first.
    fn block_receive(&self, command: XcpCommand, n: usize) -> Result<Vec<u8>>;

    /// Closes the underlying connection; subsequent `send_command` calls return
    /// `XcpCoreError::Disconnected`.
    fn close(&self);

    fn counters(&self) -> &Counters;
}
