//----------------------------------------------------------------------------------------------
// Module framing
// Per-transport packetization (C1): prepend length/counter header, append optional checksum,
// emit padded frames; inverse on receive with streaming reassembly so arbitrary chunk boundaries
// never lose or duplicate a byte. CAN padding is stripped here, not by individual response
// parsers -- the REDESIGN FLAG in spec.md section 9 names this as the one place the fix belongs.

pub mod can;
pub mod eth;
pub mod sxi;

use crate::config::Alignment;
use crate::error::XcpCoreError;

/// One fully-decoded PDU plus the transport-level counter it arrived with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub counter: u16,
    pub payload: Vec<u8>,
}

/// Maximum legal payload size, used to reject clearly-malformed length fields before any buffer
/// is allocated for them. `max_cto * max_dto` mirrors the bound named in spec.md section 4.1.
pub fn length_bound(max_cto: usize, max_dto: usize) -> usize {
    max_cto.max(1) * max_dto.max(1)
}

/// Outbound framing: wraps `payload` for the given transport, applying `alignment` padding.
pub trait FrameEncoder {
    fn encode(&self, payload: &[u8], counter: u16) -> Vec<u8>;
}

/// Inbound framing: a stateful cursor that reassembles PDUs out of arbitrary byte chunks.
/// `feed` may be called with any partitioning of the underlying byte stream; it returns every
/// `Frame` that became fully available, buffering the remainder internally.
pub trait FrameDecoder {
    fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Frame>, XcpCoreError>;
}

pub(crate) fn apply_alignment(buf: &mut Vec<u8>, alignment: Alignment) {
    let pad = (alignment.bytes() - (buf.len() % alignment.bytes())) % alignment.bytes();
    buf.extend(std::iter::repeat(0u8).take(pad));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_pads_to_boundary() {
        let mut buf = vec![1u8, 2, 3];
        apply_alignment(&mut buf, Alignment::Byte4);
        assert_eq!(buf.len(), 4);
        let mut buf8 = vec![0u8; 5];
        apply_alignment(&mut buf8, Alignment::Byte8);
        assert_eq!(buf8.len(), 8);
    }
}
