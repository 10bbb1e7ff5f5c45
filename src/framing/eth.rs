//----------------------------------------------------------------------------------------------
// Module framing::eth
// Ethernet (and USB, which shares the same header layout) framing: `(len: u16 LE, ctr: u16 LE)`
// header, no tail. `len` counts payload bytes only. Grounded in xcp_client.rs's UDP/TCP frame
// parsing, generalized into a standalone streaming decoder.

use super::{length_bound, Frame, FrameDecoder, FrameEncoder};
use crate::error::{FramingError, XcpCoreError};
use byteorder::{ByteOrder as _, LittleEndian};

pub const HEADER_LEN: usize = 4;

pub struct EthEncoder;

impl FrameEncoder for EthEncoder {
    fn encode(&self, payload: &[u8], counter: u16) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
        let mut hdr = [0u8; 4];
        LittleEndian::write_u16(&mut hdr[0..2], payload.len() as u16);
        LittleEndian::write_u16(&mut hdr[2..4], counter);
        buf.extend_from_slice(&hdr);
        buf.extend_from_slice(payload);
        buf
    }
}

/// Streaming reassembly cursor. Ethernet/USB deliver arbitrary byte chunks over a stream socket;
/// this buffers until a full header and its declared payload are available.
#[derive(Default)]
pub struct EthDecoder {
    buf: Vec<u8>,
    max_cto: usize,
    max_dto: usize,
}

impl EthDecoder {
    pub fn new(max_cto: usize, max_dto: usize) -> Self {
        EthDecoder { buf: Vec::new(), max_cto, max_dto }
    }
}

impl FrameDecoder for EthDecoder {
    fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Frame>, XcpCoreError> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        loop {
            if self.buf.len() < HEADER_LEN {
                break;
            }
            let len = LittleEndian::read_u16(&self.buf[0..2]) as usize;
            let counter = LittleEndian::read_u16(&self.buf[2..4]);
            if len == 0 {
                return Err(FramingError::ZeroLength.into());
            }
            let bound = length_bound(self.max_cto, self.max_dto);
            if len > bound {
                return Err(FramingError::MalformedLength { length: len, bound }.into());
            }
            if self.buf.len() < HEADER_LEN + len {
                // Not enough bytes yet; wait for the next chunk.
                break;
            }
            let payload = self.buf[HEADER_LEN..HEADER_LEN + len].to_vec();
            self.buf.drain(0..HEADER_LEN + len);
            frames.push(Frame { counter, payload });
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_single_frame() {
        let enc = EthEncoder;
        let framed = enc.encode(&[0xFF, 0x01, 0x02], 7);
        let mut dec = EthDecoder::new(255, 1500);
        let frames = dec.feed(&framed).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].counter, 7);
        assert_eq!(frames[0].payload, vec![0xFF, 0x01, 0x02]);
    }

    #[test]
    fn reassembles_across_arbitrary_chunk_boundaries() {
        let enc = EthEncoder;
        let a = enc.encode(&[0xFF, 1], 1);
        let b = enc.encode(&[0xFE, 2, 3], 2);
        let mut all = a.clone();
        all.extend_from_slice(&b);
        // Feed one byte at a time -- property 3 in spec.md section 8.
        let mut dec = EthDecoder::new(255, 1500);
        let mut got = Vec::new();
        for byte in all {
            got.extend(dec.feed(&[byte]).unwrap());
        }
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].payload, vec![0xFF, 1]);
        assert_eq!(got[1].payload, vec![0xFE, 2, 3]);
    }

    #[test]
    fn zero_length_is_framing_error() {
        let mut dec = EthDecoder::new(255, 1500);
        let err = dec.feed(&[0x00, 0x00, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, XcpCoreError::Framing(FramingError::ZeroLength)));
    }

    #[test]
    fn oversized_length_is_framing_error() {
        let mut dec = EthDecoder::new(255, 1500);
        let err = dec.feed(&[0xFF, 0xFF, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, XcpCoreError::Framing(FramingError::MalformedLength { .. })));
    }
}
