//----------------------------------------------------------------------------------------------
// Module framing::sxi
// Serial (SxI) framing: a configurable header (length prefix 1B/2B, optional counter 0/1/2B,
// optional fill byte), an optional 1B/2B checksum tail, and optional ESC/SYNC byte-stuffing.
// Every combination named in spec.md Transport.SxI is exercised by the unit tests below, per
// spec.md section 8 property 2 (the codec is a bijection over well-formed PDUs).

use super::{length_bound, Frame, FrameDecoder, FrameEncoder};
use crate::config::{HeaderFormat, TailFormat};
use crate::error::{ChecksumError, FramingError, XcpCoreError};
use byteorder::{ByteOrder as _, LittleEndian};

#[derive(Debug, Clone, Copy)]
pub struct SxiFraming {
    pub header: HeaderFormat,
    pub tail: TailFormat,
    pub byte_stuffing: Option<(u8, u8)>, // (sync, esc)
    pub max_cto: usize,
    pub max_dto: usize,
}

impl HeaderFormat {
    fn len_bytes(self) -> usize {
        match self {
            HeaderFormat::LenByte | HeaderFormat::LenCtrByte | HeaderFormat::LenFillByte => 1,
            HeaderFormat::LenWord | HeaderFormat::LenCtrWord | HeaderFormat::LenFillWord => 2,
        }
    }

    fn ctr_bytes(self) -> usize {
        match self {
            HeaderFormat::LenCtrByte => 1,
            HeaderFormat::LenCtrWord => 2,
            _ => 0,
        }
    }

    fn fill_bytes(self) -> usize {
        match self {
            HeaderFormat::LenFillByte | HeaderFormat::LenFillWord => 1,
            _ => 0,
        }
    }

    fn header_len(self) -> usize {
        self.len_bytes() + self.ctr_bytes() + self.fill_bytes()
    }
}

impl TailFormat {
    fn len(self) -> usize {
        match self {
            TailFormat::NoChecksum => 0,
            TailFormat::ChecksumByte => 1,
            TailFormat::ChecksumWord => 2,
        }
    }
}

fn checksum8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

fn checksum16(bytes: &[u8]) -> u16 {
    let mut sum: u16 = 0;
    for b in bytes {
        sum = sum.wrapping_add(*b as u16);
    }
    sum
}

fn stuff(buf: &[u8], sync: u8, esc: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(buf.len() + 2);
    out.push(sync);
    for &b in buf {
        if b == sync || b == esc {
            out.push(esc);
        }
        out.push(b);
    }
    out
}

/// Finds a length-delimited, byte-stuffed record starting at the SYNC byte `buf[start]`.
/// Unstuffs one byte at a time in a single forward pass: first enough bytes to read the header's
/// length field, then (now knowing the total body length) the remaining payload and tail. The
/// record is delimited by its own declared length rather than by a terminating SYNC, since the
/// wire never emits one after the last record in a stream.
///
/// Returns `(raw_len, body)` where `raw_len` is the number of bytes from `start` (inclusive of
/// the leading SYNC) consumed, and `body` is the unstuffed header+payload+tail, ready for
/// `decode_body`. `Ok(None)` means `buf` doesn't yet hold a complete record.
fn try_decode_stuffed(buf: &[u8], start: usize, cfg: SxiFraming, esc: u8) -> Result<Option<(usize, Vec<u8>)>, XcpCoreError> {
    let header_len = cfg.header.header_len();
    let mut body = Vec::with_capacity(header_len);
    let mut i = start + 1;
    let mut total_body_len = None;

    loop {
        if let Some(total) = total_body_len {
            if body.len() >= total {
                return Ok(Some((i - start, body)));
            }
        }
        if i >= buf.len() {
            return Ok(None);
        }
        if buf[i] == esc {
            if i + 1 >= buf.len() {
                return Ok(None);
            }
            body.push(buf[i + 1]);
            i += 2;
        } else {
            body.push(buf[i]);
            i += 1;
        }

        if total_body_len.is_none() && body.len() >= header_len {
            let len = match cfg.header.len_bytes() {
                1 => body[0] as usize,
                _ => LittleEndian::read_u16(&body[0..2]) as usize,
            };
            if len == 0 {
                return Err(FramingError::ZeroLength.into());
            }
            let bound = length_bound(cfg.max_cto, cfg.max_dto);
            if len > bound {
                return Err(FramingError::MalformedLength { length: len, bound }.into());
            }
            total_body_len = Some(header_len + len + cfg.tail.len());
        }
    }
}

impl FrameEncoder for SxiFraming {
    fn encode(&self, payload: &[u8], counter: u16) -> Vec<u8> {
        let mut body = Vec::new();
        match self.header.len_bytes() {
            1 => body.push(payload.len() as u8),
            _ => {
                let mut tmp = [0u8; 2];
                LittleEndian::write_u16(&mut tmp, payload.len() as u16);
                body.extend_from_slice(&tmp);
            }
        }
        match self.header.ctr_bytes() {
            1 => body.push(counter as u8),
            2 => {
                let mut tmp = [0u8; 2];
                LittleEndian::write_u16(&mut tmp, counter);
                body.extend_from_slice(&tmp);
            }
            _ => {}
        }
        if self.header.fill_bytes() == 1 {
            body.push(0);
        }
        body.extend_from_slice(payload);
        match self.tail {
            TailFormat::NoChecksum => {}
            TailFormat::ChecksumByte => body.push(checksum8(payload)),
            TailFormat::ChecksumWord => {
                let mut tmp = [0u8; 2];
                LittleEndian::write_u16(&mut tmp, checksum16(payload));
                body.extend_from_slice(&tmp);
            }
        }
        match self.byte_stuffing {
            Some((sync, esc)) => stuff(&body, sync, esc),
            None => body,
        }
    }
}

#[derive(Default)]
pub struct SxiDecoder {
    cfg: Option<SxiFraming>,
    buf: Vec<u8>,
}

impl SxiDecoder {
    pub fn new(cfg: SxiFraming) -> Self {
        SxiDecoder { cfg: Some(cfg), buf: Vec::new() }
    }
}

impl FrameDecoder for SxiDecoder {
    fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Frame>, XcpCoreError> {
        let cfg = self.cfg.expect("SxiDecoder constructed without config");
        self.buf.extend_from_slice(chunk);

        // Byte-stuffed records are delimited by their own declared length, not by a following
        // SYNC (see `try_decode_stuffed`). Without byte-stuffing the header length is parsed
        // directly out of the raw stream.
        if let Some((sync, esc)) = cfg.byte_stuffing {
            let mut frames = Vec::new();
            loop {
                let Some(start) = self.buf.iter().position(|&b| b == sync) else { break };
                let Some((raw_len, body)) = try_decode_stuffed(&self.buf, start, cfg, esc)? else { break };
                self.buf.drain(0..start + raw_len);
                match decode_body(&body, cfg) {
                    Ok(Some(frame)) => frames.push(frame),
                    Ok(None) => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(frames)
        } else {
            let mut frames = Vec::new();
            loop {
                let header_len = cfg.header.header_len();
                if self.buf.len() < header_len {
                    break;
                }
                let len = match cfg.header.len_bytes() {
                    1 => self.buf[0] as usize,
                    _ => LittleEndian::read_u16(&self.buf[0..2]) as usize,
                };
                if len == 0 {
                    return Err(FramingError::ZeroLength.into());
                }
                let bound = length_bound(cfg.max_cto, cfg.max_dto);
                if len > bound {
                    return Err(FramingError::MalformedLength { length: len, bound }.into());
                }
                let total = header_len + len + cfg.tail.len();
                if self.buf.len() < total {
                    break;
                }
                let record = self.buf[0..total].to_vec();
                self.buf.drain(0..total);
                if let Some(frame) = decode_body(&record, cfg)? {
                    frames.push(frame);
                }
            }
            Ok(frames)
        }
    }
}

/// Decodes one already-delimited record (header + payload + tail, no stuffing) into a `Frame`.
fn decode_body(record: &[u8], cfg: SxiFraming) -> Result<Option<Frame>, XcpCoreError> {
    let header_len = cfg.header.header_len();
    if record.len() < header_len {
        return Err(FramingError::ShortRead { need: header_len, have: record.len() }.into());
    }
    let len = match cfg.header.len_bytes() {
        1 => record[0] as usize,
        _ => LittleEndian::read_u16(&record[0..2]) as usize,
    };
    if len == 0 {
        return Err(FramingError::ZeroLength.into());
    }
    let ctr_offset = cfg.header.len_bytes();
    let counter = match cfg.header.ctr_bytes() {
        1 => record[ctr_offset] as u16,
        2 => LittleEndian::read_u16(&record[ctr_offset..ctr_offset + 2]),
        _ => 0,
    };
    let payload_start = header_len;
    if record.len() < payload_start + len + cfg.tail.len() {
        return Err(FramingError::ShortRead { need: payload_start + len + cfg.tail.len(), have: record.len() }.into());
    }
    let payload = &record[payload_start..payload_start + len];
    match cfg.tail {
        TailFormat::NoChecksum => {}
        TailFormat::ChecksumByte => {
            let expected = record[payload_start + len];
            let computed = checksum8(payload);
            if expected != computed {
                return Err(ChecksumError { expected: expected as u16, computed: computed as u16 }.into());
            }
        }
        TailFormat::ChecksumWord => {
            let expected = LittleEndian::read_u16(&record[payload_start + len..payload_start + len + 2]);
            let computed = checksum16(payload);
            if expected != computed {
                return Err(ChecksumError { expected, computed }.into());
            }
        }
    }
    Ok(Some(Frame { counter, payload: payload.to_vec() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(header: HeaderFormat, tail: TailFormat, stuffing: Option<(u8, u8)>) {
        let cfg = SxiFraming { header, tail, byte_stuffing: stuffing, max_cto: 255, max_dto: 1500 };
        let framed = cfg.encode(&[0xFF, 1, 2, 3, 4], 42);
        let mut dec = SxiDecoder::new(cfg);
        let frames = dec.feed(&framed).unwrap();
        assert_eq!(frames.len(), 1, "{:?}/{:?}/{:?}", header, tail, stuffing);
        assert_eq!(frames[0].payload, vec![0xFF, 1, 2, 3, 4]);
        if header.ctr_bytes() > 0 {
            assert_eq!(frames[0].counter, 42);
        }
    }

    #[test]
    fn all_header_tail_combinations_roundtrip() {
        let headers = [
            HeaderFormat::LenByte,
            HeaderFormat::LenCtrByte,
            HeaderFormat::LenFillByte,
            HeaderFormat::LenWord,
            HeaderFormat::LenCtrWord,
            HeaderFormat::LenFillWord,
        ];
        let tails = [TailFormat::NoChecksum, TailFormat::ChecksumByte, TailFormat::ChecksumWord];
        for &h in &headers {
            for &t in &tails {
                roundtrip(h, t, None);
            }
        }
    }

    #[test]
    fn byte_stuffed_framing_roundtrips() {
        let headers = [
            HeaderFormat::LenByte,
            HeaderFormat::LenCtrByte,
            HeaderFormat::LenFillByte,
            HeaderFormat::LenWord,
            HeaderFormat::LenCtrWord,
            HeaderFormat::LenFillWord,
        ];
        let tails = [TailFormat::NoChecksum, TailFormat::ChecksumByte, TailFormat::ChecksumWord];
        for &h in &headers {
            for &t in &tails {
                roundtrip(h, t, Some((0x01, 0x00)));
            }
        }
    }

    #[test]
    fn byte_stuffed_frames_decode_back_to_back_without_a_trailing_sync() {
        let cfg = SxiFraming {
            header: HeaderFormat::LenWord,
            tail: TailFormat::NoChecksum,
            byte_stuffing: Some((0x01, 0x00)),
            max_cto: 255,
            max_dto: 1500,
        };
        let mut wire = Vec::new();
        wire.extend(cfg.encode(&[1, 2, 3], 0));
        wire.extend(cfg.encode(&[4, 5, 6], 1));
        wire.extend(cfg.encode(&[7, 8, 9], 2));

        let mut dec = SxiDecoder::new(cfg);
        let frames = dec.feed(&wire).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].payload, vec![1, 2, 3]);
        assert_eq!(frames[1].payload, vec![4, 5, 6]);
        assert_eq!(frames[2].payload, vec![7, 8, 9]);
    }

    #[test]
    fn byte_stuffed_framing_escapes_sync_and_esc_bytes_in_payload() {
        let cfg = SxiFraming {
            header: HeaderFormat::LenByte,
            tail: TailFormat::NoChecksum,
            byte_stuffing: Some((0x01, 0x00)),
            max_cto: 255,
            max_dto: 1500,
        };
        let payload = [0x01, 0x00, 0x02, 0x01];
        let framed = cfg.encode(&payload, 5);
        let mut dec = SxiDecoder::new(cfg);
        let frames = dec.feed(&framed).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, payload);
    }

    #[test]
    fn checksum_mismatch_is_detected() {
        let cfg = SxiFraming {
            header: HeaderFormat::LenByte,
            tail: TailFormat::ChecksumByte,
            byte_stuffing: None,
            max_cto: 255,
            max_dto: 1500,
        };
        let mut framed = cfg.encode(&[1, 2, 3], 0);
        *framed.last_mut().unwrap() ^= 0xFF;
        let mut dec = SxiDecoder::new(cfg);
        assert!(dec.feed(&framed).is_err());
    }

    #[test]
    fn streaming_across_arbitrary_chunks() {
        let cfg = SxiFraming {
            header: HeaderFormat::LenWord,
            tail: TailFormat::NoChecksum,
            byte_stuffing: None,
            max_cto: 255,
            max_dto: 1500,
        };
        let framed = cfg.encode(&[9, 8, 7], 3);
        let mut dec = SxiDecoder::new(cfg);
        let mut got = Vec::new();
        for byte in framed {
            got.extend(dec.feed(&[byte]).unwrap());
        }
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].payload, vec![9, 8, 7]);
    }
}
