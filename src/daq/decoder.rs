//----------------------------------------------------------------------------------------------
// Module daq::decoder
// DAQ decoder (C10): routes an incoming DAQ PDU to its owning list/ODT by PID, decodes the
// leading timestamp (ODT 0 only) and each MemoryBlock's components, then invokes a per-list
// callback. Grounded in xcp_client.rs's XcpDaqDecoder trait and the tokio_demo DaqDecoder decode
// loop; see spec.md section 4.10 and scenario S4.

use byteorder::{ByteOrder as _, BigEndian, LittleEndian};

use crate::error::XcpCoreError;
use crate::types::{ByteOrder, DaqList, DataType};

/// One decoded scalar value, tagged with the measurement name it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedValue {
    pub name: String,
    pub value: Scalar,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    U64(u64),
    I64(i64),
    F64(f64),
}

/// Timestamp resolution reported by GET_DAQ_RESOLUTION_INFO: byte width and tick-to-ns scale.
#[derive(Debug, Clone, Copy)]
pub struct TimestampInfo {
    pub size_bytes: u8, // 0, 1, 2 or 4
    pub tick_ns: u64,
}

/// One decoded DAQ sample, as delivered to the per-list callback.
#[derive(Debug, Clone)]
pub struct DaqSample {
    pub list_index: usize,
    pub ts_master_ns: u64,
    pub ts_slave_ns: Option<u64>,
    pub values: Vec<DecodedValue>,
}

/// Per-event-channel timestamp epoch: ODT 0 carries the timestamp, later ODTs in the same
/// trigger inherit it until the next ODT 0.
#[derive(Default)]
struct Epoch {
    ts_slave_ns: Option<u64>,
}

pub struct DaqDecoder {
    byte_order: ByteOrder,
    timestamp: Option<TimestampInfo>,
    epochs: Vec<Epoch>,
}

impl DaqDecoder {
    pub fn new(byte_order: ByteOrder, timestamp: Option<TimestampInfo>, list_count: usize) -> Self {
        DaqDecoder { byte_order, timestamp, epochs: (0..list_count).map(|_| Epoch::default()).collect() }
    }

    fn read_u16(&self, buf: &[u8]) -> u16 {
        match self.byte_order {
            ByteOrder::Little => LittleEndian::read_u16(buf),
            ByteOrder::Big => BigEndian::read_u16(buf),
        }
    }

    fn read_u32(&self, buf: &[u8]) -> u32 {
        match self.byte_order {
            ByteOrder::Little => LittleEndian::read_u32(buf),
            ByteOrder::Big => BigEndian::read_u32(buf),
        }
    }

    fn read_u64(&self, buf: &[u8]) -> u64 {
        match self.byte_order {
            ByteOrder::Little => LittleEndian::read_u64(buf),
            ByteOrder::Big => BigEndian::read_u64(buf),
        }
    }

    fn decode_scalar(&self, dt: DataType, buf: &[u8]) -> Scalar {
        use DataType::*;
        match dt {
            U8 => Scalar::U64(buf[0] as u64),
            I8 => Scalar::I64(buf[0] as i8 as i64),
            U16 => Scalar::U64(self.read_u16(buf) as u64),
            I16 => Scalar::I64(self.read_u16(buf) as i16 as i64),
            U32 => Scalar::U64(self.read_u32(buf) as u64),
            I32 => Scalar::I64(self.read_u32(buf) as i32 as i64),
            U64 => Scalar::U64(self.read_u64(buf)),
            I64 => Scalar::I64(self.read_u64(buf) as i64),
            F32 => {
                let bits = self.read_u32(buf);
                Scalar::F64(f32::from_bits(bits) as f64)
            }
            F64 => {
                let bits = self.read_u64(buf);
                Scalar::F64(f64::from_bits(bits))
            }
            F16 | Bf16 => {
                // Half-precision formats: widen to f32 via the IEEE-754 half layout.
                let bits = self.read_u16(buf);
                Scalar::F64(half_to_f32(bits, dt) as f64)
            }
        }
    }

    /// Finds `(list_index, odt_index)` owning PID `pid` given each list's `first_pid` and ODT
    /// count. Returns `XcpProtocolError` (as a String, per spec.md section 7) if no list owns it.
    fn locate(&self, pid: u8, lists: &[DaqList]) -> Result<(usize, usize), XcpCoreError> {
        for (i, list) in lists.iter().enumerate() {
            if let Some(range) = list.pid_range() {
                let pid16 = pid as u16;
                if range.contains(&pid16) {
                    return Ok((i, (pid16 - range.start) as usize));
                }
            }
        }
        Err(XcpCoreError::Protocol(format!("DAQ PID 0x{pid:02X} does not belong to any configured list")))
    }

    /// Decodes one received DAQ frame `(pid, payload)` against `lists`, returning the sample.
    pub fn decode(&mut self, pid: u8, payload: &[u8], lists: &[DaqList], ts_master_ns: u64) -> Result<DaqSample, XcpCoreError> {
        let (list_index, odt_index) = self.locate(pid, lists)?;
        let list = &lists[list_index];
        let odt = list.planned_odts.get(odt_index).ok_or_else(|| {
            XcpCoreError::Protocol(format!("list {list_index} has no ODT at index {odt_index}"))
        })?;

        let mut cursor = 0usize;
        let ts_slave_ns = if odt_index == 0 && list.enable_timestamps {
            let info = self.timestamp.ok_or_else(|| XcpCoreError::Protocol("timestamps enabled but no resolution info known".into()))?;
            let ts = match info.size_bytes {
                1 => payload.first().copied().unwrap_or(0) as u64,
                2 => self.read_u16(&payload[0..2]) as u64,
                4 => self.read_u32(&payload[0..4]) as u64,
                _ => 0,
            } * info.tick_ns;
            cursor += info.size_bytes as usize;
            self.epochs[list_index].ts_slave_ns = Some(ts);
            Some(ts)
        } else {
            self.epochs[list_index].ts_slave_ns
        };

        let mut values = Vec::new();
        for block in &odt.entries {
            let slice = payload.get(cursor..cursor + block.length).ok_or_else(|| {
                XcpCoreError::Protocol(format!("DAQ payload too short: need {} more bytes at offset {cursor}", block.length))
            })?;
            let mut offset = 0;
            for component in &block.components {
                let len = component.length();
                let value = self.decode_scalar(component.data_type, &slice[offset..offset + len]);
                values.push(DecodedValue { name: component.name.clone(), value });
                offset += len;
            }
            cursor += block.length;
        }

        Ok(DaqSample { list_index, ts_master_ns, ts_slave_ns, values })
    }
}

fn half_to_f32(bits: u16, dt: DataType) -> f32 {
    match dt {
        DataType::Bf16 => f32::from_bits((bits as u32) << 16),
        _ => {
            // IEEE-754 binary16 -> f32.
            let sign = (bits >> 15) & 0x1;
            let exp = (bits >> 10) & 0x1F;
            let frac = bits & 0x3FF;
            let f32_bits: u32 = if exp == 0 {
                if frac == 0 {
                    (sign as u32) << 31
                } else {
                    // Subnormal half -> normalized f32.
                    let mut e = -1i32;
                    let mut f = frac as u32;
                    while f & 0x400 == 0 {
                        f <<= 1;
                        e -= 1;
                    }
                    f &= 0x3FF;
                    let exp32 = (127 - 15 + e + 1) as u32;
                    ((sign as u32) << 31) | (exp32 << 23) | (f << 13)
                }
            } else if exp == 0x1F {
                ((sign as u32) << 31) | (0xFF << 23) | ((frac as u32) << 13)
            } else {
                let exp32 = exp as u32 - 15 + 127;
                ((sign as u32) << 31) | (exp32 << 23) | ((frac as u32) << 13)
            };
            f32::from_bits(f32_bits)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DaqDirection, MemoryBlock, Measurement, Odt};

    fn make_list(first_pid: u16) -> DaqList {
        let odt0 = Odt {
            capacity: 8,
            residual: 0,
            entries: vec![MemoryBlock {
                address: 0x1000,
                ext: 0,
                length: 8,
                components: vec![
                    Measurement { name: "A".into(), address: 0x1000, ext: 0, data_type: DataType::U32 },
                    Measurement { name: "B".into(), address: 0x1004, ext: 0, data_type: DataType::U32 },
                ],
            }],
        };
        let odt1 = Odt {
            capacity: 8,
            residual: 4,
            entries: vec![MemoryBlock {
                address: 0x1010,
                ext: 0,
                length: 4,
                components: vec![
                    Measurement { name: "C".into(), address: 0x1010, ext: 0, data_type: DataType::U16 },
                    Measurement { name: "D".into(), address: 0x1012, ext: 0, data_type: DataType::U16 },
                ],
            }],
        };
        DaqList {
            name: "list0".into(),
            event_channel: 0,
            direction: DaqDirection::Daq,
            enable_timestamps: true,
            prescaler: 1,
            priority: 0,
            measurements: vec![],
            planned_odts: vec![odt0, odt1],
            first_pid: Some(first_pid),
        }
    }

    /// Scenario S4 from spec.md section 8.
    #[test]
    fn scenario_s4_daq_decode_with_inherited_timestamp() {
        let lists = vec![make_list(10)];
        let ts_info = TimestampInfo { size_bytes: 2, tick_ns: 1 };
        let mut decoder = DaqDecoder::new(ByteOrder::Little, Some(ts_info), 1);

        let payload0 = vec![0x34, 0x12, 1, 0, 0, 0, 2, 0, 0, 0];
        let sample0 = decoder.decode(10, &payload0, &lists, 1000).unwrap();
        assert_eq!(sample0.list_index, 0);
        assert_eq!(sample0.ts_slave_ns, Some(0x1234));
        assert_eq!(sample0.values[0].value, Scalar::U64(1));
        assert_eq!(sample0.values[1].value, Scalar::U64(2));

        let payload1 = vec![3, 0, 4, 0];
        let sample1 = decoder.decode(11, &payload1, &lists, 1001).unwrap();
        assert_eq!(sample1.ts_slave_ns, Some(0x1234), "ODT 1 inherits ODT 0's timestamp epoch");
        assert_eq!(sample1.values[0].value, Scalar::U64(3));
        assert_eq!(sample1.values[1].value, Scalar::U64(4));
    }

    #[test]
    fn pid_outside_any_lists_range_is_protocol_error() {
        let lists = vec![make_list(10)];
        let mut decoder = DaqDecoder::new(ByteOrder::Little, None, 1);
        let err = decoder.decode(99, &[0u8; 8], &lists, 0).unwrap_err();
        assert!(matches!(err, XcpCoreError::Protocol(_)));
    }
}
