//----------------------------------------------------------------------------------------------
// Module pdu
// Byte-exact request builders and response parsers for every XCP service, parameterized by
// SlaveProperties::byte_order / address_granularity. Grounded in xcp_client.rs's
// XcpCommandBuilder and per-service response parsing, generalized from little-endian-only to
// both byte orders and to the full service list in spec.md section 4.5.

use byteorder::{ByteOrder as _, BigEndian, LittleEndian};

use crate::command::XcpCommand;
use crate::error::{FramingError, XcpCoreError};
use crate::types::{AddressGranularity, ByteOrder, Mta};

/// Writes multi-byte fields in the session's negotiated byte order. CONNECT itself is always
/// built with a fixed parameter byte; everything after uses the order from the CONNECT response.
pub struct PduBuilder {
    pub byte_order: ByteOrder,
    pub address_granularity: AddressGranularity,
}

impl PduBuilder {
    pub fn new(byte_order: ByteOrder, address_granularity: AddressGranularity) -> Self {
        PduBuilder { byte_order, address_granularity }
    }

    fn put_u16(&self, buf: &mut Vec<u8>, v: u16) {
        let mut tmp = [0u8; 2];
        match self.byte_order {
            ByteOrder::Little => LittleEndian::write_u16(&mut tmp, v),
            ByteOrder::Big => BigEndian::write_u16(&mut tmp, v),
        }
        buf.extend_from_slice(&tmp);
    }

    fn put_u32(&self, buf: &mut Vec<u8>, v: u32) {
        let mut tmp = [0u8; 4];
        match self.byte_order {
            ByteOrder::Little => LittleEndian::write_u32(&mut tmp, v),
            ByteOrder::Big => BigEndian::write_u32(&mut tmp, v),
        }
        buf.extend_from_slice(&tmp);
    }

    fn get_u16(&self, buf: &[u8]) -> u16 {
        match self.byte_order {
            ByteOrder::Little => LittleEndian::read_u16(buf),
            ByteOrder::Big => BigEndian::read_u16(buf),
        }
    }

    fn get_u32(&self, buf: &[u8]) -> u32 {
        match self.byte_order {
            ByteOrder::Little => LittleEndian::read_u32(buf),
            ByteOrder::Big => BigEndian::read_u32(buf),
        }
    }

    /// Padding bytes between a count field and the first data element in DOWNLOAD-family and
    /// PROGRAM-family requests: 0 for byte AG, 1 for word AG, 3 for dword AG.
    fn alignment_pad(&self) -> usize {
        match self.address_granularity {
            AddressGranularity::Byte => 0,
            AddressGranularity::Word => 1,
            AddressGranularity::Dword => 3,
        }
    }

    /// Maximum data bytes one DOWNLOAD/DOWNLOAD_NEXT/PROGRAM/PROGRAM_NEXT request can carry given
    /// the slave's negotiated `max_cto` -- the 2-byte command+length header plus alignment padding
    /// come out of the same CTO frame.
    pub fn download_chunk_capacity(&self, max_cto: usize) -> usize {
        max_cto.saturating_sub(2 + self.alignment_pad())
    }

    pub fn connect(mode: u8) -> Vec<u8> {
        vec![XcpCommand::Connect.code(), mode]
    }

    pub fn disconnect() -> Vec<u8> {
        vec![XcpCommand::Disconnect.code()]
    }

    pub fn get_status() -> Vec<u8> {
        vec![XcpCommand::GetStatus.code()]
    }

    pub fn synch() -> Vec<u8> {
        vec![XcpCommand::Synch.code()]
    }

    pub fn get_comm_mode_info() -> Vec<u8> {
        vec![XcpCommand::GetCommModeInfo.code()]
    }

    pub fn set_request(mode: u8, session_config_id: u16) -> Vec<u8> {
        let mut buf = vec![XcpCommand::SetRequest.code(), mode];
        let mut tmp = [0u8; 2];
        LittleEndian::write_u16(&mut tmp, session_config_id);
        buf.extend_from_slice(&tmp);
        buf
    }

    pub fn get_id(req_id: u8) -> Vec<u8> {
        vec![XcpCommand::GetId.code(), req_id]
    }

    pub fn get_version() -> Vec<u8> {
        vec![XcpCommand::GetVersion.code(), 0, 0, 0, 0, 0]
    }

    pub fn get_seed(mode: u8, resource: u8) -> Vec<u8> {
        vec![XcpCommand::GetSeed.code(), mode, resource]
    }

    pub fn unlock(&self, key_chunk: &[u8], total_key_length: u8) -> Vec<u8> {
        let mut buf = vec![XcpCommand::Unlock.code(), total_key_length.min(key_chunk.len() as u8)];
        buf.extend_from_slice(key_chunk);
        buf
    }

    pub fn set_mta(&self, mta: Mta) -> Vec<u8> {
        let mut buf = vec![XcpCommand::SetMta.code(), 0, 0, mta.extension];
        self.put_u32(&mut buf, mta.address);
        buf
    }

    pub fn upload(n: u8) -> Vec<u8> {
        vec![XcpCommand::Upload.code(), n]
    }

    pub fn short_upload(&self, n: u8, mta: Mta) -> Vec<u8> {
        let mut buf = vec![XcpCommand::ShortUpload.code(), n, 0, mta.extension];
        self.put_u32(&mut buf, mta.address);
        buf
    }

    pub fn build_checksum(n: u32) -> Vec<u8> {
        let mut buf = vec![XcpCommand::BuildChecksum.code(), 0, 0, 0];
        let mut tmp = [0u8; 4];
        LittleEndian::write_u32(&mut tmp, n);
        buf.extend_from_slice(&tmp);
        buf
    }

    /// DOWNLOAD: `[cc, len, pad..., data...]`. `pad` bytes depend on address_granularity.
    pub fn download(&self, data: &[u8]) -> Vec<u8> {
        let mut buf = vec![XcpCommand::Download.code(), data.len() as u8];
        buf.extend(std::iter::repeat(0u8).take(self.alignment_pad()));
        buf.extend_from_slice(data);
        buf
    }

    pub fn download_next(&self, data: &[u8]) -> Vec<u8> {
        let mut buf = vec![XcpCommand::DownloadNext.code(), data.len() as u8];
        buf.extend(std::iter::repeat(0u8).take(self.alignment_pad()));
        buf.extend_from_slice(data);
        buf
    }

    pub fn download_max(&self, data: &[u8]) -> Vec<u8> {
        let mut buf = vec![XcpCommand::DownloadMax.code()];
        buf.extend(std::iter::repeat(0u8).take(self.alignment_pad() + 1));
        buf.extend_from_slice(data);
        buf
    }

    pub fn short_download(&self, data: &[u8], mta: Mta) -> Vec<u8> {
        let mut buf = vec![XcpCommand::ShortDownload.code(), data.len() as u8, 0, mta.extension];
        self.put_u32(&mut buf, mta.address);
        buf.extend_from_slice(data);
        buf
    }

    pub fn modify_bits(shift: u8, and_mask: u16, xor_mask: u16) -> Vec<u8> {
        let mut buf = vec![XcpCommand::ModifyBits.code(), shift];
        let mut tmp = [0u8; 2];
        LittleEndian::write_u16(&mut tmp, and_mask);
        buf.extend_from_slice(&tmp);
        LittleEndian::write_u16(&mut tmp, xor_mask);
        buf.extend_from_slice(&tmp);
        buf
    }

    pub fn set_cal_page(mode: u8, segment: u8, page: u8) -> Vec<u8> {
        vec![XcpCommand::SetCalPage.code(), mode, segment, page]
    }

    pub fn get_cal_page(mode: u8, segment: u8) -> Vec<u8> {
        vec![XcpCommand::GetCalPage.code(), mode, segment, 0]
    }

    pub fn get_pag_processor_info() -> Vec<u8> {
        vec![XcpCommand::GetPagProcessorInfo.code()]
    }

    pub fn get_segment_info(mode: u8, segment: u8, mapping: u8, mapping_index: u8) -> Vec<u8> {
        vec![XcpCommand::GetSegmentInfo.code(), mode, segment, mapping, mapping_index]
    }

    pub fn get_page_info(segment: u8, page: u8) -> Vec<u8> {
        vec![XcpCommand::GetPageInfo.code(), 0, segment, page]
    }

    pub fn set_segment_mode(mode: u8, segment: u8) -> Vec<u8> {
        vec![XcpCommand::SetSegmentMode.code(), mode, segment]
    }

    pub fn get_segment_mode(segment: u8) -> Vec<u8> {
        vec![XcpCommand::GetSegmentMode.code(), 0, segment]
    }

    pub fn copy_cal_page(src_segment: u8, src_page: u8, dst_segment: u8, dst_page: u8) -> Vec<u8> {
        vec![XcpCommand::CopyCalPage.code(), src_segment, src_page, dst_segment, dst_page]
    }

    pub fn clear_daq_list(&self, daq_list: u16) -> Vec<u8> {
        let mut buf = vec![XcpCommand::ClearDaqList.code(), 0];
        self.put_u16(&mut buf, daq_list);
        buf
    }

    pub fn set_daq_ptr(&self, daq_list: u16, odt: u8, odt_entry: u8) -> Vec<u8> {
        let mut buf = vec![XcpCommand::SetDaqPtr.code(), 0];
        self.put_u16(&mut buf, daq_list);
        buf.push(odt);
        buf.push(odt_entry);
        buf
    }

    pub fn write_daq(&self, bit_offset: u8, size: u8, ext: u8, addr: u32) -> Vec<u8> {
        let mut buf = vec![XcpCommand::WriteDaq.code(), bit_offset, size, ext];
        self.put_u32(&mut buf, addr);
        buf
    }

    pub fn write_daq_multiple(&self, entries: &[(u8, u8, u8, u32)]) -> Vec<u8> {
        let mut buf = vec![XcpCommand::WriteDaqMultiple.code(), entries.len() as u8];
        for &(bit_offset, size, ext, addr) in entries {
            buf.push(bit_offset);
            buf.push(size);
            buf.push(ext);
            self.put_u32(&mut buf, addr);
        }
        buf
    }

    pub fn set_daq_list_mode(&self, mode: u8, daq_list: u16, event_channel: u16, prescaler: u8, priority: u8) -> Vec<u8> {
        let mut buf = vec![XcpCommand::SetDaqListMode.code(), mode];
        self.put_u16(&mut buf, daq_list);
        self.put_u16(&mut buf, event_channel);
        buf.push(prescaler);
        buf.push(priority);
        buf
    }

    pub fn get_daq_list_mode(&self, daq_list: u16) -> Vec<u8> {
        let mut buf = vec![XcpCommand::GetDaqListMode.code(), 0];
        self.put_u16(&mut buf, daq_list);
        buf
    }

    pub fn start_stop_daq_list(&self, mode: u8, daq_list: u16) -> Vec<u8> {
        let mut buf = vec![XcpCommand::StartStopDaqList.code(), mode];
        self.put_u16(&mut buf, daq_list);
        buf
    }

    pub fn start_stop_synch(mode: u8) -> Vec<u8> {
        vec![XcpCommand::StartStopSynch.code(), mode]
    }

    pub fn get_daq_clock() -> Vec<u8> {
        vec![XcpCommand::GetDaqClock.code(), 0, 0, 0]
    }

    pub fn read_daq(odt_entry: u8) -> Vec<u8> {
        vec![XcpCommand::ReadDaq.code(), odt_entry]
    }

    pub fn get_daq_processor_info() -> Vec<u8> {
        vec![XcpCommand::GetDaqProcessorInfo.code()]
    }

    pub fn get_daq_resolution_info() -> Vec<u8> {
        vec![XcpCommand::GetDaqResolutionInfo.code()]
    }

    pub fn get_daq_list_info(&self, daq_list: u16) -> Vec<u8> {
        let mut buf = vec![XcpCommand::GetDaqListInfo.code(), 0];
        self.put_u16(&mut buf, daq_list);
        buf
    }

    pub fn get_daq_event_info(&self, event_channel: u16) -> Vec<u8> {
        let mut buf = vec![XcpCommand::GetDaqEventInfo.code(), 0];
        self.put_u16(&mut buf, event_channel);
        buf
    }

    pub fn dto_ctr_properties(mode: u8, event: u16, ctr_offset: u8) -> Vec<u8> {
        let mut buf = vec![XcpCommand::DtoCtrProperties.code(), mode];
        let mut tmp = [0u8; 2];
        LittleEndian::write_u16(&mut tmp, event);
        buf.extend_from_slice(&tmp);
        buf.push(ctr_offset);
        buf.push(0);
        buf
    }

    pub fn free_daq() -> Vec<u8> {
        vec![XcpCommand::FreeDaq.code(), 0]
    }

    pub fn alloc_daq(&self, count: u16) -> Vec<u8> {
        let mut buf = vec![XcpCommand::AllocDaq.code(), 0];
        self.put_u16(&mut buf, count);
        buf
    }

    pub fn alloc_odt(&self, daq_list: u16, count: u8) -> Vec<u8> {
        let mut buf = vec![XcpCommand::AllocOdt.code(), 0];
        self.put_u16(&mut buf, daq_list);
        buf.push(count);
        buf
    }

    pub fn alloc_odt_entry(&self, daq_list: u16, odt: u8, count: u8) -> Vec<u8> {
        let mut buf = vec![XcpCommand::AllocOdtEntry.code(), 0];
        self.put_u16(&mut buf, daq_list);
        buf.push(odt);
        buf.push(count);
        buf
    }

    pub fn transport_layer_cmd(sub_command: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![XcpCommand::TransportLayerCmd.code(), sub_command];
        buf.extend_from_slice(payload);
        buf
    }

    pub fn user_cmd(sub_command: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![XcpCommand::UserCmd.code(), sub_command];
        buf.extend_from_slice(payload);
        buf
    }

    pub fn program_start() -> Vec<u8> {
        vec![XcpCommand::ProgramStart.code()]
    }

    pub fn program_clear(&self, mode: u8, range: u32) -> Vec<u8> {
        let mut buf = vec![XcpCommand::ProgramClear.code(), mode, 0, 0];
        self.put_u32(&mut buf, range);
        buf
    }

    pub fn program(&self, data: &[u8]) -> Vec<u8> {
        let mut buf = vec![XcpCommand::Program.code(), data.len() as u8];
        buf.extend(std::iter::repeat(0u8).take(self.alignment_pad()));
        buf.extend_from_slice(data);
        buf
    }

    pub fn program_reset() -> Vec<u8> {
        vec![XcpCommand::ProgramReset.code()]
    }

    pub fn get_pgm_processor_info() -> Vec<u8> {
        vec![XcpCommand::GetPgmProcessorInfo.code()]
    }

    pub fn get_sector_info(mode: u8, sector: u8) -> Vec<u8> {
        vec![XcpCommand::GetSectorInfo.code(), mode, sector]
    }

    pub fn program_prepare(&self, size: u16) -> Vec<u8> {
        let mut buf = vec![XcpCommand::ProgramPrepare.code(), 0];
        self.put_u16(&mut buf, size);
        buf
    }

    pub fn program_format(compression: u8, encryption: u8, layout: u8, access_mode: u8) -> Vec<u8> {
        vec![XcpCommand::ProgramFormat.code(), compression, encryption, layout, access_mode]
    }

    pub fn program_next(&self, data: &[u8]) -> Vec<u8> {
        let mut buf = vec![XcpCommand::ProgramNext.code(), data.len() as u8];
        buf.extend(std::iter::repeat(0u8).take(self.alignment_pad()));
        buf.extend_from_slice(data);
        buf
    }

    pub fn program_max(&self, data: &[u8]) -> Vec<u8> {
        let mut buf = vec![XcpCommand::ProgramMax.code()];
        buf.extend(std::iter::repeat(0u8).take(self.alignment_pad() + 1));
        buf.extend_from_slice(data);
        buf
    }

    pub fn program_verify(kind: u8, mode: u16, value: u32) -> Vec<u8> {
        let mut buf = vec![XcpCommand::ProgramVerify.code(), kind];
        let mut tmp = [0u8; 2];
        LittleEndian::write_u16(&mut tmp, mode);
        buf.extend_from_slice(&tmp);
        let mut tmp4 = [0u8; 4];
        LittleEndian::write_u32(&mut tmp4, value);
        buf.extend_from_slice(&tmp4);
        buf
    }

    pub fn time_correlation_properties(set_properties: u8, get_properties_request: u8, cluster_id: u16) -> Vec<u8> {
        let mut buf = vec![XcpCommand::TimeCorrelationProperties.code(), set_properties, get_properties_request, 0];
        let mut tmp = [0u8; 2];
        LittleEndian::write_u16(&mut tmp, cluster_id);
        buf.extend_from_slice(&tmp);
        buf.push(0);
        buf.push(0);
        buf
    }

    pub fn set_daq_packed_mode(&self, daq_list: u16, mode: u8, time_mode: u8, sample_count: u16) -> Vec<u8> {
        let mut buf = vec![XcpCommand::SetDaqPackedMode.code(), 0];
        self.put_u16(&mut buf, daq_list);
        buf.push(mode);
        buf.push(time_mode);
        self.put_u16(&mut buf, sample_count);
        buf
    }

    pub fn get_daq_packed_mode(&self, daq_list: u16) -> Vec<u8> {
        let mut buf = vec![XcpCommand::GetDaqPackedMode.code(), 1];
        self.put_u16(&mut buf, daq_list);
        buf
    }
}

/// Parsed CONNECT response: resource flags, comm mode, max_cto, max_dto, versions.
#[derive(Debug, Clone)]
pub struct ConnectResponse {
    pub resource: u8,
    pub comm_mode_basic: u8,
    pub max_cto: u8,
    pub max_dto: u16,
    pub protocol_layer_version: u8,
    pub transport_layer_version: u8,
}

pub fn parse_connect_response(payload: &[u8]) -> Result<ConnectResponse, XcpCoreError> {
    require_len(payload, 7)?;
    let byte_order = if payload[1] & 0x01 != 0 { ByteOrder::Big } else { ByteOrder::Little };
    let max_dto = match byte_order {
        ByteOrder::Little => LittleEndian::read_u16(&payload[3..5]),
        ByteOrder::Big => BigEndian::read_u16(&payload[3..5]),
    };
    Ok(ConnectResponse {
        resource: payload[0],
        comm_mode_basic: payload[1],
        max_cto: payload[2],
        max_dto,
        protocol_layer_version: payload[5],
        transport_layer_version: payload[6],
    })
}

fn require_len(payload: &[u8], n: usize) -> Result<(), XcpCoreError> {
    if payload.len() < n {
        return Err(FramingError::ShortRead { need: n, have: payload.len() }.into());
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct GetSeedResponse {
    pub remaining: u8,
    pub seed_chunk: Vec<u8>,
}

pub fn parse_get_seed_response(payload: &[u8]) -> Result<GetSeedResponse, XcpCoreError> {
    require_len(payload, 1)?;
    Ok(GetSeedResponse { remaining: payload[0], seed_chunk: payload[1..].to_vec() })
}

#[derive(Debug, Clone, Default)]
pub struct StatusResponse {
    pub session_status: u8,
    pub resource_protection: u8,
    pub session_config_id: u16,
}

pub fn parse_status_response(byte_order: ByteOrder, payload: &[u8]) -> Result<StatusResponse, XcpCoreError> {
    require_len(payload, 2)?;
    let session_config_id = if payload.len() >= 4 {
        match byte_order {
            ByteOrder::Little => LittleEndian::read_u16(&payload[2..4]),
            ByteOrder::Big => BigEndian::read_u16(&payload[2..4]),
        }
    } else {
        0
    };
    Ok(StatusResponse { session_status: payload[0], resource_protection: payload[1], session_config_id })
}

/// Decodes the GET_ID response's textual identification, once the data has been fully fetched
/// via UPLOAD (mode 0: the length-prefixed immediate form is handled by the session, not here).
pub fn decode_id_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[derive(Debug, Clone)]
pub struct GetIdResponse {
    pub mode: u8,
    pub length: u32,
}

pub fn parse_get_id_response(byte_order: ByteOrder, payload: &[u8]) -> Result<GetIdResponse, XcpCoreError> {
    // Wire layout after the PID byte: MODE(1), Reserved(2), Length(4) -- 7 bytes total.
    require_len(payload, 7)?;
    let length = match byte_order {
        ByteOrder::Little => LittleEndian::read_u32(&payload[3..7]),
        ByteOrder::Big => BigEndian::read_u32(&payload[3..7]),
    };
    Ok(GetIdResponse { mode: payload[0], length })
}

#[derive(Debug, Clone)]
pub struct CommModeInfoResponse {
    pub comm_mode_optional: u8,
    pub max_bs: u8,
    pub min_st: u8,
    pub queue_size: u8,
    pub driver_version: u8,
}

pub fn parse_comm_mode_info_response(payload: &[u8]) -> Result<CommModeInfoResponse, XcpCoreError> {
    require_len(payload, 6)?;
    Ok(CommModeInfoResponse {
        comm_mode_optional: payload[1],
        max_bs: payload[3],
        min_st: payload[4],
        queue_size: payload[5],
        driver_version: *payload.get(6).unwrap_or(&0),
    })
}

#[derive(Debug, Clone)]
pub struct DaqProcessorInfoResponse {
    pub daq_properties: u8,
    pub max_daq: u16,
    pub max_event_channel: u16,
    pub min_daq: u8,
    pub daq_key_byte: u8,
}

pub fn parse_daq_processor_info_response(byte_order: ByteOrder, payload: &[u8]) -> Result<DaqProcessorInfoResponse, XcpCoreError> {
    require_len(payload, 7)?;
    let (max_daq, max_event_channel) = match byte_order {
        ByteOrder::Little => (LittleEndian::read_u16(&payload[1..3]), LittleEndian::read_u16(&payload[3..5])),
        ByteOrder::Big => (BigEndian::read_u16(&payload[1..3]), BigEndian::read_u16(&payload[3..5])),
    };
    Ok(DaqProcessorInfoResponse {
        daq_properties: payload[0],
        max_daq,
        max_event_channel,
        min_daq: payload[5],
        daq_key_byte: payload[6],
    })
}

#[derive(Debug, Clone)]
pub struct DaqResolutionInfoResponse {
    pub granularity_odt_entry_daq: u8,
    pub max_odt_entry_size_daq: u8,
    pub granularity_odt_entry_stim: u8,
    pub max_odt_entry_size_stim: u8,
    pub timestamp_mode: u8,
    pub timestamp_ticks: u16,
}

pub fn parse_daq_resolution_info_response(byte_order: ByteOrder, payload: &[u8]) -> Result<DaqResolutionInfoResponse, XcpCoreError> {
    require_len(payload, 7)?;
    let timestamp_ticks = match byte_order {
        ByteOrder::Little => LittleEndian::read_u16(&payload[5..7]),
        ByteOrder::Big => BigEndian::read_u16(&payload[5..7]),
    };
    Ok(DaqResolutionInfoResponse {
        granularity_odt_entry_daq: payload[0],
        max_odt_entry_size_daq: payload[1],
        granularity_odt_entry_stim: payload[2],
        max_odt_entry_size_stim: payload[3],
        timestamp_mode: payload[4],
        timestamp_ticks,
    })
}

/// DAQ timestamp unit, the low nibble of `DaqResolutionInfoResponse::timestamp_mode` (XCP Part 2
/// table "Timestamp unit"): resolution in nanoseconds is 10^unit -- matches xcp_client.rs's
/// `get_daq_resolution_info` exponent table.
pub fn timestamp_unit_ns(timestamp_mode: u8) -> u64 {
    let unit = timestamp_mode & 0x0F;
    10u64.pow(unit.min(9) as u32)
}

/// Byte width of the fixed DAQ timestamp, the `timestamp_mode` bits 4-5 (0=none, 1=byte, 2=word,
/// 4=dword -- values 3/5-15 unused by the standard and treated as "no timestamp" here).
pub fn timestamp_size_bytes(timestamp_mode: u8) -> u8 {
    match (timestamp_mode >> 4) & 0x0F {
        1 => 1,
        2 => 2,
        4 => 4,
        _ => 0,
    }
}

#[derive(Debug, Clone)]
pub struct DaqClockResponse {
    pub trigger_info: u8,
    pub timestamp: u32,
}

pub fn parse_daq_clock_response(byte_order: ByteOrder, payload: &[u8]) -> Result<DaqClockResponse, XcpCoreError> {
    require_len(payload, 5)?;
    let timestamp = match byte_order {
        ByteOrder::Little => LittleEndian::read_u32(&payload[1..5]),
        ByteOrder::Big => BigEndian::read_u32(&payload[1..5]),
    };
    Ok(DaqClockResponse { trigger_info: payload[0], timestamp })
}
