//----------------------------------------------------------------------------------------------
// Module session
// Master session (C6): the command surface a caller programs against. One method per XCP
// service, each going through `execute`, which drives the error handler's LIFO retry stack
// (errorhandler module) around the transport's blocking `send_command`. Grounded in
// xcp_client/src/xcp_client.rs's XcpClient (connect/disconnect/get_id/the cal-page and
// calibration-object convenience methods, the free_daq/alloc_daq/.../start_selected_daq_lists
// DAQ setup sequence) and pyxcp/master/master.py's Master (cond_unlock, the error-handler
// integration around every command); see spec.md section 4.6.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::command::{error_code, XcpCommand};
use crate::errorhandler::{Disposition, ErrorHandler, PreAction};
use crate::error::{Result, XcpCoreError};
use crate::pdu::{self, PduBuilder};
use crate::seedkey::SeedNKeyDriver;
use crate::transport::Transport;
use crate::types::{
    A2lAddr, A2lLimits, A2lType, AddressGranularity, BlockModeFlags, ByteOrder, Capabilities, DaqDirection,
    DaqList, DataType, Mta, ResourceProtection, SlaveProperties,
};

/// Logical calibration page selector, per XCP's GET/SET_CAL_PAGE MODE byte.
const CAL_PAGE_MODE_ECU: u8 = 0x01;
const CAL_PAGE_MODE_XCP: u8 = 0x02;
const CAL_PAGE_MODE_ALL: u8 = 0x80;

/// Result of a GET_ID request: either the slave has staged the string for UPLOAD, or it came
/// back inline in the response itself.
#[derive(Debug, Clone)]
pub enum GetIdValue {
    Available { length: u32 },
    Inline(String),
}

struct CalibrationObject {
    name: String,
    addr: A2lAddr,
    a2l_type: A2lType,
    limits: Option<A2lLimits>,
    cached: Option<f64>,
}

/// Opaque reference to a calibration object created by `create_calibration_object`. Stable for
/// the lifetime of the session; indices are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XcpCalibrationObjectHandle(usize);

/// The master side of one XCP connection. Synchronous: every method blocks until the slave
/// responds (or the configured timeout/retry budget is exhausted), matching the half-duplex CTO
/// channel it sits on top of.
pub struct XcpSession {
    transport: Arc<dyn Transport>,
    seed_n_key: Option<Arc<dyn SeedNKeyDriver>>,
    slave: Mutex<Option<SlaveProperties>>,
    mta: Mutex<Mta>,
    last_daq_ptr: Mutex<Option<(u16, u8, u8)>>,
    resource_protection: Mutex<ResourceProtection>,
    error_handler: Mutex<ErrorHandler>,
    calibration_objects: Mutex<Vec<CalibrationObject>>,
    connected: AtomicBool,
}

impl XcpSession {
    pub fn new(transport: Arc<dyn Transport>, max_retries: i32, seed_n_key: Option<Arc<dyn SeedNKeyDriver>>) -> Self {
        XcpSession {
            transport,
            seed_n_key,
            slave: Mutex::new(None),
            mta: Mutex::new(Mta::default()),
            last_daq_ptr: Mutex::new(None),
            resource_protection: Mutex::new(ResourceProtection::empty()),
            error_handler: Mutex::new(ErrorHandler::new(max_retries)),
            calibration_objects: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn slave_properties(&self) -> Option<SlaveProperties> {
        self.slave.lock().clone()
    }

    pub fn resource_protection(&self) -> ResourceProtection {
        *self.resource_protection.lock()
    }

    fn builder(&self) -> Result<PduBuilder> {
        let slave = self.slave.lock();
        let sp = slave.as_ref().ok_or(XcpCoreError::Disconnected)?;
        Ok(PduBuilder::new(sp.byte_order, sp.address_granularity))
    }

    fn byte_order(&self) -> Result<ByteOrder> {
        Ok(self.slave.lock().as_ref().ok_or(XcpCoreError::Disconnected)?.byte_order)
    }

    fn max_cto(&self) -> Result<usize> {
        Ok(self.slave.lock().as_ref().ok_or(XcpCoreError::Disconnected)?.max_cto as usize)
    }

    //--------------------------------------------------------------------------------------
    // Retry engine

    /// Sends one command and, on a slave ERR response or a channel timeout, consults the error
    /// handler and either retries (after running its pre-actions), returns a synthesized empty
    /// response (`Skip`), or surfaces a terminal error. Every other method in this file funnels
    /// through here rather than calling the transport directly.
    fn execute(&self, command: XcpCommand, payload: Vec<u8>) -> Result<Vec<u8>> {
        let mut pending = false;
        loop {
            match self.transport.send_command(command, &payload) {
                Ok(data) => {
                    if pending {
                        self.error_handler.lock().pop();
                    }
                    return Ok(data);
                }
                Err(err) => {
                    let code = match &err {
                        XcpCoreError::Response(r) => r.code(),
                        XcpCoreError::Timeout(_) => error_code::TIMEOUT,
                        _ => return Err(err),
                    };

                    if pending {
                        if self.error_handler.lock().consume_retry() {
                            let actions = self.error_handler.lock().top_pre_actions();
                            self.run_pre_actions(&actions)?;
                            continue;
                        }
                        return Err(err);
                    }

                    match self.error_handler.lock().handle(command, code) {
                        Disposition::Retry { pre_actions } => {
                            pending = true;
                            self.run_pre_actions(&pre_actions)?;
                            continue;
                        }
                        Disposition::Skip => return Ok(Vec::new()),
                        Disposition::Surface { severity, description } => {
                            return Err(XcpCoreError::Protocol(format!("{description} (severity={severity:?})")))
                        }
                        Disposition::RestartSession => {
                            return Err(XcpCoreError::Protocol(format!("{command:?}: slave requires a full session restart")))
                        }
                        Disposition::TerminateSession => {
                            self.connected.store(false, Ordering::Release);
                            return Err(XcpCoreError::Disconnected);
                        }
                    }
                }
            }
        }
    }

    /// Runs the pre-actions a retry disposition asked for. Talks to the transport directly
    /// (never through `execute`) except for `UnlockSlave`, which legitimately re-enters the
    /// normal command path; every other raw send here is best-effort and its result discarded,
    /// since the point is to put the slave back in a state where the retried command can
    /// succeed, not to treat the pre-action itself as the operation under retry.
    fn run_pre_actions(&self, actions: &[PreAction]) -> Result<()> {
        for action in actions {
            match action {
                PreAction::None => {}
                PreAction::WaitT7 => thread::sleep(Duration::from_millis(20)),
                PreAction::Synch => {
                    let _ = self.transport.send_command(XcpCommand::Synch, &PduBuilder::synch());
                }
                PreAction::SetMta => {
                    if let Ok(builder) = self.builder() {
                        let mta = *self.mta.lock();
                        let _ = self.transport.send_command(XcpCommand::SetMta, &builder.set_mta(mta));
                    }
                }
                PreAction::SetDaqPtr => {
                    if let (Ok(builder), Some((daq_list, odt, entry))) = (self.builder(), *self.last_daq_ptr.lock()) {
                        let _ = self.transport.send_command(XcpCommand::SetDaqPtr, &builder.set_daq_ptr(daq_list, odt, entry));
                    }
                }
                PreAction::UnlockSlave => {
                    self.cond_unlock(ResourceProtection::all())?;
                }
                PreAction::ReinitDaq => {
                    let _ = self.transport.send_command(XcpCommand::FreeDaq, &PduBuilder::free_daq());
                }
                PreAction::Download | PreAction::Upload | PreAction::Program => {
                    log::debug!("{action:?}: block-transfer resume is not tracked; the retried command restarts from its own arguments");
                }
                PreAction::DisplayError => {
                    log::warn!("XCP pre-action requested display of a non-fatal error condition");
                }
            }
        }
        Ok(())
    }

    //--------------------------------------------------------------------------------------
    // Connection lifecycle

    pub fn connect(&self, mode: u8) -> Result<pdu::ConnectResponse> {
        let data = self.execute(XcpCommand::Connect, PduBuilder::connect(mode))?;
        let resp = pdu::parse_connect_response(&data[1..])?;
        let byte_order = if resp.comm_mode_basic & 0x01 != 0 { ByteOrder::Big } else { ByteOrder::Little };
        let address_granularity = AddressGranularity::from_raw((resp.comm_mode_basic >> 1) & 0x03);
        *self.slave.lock() = Some(SlaveProperties {
            byte_order,
            address_granularity,
            max_cto: resp.max_cto,
            max_dto: resp.max_dto,
            capabilities: Capabilities::from_bits_truncate(resp.resource),
            block_mode: BlockModeFlags::from_bits_truncate(resp.comm_mode_basic),
            max_bs: 0,
            min_st: 0,
            protocol_layer_version: resp.protocol_layer_version,
            transport_layer_version: resp.transport_layer_version,
        });
        *self.mta.lock() = Mta::default();
        *self.resource_protection.lock() = ResourceProtection::empty();
        self.connected.store(true, Ordering::Release);
        Ok(resp)
    }

    pub fn disconnect(&self) -> Result<()> {
        self.execute(XcpCommand::Disconnect, PduBuilder::disconnect())?;
        self.connected.store(false, Ordering::Release);
        self.transport.close();
        Ok(())
    }

    pub fn get_status(&self) -> Result<pdu::StatusResponse> {
        let data = self.execute(XcpCommand::GetStatus, PduBuilder::get_status())?;
        let byte_order = self.byte_order()?;
        let resp = pdu::parse_status_response(byte_order, &data[1..])?;
        *self.resource_protection.lock() = ResourceProtection::from_bits_truncate(resp.resource_protection);
        Ok(resp)
    }

    pub fn synch(&self) -> Result<()> {
        self.execute(XcpCommand::Synch, PduBuilder::synch())?;
        Ok(())
    }

    pub fn get_comm_mode_info(&self) -> Result<pdu::CommModeInfoResponse> {
        let data = self.execute(XcpCommand::GetCommModeInfo, PduBuilder::get_comm_mode_info())?;
        let resp = pdu::parse_comm_mode_info_response(&data[1..])?;
        if let Some(sp) = self.slave.lock().as_mut() {
            sp.max_bs = resp.max_bs;
            sp.min_st = resp.min_st;
            if resp.comm_mode_optional & 0x01 != 0 {
                sp.block_mode.insert(BlockModeFlags::MASTER_BLOCK);
            }
        }
        Ok(resp)
    }

    pub fn set_request(&self, mode: u8, session_config_id: u16) -> Result<()> {
        self.execute(XcpCommand::SetRequest, PduBuilder::set_request(mode, session_config_id))?;
        Ok(())
    }

    pub fn get_version(&self) -> Result<Vec<u8>> {
        self.execute(XcpCommand::GetVersion, PduBuilder::get_version())
    }

    pub fn get_id(&self, id_type: u8) -> Result<GetIdValue> {
        let data = self.execute(XcpCommand::GetId, PduBuilder::get_id(id_type))?;
        let byte_order = self.byte_order()?;
        let resp = pdu::parse_get_id_response(byte_order, &data[1..])?;
        if resp.mode & 0x01 == 0 {
            Ok(GetIdValue::Available { length: resp.length })
        } else {
            // Full response layout: PID(1) + MODE(1) + Reserved(2) + Length(4) + inline string.
            let start = 8;
            let end = start + resp.length as usize;
            let bytes = data.get(start..end.min(data.len())).unwrap_or(&[]);
            Ok(GetIdValue::Inline(pdu::decode_id_string(bytes)))
        }
    }

    /// Convenience over `get_id`: GET_ID implicitly points the slave's MTA at the identification
    /// string, so an inline response is returned as-is and a staged one is fetched immediately.
    pub fn get_id_string(&self, id_type: u8) -> Result<String> {
        match self.get_id(id_type)? {
            GetIdValue::Inline(s) => Ok(s),
            GetIdValue::Available { length } => {
                let bytes = self.fetch(length as usize)?;
                Ok(pdu::decode_id_string(&bytes))
            }
        }
    }

    //--------------------------------------------------------------------------------------
    // Seed & key

    /// Unlocks `resources`, skipping entirely if every requested bit is already unlocked.
    /// Exchanges GET_SEED calls until the slave reports no remaining seed bytes, hands the
    /// assembled seed to the configured driver, then sends UNLOCK in `max_cto - 2`-sized chunks.
    pub fn cond_unlock(&self, resources: ResourceProtection) -> Result<()> {
        let already = *self.resource_protection.lock();
        let missing = resources - already;
        if missing.is_empty() {
            return Ok(());
        }
        let driver = self
            .seed_n_key
            .clone()
            .ok_or_else(|| XcpCoreError::Protocol("resource locked but no seed & key driver is configured".into()))?;

        let mut seed = Vec::new();
        let mut mode = 0x00u8;
        loop {
            let data = self.execute(XcpCommand::GetSeed, PduBuilder::get_seed(mode, missing.bits()))?;
            let resp = pdu::parse_get_seed_response(&data[1..])?;
            seed.extend_from_slice(&resp.seed_chunk);
            if resp.remaining == 0 {
                break;
            }
            mode = 0x01;
        }

        let key = driver.compute_key(missing.bits(), &seed)?;
        let max_cto = self.max_cto()?;
        let chunk_cap = max_cto.saturating_sub(2).max(1);
        let mut remaining_len = key.len();
        let mut last_status = already.bits();
        for chunk in key.chunks(chunk_cap) {
            let builder = self.builder()?;
            let data = self.execute(XcpCommand::Unlock, builder.unlock(chunk, remaining_len as u8))?;
            remaining_len -= chunk.len();
            last_status = *data.get(1).unwrap_or(&last_status);
        }
        *self.resource_protection.lock() = ResourceProtection::from_bits_truncate(last_status);
        Ok(())
    }

    //--------------------------------------------------------------------------------------
    // Memory transfer

    pub fn set_mta(&self, mta: Mta) -> Result<()> {
        let builder = self.builder()?;
        self.execute(XcpCommand::SetMta, builder.set_mta(mta))?;
        *self.mta.lock() = mta;
        Ok(())
    }

    pub fn upload(&self, n: u8) -> Result<Vec<u8>> {
        let data = self.execute(XcpCommand::Upload, PduBuilder::upload(n))?;
        Ok(data.get(1..).unwrap_or(&[]).to_vec())
    }

    pub fn short_upload(&self, n: u8, mta: Mta) -> Result<Vec<u8>> {
        let builder = self.builder()?;
        let data = self.execute(XcpCommand::ShortUpload, builder.short_upload(n, mta))?;
        Ok(data.get(1..).unwrap_or(&[]).to_vec())
    }

    /// Fetches `length` bytes starting at the current MTA, using slave-block-mode UPLOAD bursts
    /// when the slave advertised `SLAVE_BLOCK` support, and single-packet UPLOAD requests
    /// otherwise.
    pub fn fetch(&self, length: usize) -> Result<Vec<u8>> {
        let max_cto = self.max_cto()?;
        let chunk_cap = max_cto.saturating_sub(1).max(1);
        let slave_block = self
            .slave
            .lock()
            .as_ref()
            .map(|s| s.block_mode.contains(BlockModeFlags::SLAVE_BLOCK))
            .unwrap_or(false);

        let mut out = Vec::with_capacity(length);
        let mut remaining = length;
        while remaining > 0 {
            let request_n = remaining.min(255);
            let first = self.execute(XcpCommand::Upload, PduBuilder::upload(request_n as u8))?;
            let first_payload = first.get(1..).unwrap_or(&[]);
            out.extend_from_slice(first_payload);
            let mut got = first_payload.len();
            if got < request_n {
                if !slave_block {
                    return Err(XcpCoreError::Protocol(
                        "UPLOAD returned fewer bytes than requested and the slave does not advertise block mode".into(),
                    ));
                }
                let extra = self.transport.block_receive(XcpCommand::Upload, request_n - got)?;
                out.extend_from_slice(&extra);
                got += extra.len();
            }
            remaining -= got;
        }
        Ok(out)
    }

    pub fn build_checksum(&self, n: u32) -> Result<Vec<u8>> {
        let data = self.execute(XcpCommand::BuildChecksum, PduBuilder::build_checksum(n))?;
        Ok(data.get(1..).unwrap_or(&[]).to_vec())
    }

    pub fn short_download(&self, data: &[u8], mta: Mta) -> Result<()> {
        let builder = self.builder()?;
        self.execute(XcpCommand::ShortDownload, builder.short_download(data, mta))?;
        Ok(())
    }

    pub fn modify_bits(&self, shift: u8, and_mask: u16, xor_mask: u16) -> Result<()> {
        self.execute(XcpCommand::ModifyBits, PduBuilder::modify_bits(shift, and_mask, xor_mask))?;
        Ok(())
    }

    /// Writes `data` at the current MTA via DOWNLOAD followed by as many DOWNLOAD_NEXT calls as
    /// needed, each chunk sized to `max_cto`. Every chunk is awaited in turn: MASTER_BLOCK support
    /// only changes whether the slave accepts a DOWNLOAD_NEXT burst without intermediate replies,
    /// never whether the master is required to send one; a plain sequential transfer is always
    /// protocol-legal.
    pub fn push(&self, data: &[u8]) -> Result<()> {
        let max_cto = self.max_cto()?;
        let chunk_cap = {
            let builder = self.builder()?;
            builder.download_chunk_capacity(max_cto).max(1)
        };
        let mut chunks = data.chunks(chunk_cap);
        let Some(first) = chunks.next() else { return Ok(()) };
        {
            let builder = self.builder()?;
            self.execute(XcpCommand::Download, builder.download(first))?;
        }
        for chunk in chunks {
            let builder = self.builder()?;
            self.execute(XcpCommand::DownloadNext, builder.download_next(chunk))?;
        }
        Ok(())
    }

    pub fn download_max(&self, data: &[u8]) -> Result<()> {
        let builder = self.builder()?;
        self.execute(XcpCommand::DownloadMax, builder.download_max(data))?;
        Ok(())
    }

    //--------------------------------------------------------------------------------------
    // Calibration page handling

    pub fn get_cal_page(&self, mode: u8, segment: u8) -> Result<u8> {
        let data = self.execute(XcpCommand::GetCalPage, PduBuilder::get_cal_page(mode, segment))?;
        Ok(*data.get(3).unwrap_or(&0))
    }

    pub fn set_cal_page(&self, mode: u8, segment: u8, page: u8) -> Result<()> {
        self.execute(XcpCommand::SetCalPage, PduBuilder::set_cal_page(mode, segment, page))?;
        Ok(())
    }

    pub fn get_ecu_page(&self, segment: u8) -> Result<u8> {
        self.get_cal_page(CAL_PAGE_MODE_ECU, segment)
    }

    pub fn get_xcp_page(&self, segment: u8) -> Result<u8> {
        self.get_cal_page(CAL_PAGE_MODE_XCP, segment)
    }

    pub fn set_ecu_page(&self, segment: u8, page: u8) -> Result<()> {
        self.set_cal_page(CAL_PAGE_MODE_ECU | CAL_PAGE_MODE_ALL, segment, page)
    }

    pub fn set_xcp_page(&self, segment: u8, page: u8) -> Result<()> {
        self.set_cal_page(CAL_PAGE_MODE_XCP | CAL_PAGE_MODE_ALL, segment, page)
    }

    /// Switches segment 0 to its XCP (RAM) page so a batch of calibration writes lands somewhere
    /// mutable; pair with `modify_end` to switch back to the ECU (FLASH) page once done.
    pub fn modify_begin(&self) -> Result<()> {
        self.set_xcp_page(0, 0)
    }

    pub fn modify_end(&self) -> Result<()> {
        self.set_ecu_page(0, 0)
    }

    pub fn get_pag_processor_info(&self) -> Result<Vec<u8>> {
        self.execute(XcpCommand::GetPagProcessorInfo, PduBuilder::get_pag_processor_info())
    }

    pub fn get_segment_info(&self, mode: u8, segment: u8, mapping: u8, mapping_index: u8) -> Result<Vec<u8>> {
        self.execute(XcpCommand::GetSegmentInfo, PduBuilder::get_segment_info(mode, segment, mapping, mapping_index))
    }

    pub fn get_page_info(&self, segment: u8, page: u8) -> Result<Vec<u8>> {
        self.execute(XcpCommand::GetPageInfo, PduBuilder::get_page_info(segment, page))
    }

    pub fn set_segment_mode(&self, mode: u8, segment: u8) -> Result<()> {
        self.execute(XcpCommand::SetSegmentMode, PduBuilder::set_segment_mode(mode, segment))?;
        Ok(())
    }

    pub fn get_segment_mode(&self, segment: u8) -> Result<u8> {
        let data = self.execute(XcpCommand::GetSegmentMode, PduBuilder::get_segment_mode(segment))?;
        Ok(*data.get(2).unwrap_or(&0))
    }

    pub fn copy_cal_page(&self, src_segment: u8, src_page: u8, dst_segment: u8, dst_page: u8) -> Result<()> {
        self.execute(XcpCommand::CopyCalPage, PduBuilder::copy_cal_page(src_segment, src_page, dst_segment, dst_page))?;
        Ok(())
    }

    //--------------------------------------------------------------------------------------
    // Calibration object convenience API

    pub fn create_calibration_object(&self, name: &str, addr: A2lAddr, a2l_type: A2lType, limits: Option<A2lLimits>) -> XcpCalibrationObjectHandle {
        let mut objs = self.calibration_objects.lock();
        objs.push(CalibrationObject { name: name.to_string(), addr, a2l_type, limits, cached: None });
        XcpCalibrationObjectHandle(objs.len() - 1)
    }

    /// Reads the object's current value via SHORT_UPLOAD and caches it.
    pub fn calibration_object_value(&self, handle: XcpCalibrationObjectHandle) -> Result<f64> {
        let (addr, data_type) = {
            let objs = self.calibration_objects.lock();
            let obj = objs.get(handle.0).ok_or_else(|| XcpCoreError::Protocol("invalid calibration object handle".into()))?;
            (obj.addr.clone(), obj.a2l_type.data_type)
        };
        let mta = Mta { address: addr.addr, extension: addr.ext };
        let bytes = self.short_upload(data_type.size() as u8, mta)?;
        let byte_order = self.byte_order()?;
        let value = decode_calibration_scalar(byte_order, data_type, &bytes)?;
        if let Some(obj) = self.calibration_objects.lock().get_mut(handle.0) {
            obj.cached = Some(value);
        }
        Ok(value)
    }

    /// Writes `value` via SHORT_DOWNLOAD after checking it against the object's A2L limits, if
    /// any were supplied at creation.
    pub fn set_calibration_object_value(&self, handle: XcpCalibrationObjectHandle, value: f64) -> Result<()> {
        let (name, addr, data_type, limits) = {
            let objs = self.calibration_objects.lock();
            let obj = objs.get(handle.0).ok_or_else(|| XcpCoreError::Protocol("invalid calibration object handle".into()))?;
            (obj.name.clone(), obj.addr.clone(), obj.a2l_type.data_type, obj.limits)
        };
        if let Some(limits) = limits {
            if !limits.contains(value) {
                return Err(XcpCoreError::Protocol(format!(
                    "{name}: value {value} outside calibration limits [{}, {}]",
                    limits.lower, limits.upper
                )));
            }
        }
        let byte_order = self.byte_order()?;
        let bytes = encode_calibration_scalar(byte_order, data_type, value);
        let mta = Mta { address: addr.addr, extension: addr.ext };
        self.short_download(&bytes, mta)?;
        if let Some(obj) = self.calibration_objects.lock().get_mut(handle.0) {
            obj.cached = Some(value);
        }
        Ok(())
    }

    pub fn calibration_object_cached_value(&self, handle: XcpCalibrationObjectHandle) -> Option<f64> {
        self.calibration_objects.lock().get(handle.0).and_then(|o| o.cached)
    }

    //--------------------------------------------------------------------------------------
    // DAQ administration

    pub fn free_daq(&self) -> Result<()> {
        self.execute(XcpCommand::FreeDaq, PduBuilder::free_daq())?;
        Ok(())
    }

    pub fn clear_daq_list(&self, daq_list: u16) -> Result<()> {
        let builder = self.builder()?;
        self.execute(XcpCommand::ClearDaqList, builder.clear_daq_list(daq_list))?;
        Ok(())
    }

    pub fn alloc_daq(&self, count: u16) -> Result<()> {
        let builder = self.builder()?;
        self.execute(XcpCommand::AllocDaq, builder.alloc_daq(count))?;
        Ok(())
    }

    pub fn alloc_odt(&self, daq_list: u16, count: u8) -> Result<()> {
        let builder = self.builder()?;
        self.execute(XcpCommand::AllocOdt, builder.alloc_odt(daq_list, count))?;
        Ok(())
    }

    pub fn alloc_odt_entry(&self, daq_list: u16, odt: u8, count: u8) -> Result<()> {
        let builder = self.builder()?;
        self.execute(XcpCommand::AllocOdtEntry, builder.alloc_odt_entry(daq_list, odt, count))?;
        Ok(())
    }

    pub fn write_daq(&self, bit_offset: u8, size: u8, ext: u8, addr: u32) -> Result<()> {
        let builder = self.builder()?;
        self.execute(XcpCommand::WriteDaq, builder.write_daq(bit_offset, size, ext, addr))?;
        Ok(())
    }

    pub fn write_daq_multiple(&self, entries: &[(u8, u8, u8, u32)]) -> Result<()> {
        let builder = self.builder()?;
        self.execute(XcpCommand::WriteDaqMultiple, builder.write_daq_multiple(entries))?;
        Ok(())
    }

    pub fn set_daq_list_mode(&self, mode: u8, daq_list: u16, event_channel: u16, prescaler: u8, priority: u8) -> Result<()> {
        let builder = self.builder()?;
        self.execute(XcpCommand::SetDaqListMode, builder.set_daq_list_mode(mode, daq_list, event_channel, prescaler, priority))?;
        Ok(())
    }

    pub fn get_daq_list_mode(&self, daq_list: u16) -> Result<Vec<u8>> {
        let builder = self.builder()?;
        self.execute(XcpCommand::GetDaqListMode, builder.get_daq_list_mode(daq_list))
    }

    /// Stops all DAQ lists (START_STOP_SYNCH mode 0).
    pub fn stop_all_daq_lists(&self) -> Result<()> {
        self.execute(XcpCommand::StartStopSynch, PduBuilder::start_stop_synch(0))?;
        Ok(())
    }

    pub fn stop_daq_list(&self, daq_list: u16) -> Result<()> {
        let builder = self.builder()?;
        self.execute(XcpCommand::StartStopDaqList, builder.start_stop_daq_list(0, daq_list))?;
        Ok(())
    }

    /// Selects every list in `daq_lists` (START_STOP_DAQ_LIST mode 2) then starts them all at
    /// once with a single START_STOP_SYNCH, so sampling begins on the same event cycle across
    /// lists. Mirrors select_daq_list/prepare_selected_daq_lists/start_selected_daq_lists.
    pub fn start_daq_lists(&self, daq_lists: &[u16]) -> Result<()> {
        for &daq_list in daq_lists {
            let builder = self.builder()?;
            self.execute(XcpCommand::StartStopDaqList, builder.start_stop_daq_list(2, daq_list))?;
        }
        self.execute(XcpCommand::StartStopSynch, PduBuilder::start_stop_synch(1))?;
        Ok(())
    }

    pub fn get_daq_clock(&self) -> Result<pdu::DaqClockResponse> {
        let data = self.execute(XcpCommand::GetDaqClock, PduBuilder::get_daq_clock())?;
        let byte_order = self.byte_order()?;
        pdu::parse_daq_clock_response(byte_order, &data[1..])
    }

    pub fn read_daq(&self, odt_entry: u8) -> Result<Vec<u8>> {
        let data = self.execute(XcpCommand::ReadDaq, PduBuilder::read_daq(odt_entry))?;
        Ok(data.get(1..).unwrap_or(&[]).to_vec())
    }

    pub fn get_daq_processor_info(&self) -> Result<pdu::DaqProcessorInfoResponse> {
        let data = self.execute(XcpCommand::GetDaqProcessorInfo, PduBuilder::get_daq_processor_info())?;
        let byte_order = self.byte_order()?;
        pdu::parse_daq_processor_info_response(byte_order, &data[1..])
    }

    pub fn get_daq_resolution_info(&self) -> Result<pdu::DaqResolutionInfoResponse> {
        let data = self.execute(XcpCommand::GetDaqResolutionInfo, PduBuilder::get_daq_resolution_info())?;
        let byte_order = self.byte_order()?;
        pdu::parse_daq_resolution_info_response(byte_order, &data[1..])
    }

    pub fn get_daq_event_info(&self, event_channel: u16) -> Result<Vec<u8>> {
        let builder = self.builder()?;
        self.execute(XcpCommand::GetDaqEventInfo, builder.get_daq_event_info(event_channel))
    }

    pub fn dto_ctr_properties(&self, mode: u8, event: u16, ctr_offset: u8) -> Result<Vec<u8>> {
        self.execute(XcpCommand::DtoCtrProperties, PduBuilder::dto_ctr_properties(mode, event, ctr_offset))
    }

    pub fn set_daq_packed_mode(&self, daq_list: u16, mode: u8, time_mode: u8, sample_count: u16) -> Result<()> {
        let builder = self.builder()?;
        self.execute(XcpCommand::SetDaqPackedMode, builder.set_daq_packed_mode(daq_list, mode, time_mode, sample_count))?;
        Ok(())
    }

    pub fn get_daq_packed_mode(&self, daq_list: u16) -> Result<Vec<u8>> {
        let builder = self.builder()?;
        self.execute(XcpCommand::GetDaqPackedMode, builder.get_daq_packed_mode(daq_list))
    }

    /// Runs the full slave-side setup sequence for already-planned DAQ lists: FREE_DAQ, ALLOC_DAQ
    /// for the whole set, then per list ALLOC_ODT/ALLOC_ODT_ENTRY/SET_DAQ_PTR+WRITE_DAQ for every
    /// planned entry and SET_DAQ_LIST_MODE. PIDs are assigned by allocation order, matching how a
    /// slave numbers ODTs when it isn't separately queried. Mirrors xcp_client.rs's
    /// free_daq/alloc_daq/alloc_odt/alloc_odt_entries/set_daq_ptr/write_daq/set_daq_list_mode
    /// sequence.
    pub fn configure_daq_lists(&self, lists: &mut [DaqList]) -> Result<()> {
        self.free_daq()?;
        self.alloc_daq(lists.len() as u16)?;

        let mut next_pid: u16 = 0;
        for (i, list) in lists.iter_mut().enumerate() {
            let daq_list = i as u16;
            self.alloc_odt(daq_list, list.planned_odts.len() as u8)?;
            for (odt_idx, odt) in list.planned_odts.iter().enumerate() {
                self.alloc_odt_entry(daq_list, odt_idx as u8, odt.entries.len() as u8)?;
            }
            for (odt_idx, odt) in list.planned_odts.iter().enumerate() {
                for (entry_idx, block) in odt.entries.iter().enumerate() {
                    let builder = self.builder()?;
                    self.execute(XcpCommand::SetDaqPtr, builder.set_daq_ptr(daq_list, odt_idx as u8, entry_idx as u8))?;
                    *self.last_daq_ptr.lock() = Some((daq_list, odt_idx as u8, entry_idx as u8));
                    self.write_daq(0, block.length as u8, block.ext, block.address)?;
                }
            }

            let mut mode = 0u8;
            if list.enable_timestamps {
                mode |= 0x10;
            }
            if list.direction == DaqDirection::Stim {
                mode |= 0x80;
            }
            self.set_daq_list_mode(mode, daq_list, list.event_channel, list.prescaler.min(u8::MAX as u16) as u8, list.priority)?;

            list.first_pid = Some(next_pid);
            next_pid += list.planned_odts.len() as u16;
        }
        Ok(())
    }

    //--------------------------------------------------------------------------------------
    // Transport-layer / user commands

    pub fn transport_layer_cmd(&self, sub_command: u8, payload: &[u8]) -> Result<Vec<u8>> {
        self.execute(XcpCommand::TransportLayerCmd, PduBuilder::transport_layer_cmd(sub_command, payload))
    }

    pub fn user_cmd(&self, sub_command: u8, payload: &[u8]) -> Result<Vec<u8>> {
        self.execute(XcpCommand::UserCmd, PduBuilder::user_cmd(sub_command, payload))
    }

    pub fn time_correlation_properties(&self, set_properties: u8, get_properties_request: u8, cluster_id: u16) -> Result<Vec<u8>> {
        self.execute(
            XcpCommand::TimeCorrelationProperties,
            PduBuilder::time_correlation_properties(set_properties, get_properties_request, cluster_id),
        )
    }

    //--------------------------------------------------------------------------------------
    // Flash programming

    pub fn program_start(&self) -> Result<()> {
        self.execute(XcpCommand::ProgramStart, PduBuilder::program_start())?;
        Ok(())
    }

    pub fn program_clear(&self, mode: u8, range: u32) -> Result<()> {
        let builder = self.builder()?;
        self.execute(XcpCommand::ProgramClear, builder.program_clear(mode, range))?;
        Ok(())
    }

    pub fn program(&self, data: &[u8]) -> Result<()> {
        let builder = self.builder()?;
        self.execute(XcpCommand::Program, builder.program(data))?;
        Ok(())
    }

    pub fn program_reset(&self) -> Result<()> {
        self.execute(XcpCommand::ProgramReset, PduBuilder::program_reset())?;
        Ok(())
    }

    pub fn get_pgm_processor_info(&self) -> Result<Vec<u8>> {
        self.execute(XcpCommand::GetPgmProcessorInfo, PduBuilder::get_pgm_processor_info())
    }

    pub fn get_sector_info(&self, mode: u8, sector: u8) -> Result<Vec<u8>> {
        self.execute(XcpCommand::GetSectorInfo, PduBuilder::get_sector_info(mode, sector))
    }

    pub fn program_prepare(&self, size: u16) -> Result<()> {
        let builder = self.builder()?;
        self.execute(XcpCommand::ProgramPrepare, builder.program_prepare(size))?;
        Ok(())
    }

    pub fn program_format(&self, compression: u8, encryption: u8, layout: u8, access_mode: u8) -> Result<()> {
        self.execute(XcpCommand::ProgramFormat, PduBuilder::program_format(compression, encryption, layout, access_mode))?;
        Ok(())
    }

    /// Writes `data` via PROGRAM_NEXT, gathering the slave's block-mode response burst the same
    /// way `fetch` does for UPLOAD.
    pub fn program_next(&self, data: &[u8]) -> Result<Vec<u8>> {
        let builder = self.builder()?;
        self.execute(XcpCommand::ProgramNext, builder.program_next(data))
    }

    pub fn program_max(&self, data: &[u8]) -> Result<()> {
        let builder = self.builder()?;
        self.execute(XcpCommand::ProgramMax, builder.program_max(data))?;
        Ok(())
    }

    pub fn program_verify(&self, kind: u8, mode: u16, value: u32) -> Result<()> {
        self.execute(XcpCommand::ProgramVerify, PduBuilder::program_verify(kind, mode, value))?;
        Ok(())
    }
}

fn decode_calibration_scalar(byte_order: ByteOrder, dt: DataType, buf: &[u8]) -> Result<f64> {
    use byteorder::{ByteOrder as _, BigEndian, LittleEndian};
    let need = dt.size();
    if buf.len() < need {
        return Err(XcpCoreError::Protocol(format!("calibration read too short: need {need} bytes, have {}", buf.len())));
    }
    Ok(match dt {
        DataType::U8 => buf[0] as f64,
        DataType::I8 => buf[0] as i8 as f64,
        DataType::U16 => match byte_order {
            ByteOrder::Little => LittleEndian::read_u16(buf) as f64,
            ByteOrder::Big => BigEndian::read_u16(buf) as f64,
        },
        DataType::I16 => match byte_order {
            ByteOrder::Little => LittleEndian::read_i16(buf) as f64,
            ByteOrder::Big => BigEndian::read_i16(buf) as f64,
        },
        DataType::U32 => match byte_order {
            ByteOrder::Little => LittleEndian::read_u32(buf) as f64,
            ByteOrder::Big => BigEndian::read_u32(buf) as f64,
        },
        DataType::I32 => match byte_order {
            ByteOrder::Little => LittleEndian::read_i32(buf) as f64,
            ByteOrder::Big => BigEndian::read_i32(buf) as f64,
        },
        DataType::U64 => match byte_order {
            ByteOrder::Little => LittleEndian::read_u64(buf) as f64,
            ByteOrder::Big => BigEndian::read_u64(buf) as f64,
        },
        DataType::I64 => match byte_order {
            ByteOrder::Little => LittleEndian::read_i64(buf) as f64,
            ByteOrder::Big => BigEndian::read_i64(buf) as f64,
        },
        DataType::F32 => match byte_order {
            ByteOrder::Little => LittleEndian::read_f32(buf) as f64,
            ByteOrder::Big => BigEndian::read_f32(buf) as f64,
        },
        DataType::F64 => match byte_order {
            ByteOrder::Little => LittleEndian::read_f64(buf),
            ByteOrder::Big => BigEndian::read_f64(buf),
        },
        DataType::F16 | DataType::Bf16 => {
            return Err(XcpCoreError::Protocol("half-precision calibration objects are not supported".into()))
        }
    })
}

fn encode_calibration_scalar(byte_order: ByteOrder, dt: DataType, value: f64) -> Vec<u8> {
    use byteorder::{ByteOrder as _, BigEndian, LittleEndian};
    let mut buf = vec![0u8; dt.size()];
    match dt {
        DataType::U8 => buf[0] = value as u8,
        DataType::I8 => buf[0] = (value as i8) as u8,
        DataType::U16 => match byte_order {
            ByteOrder::Little => LittleEndian::write_u16(&mut buf, value as u16),
            ByteOrder::Big => BigEndian::write_u16(&mut buf, value as u16),
        },
        DataType::I16 => match byte_order {
            ByteOrder::Little => LittleEndian::write_i16(&mut buf, value as i16),
            ByteOrder::Big => BigEndian::write_i16(&mut buf, value as i16),
        },
        DataType::U32 => match byte_order {
            ByteOrder::Little => LittleEndian::write_u32(&mut buf, value as u32),
            ByteOrder::Big => BigEndian::write_u32(&mut buf, value as u32),
        },
        DataType::I32 => match byte_order {
            ByteOrder::Little => LittleEndian::write_i32(&mut buf, value as i32),
            ByteOrder::Big => BigEndian::write_i32(&mut buf, value as i32),
        },
        DataType::U64 => match byte_order {
            ByteOrder::Little => LittleEndian::write_u64(&mut buf, value as u64),
            ByteOrder::Big => BigEndian::write_u64(&mut buf, value as u64),
        },
        DataType::I64 => match byte_order {
            ByteOrder::Little => LittleEndian::write_i64(&mut buf, value as i64),
            ByteOrder::Big => BigEndian::write_i64(&mut buf, value as i64),
        },
        DataType::F32 => match byte_order {
            ByteOrder::Little => LittleEndian::write_f32(&mut buf, value as f32),
            ByteOrder::Big => BigEndian::write_f32(&mut buf, value as f32),
        },
        DataType::F64 => match byte_order {
            ByteOrder::Little => LittleEndian::write_f64(&mut buf, value),
            ByteOrder::Big => BigEndian::write_f64(&mut buf, value),
        },
        DataType::F16 | DataType::Bf16 => {}
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Counters;
    use std::sync::Mutex as StdMutex;

    /// A fake transport whose script is a queue of canned responses, one per `send_command`
    /// call, so the retry engine and the wire-level service methods can be tested without a
    /// socket.
    struct ScriptedTransport {
        responses: StdMutex<std::collections::VecDeque<Result<Vec<u8>>>>,
        counters: Counters,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<Vec<u8>>>) -> Self {
            ScriptedTransport { responses: StdMutex::new(responses.into()), counters: Counters::default() }
        }
    }

    impl Transport for ScriptedTransport {
        fn send_command(&self, _command: XcpCommand, _payload: &[u8]) -> Result<Vec<u8>> {
            self.counters.note_sent();
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(data)) => {
                    self.counters.note_received();
                    Ok(data)
                }
                Some(Err(e)) => Err(e),
                None => Err(XcpCoreError::Disconnected),
            }
        }

        fn block_receive(&self, _command: XcpCommand, _n: usize) -> Result<Vec<u8>> {
            Err(XcpCoreError::Disconnected)
        }

        fn close(&self) {}

        fn counters(&self) -> &Counters {
            &self.counters
        }
    }

    fn connect_response(max_cto: u8, max_dto: u16) -> Vec<u8> {
        vec![0xFF, 0x05, max_cto, (max_dto & 0xFF) as u8, (max_dto >> 8) as u8, 1, 1]
    }

    #[test]
    fn connect_parses_byte_order_and_granularity() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(connect_response(8, 64))]));
        let session = XcpSession::new(transport, 3, None);
        let resp = session.connect(0).unwrap();
        assert_eq!(resp.max_cto, 8);
        assert_eq!(resp.max_dto, 64);
        assert!(session.is_connected());
        let props = session.slave_properties().unwrap();
        assert_eq!(props.byte_order, ByteOrder::Little);
        assert_eq!(props.address_granularity, AddressGranularity::Byte);
    }

    #[test]
    fn timeout_then_success_resolves_through_the_retry_table() {
        let timeout_err = XcpCoreError::Timeout(crate::error::XcpTimeoutError::new(XcpCommand::GetStatus, 100, 1, 0, &[]));
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(connect_response(8, 64)),
            Err(timeout_err),
            Ok(vec![0xFF, 0x00, 0x00, 0x00, 0x00]),
        ]));
        let session = XcpSession::new(transport, 3, None);
        session.connect(0).unwrap();
        let status = session.get_status().unwrap();
        assert_eq!(status.session_status, 0x00);
    }

    #[test]
    fn cond_unlock_is_idempotent_once_already_unlocked() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(connect_response(8, 64))]));
        let session = XcpSession::new(transport, 3, None);
        session.connect(0).unwrap();
        *session.resource_protection.lock() = ResourceProtection::CALPAG;
        // No GET_SEED/UNLOCK scripted -- if cond_unlock tried to send anything, the transport
        // would return Disconnected from its empty queue and this would fail.
        session.cond_unlock(ResourceProtection::CALPAG).unwrap();
    }

    #[test]
    fn cond_unlock_drives_seed_and_key_exchange() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(connect_response(8, 64)),
            Ok(vec![0xFF, 0, 0x12, 0x34]), // GET_SEED: remaining=0, seed=[0x12,0x34]
            Ok(vec![0xFF, 0x01]),          // UNLOCK: resource_protection now CALPAG
        ]));
        let session = XcpSession::new(
            transport,
            3,
            Some(Arc::new(crate::seedkey::ClosureDriver(|_priv, seed: &[u8]| Ok(seed.iter().map(|b| b ^ 0xFF).collect())))),
        );
        session.connect(0).unwrap();
        session.cond_unlock(ResourceProtection::CALPAG).unwrap();
        assert_eq!(session.resource_protection(), ResourceProtection::CALPAG);
    }

    #[test]
    fn push_splits_into_download_and_download_next_chunks() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(connect_response(6, 64)), // max_cto=6 -> download_chunk_capacity = 6-2 = 4
            Ok(vec![0xFF]),              // DOWNLOAD
            Ok(vec![0xFF]),              // DOWNLOAD_NEXT
        ]));
        let session = XcpSession::new(transport, 3, None);
        session.connect(0).unwrap();
        session.push(&[1, 2, 3, 4, 5, 6]).unwrap();
    }

    #[test]
    fn fetch_without_slave_block_support_rejects_a_short_first_packet() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(connect_response(4, 64)), // chunk_cap = max_cto-1 = 3
            Ok(vec![0xFF, 1, 2]),        // only 2 bytes of the 5 requested, no block mode
        ]));
        let session = XcpSession::new(transport, 3, None);
        session.connect(0).unwrap();
        let err = session.fetch(5).unwrap_err();
        assert!(matches!(err, XcpCoreError::Protocol(_)));
    }

    #[test]
    fn calibration_object_limits_reject_out_of_range_writes() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(connect_response(8, 64))]));
        let session = XcpSession::new(transport, 3, None);
        session.connect(0).unwrap();
        let handle = session.create_calibration_object(
            "Kp",
            A2lAddr { addr: 0x2000, ext: 0, event: 0 },
            A2lType { encoding: crate::types::A2lTypeEncoding::Float, data_type: DataType::F32 },
            Some(A2lLimits { lower: 0.0, upper: 10.0 }),
        );
        let err = session.set_calibration_object_value(handle, 15.0).unwrap_err();
        assert!(matches!(err, XcpCoreError::Protocol(_)));
    }
}
