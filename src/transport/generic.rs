//----------------------------------------------------------------------------------------------
// Module transport::generic
// Blocking transports for SxI (serial), CAN/CAN-FD and USB, sharing one reader-thread pattern:
// a dedicated `std::thread` blocks on the underlying link's synchronous read call, feeds bytes
// (or, for CAN, whole frames) through the transport's `FrameDecoder`/`CanFraming`, and forwards
// classified frames via `transport::route_frame` exactly like `eth`'s tokio reader task. Grounded
// in xcp_client.rs's receive_task for the routing/counters shape, generalized to std::thread
// since serialport/socketcan/rusb expose blocking APIs, not async ones.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::command::XcpCommand;
use crate::config::{CanConfig, SxiConfig, UsbConfig};
use crate::error::{Result, XcpCoreError};
use crate::framing::can::CanFraming;
use crate::framing::eth::{EthDecoder, EthEncoder};
use crate::framing::sxi::{SxiDecoder, SxiFraming};
use crate::framing::{FrameDecoder, FrameEncoder};
use crate::policy::AcquisitionPolicy;
use crate::timestamp::{TimestampMode, TimestampSource};

use super::{route_frame, timeout_error, Counters};

fn respond(command: XcpCommand, data: Vec<u8>, counters: &Counters) -> Result<Vec<u8>> {
    counters.note_received();
    if data.first() == Some(&crate::command::pid::ERR) {
        let code = *data.get(1).unwrap_or(&0);
        Err(XcpCoreError::Response(crate::error::XcpResponseError::new(code, command)))
    } else {
        Ok(data)
    }
}

//------------------------------------------------------------------------------------------
// SxI (RS-232/RS-485 style serial link)

pub struct SxiTransport {
    port: Mutex<Box<dyn serialport::SerialPort>>,
    framing: SxiFraming,
    counter: std::sync::atomic::AtomicU16,
    counters: Counters,
    timeout_ms: u64,
    response_rx: Mutex<std_mpsc::Receiver<Vec<u8>>>,
    closed: AtomicBool,
}

impl SxiTransport {
    pub fn connect(cfg: &SxiConfig, framing: SxiFraming, timeout_ms: u64, policy: Arc<dyn AcquisitionPolicy>) -> Result<Self> {
        let parity = match cfg.parity {
            crate::config::Parity::N => serialport::Parity::None,
            crate::config::Parity::E => serialport::Parity::Even,
            crate::config::Parity::O => serialport::Parity::Odd,
            crate::config::Parity::M | crate::config::Parity::S => serialport::Parity::None,
        };
        let stop_bits = match cfg.stopbits {
            crate::config::StopBits::One | crate::config::StopBits::OnePointFive => serialport::StopBits::One,
            crate::config::StopBits::Two => serialport::StopBits::Two,
        };
        let port = serialport::new(&cfg.port, cfg.bitrate)
            .data_bits(match cfg.bytesize {
                5 => serialport::DataBits::Five,
                6 => serialport::DataBits::Six,
                7 => serialport::DataBits::Seven,
                _ => serialport::DataBits::Eight,
            })
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(Duration::from_millis(timeout_ms))
            .open()
            .map_err(|e| XcpCoreError::Protocol(format!("failed to open serial port {}: {e}", cfg.port)))?;

        let reader_port = port.try_clone().map_err(|e| XcpCoreError::Protocol(format!("failed to clone serial port: {e}")))?;
        let (tx, rx) = std_mpsc::channel::<Vec<u8>>();
        let framing_clone = framing;
        std::thread::spawn(move || reader_loop(reader_port, framing_clone, tx, policy));

        Ok(SxiTransport {
            port: Mutex::new(port),
            framing,
            counter: std::sync::atomic::AtomicU16::new(0),
            counters: Counters::default(),
            timeout_ms,
            response_rx: Mutex::new(rx),
            closed: AtomicBool::new(false),
        })
    }
}

fn reader_loop(mut port: Box<dyn serialport::SerialPort>, framing: SxiFraming, tx: std_mpsc::Sender<Vec<u8>>, policy: Arc<dyn AcquisitionPolicy>) {
    let clock = TimestampSource::new(TimestampMode::Absolute);
    let mut decoder = SxiDecoder::new(framing);
    let mut buf = [0u8; 512];
    loop {
        match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => match decoder.feed(&buf[..n]) {
                Ok(frames) => {
                    for frame in frames {
                        let ts = clock.now_ns();
                        if let Some(resp) = route_frame(&frame.payload, frame.counter, ts, policy.as_ref()) {
                            let _ = tx.send(resp);
                        }
                    }
                }
                Err(_) => break,
            },
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(_) => break,
        }
    }
}

impl super::Transport for SxiTransport {
    fn send_command(&self, command: XcpCommand, payload: &[u8]) -> Result<Vec<u8>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(XcpCoreError::Disconnected);
        }
        let ctr = self.counter.fetch_add(1, Ordering::Relaxed);
        let framed = self.framing.encode(payload, ctr);
        {
            use std::io::Write;
            self.port.lock().write_all(&framed)?;
        }
        self.counters.note_sent();

        let rx = self.response_rx.lock();
        match rx.recv_timeout(Duration::from_millis(self.timeout_ms)) {
            Ok(data) => respond(command, data, &self.counters),
            Err(_) => Err(timeout_error(command, self.timeout_ms, &self.counters, &["check cable/baud rate", "verify header/tail format matches the slave"])),
        }
    }

    fn block_receive(&self, command: XcpCommand, n: usize) -> Result<Vec<u8>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(XcpCoreError::Disconnected);
        }
        super::block_receive_loop(&self.response_rx.lock(), command, n, self.timeout_ms, &self.counters)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn counters(&self) -> &Counters {
        &self.counters
    }
}

//------------------------------------------------------------------------------------------
// CAN / CAN-FD

pub struct CanTransport {
    socket: Mutex<socketcan::CanSocket>,
    framing: CanFraming,
    can_id_master: u32,
    counters: Counters,
    timeout_ms: u64,
    response_rx: Mutex<std_mpsc::Receiver<Vec<u8>>>,
    closed: AtomicBool,
}

impl CanTransport {
    pub fn connect(cfg: &CanConfig, timeout_ms: u64, policy: Arc<dyn AcquisitionPolicy>) -> Result<Self> {
        use socketcan::Socket;
        let socket = socketcan::CanSocket::open(&cfg.channel)
            .map_err(|e| XcpCoreError::Protocol(format!("failed to open CAN interface {}: {e}", cfg.channel)))?;
        let reader_socket = socket.try_clone().map_err(|e| XcpCoreError::Protocol(format!("failed to clone CAN socket: {e}")))?;

        let framing = CanFraming { fd: cfg.fd, max_dlc_required: cfg.max_dlc_required, padding_value: cfg.padding_value };
        let (tx, rx) = std_mpsc::channel::<Vec<u8>>();
        let can_id_slave = cfg.can_id_slave;
        std::thread::spawn(move || can_reader_loop(reader_socket, framing, can_id_slave, tx, policy));

        Ok(CanTransport {
            socket: Mutex::new(socket),
            framing,
            can_id_master: cfg.can_id_master,
            counters: Counters::default(),
            timeout_ms,
            response_rx: Mutex::new(rx),
            closed: AtomicBool::new(false),
        })
    }
}

fn can_reader_loop(socket: socketcan::CanSocket, framing: CanFraming, can_id_slave: u32, tx: std_mpsc::Sender<Vec<u8>>, policy: Arc<dyn AcquisitionPolicy>) {
    use socketcan::Socket;
    let clock = TimestampSource::new(TimestampMode::Absolute);
    loop {
        let frame = match socket.read_frame() {
            Ok(f) => f,
            Err(_) => break,
        };
        let data = frame.data();
        if data.is_empty() {
            continue;
        }
        let parsed = match framing.strip_padding(data, None) {
            Ok(f) => f,
            Err(_) => continue,
        };
        let ts = clock.now_ns();
        let counter = (frame.raw_id() & 0xFFFF) as u16;
        let is_from_slave = frame.raw_id() == can_id_slave || can_id_slave == 0;
        if is_from_slave {
            if let Some(resp) = route_frame(&parsed.payload, counter, ts, policy.as_ref()) {
                let _ = tx.send(resp);
            }
        }
    }
}

impl super::Transport for CanTransport {
    fn send_command(&self, command: XcpCommand, payload: &[u8]) -> Result<Vec<u8>> {
        use socketcan::{EmbeddedFrame, Socket};
        if self.closed.load(Ordering::Acquire) {
            return Err(XcpCoreError::Disconnected);
        }
        let data = self.framing.encode(payload);
        let id = socketcan::StandardId::new(self.can_id_master as u16)
            .ok_or_else(|| XcpCoreError::Protocol(format!("invalid CAN master id 0x{:X}", self.can_id_master)))?;
        let frame = socketcan::CanFrame::new(id, &data)
            .ok_or_else(|| XcpCoreError::Protocol("CAN data too long for frame".into()))?;
        self.socket.lock().write_frame(&frame).map_err(|e| XcpCoreError::Protocol(format!("CAN write failed: {e}")))?;
        self.counters.note_sent();

        let rx = self.response_rx.lock();
        match rx.recv_timeout(Duration::from_millis(self.timeout_ms)) {
            Ok(data) => respond(command, data, &self.counters),
            Err(_) => Err(timeout_error(command, self.timeout_ms, &self.counters, &["check bus termination/bitrate", "confirm CAN IDs match the slave's A2L"])),
        }
    }

    fn block_receive(&self, command: XcpCommand, n: usize) -> Result<Vec<u8>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(XcpCoreError::Disconnected);
        }
        super::block_receive_loop(&self.response_rx.lock(), command, n, self.timeout_ms, &self.counters)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn counters(&self) -> &Counters {
        &self.counters
    }
}

//------------------------------------------------------------------------------------------
// USB (bulk transfer, same length+counter header as Ethernet)

pub struct UsbTransport {
    handle: Mutex<rusb::DeviceHandle<rusb::GlobalContext>>,
    out_ep: u8,
    counter: std::sync::atomic::AtomicU16,
    counters: Counters,
    timeout_ms: u64,
    response_rx: Mutex<std_mpsc::Receiver<Vec<u8>>>,
    closed: AtomicBool,
}

impl UsbTransport {
    pub fn connect(cfg: &UsbConfig, timeout_ms: u64, policy: Arc<dyn AcquisitionPolicy>, max_cto: usize, max_dto: usize) -> Result<Self> {
        let handle = rusb::open_device_with_vid_pid(cfg.vendor_id, cfg.product_id)
            .ok_or_else(|| XcpCoreError::Protocol(format!("USB device {:04x}:{:04x} not found", cfg.vendor_id, cfg.product_id)))?;
        handle
            .set_active_configuration(cfg.configuration_number)
            .map_err(|e| XcpCoreError::Protocol(format!("failed to set USB configuration: {e}")))?;
        handle
            .claim_interface(cfg.interface_number)
            .map_err(|e| XcpCoreError::Protocol(format!("failed to claim USB interface: {e}")))?;

        let (tx, rx) = std_mpsc::channel::<Vec<u8>>();
        let in_ep = cfg.in_ep;
        let in_ep_size = cfg.in_ep_max_packet_size as usize;
        let reader_handle_timeout = Duration::from_millis(200);
        let device = handle.device();
        let reader_handle = device.open().map_err(|e| XcpCoreError::Protocol(format!("failed to reopen USB device for reader thread: {e}")))?;
        std::thread::spawn(move || usb_reader_loop(reader_handle, in_ep, in_ep_size.max(64), reader_handle_timeout, max_cto, max_dto, tx, policy));

        Ok(UsbTransport {
            handle: Mutex::new(handle),
            out_ep: cfg.out_ep,
            counter: std::sync::atomic::AtomicU16::new(0),
            counters: Counters::default(),
            timeout_ms,
            response_rx: Mutex::new(rx),
            closed: AtomicBool::new(false),
        })
    }
}

fn usb_reader_loop(
    handle: rusb::DeviceHandle<rusb::GlobalContext>,
    in_ep: u8,
    packet_size: usize,
    timeout: Duration,
    max_cto: usize,
    max_dto: usize,
    tx: std_mpsc::Sender<Vec<u8>>,
    policy: Arc<dyn AcquisitionPolicy>,
) {
    let clock = TimestampSource::new(TimestampMode::Absolute);
    let mut decoder = EthDecoder::new(max_cto, max_dto);
    let mut buf = vec![0u8; packet_size];
    loop {
        match handle.read_bulk(in_ep, &mut buf, timeout) {
            Ok(n) if n > 0 => match decoder.feed(&buf[..n]) {
                Ok(frames) => {
                    for frame in frames {
                        let ts = clock.now_ns();
                        if let Some(resp) = route_frame(&frame.payload, frame.counter, ts, policy.as_ref()) {
                            let _ = tx.send(resp);
                        }
                    }
                }
                Err(_) => break,
            },
            Ok(_) => continue,
            Err(rusb::Error::Timeout) => continue,
            Err(_) => break,
        }
    }
}

impl super::Transport for UsbTransport {
    fn send_command(&self, command: XcpCommand, payload: &[u8]) -> Result<Vec<u8>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(XcpCoreError::Disconnected);
        }
        let ctr = self.counter.fetch_add(1, Ordering::Relaxed);
        let framed = EthEncoder.encode(payload, ctr);
        self.handle
            .lock()
            .write_bulk(self.out_ep, &framed, Duration::from_millis(self.timeout_ms))
            .map_err(|e| XcpCoreError::Protocol(format!("USB bulk write failed: {e}")))?;
        self.counters.note_sent();

        let rx = self.response_rx.lock();
        match rx.recv_timeout(Duration::from_millis(self.timeout_ms)) {
            Ok(data) => respond(command, data, &self.counters),
            Err(_) => Err(timeout_error(command, self.timeout_ms, &self.counters, &["check USB endpoint numbers", "reconnect the device"])),
        }
    }

    fn block_receive(&self, command: XcpCommand, n: usize) -> Result<Vec<u8>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(XcpCoreError::Disconnected);
        }
        super::block_receive_loop(&self.response_rx.lock(), command, n, self.timeout_ms, &self.counters)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn counters(&self) -> &Counters {
        &self.counters
    }
}
