//! Drives the real `EthTransport`/`XcpSession` stack against a simulated slave built from this
//! crate's own `framing::eth` codec, so the fixtures can't silently diverge from what the wire
//! code actually produces. A bare `std::net::UdpSocket` plays the slave: it reads framed CTOs and
//! replies with framed responses it assembles by hand, mirroring the CONNECT/GET_ID/DISCONNECT
//! exchange from spec.md's scenario S1.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use xcp_master::command::{pid, XcpCommand};
use xcp_master::config::EthConfig;
use xcp_master::framing::eth::{EthDecoder, EthEncoder};
use xcp_master::framing::{FrameDecoder, FrameEncoder};
use xcp_master::policy::NoOpPolicy;
use xcp_master::session::XcpSession;
use xcp_master::transport::eth::EthTransport;
use xcp_master::XcpCoreError;

const SLAVE_ID_STRING: &str = "XCP_SIM_SLAVE";

/// Runs a slave that understands CONNECT, GET_ID (inline string response) and DISCONNECT, then
/// stops after replying to DISCONNECT. Returns once that reply has been sent.
fn run_slave(socket: UdpSocket, stop: Arc<AtomicBool>) {
    let mut dec = EthDecoder::new(255, 1500);
    let mut buf = [0u8; 1024];
    socket.set_read_timeout(Some(std::time::Duration::from_millis(500))).unwrap();
    while !stop.load(Ordering::Acquire) {
        let (n, src) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let frames = dec.feed(&buf[..n]).expect("well-formed frame from the master");
        for frame in frames {
            let Some(&cmd) = frame.payload.first() else { continue };
            let response: Vec<u8> = if cmd == XcpCommand::Connect.code() {
                // resource=0x04 (DAQ), comm_mode_basic=0x00 (little endian, byte granularity),
                // max_cto=255, max_dto=1500 LE, protocol/transport layer version 1.
                vec![pid::OK, 0x04, 0x00, 255, 0xDC, 0x05, 1, 1]
            } else if cmd == XcpCommand::GetId.code() {
                let s = SLAVE_ID_STRING.as_bytes();
                let mut r = vec![pid::OK, 0x01, 0, 0];
                r.extend_from_slice(&(s.len() as u32).to_le_bytes());
                r.extend_from_slice(s);
                r
            } else if cmd == XcpCommand::Disconnect.code() {
                vec![pid::OK]
            } else {
                vec![pid::ERR, 0x10] // ERR_CMD_UNKNOWN
            };
            let framed = EthEncoder.encode(&response, frame.counter);
            socket.send_to(&framed, src).unwrap();
            if cmd == XcpCommand::Disconnect.code() {
                stop.store(true, Ordering::Release);
            }
        }
    }
}

#[test]
fn connect_get_id_disconnect_round_trip() {
    let slave_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let slave_addr = slave_socket.local_addr().unwrap();
    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = stop.clone();
    let slave = std::thread::spawn(move || run_slave(slave_socket, stop_clone));

    let eth_cfg = EthConfig { host: slave_addr.ip().to_string(), port: slave_addr.port(), ..EthConfig::default() };
    let transport = EthTransport::connect(&eth_cfg, 1000, Arc::new(NoOpPolicy), 255, 1500).unwrap();
    let session = XcpSession::new(Arc::new(transport), 0, None);

    let connect_resp = session.connect(0).unwrap();
    assert_eq!(connect_resp.max_cto, 255);
    assert_eq!(connect_resp.max_dto, 1500);

    let id = session.get_id_string(1).unwrap();
    assert_eq!(id, SLAVE_ID_STRING);

    session.disconnect().unwrap();

    stop.store(true, Ordering::Release);
    slave.join().unwrap();
}

#[test]
fn timeout_error_names_the_command_and_counters() {
    // Nothing is listening on this port, so CONNECT must time out rather than hang.
    let unused = UdpSocket::bind("127.0.0.1:0").unwrap();
    let dead_addr = unused.local_addr().unwrap();
    drop(unused);

    let eth_cfg = EthConfig { host: dead_addr.ip().to_string(), port: dead_addr.port(), ..EthConfig::default() };
    let transport = EthTransport::connect(&eth_cfg, 150, Arc::new(NoOpPolicy), 255, 1500).unwrap();
    let session = XcpSession::new(Arc::new(transport), 0, None);

    let err = session.connect(0).unwrap_err();
    let msg = err.to_string();
    assert!(msg.to_lowercase().contains("timed out"), "message was: {msg}");
    assert!(matches!(err, XcpCoreError::Timeout(_)));
}
