//----------------------------------------------------------------------------------------------
// Module transport::eth
// UDP/TCP transport. Owns a dedicated tokio runtime and reader task, grounded directly in
// xcp_client/src/xcp_client.rs's `XcpClient` (UdpSocket::bind, receive_task's `select!` loop,
// send_command's `timeout(CMD_TIMEOUT, rx.recv())`), generalized to also support TCP (streaming,
// so it runs bytes through `framing::eth::EthDecoder`) and to the full PID routing table via
// `transport::route_frame`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::runtime::Runtime;

use crate::command::XcpCommand;
use crate::config::{EthConfig, EthProtocol};
use crate::error::{Result, XcpCoreError};
use crate::framing::eth::{EthDecoder, EthEncoder};
use crate::framing::{FrameDecoder, FrameEncoder};
use crate::policy::AcquisitionPolicy;

use super::{route_frame, timeout_error, Counters};

enum Link {
    Udp(Arc<UdpSocket>, SocketAddr),
    Tcp(Mutex<TcpStream>),
}

/// Ethernet transport channel. `send_command` blocks the calling thread but internally drives the
/// connection on its own tokio runtime, so the session API stays synchronous like every other
/// transport in this crate.
pub struct EthTransport {
    runtime: Runtime,
    link: Arc<Link>,
    counter: std::sync::atomic::AtomicU16,
    counters: Counters,
    timeout_ms: u64,
    response_rx: Mutex<std_mpsc::Receiver<Vec<u8>>>,
    closed: AtomicBool,
}

impl EthTransport {
    pub fn connect(cfg: &EthConfig, timeout_ms: u64, policy: Arc<dyn AcquisitionPolicy>, max_cto: usize, max_dto: usize) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().worker_threads(2).build()?;
        let dest: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse().map_err(|_| {
            XcpCoreError::Protocol(format!("invalid Ethernet destination {}:{}", cfg.host, cfg.port))
        })?;

        let (tx, rx) = std_mpsc::channel::<Vec<u8>>();
        let counters = Counters::default();

        let link = match cfg.protocol {
            EthProtocol::Udp => {
                let bind_addr: SocketAddr = format!(
                    "{}:{}",
                    cfg.bind_to_address.as_deref().unwrap_or(if cfg.ipv6 { "::" } else { "0.0.0.0" }),
                    cfg.bind_to_port.unwrap_or(0)
                )
                .parse()
                .map_err(|_| XcpCoreError::Protocol("invalid Ethernet bind address".into()))?;
                let socket = runtime.block_on(UdpSocket::bind(bind_addr))?;
                runtime.block_on(socket.connect(dest))?;
                Arc::new(Link::Udp(Arc::new(socket), dest))
            }
            EthProtocol::Tcp => {
                let stream = runtime.block_on(TcpStream::connect(dest))?;
                if cfg.tcp_nodelay {
                    stream.set_nodelay(true)?;
                }
                Arc::new(Link::Tcp(Mutex::new(stream)))
            }
        };

        spawn_reader(&runtime, link.clone(), tx, policy, max_cto, max_dto);

        Ok(EthTransport {
            runtime,
            link,
            counter: std::sync::atomic::AtomicU16::new(0),
            counters,
            timeout_ms,
            response_rx: Mutex::new(rx),
            closed: AtomicBool::new(false),
        })
    }
}

fn spawn_reader(
    runtime: &Runtime,
    link: Arc<Link>,
    tx: std_mpsc::Sender<Vec<u8>>,
    policy: Arc<dyn AcquisitionPolicy>,
    max_cto: usize,
    max_dto: usize,
) {
    runtime.spawn(async move {
        let clock = crate::timestamp::TimestampSource::new(crate::timestamp::TimestampMode::Absolute);
        match &*link {
            Link::Udp(socket, _) => {
                let mut buf = [0u8; 8192];
                loop {
                    let n = match socket.recv(&mut buf).await {
                        Ok(0) => break,
                        Ok(n) => n,
                        Err(_) => break,
                    };
                    // A UDP datagram may carry several concatenated transport-layer messages.
                    let mut dec = EthDecoder::new(max_cto, max_dto);
                    let frames = match dec.feed(&buf[..n]) {
                        Ok(f) => f,
                        Err(_) => continue,
                    };
                    for frame in frames {
                        let ts = clock.now_ns();
                        if let Some(resp) = route_frame(&frame.payload, frame.counter, ts, policy.as_ref()) {
                            let _ = tx.send(resp);
                        }
                    }
                }
            }
            Link::Tcp(stream_mutex) => {
                let mut dec = EthDecoder::new(max_cto, max_dto);
                let mut buf = [0u8; 4096];
                loop {
                    let n = {
                        let mut stream = stream_mutex.lock();
                        match stream.read(&mut buf).await {
                            Ok(0) => break,
                            Ok(n) => n,
                            Err(_) => break,
                        }
                    };
                    let frames = match dec.feed(&buf[..n]) {
                        Ok(f) => f,
                        Err(_) => break,
                    };
                    for frame in frames {
                        let ts = clock.now_ns();
                        if let Some(resp) = route_frame(&frame.payload, frame.counter, ts, policy.as_ref()) {
                            let _ = tx.send(resp);
                        }
                    }
                }
            }
        }
    });
}

impl super::Transport for EthTransport {
    fn send_command(&self, command: XcpCommand, payload: &[u8]) -> Result<Vec<u8>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(XcpCoreError::Disconnected);
        }
        let ctr = self.counter.fetch_add(1, Ordering::Relaxed);
        let framed = EthEncoder.encode(payload, ctr);

        self.runtime.block_on(async {
            match &*self.link {
                Link::Udp(socket, _) => socket.send(&framed).await.map(|_| ()),
                Link::Tcp(stream) => {
                    use tokio::io::AsyncWriteExt;
                    stream.lock().write_all(&framed).await
                }
            }
        })?;
        self.counters.note_sent();

        let rx = self.response_rx.lock();
        match rx.recv_timeout(Duration::from_millis(self.timeout_ms)) {
            Ok(data) => {
                self.counters.note_received();
                if data.first() == Some(&crate::command::pid::ERR) {
                    let code = *data.get(1).unwrap_or(&0);
                    Err(XcpCoreError::Response(crate::error::XcpResponseError::new(code, command)))
                } else {
                    Ok(data)
                }
            }
            Err(_) => Err(timeout_error(command, self.timeout_ms, &self.counters, &["check cable/link", "increase transport.timeout_seconds"])),
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
