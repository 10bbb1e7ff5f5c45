//----------------------------------------------------------------------------------------------
// Module config
// Typed configuration sections recognized by the core, per spec.md section 6. The core only ever
// sees a fully-built `Config` value; reading it from TOML/JSON is the glue binary's job
// (xcp-ctl-demo), mirroring the teacher's optional `serde`/`serde_json` dependency pair already
// used for calibration segment persistence.

#[cfg_attr(feature = "serde-config", derive(serde::Deserialize, serde::Serialize))]
#[derive(Debug, Clone)]
pub struct Config {
    #[cfg_attr(feature = "serde-config", serde(default))]
    pub general: General,
    #[cfg_attr(feature = "serde-config", serde(default))]
    pub transport: Transport,
}

impl Default for Config {
    fn default() -> Self {
        Config { general: General::default(), transport: Transport::default() }
    }
}

#[cfg_attr(feature = "serde-config", derive(serde::Deserialize, serde::Serialize))]
#[derive(Debug, Clone)]
pub struct General {
    pub disable_error_handling: bool,
    pub disconnect_response_optional: bool,
    pub seed_n_key_dll: Option<String>,
    pub stim_support: bool,
    /// -1 = infinite (honor REPEAT_INF_TIMES literally), 0 = no retries, N = cap.
    pub max_retries: i32,
}

impl Default for General {
    fn default() -> Self {
        General {
            disable_error_handling: false,
            disconnect_response_optional: false,
            seed_n_key_dll: None,
            stim_support: false,
            max_retries: 3,
        }
    }
}

#[cfg_attr(feature = "serde-config", derive(serde::Deserialize, serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportLayer {
    Can,
    Eth,
    SxI,
    Usb,
}

#[cfg_attr(feature = "serde-config", derive(serde::Deserialize, serde::Serialize))]
#[derive(Debug, Clone)]
pub struct Transport {
    pub layer: TransportLayer,
    pub create_daq_timestamps: bool,
    pub timeout_seconds: f64,
    pub alignment: Alignment,
    pub eth: EthConfig,
    pub sxi: SxiConfig,
    pub can: CanConfig,
    pub usb: UsbConfig,
}

impl Default for Transport {
    fn default() -> Self {
        Transport {
            layer: TransportLayer::Eth,
            create_daq_timestamps: true,
            timeout_seconds: 2.0,
            alignment: Alignment::Byte1,
            eth: EthConfig::default(),
            sxi: SxiConfig::default(),
            can: CanConfig::default(),
            usb: UsbConfig::default(),
        }
    }
}

#[cfg_attr(feature = "serde-config", derive(serde::Deserialize, serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Byte1 = 1,
    Byte2 = 2,
    Byte4 = 4,
    Byte8 = 8,
}

impl Alignment {
    pub fn bytes(self) -> usize {
        self as usize
    }
}

#[cfg_attr(feature = "serde-config", derive(serde::Deserialize, serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EthProtocol {
    Tcp,
    Udp,
}

#[cfg_attr(feature = "serde-config", derive(serde::Deserialize, serde::Serialize))]
#[derive(Debug, Clone)]
pub struct EthConfig {
    pub host: String,
    pub port: u16,
    pub protocol: EthProtocol,
    pub ipv6: bool,
    pub tcp_nodelay: bool,
    pub bind_to_address: Option<String>,
    pub bind_to_port: Option<u16>,
}

impl Default for EthConfig {
    fn default() -> Self {
        EthConfig {
            host: "127.0.0.1".into(),
            port: 5555,
            protocol: EthProtocol::Udp,
            ipv6: false,
            tcp_nodelay: true,
            bind_to_address: None,
            bind_to_port: None,
        }
    }
}

#[cfg_attr(feature = "serde-config", derive(serde::Deserialize, serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    N,
    E,
    O,
    M,
    S,
}

#[cfg_attr(feature = "serde-config", derive(serde::Deserialize, serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

#[cfg_attr(feature = "serde-config", derive(serde::Deserialize, serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFormat {
    LenByte,
    LenCtrByte,
    LenFillByte,
    LenWord,
    LenCtrWord,
    LenFillWord,
}

#[cfg_attr(feature = "serde-config", derive(serde::Deserialize, serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailFormat {
    NoChecksum,
    ChecksumByte,
    ChecksumWord,
}

#[cfg_attr(feature = "serde-config", derive(serde::Deserialize, serde::Serialize))]
#[derive(Debug, Clone)]
pub struct SxiConfig {
    pub port: String,
    pub bitrate: u32,
    pub bytesize: u8,
    pub parity: Parity,
    pub stopbits: StopBits,
    pub header_format: HeaderFormat,
    pub tail_format: TailFormat,
    pub framing: bool,
    pub esc_sync: u8,
    pub esc_esc: u8,
}

impl Default for SxiConfig {
    fn default() -> Self {
        SxiConfig {
            port: "/dev/ttyUSB0".into(),
            bitrate: 115200,
            bytesize: 8,
            parity: Parity::N,
            stopbits: StopBits::One,
            header_format: HeaderFormat::LenWord,
            tail_format: TailFormat::NoChecksum,
            framing: false,
            esc_sync: 0x01,
            esc_esc: 0x00,
        }
    }
}

#[cfg_attr(feature = "serde-config", derive(serde::Deserialize, serde::Serialize))]
#[derive(Debug, Clone)]
pub struct CanConfig {
    pub interface: String,
    pub channel: String,
    pub bitrate: u32,
    pub fd: bool,
    pub data_bitrate: Option<u32>,
    pub can_id_master: u32,
    pub can_id_slave: u32,
    pub can_id_broadcast: Option<u32>,
    pub daq_identifier: Vec<u32>,
    pub max_dlc_required: bool,
    pub padding_value: u8,
    pub sjw_abr: Option<u8>,
    pub tseg1_abr: Option<u8>,
    pub tseg2_abr: Option<u8>,
    pub sjw_dbr: Option<u8>,
    pub tseg1_dbr: Option<u8>,
    pub tseg2_dbr: Option<u8>,
}

impl Default for CanConfig {
    fn default() -> Self {
        CanConfig {
            interface: "socketcan".into(),
            channel: "can0".into(),
            bitrate: 500_000,
            fd: false,
            data_bitrate: None,
            can_id_master: 0x7E1,
            can_id_slave: 0x7E0,
            can_id_broadcast: None,
            daq_identifier: Vec::new(),
            max_dlc_required: false,
            padding_value: 0xAA,
            sjw_abr: None,
            tseg1_abr: None,
            tseg2_abr: None,
            sjw_dbr: None,
            tseg1_dbr: None,
            tseg2_dbr: None,
        }
    }
}

#[cfg_attr(feature = "serde-config", derive(serde::Deserialize, serde::Serialize))]
#[derive(Debug, Clone)]
pub struct UsbConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: Option<String>,
    pub configuration_number: u8,
    pub interface_number: u8,
    pub in_ep: u8,
    pub out_ep: u8,
    pub in_ep_max_packet_size: u16,
    pub out_ep_max_packet_size: u16,
}

impl Default for UsbConfig {
    fn default() -> Self {
        UsbConfig {
            vendor_id: 0,
            product_id: 0,
            serial_number: None,
            configuration_number: 1,
            interface_number: 0,
            in_ep: 0x81,
            out_ep: 0x01,
            in_ep_max_packet_size: 512,
            out_ep_max_packet_size: 512,
        }
    }
}
