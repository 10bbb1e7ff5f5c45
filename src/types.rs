//----------------------------------------------------------------------------------------------
// Module types
// Core data model: SlaveProperties, MTA, ResourceProtection, FrameCategory, Measurement,
// MemoryBlock, ODT, DaqList and the decoded-A2L-tuple shape the session accepts.

use bitflags::bitflags;

/// Multi-byte field byte order, fixed by the slave's CONNECT response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// Address granularity: the slave's natural word size for memory transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressGranularity {
    Byte = 1,
    Word = 2,
    Dword = 4,
}

impl AddressGranularity {
    pub fn bytes(self) -> usize {
        self as usize
    }

    pub fn from_raw(v: u8) -> Self {
        match v {
            0b01 => AddressGranularity::Word,
            0b10 => AddressGranularity::Dword,
            _ => AddressGranularity::Byte,
        }
    }
}

bitflags! {
    /// Capability flags reported in the CONNECT response's RESOURCE byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        const CALPAG = 0x01;
        const DAQ    = 0x04;
        const STIM   = 0x08;
        const PGM    = 0x10;
        const DBG    = 0x20;
    }
}

bitflags! {
    /// Block-mode support reported in GET_COMM_MODE_INFO.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockModeFlags: u8 {
        const MASTER_BLOCK = 0x01;
        const SLAVE_BLOCK  = 0x40;
    }
}

/// Captured at CONNECT and from subsequent capability queries. Immutable for the session.
#[derive(Debug, Clone)]
pub struct SlaveProperties {
    pub byte_order: ByteOrder,
    pub address_granularity: AddressGranularity,
    pub max_cto: u8,
    pub max_dto: u16,
    pub capabilities: Capabilities,
    pub block_mode: BlockModeFlags,
    pub max_bs: u8,
    pub min_st: u8,
    pub protocol_layer_version: u8,
    pub transport_layer_version: u8,
}

impl SlaveProperties {
    pub fn supports(&self, cap: Capabilities) -> bool {
        self.capabilities.contains(cap)
    }
}

/// Memory Transfer Address. Mutated by SET_MTA, implicitly advanced by UPLOAD/DOWNLOAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mta {
    pub address: u32,
    pub extension: u8,
}

impl Mta {
    pub fn advance(self, n: u32) -> Mta {
        Mta { address: self.address.wrapping_add(n), extension: self.extension }
    }
}

bitflags! {
    /// One bit per protected resource, updated by GET_STATUS / UNLOCK responses.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ResourceProtection: u8 {
        const CALPAG = 0x01;
        const DAQ    = 0x04;
        const STIM   = 0x08;
        const PGM    = 0x10;
        const DBG    = 0x20;
    }
}

/// Tag attached to every decoded PDU, drives routing to the acquisition policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCategory {
    Cmd,
    Response,
    Error,
    Event,
    Serv,
    Daq,
    Stim,
    Metadata,
}

/// Scalar data types a measurement or calibration object may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F16,
    Bf16,
    F32,
    F64,
}

impl DataType {
    pub fn size(self) -> usize {
        use DataType::*;
        match self {
            U8 | I8 => 1,
            U16 | I16 | F16 | Bf16 => 2,
            U32 | I32 | F32 => 4,
            U64 | I64 | F64 => 8,
        }
    }
}

/// Address shape a decoded A2L entry hands to the core: name, address, extension, event and type.
/// A2L parsing itself stays outside this crate; this is the interchange shape a reader plugs into.
#[derive(Debug, Clone)]
pub struct A2lAddr {
    pub addr: u32,
    pub ext: u8,
    pub event: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum A2lTypeEncoding {
    Signed,
    Unsigned,
    Float,
    Blob,
}

#[derive(Debug, Clone)]
pub struct A2lType {
    pub encoding: A2lTypeEncoding,
    pub data_type: DataType,
}

/// Calibration limits from an A2L characteristic's lower/upper annotation, checked before a
/// convenience write is sent down to the slave.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct A2lLimits {
    pub lower: f64,
    pub upper: f64,
}

impl A2lLimits {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// A single measurement or calibration variable, already resolved to an address.
#[derive(Debug, Clone)]
pub struct Measurement {
    pub name: String,
    pub address: u32,
    pub ext: u8,
    pub data_type: DataType,
}

impl Measurement {
    pub fn length(&self) -> usize {
        self.data_type.size()
    }
}

/// Contiguous run of measurements produced by the planner's coalesce step.
#[derive(Debug, Clone)]
pub struct MemoryBlock {
    pub address: u32,
    pub ext: u8,
    pub length: usize,
    pub components: Vec<Measurement>,
}

/// A bin produced by the pack step: entries whose total length never exceeds `capacity`.
#[derive(Debug, Clone)]
pub struct Odt {
    pub capacity: usize,
    pub residual: usize,
    pub entries: Vec<MemoryBlock>,
}

impl Odt {
    pub fn new(capacity: usize) -> Self {
        Odt { capacity, residual: capacity, entries: Vec::new() }
    }

    pub fn used(&self) -> usize {
        self.capacity - self.residual
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaqDirection {
    Daq,
    Stim,
}

/// One DAQ list: its measurements, the plan the planner produced, and slave-assigned PIDs.
#[derive(Debug, Clone)]
pub struct DaqList {
    pub name: String,
    pub event_channel: u16,
    pub direction: DaqDirection,
    pub enable_timestamps: bool,
    pub prescaler: u16,
    pub priority: u8,
    pub measurements: Vec<Measurement>,
    pub planned_odts: Vec<Odt>,
    pub first_pid: Option<u16>,
}

impl DaqList {
    /// Range of PIDs this list owns once the slave has assigned `first_pid`.
    pub fn pid_range(&self) -> Option<std::ops::Range<u16>> {
        self.first_pid.map(|p| p..p + self.planned_odts.len() as u16)
    }
}

/// One frame as captured by the acquisition policy / recorder.
#[derive(Debug, Clone)]
pub struct RecordedFrame {
    pub category: FrameCategory,
    pub counter: u16,
    pub timestamp_ns: f64,
    pub payload: Vec<u8>,
}
