//----------------------------------------------------------------------------------------------
// Module command
// Every XCP service as an enum plus its command code, per ASAM XCP Part 2. Command codes are
// grounded in the teacher client's CC_* constants; the full list in spec.md section 4.5 extends
// that to services the demo client never exercised (PROGRAM family, DAQ resolution/info family).

/// One XCP service. Ordering mirrors the table in the on-wire command code, not the enum's
/// declaration order -- see `XcpCommand::code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XcpCommand {
    Connect,
    Disconnect,
    GetStatus,
    Synch,
    GetCommModeInfo,
    GetId,
    SetRequest,
    GetSeed,
    Unlock,
    SetMta,
    Upload,
    ShortUpload,
    BuildChecksum,
    TransportLayerCmd,
    UserCmd,
    GetVersion,
    Download,
    DownloadNext,
    DownloadMax,
    ShortDownload,
    ModifyBits,
    SetCalPage,
    GetCalPage,
    GetPagProcessorInfo,
    GetSegmentInfo,
    GetPageInfo,
    SetSegmentMode,
    GetSegmentMode,
    CopyCalPage,
    ClearDaqList,
    SetDaqPtr,
    WriteDaq,
    WriteDaqMultiple,
    SetDaqListMode,
    GetDaqListMode,
    StartStopDaqList,
    StartStopSynch,
    GetDaqClock,
    ReadDaq,
    GetDaqProcessorInfo,
    GetDaqResolutionInfo,
    GetDaqListInfo,
    GetDaqEventInfo,
    DtoCtrProperties,
    FreeDaq,
    AllocDaq,
    AllocOdt,
    AllocOdtEntry,
    ProgramStart,
    ProgramClear,
    Program,
    ProgramReset,
    GetPgmProcessorInfo,
    GetSectorInfo,
    ProgramPrepare,
    ProgramFormat,
    ProgramNext,
    ProgramMax,
    ProgramVerify,
    TimeCorrelationProperties,
    SetDaqPackedMode,
    GetDaqPackedMode,
}

impl XcpCommand {
    /// On-wire command code, the first byte of the CTO request.
    pub fn code(self) -> u8 {
        use XcpCommand::*;
        match self {
            Connect => 0xFF,
            Disconnect => 0xFE,
            GetStatus => 0xFD,
            Synch => 0xFC,
            GetCommModeInfo => 0xFB,
            GetId => 0xFA,
            SetRequest => 0xF9,
            GetSeed => 0xF8,
            Unlock => 0xF7,
            SetMta => 0xF6,
            Upload => 0xF5,
            ShortUpload => 0xF4,
            BuildChecksum => 0xF3,
            TransportLayerCmd => 0xF2,
            UserCmd => 0xF1,
            GetVersion => 0xC0,
            Download => 0xF0,
            DownloadNext => 0xEF,
            DownloadMax => 0xEE,
            ShortDownload => 0xED,
            ModifyBits => 0xEC,
            SetCalPage => 0xEB,
            GetCalPage => 0xEA,
            GetPagProcessorInfo => 0xE9,
            GetSegmentInfo => 0xE8,
            GetPageInfo => 0xE7,
            SetSegmentMode => 0xE6,
            GetSegmentMode => 0xE5,
            CopyCalPage => 0xE4,
            ClearDaqList => 0xE3,
            SetDaqPtr => 0xE2,
            WriteDaq => 0xE1,
            SetDaqListMode => 0xE0,
            GetDaqListMode => 0xDF,
            StartStopDaqList => 0xDE,
            StartStopSynch => 0xDD,
            GetDaqClock => 0xDC,
            ReadDaq => 0xDB,
            GetDaqProcessorInfo => 0xDA,
            GetDaqResolutionInfo => 0xD9,
            GetDaqListInfo => 0xD8,
            GetDaqEventInfo => 0xD7,
            FreeDaq => 0xD6,
            AllocDaq => 0xD5,
            AllocOdt => 0xD4,
            AllocOdtEntry => 0xD3,
            WriteDaqMultiple => 0xC7,
            TimeCorrelationProperties => 0xC6,
            DtoCtrProperties => 0xC5,
            SetDaqPackedMode => 0xC1,
            GetDaqPackedMode => 0xC1,
            ProgramStart => 0xD2,
            ProgramClear => 0xD1,
            Program => 0xD0,
            ProgramReset => 0xCF,
            GetPgmProcessorInfo => 0xCE,
            GetSectorInfo => 0xCD,
            ProgramPrepare => 0xCC,
            ProgramFormat => 0xCB,
            ProgramNext => 0xCA,
            ProgramMax => 0xC9,
            ProgramVerify => 0xC8,
        }
    }

    pub fn has_block_response(self) -> bool {
        matches!(self, XcpCommand::Upload | XcpCommand::ProgramNext)
    }
}

/// Standard ERR response codes, CRC_* in the teacher's naming.
pub mod error_code {
    pub const CMD_SYNCH: u8 = 0x00;
    pub const CMD_PENDING: u8 = 0x01;
    pub const CMD_IGNORED: u8 = 0x02;
    pub const CMD_BUSY: u8 = 0x10;
    pub const DAQ_ACTIVE: u8 = 0x11;
    pub const PRM_ACTIVE: u8 = 0x12;
    pub const CMD_UNKNOWN: u8 = 0x20;
    pub const CMD_SYNTAX: u8 = 0x21;
    pub const OUT_OF_RANGE: u8 = 0x22;
    pub const WRITE_PROTECTED: u8 = 0x23;
    pub const ACCESS_DENIED: u8 = 0x24;
    pub const ACCESS_LOCKED: u8 = 0x25;
    pub const PAGE_NOT_VALID: u8 = 0x26;
    pub const PAGE_MODE_NOT_VALID: u8 = 0x27;
    pub const SEGMENT_NOT_VALID: u8 = 0x28;
    pub const SEQUENCE: u8 = 0x29;
    pub const DAQ_CONFIG: u8 = 0x2A;
    pub const MEMORY_OVERFLOW: u8 = 0x30;
    pub const GENERIC: u8 = 0x31;
    pub const VERIFY: u8 = 0x32;
    pub const RESOURCE_TEMPORARY_NOT_ACCESSIBLE: u8 = 0x33;
    pub const SUBCMD_UNKNOWN: u8 = 0x34;
    pub const TIMECORR_STATE_CHANGE: u8 = 0x35;
    /// Synthesized by the channel, never sent by a slave; lets the error table treat a
    /// timeout and a real ERR response uniformly.
    pub const TIMEOUT: u8 = 0xF0;
}

/// PID values carried by the first byte of any received PDU.
pub mod pid {
    pub const OK: u8 = 0xFF;
    pub const ERR: u8 = 0xFE;
    pub const EVENT: u8 = 0xFD;
    pub const SERV: u8 = 0xFC;
    pub const EV_CMD_PENDING: u8 = 0x01;

    pub fn is_daq_or_stim(p: u8) -> bool {
        p < SERV
    }
}
