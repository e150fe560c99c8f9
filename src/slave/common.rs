// Licensed under the Apache-2.0 license

//! Types and constants shared across the HPI slave middleware.

/// Maximum number of PD ports supported.
pub const MAX_PD_PORTS: usize = 2;

/// Number of event queues: one per port plus the device section.
pub const EVENT_QUEUE_COUNT: usize = MAX_PD_PORTS + 1;

/// Maximum supported flash row size in bytes.
pub const MAX_FLASH_ROW_SIZE: usize = 256;

/// Number of user-defined registers in the device section.
pub const USERDEF_REG_COUNT: usize = 16;

/// Number of user-defined registers in each port section.
pub const PORT_USERDEF_REG_COUNT: usize = 24;

/// I2C slave address when the I2C_CFG strap is sensed LOW.
pub const ADDR_I2C_CFG_LOW: u8 = 0x40;
/// I2C slave address when the I2C_CFG strap is sensed HIGH.
pub const ADDR_I2C_CFG_HIGH: u8 = 0x42;
/// I2C slave address when the I2C_CFG strap is floating.
pub const ADDR_I2C_CFG_FLOAT: u8 = 0x08;

/// Default address mask applied on the received preamble.
pub const SLAVE_ADDR_MASK_DEFAULT: u8 = 0xFE;

/// Interrupt status register bit for the device section.
pub const INTR_DEV: u8 = 0x01;
/// Interrupt status register bit for port 0.
pub const INTR_PORT0: u8 = 0x02;
/// Interrupt status register bit for port 1.
pub const INTR_PORT1: u8 = 0x04;

/// UCSI read pending bit index in the interrupt status register.
pub const UCSI_READ_PENDING_EVENT: u8 = 7;
/// Mask applied for the UCSI read pending event.
pub const UCSI_READ_PENDING_MASK: u8 = 1 << UCSI_READ_PENDING_EVENT;

/// Mask to retrieve a UCSI register offset from a 16-bit address.
pub const UCSI_REG_OFFSET_MASK: u16 = 0x0FFF;

/// Automatic EPR enable mask bit.
pub const AUTO_EPR_ENABLE_MASK: u8 = 0x80;
/// Valid EPR PDO selection mask bits.
pub const VALID_EPR_MASK: u8 = 0x3F;

/// PD_CONTROL command the EC writes to report its initialization done.
pub const PD_CTRL_EC_INIT_COMPLETE: u8 = 0x10;

/// HPI slave status codes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlaveError {
    /// Operation failed due to invalid arguments.
    InvalidArgs,
    /// Command is not supported.
    InvalidCmd,
    /// Bad input parameters.
    BadParam,
}

/// HPI response and event codes.
///
/// Values below 0x80 are command responses, values from 0x80 up are
/// asynchronous event notifications.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Response {
    NoResponse = 0x00,
    Success = 0x02,
    FlashDataAvailable = 0x03,
    InvalidCommand = 0x05,
    CmdFailed = 0x06,
    FlashUpdateFailed = 0x07,
    InvalidFw = 0x08,
    InvalidArgument = 0x09,
    NotSupported = 0x0A,
    PdTransactionFailed = 0x0C,
    PdCommandFailed = 0x0D,
    UndefinedError = 0x0F,
    PdoData = 0x10,
    CmdAborted = 0x11,
    PortBusy = 0x12,
    MinMaxCurrent = 0x13,
    ExtSrcCap = 0x14,
    UcsiCommandFailed = 0x15,
    PpsSinkCapMismatch = 0x16,
    DiscIdVdm = 0x18,
    DiscSvidVdm = 0x19,
    DiscModeVdm = 0x1A,
    VconnDisabled = 0x1B,
    ExtSnkCap = 0x1C,
    I2cRegData = 0x1D,
    PdRespData = 0x1E,
    MinMaxCurrentEpr = 0x1F,

    InvalidId = 0x40,
    InvalidGuid = 0x41,
    InvalidVersion = 0x42,
    OutOfSequenceCmd = 0x43,
    InvalidFwct = 0x44,
    HashCmpFailed = 0x45,
    InvalidFwData = 0x46,

    ResetComplete = 0x80,
    EventQueueOverflow = 0x81,
    OcDetect = 0x82,
    OvDetect = 0x83,
    ConnectDetect = 0x84,
    DisconnectDetect = 0x85,
    NegotiationComplete = 0x86,
    SwapComplete = 0x87,
    PsRdyReceived = 0x8A,
    GotoMinReceived = 0x8B,
    AcceptReceived = 0x8C,
    RejectReceived = 0x8D,
    WaitReceived = 0x8E,
    HardResetReceived = 0x8F,
    VdmReceived = 0x90,
    SourceCapReceived = 0x91,
    SinkCapReceived = 0x92,
    DataResetReceived = 0x93,
    DataResetComplete = 0x94,
    UsbEntryComplete = 0x95,
    HardResetSent = 0x9A,
    SoftResetSent = 0x9B,
    CableResetSent = 0x9C,
    SourceDisabled = 0x9D,
    SenderTimeout = 0x9E,
    VdmNoResponse = 0x9F,
    UnexpectedVoltage = 0xA0,
    ErrorRecovery = 0xA1,
    BatStatusReceived = 0xA2,
    AlertReceived = 0xA3,
    NotSuppReceived = 0xA4,
    EmcaDetect = 0xA6,
    EmcaNotDetect = 0xA7,
    RpChangeDetect = 0xAA,
    BillboardUpdate = 0xAB,
    PdExtdMsgSop = 0xAC,
    AltMode = 0xB0,
    AppHw = 0xB1,
    PdExtdMsgSopPrime = 0xB4,
    PdExtdMsgSopDPrime = 0xB5,
    OtDetect = 0xB6,
    HardwareError = 0xB8,
    VconnOcDetect = 0xB9,
    CcVbusShort = 0xBA,
    SbuVbusShort = 0xBB,
    ScDetect = 0xBC,
    RcDetect = 0xBD,
    StandbyCurrent = 0xBE,
    UvDetect = 0xBF,

    SocTimeout = 0xC0,
    SrcRpRemoved = 0xC1,
    PrSwapAccepted = 0xC2,
    SnkPowerReduced = 0xC3,
    Bc12Event = 0xC4,

    NotifyBeforeHardReset = 0xD0,
    CustomUvdmReceived = 0xD1,
    CustomAltModeChange = 0xD2,
    CustomDiscoveryComplete = 0xD3,
    CollectedChunkedMsg = 0xD4,
    BistStmEntry = 0xD5,
    BistStmExit = 0xD6,
    SrcInfoReceived = 0xD7,
    RevisionReceived = 0xD8,
    EprModeReceived = 0xD9,
    PortDisabled = 0xDA,
    MoistureDetected = 0xDB,
    MoistureCleared = 0xDC,
    HashMeasureComplete = 0xDD,
}

/// HPI register sections. Registers are grouped into sections matching
/// the functions supported; the section id forms the top nibble of the
/// 16-bit register address.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RegSection {
    /// Device information registers.
    Dev = 0x0,
    /// USB PD port 0 registers.
    Port0 = 0x1,
    /// USB PD port 1 registers.
    Port1 = 0x2,
    /// Auto firmware related registers.
    DevAuto = 0x6,
    /// UCSI registers.
    Ucsi = 0xF,
}

impl RegSection {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x0 => Self::Dev,
            0x1 => Self::Port0,
            0x2 => Self::Port1,
            0x6 => Self::DevAuto,
            0xF => Self::Ucsi,
            _ => return None,
        })
    }

    /// Port index for port sections.
    #[must_use]
    pub fn port(self) -> Option<u8> {
        match self {
            Self::Port0 => Some(0),
            Self::Port1 => Some(1),
            _ => None,
        }
    }

    /// Section for a given port index.
    #[must_use]
    pub fn for_port(port: u8) -> Option<Self> {
        match port {
            0 => Some(Self::Port0),
            1 => Some(Self::Port1),
            _ => None,
        }
    }
}

/// Types of HPI register/memory regions within a section.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RegPart {
    /// Register region.
    Reg = 0,
    /// Data memory for the device section.
    Data = 1,
    /// Flash read/write memory.
    Flash = 2,
    /// Read data memory for a port section.
    PdDataRead = 4,
    /// Upper fraction of the read data memory.
    PdDataReadH = 5,
    /// Write data memory for a port section.
    PdDataWrite = 8,
    /// Upper fraction of the write data memory.
    PdDataWriteH = 9,
}

impl RegPart {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Reg,
            1 => Self::Data,
            2 => Self::Flash,
            4 => Self::PdDataRead,
            5 => Self::PdDataReadH,
            8 => Self::PdDataWrite,
            9 => Self::PdDataWriteH,
            _ => return None,
        })
    }
}

/// Device section register offsets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DevRegAddr {
    DeviceMode = 0x00,
    BootModeReason = 0x01,
    SiliconId = 0x02,
    BootloaderLastRow = 0x04,
    InterruptStatus = 0x06,
    JumpToBoot = 0x07,
    ResetRequest = 0x08,
    EnterFlashMode = 0x0A,
    ValidateFw = 0x0B,
    FlashReadWrite = 0x0C,
    AllVersion = 0x10,
    Fw2Version = 0x20,
    FwBinaryLocation = 0x28,
    PortEnable = 0x2C,
    SleepControl = 0x2D,
    PowerStatus = 0x2E,
    SetAppPriority = 0x2F,
    ReadCustomerInfo = 0x30,
    BatteryStatus = 0x31,
    WatchdogResetCount = 0x32,
    ReadDieInfo = 0x33,
    HpiVersionExt = 0x34,
    UcsiStatus = 0x38,
    UcsiControl = 0x39,
    CfgTableVersion = 0x3A,
    SysPowerState = 0x3B,
    HpiVersion = 0x3C,
    UserdefBase = 0x40,
    PpsDesignVoltage = 0x70,
    FwUpdateLock = 0x72,
    DevControl = 0x73,
    Response = 0x7E,
    ResponseLen = 0x7F,
}

/// Port section register offsets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PortRegAddr {
    VdmControl = 0x00,
    EffSourcePdoMask = 0x02,
    EffSinkPdoMask = 0x03,
    SourcePdoSelect = 0x04,
    SinkPdoSelect = 0x05,
    PdControl = 0x06,
    PdStatus = 0x08,
    TypeCStatus = 0x0C,
    BusVoltage = 0x0D,
    CurrentPdo = 0x10,
    CurrentRdo = 0x14,
    CableVdo = 0x18,
    AltModeCmd = 0x1C,
    AppHwCmd = 0x20,
    EventMask = 0x24,
    SwapResponse = 0x28,
    ActiveEcModes = 0x29,
    VdmEcControl = 0x2A,
    AltModeStatus = 0x2B,
    Bc12Control = 0x2C,
    CmdTimeout = 0x30,
    FrsEnable = 0x31,
    ConsumerFetControl = 0x32,
    InterruptStatus = 0x34,
    UserdefBase = 0x38,
    ActiveCableVdo2 = 0x50,
    SinkRdoRequest = 0x54,
    BusCurrent = 0x58,
    HostCapControl = 0x5C,
    DfpAltModeMask = 0x60,
    UfpAltModeMask = 0x61,
    CustomAltModeSvid = 0x62,
    EprSourcePdoSelect = 0x64,
    EprSinkPdoSelect = 0x65,
    SinkPpsAvsControl = 0x68,
}

/// Possible boot priority configurations for the firmware application.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BootPriority {
    /// The last flashed firmware is prioritized.
    LastFlashed = 0,
    /// FW1 is prioritized.
    Fw1 = 1,
    /// FW2 is prioritized.
    Fw2 = 2,
}

/// Hardware errors reportable through the hardware error event.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SysHwError {
    None = 0x00,
    /// Error while accessing the data MUX.
    MuxAccess = 0x01,
    /// Error while accessing the regulator.
    RegulatorAccess = 0x02,
    /// Unexpected voltage generated by the source regulator.
    BadVoltage = 0x04,
}

/// Owner of the shared I2C slave interface. The interface serves HPI or
/// UCSI traffic, one at a time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum I2cOwner {
    Ucsi,
    Hpi,
}

/// UCSI Status register values.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum UcsiStatusValue {
    Started = 0x00,
    CommandInProgress = 0x01,
    EventPending = 0x02,
}

/// UCSI Control register commands.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum UcsiControlCommand {
    /// Start the UCSI interface.
    Start = 0x01,
    /// Stop the UCSI interface.
    Stop = 0x02,
    /// Silence the UCSI port.
    Silence = 0x03,
    /// Request the device to send connect event information to the OS.
    SignalConnectEvent = 0x04,
}

impl UcsiControlCommand {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x01 => Self::Start,
            0x02 => Self::Stop,
            0x03 => Self::Silence,
            0x04 => Self::SignalConnectEvent,
            _ => return None,
        })
    }
}

/// Configuration of the HPI communication bus and interrupt pin.
#[derive(Copy, Clone, Debug)]
pub struct HwConfig {
    /// HPI slave I2C address (7 bits).
    pub slave_addr: u8,
    /// Address mask applied on the received preamble.
    pub slave_mask: u8,
    /// EC interrupt GPIO port number.
    pub ec_int_port: u8,
    /// EC interrupt GPIO pin number.
    pub ec_int_pin: u8,
}

/// Device flash parameters used for status reporting and firmware update.
#[derive(Copy, Clone, Debug, Default)]
pub struct FlashConfig {
    /// Total device flash size in bytes.
    pub flash_size: u32,
    /// Size of each flash row in bytes.
    pub row_size: u16,
    /// Number of flash rows on the device.
    pub row_count: u16,
    /// Last flash row assigned to the bootloader.
    pub bl_last_row: u16,
}

/// PD stack events forwarded into the HPI event pipeline.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PdEvent {
    TypeCConnect,
    TypeCDisconnect,
    ContractComplete,
    SwapComplete,
    OcpFault,
    OvpFault,
    OtpFault,
    UvpFault,
    ScFault,
    RcFault,
    VconnOcpFault,
    PsRdyReceived,
    GotoMinReceived,
    AcceptReceived,
    RejectReceived,
    WaitReceived,
    HardResetReceived,
    HardResetSent,
    SoftResetSent,
    CableResetSent,
    SourceDisabled,
    SenderTimeout,
    VdmReceived,
    SourceCapReceived,
    SinkCapReceived,
    AlertReceived,
    BatteryStatusReceived,
    NotSupportedReceived,
    ErrorRecovery,
    UnexpectedVoltage,
    EmcaDetected,
    EmcaNotDetected,
    RpChangeDetected,
    DataResetReceived,
    DataResetComplete,
    UsbEntryComplete,
}

/// Borrowed view of a PD message packet handed in by the stack.
#[derive(Copy, Clone, Debug)]
pub struct PdPacket<'a> {
    /// SOP type of the packet.
    pub sop: u8,
    /// PD message header.
    pub header: u16,
    /// Extended message header, zero for non-extended messages.
    pub extd_header: u16,
    /// Data objects / extended payload bytes.
    pub data: &'a [u8],
}
