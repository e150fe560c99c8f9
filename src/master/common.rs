// Licensed under the Apache-2.0 license

//! Types and constants shared across the HPI master middleware.

/// Mask to clear the device section interrupt on a slave.
pub const INTR_REG_CLEAR_DEV: u8 = 0x01;
/// Mask to clear the port 0 section interrupt on a slave.
pub const INTR_REG_CLEAR_PORT0: u8 = 0x02;
/// Mask to clear the port 1 section interrupt on a slave.
pub const INTR_REG_CLEAR_PORT1: u8 = 0x04;

/// Signature to request a JUMP_TO_BOOT operation.
pub const JUMP_TO_BOOT_SIG: u8 = b'J';
/// Signature to request a JUMP_TO_ALT_FW operation.
pub const JUMP_TO_ALT_FW_SIG: u8 = b'A';
/// Signature to request entry to flash update mode.
pub const ENTER_FLASHING_SIG: u8 = b'P';
/// Signature for valid flash read/write requests.
pub const FLASH_READ_WRITE_SIG: u8 = b'F';
/// Signature to request an I2C interface or device reset.
pub const RESET_SIG: u8 = b'R';

/// Command code to read a flash row.
pub const FLASH_ROW_READ_CMD: u8 = 0x00;
/// Command code to write a flash row.
pub const FLASH_ROW_WRITE_CMD: u8 = 0x01;
/// Command code for an I2C interface reset request.
pub const RESET_I2C_CMD: u8 = 0x00;
/// Command code for a device reset request.
pub const RESET_DEVICE_CMD: u8 = 0x01;

/// Size of all three firmware version records together.
pub const ALL_VERSION_BYTES: usize = crate::common::FW_VERSION_SIZE * 3;

/// Index value reporting that no registered slave matched.
pub const UNKNOWN_SLAVE_IDX: u8 = 0xFF;

/// HPI master return status.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MasterError {
    /// Generic failure.
    Failure,
    /// Input parameter validation failed.
    InvalidArgs,
    /// Event queue overflow.
    QueueOverflow,
    /// Read/write to the slave device failed.
    I2cFailure,
}

/// HPI response and event codes reported by slave devices.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MasterEvent {
    NoResponse = 0x00,
    Success = 0x02,
    FlashDataAvailable = 0x03,
    InvalidCommand = 0x05,
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
}

impl MasterEvent {
    /// Decode a wire event/response code. Codes the middleware does not
    /// know are passed to the application as raw values.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => Self::NoResponse,
            0x02 => Self::Success,
            0x03 => Self::FlashDataAvailable,
            0x05 => Self::InvalidCommand,
            0x07 => Self::FlashUpdateFailed,
            0x08 => Self::InvalidFw,
            0x09 => Self::InvalidArgument,
            0x0A => Self::NotSupported,
            0x0C => Self::PdTransactionFailed,
            0x0D => Self::PdCommandFailed,
            0x0F => Self::UndefinedError,
            0x10 => Self::PdoData,
            0x11 => Self::CmdAborted,
            0x12 => Self::PortBusy,
            0x13 => Self::MinMaxCurrent,
            0x14 => Self::ExtSrcCap,
            0x80 => Self::ResetComplete,
            0x81 => Self::EventQueueOverflow,
            0x82 => Self::OcDetect,
            0x83 => Self::OvDetect,
            0x84 => Self::ConnectDetect,
            0x85 => Self::DisconnectDetect,
            0x86 => Self::NegotiationComplete,
            0x87 => Self::SwapComplete,
            0x8A => Self::PsRdyReceived,
            0x8B => Self::GotoMinReceived,
            0x8C => Self::AcceptReceived,
            0x8D => Self::RejectReceived,
            0x8E => Self::WaitReceived,
            0x8F => Self::HardResetReceived,
            0x90 => Self::VdmReceived,
            0x91 => Self::SourceCapReceived,
            0x92 => Self::SinkCapReceived,
            0x9A => Self::HardResetSent,
            0x9B => Self::SoftResetSent,
            0x9C => Self::CableResetSent,
            0x9D => Self::SourceDisabled,
            0x9E => Self::SenderTimeout,
            0x9F => Self::VdmNoResponse,
            0xA0 => Self::UnexpectedVoltage,
            0xA1 => Self::ErrorRecovery,
            0xA2 => Self::BatStatusReceived,
            0xA3 => Self::AlertReceived,
            0xA4 => Self::NotSuppReceived,
            0xA6 => Self::EmcaDetect,
            0xA7 => Self::EmcaNotDetect,
            0xAA => Self::RpChangeDetect,
            0xAB => Self::BillboardUpdate,
            0xAC => Self::PdExtdMsgSop,
            0xB0 => Self::AltMode,
            0xB1 => Self::AppHw,
            0xB4 => Self::PdExtdMsgSopPrime,
            0xB5 => Self::PdExtdMsgSopDPrime,
            0xB6 => Self::OtDetect,
            _ => return None,
        })
    }
}

/// HPI device information register addresses.
///
/// These registers report firmware mode and version information and drive
/// firmware and configuration table updates.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DevRegister {
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
    UcsiStatus = 0x38,
    UcsiControl = 0x39,
    CfgTableVersion = 0x3A,
    SysPowerState = 0x3B,
    HpiVersion = 0x3C,
    Response = 0x7E,
}

/// HPI port information register addresses, offsets within a port section.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PortRegister {
    VdmControl = 0x00,
    EffSourcePdoMask = 0x02,
    EffSinkPdoMask = 0x03,
    PdControl = 0x06,
    PdStatus = 0x08,
    TypeCStatus = 0x0C,
    CurrentPdo = 0x10,
    CurrentRdo = 0x14,
    EventMask = 0x24,
    SwapResponse = 0x28,
}

/// Descriptor for one registered HPI slave device.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SlaveDevice {
    /// Slave I2C address (7 bits).
    pub addr: u8,
    /// Interrupt GPIO port number.
    pub intr_gpio_port: u8,
    /// Interrupt GPIO pin number.
    pub intr_gpio_pin: u8,
    /// Number of PD ports supported by the slave.
    pub port_count: u8,
    /// Latched copy of the slave interrupt status register.
    pub intr_reg: u8,
    /// Count of consecutive transport failures.
    pub fail_count: u8,
}

/// Event or response received from a slave device, as delivered to the
/// application handler.
#[derive(Copy, Clone, Debug)]
pub struct SlaveEvent<'a> {
    /// Index of the slave in the registration order.
    pub slave_idx: u8,
    /// Slave port number the event relates to (0 for device level events).
    pub port: u8,
    /// Raw HPI response/event/failure code.
    pub code: u8,
    /// Data associated with the event.
    pub data: &'a [u8],
}

impl SlaveEvent<'_> {
    /// Decoded event code, when the middleware knows it.
    #[must_use]
    pub fn event(&self) -> Option<MasterEvent> {
        MasterEvent::from_code(self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_codes_roundtrip() {
        for code in 0..=0xFFu8 {
            if let Some(evt) = MasterEvent::from_code(code) {
                assert_eq!(evt as u8, code);
            }
        }
    }

    #[test]
    fn known_codes_decode() {
        assert_eq!(MasterEvent::from_code(0x84), Some(MasterEvent::ConnectDetect));
        assert_eq!(
            MasterEvent::from_code(0x81),
            Some(MasterEvent::EventQueueOverflow)
        );
        assert_eq!(MasterEvent::from_code(0x01), None);
    }
}
