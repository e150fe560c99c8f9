// Licensed under the Apache-2.0 license

//! HPI slave register/event engine.
//!
//! [`HpiSlave`] ties the pieces together: the I2C transport, the register
//! space, the UCSI bridge, the per-section event queues, and the
//! application seams. EC writes are latched by the transport in interrupt
//! context; [`HpiSlave::task`] decodes and executes them from the main
//! loop, posts the response through the device response registers, and
//! raises EC_INT. PD stack events enter through
//! [`HpiSlave::pd_event_handler`] and friends and leave the same way.

use fugit::MillisDurationU32;

use crate::common::{event_mask, FwVersion, Logger};
use crate::queue::EventQueue;
use crate::slave::common::{
    DevRegAddr, FlashConfig, HwConfig, PdEvent, PdPacket, PortRegAddr, RegPart, RegSection,
    Response, SlaveError, SysHwError, UcsiControlCommand, EVENT_QUEUE_COUNT, INTR_DEV,
    INTR_PORT0, INTR_PORT1, MAX_FLASH_ROW_SIZE, PD_CTRL_EC_INIT_COMPLETE,
    UCSI_READ_PENDING_EVENT, UCSI_READ_PENDING_MASK, VALID_EPR_MASK,
};
use crate::slave::common::{
    AUTO_EPR_ENABLE_MASK, MAX_PD_PORTS, PORT_USERDEF_REG_COUNT, USERDEF_REG_COUNT,
};
use crate::slave::hw_i2c::{HpiI2c, I2cEvent, I2cSlaveHw};
use crate::slave::regs::RegSpace;
use crate::slave::traits::{SlaveApplication, UserRegWriteHandler};
use crate::slave::ucsi::UcsiState;

// Command signatures the EC writes with the corresponding requests.
const JUMP_TO_BOOT_SIG: u8 = b'J';
const JUMP_TO_ALT_FW_SIG: u8 = b'A';
const ENTER_FLASHING_SIG: u8 = b'P';
const FLASH_READ_WRITE_SIG: u8 = b'F';
const RESET_SIG: u8 = b'R';

const FLASH_ROW_READ_CMD: u8 = 0x00;
const FLASH_ROW_WRITE_CMD: u8 = 0x01;
const RESET_I2C_CMD: u8 = 0x00;
const RESET_DEVICE_CMD: u8 = 0x01;

// Device section register offsets handled as commands.
const DEV_INTR: u8 = DevRegAddr::InterruptStatus as u8;
const DEV_JUMP_TO_BOOT: u8 = DevRegAddr::JumpToBoot as u8;
const DEV_RESET: u8 = DevRegAddr::ResetRequest as u8;
const DEV_ENTER_FLASH: u8 = DevRegAddr::EnterFlashMode as u8;
const DEV_VALIDATE_FW: u8 = DevRegAddr::ValidateFw as u8;
const DEV_FLASH_RW: u8 = DevRegAddr::FlashReadWrite as u8;
const DEV_PORT_ENABLE: u8 = DevRegAddr::PortEnable as u8;
const DEV_SLEEP_CTRL: u8 = DevRegAddr::SleepControl as u8;
const DEV_APP_PRIORITY: u8 = DevRegAddr::SetAppPriority as u8;
const DEV_UCSI_CONTROL: u8 = DevRegAddr::UcsiControl as u8;
const DEV_SYS_PWR_STATE: u8 = DevRegAddr::SysPowerState as u8;
const DEV_USERDEF_FIRST: u8 = DevRegAddr::UserdefBase as u8;
const DEV_USERDEF_LAST: u8 = DEV_USERDEF_FIRST + USERDEF_REG_COUNT as u8 - 1;
const DEV_CONTROL: u8 = DevRegAddr::DevControl as u8;

// Port section register offsets.
const PORT_VDM_CTRL: u8 = PortRegAddr::VdmControl as u8;
const PORT_SRC_PDO_SELECT: u8 = PortRegAddr::SourcePdoSelect as u8;
const PORT_SINK_PDO_SELECT: u8 = PortRegAddr::SinkPdoSelect as u8;
const PORT_PD_CTRL: u8 = PortRegAddr::PdControl as u8;
const PORT_ALT_MODE_CMD: u8 = PortRegAddr::AltModeCmd as u8;
const PORT_APP_HW_CMD: u8 = PortRegAddr::AppHwCmd as u8;
const PORT_EVENT_MASK: u8 = PortRegAddr::EventMask as u8;
const PORT_SWAP_RESPONSE: u8 = PortRegAddr::SwapResponse as u8;
const PORT_ACTIVE_EC_MODES: u8 = PortRegAddr::ActiveEcModes as u8;
const PORT_VDM_EC_CTRL: u8 = PortRegAddr::VdmEcControl as u8;
const PORT_BC12_CONTROL: u8 = PortRegAddr::Bc12Control as u8;
const PORT_CMD_TIMEOUT: u8 = PortRegAddr::CmdTimeout as u8;
const PORT_FRS_ENABLE: u8 = PortRegAddr::FrsEnable as u8;
const PORT_CFET_CTRL: u8 = PortRegAddr::ConsumerFetControl as u8;
const PORT_USERDEF_FIRST: u8 = PortRegAddr::UserdefBase as u8;
const PORT_USERDEF_LAST: u8 = PORT_USERDEF_FIRST + PORT_USERDEF_REG_COUNT as u8 - 1;
const PORT_SINK_RDO: u8 = PortRegAddr::SinkRdoRequest as u8;
const PORT_HOST_CAP: u8 = PortRegAddr::HostCapControl as u8;
const PORT_DFP_ALT_MASK: u8 = PortRegAddr::DfpAltModeMask as u8;
const PORT_UFP_ALT_MASK: u8 = PortRegAddr::UfpAltModeMask as u8;
const PORT_ALT_MODE_SVID: u8 = PortRegAddr::CustomAltModeSvid as u8;
const PORT_EPR_SRC_SELECT: u8 = PortRegAddr::EprSourcePdoSelect as u8;
const PORT_EPR_SNK_SELECT: u8 = PortRegAddr::EprSinkPdoSelect as u8;
const PORT_SINK_PPS_AVS: u8 = PortRegAddr::SinkPpsAvsControl as u8;

/// Interrupt and command handling status.
struct EngineStatus {
    accessed: bool,
    ec_ready: bool,
    ec_int_enabled: bool,
    ec_int_asserted: bool,
    cmd_pending: bool,
    pending_addr: u16,
    pdo_update_disable: bool,
}

impl EngineStatus {
    const fn new() -> Self {
        Self {
            accessed: false,
            ec_ready: false,
            ec_int_enabled: true,
            ec_int_asserted: false,
            cmd_pending: false,
            pending_addr: 0,
            pdo_update_disable: false,
        }
    }
}

/// HPI slave middleware context.
///
/// * `HW` - I2C slave hardware block.
/// * `A` - application seam ([`SlaveApplication`]).
/// * `L` - logging seam.
/// * `SCRATCH` - transport receive buffer size; must hold the address
///   preamble plus the largest EC write (a full flash row).
/// * `QUEUE` - per-section event queue size in bytes.
pub struct HpiSlave<
    HW: I2cSlaveHw,
    A: SlaveApplication,
    L: Logger,
    const SCRATCH: usize = 288,
    const QUEUE: usize = 256,
> {
    i2c: HpiI2c<HW, SCRATCH>,
    app: A,
    logger: L,
    regs: RegSpace,
    flash: FlashConfig,
    hw_config: HwConfig,
    ucsi: UcsiState,
    queues: [EventQueue<QUEUE>; EVENT_QUEUE_COUNT],
    userdef_handler: Option<UserRegWriteHandler>,
    num_ports: u8,
    status: EngineStatus,
}

impl<
        HW: I2cSlaveHw,
        A: SlaveApplication,
        L: Logger,
        const SCRATCH: usize,
        const QUEUE: usize,
    > HpiSlave<HW, A, L, SCRATCH, QUEUE>
{
    /// Initialize the slave middleware and enable the I2C interface.
    /// Configure the I2C block in slave mode before calling this.
    pub fn new(
        hw: HW,
        app: A,
        logger: L,
        hw_config: HwConfig,
        flash: FlashConfig,
        num_ports: u8,
    ) -> Result<Self, SlaveError> {
        if num_ports == 0
            || usize::from(num_ports) > MAX_PD_PORTS
            || hw_config.slave_addr == 0
            || hw_config.slave_addr > 0x7F
            || SCRATCH < MAX_FLASH_ROW_SIZE + 2
        {
            return Err(SlaveError::InvalidArgs);
        }

        let mut slave = Self {
            i2c: HpiI2c::new(hw),
            app,
            logger,
            regs: RegSpace::new(),
            flash,
            hw_config,
            ucsi: UcsiState::new(),
            queues: [EventQueue::new(), EventQueue::new(), EventQueue::new()],
            userdef_handler: None,
            num_ports,
            status: EngineStatus::new(),
        };
        slave.regs.dev.bl_last_row = flash.bl_last_row;
        slave.regs.dev.device_mode = slave.app.device_mode();
        slave.i2c.enable();
        Ok(slave)
    }

    /// Disable the interface and restore all state to defaults.
    pub fn deinit(&mut self) {
        self.i2c.disable();
        self.regs = RegSpace::new();
        self.ucsi.reset(&mut self.regs.dev);
        for q in &mut self.queues {
            q.clear();
        }
        if self.status.ec_int_asserted {
            self.app.set_ec_interrupt(false);
        }
        self.status = EngineStatus::new();
    }

    /// Application seam access.
    pub fn app(&self) -> &A {
        &self.app
    }

    /// Mutable application seam access.
    pub fn app_mut(&mut self) -> &mut A {
        &mut self.app
    }

    /// Configured hardware parameters.
    #[must_use]
    pub fn hw_config(&self) -> &HwConfig {
        &self.hw_config
    }

    // --- Event signalling ---------------------------------------------

    /// Set a bit in the interrupt status register and drive EC_INT.
    pub fn set_event(&mut self, bit_idx: u8) {
        self.regs.dev.intr_stat |= 1 << bit_idx;
        self.update_ec_int();
    }

    /// Clear a bit in the interrupt status register; deasserts EC_INT
    /// when nothing remains pending.
    pub fn clear_event(&mut self, bit_idx: u8) {
        self.regs.dev.intr_stat &= !(1 << bit_idx);
        self.update_ec_int();
    }

    fn update_ec_int(&mut self) {
        let assert = self.status.ec_int_enabled && self.regs.dev.intr_stat != 0;
        if assert != self.status.ec_int_asserted {
            self.status.ec_int_asserted = assert;
            self.app.set_ec_interrupt(assert);
        }
    }

    /// Enable or disable interrupt mode on the EC_INT pin.
    pub fn set_ec_interrupt(&mut self, enable: bool) {
        self.status.ec_int_enabled = enable;
        self.update_ec_int();
    }

    /// Notify the EC that the firmware is up after a reset.
    pub fn send_fw_ready_event(&mut self) {
        self.queue_event(RegSection::Dev, Response::ResetComplete, &[]);
    }

    /// Report a system hardware access error, gated by the system error
    /// event mask.
    pub fn send_hw_error_event(&mut self, port: u8, err: SysHwError) {
        if self.event_enabled(port, Response::HardwareError as u8, event_mask::SYS_ERROR) {
            if let Some(section) = RegSection::for_port(port) {
                self.queue_event(section, Response::HardwareError, &[err as u8]);
            }
        }
    }

    /// Report a platform-specific event, gated by the misc event mask.
    pub fn send_platform_event(&mut self, port: u8, code: Response) {
        if self.event_enabled(port, code as u8, event_mask::MISC) {
            if let Some(section) = RegSection::for_port(port) {
                self.queue_event(section, code, &[]);
            }
        }
    }

    fn queue_index(section: RegSection) -> Option<usize> {
        match section {
            RegSection::Dev => Some(0),
            RegSection::Port0 => Some(1),
            RegSection::Port1 => Some(2),
            _ => None,
        }
    }

    /// Queue an event for delivery through the response registers.
    ///
    /// Device section responses carry no payload; data goes through the
    /// port section read data memory. Returns `false` on overflow or when
    /// the section cannot take the event.
    pub fn queue_event(&mut self, section: RegSection, code: Response, data: &[u8]) -> bool {
        self.queue_event_pair(section, code, data, &[])
    }

    fn queue_event_pair(
        &mut self,
        section: RegSection,
        code: Response,
        head: &[u8],
        tail: &[u8],
    ) -> bool {
        let Some(qi) = Self::queue_index(section) else {
            return false;
        };
        if section == RegSection::Dev && (!head.is_empty() || !tail.is_empty()) {
            return false;
        }
        if let Some(port) = section.port() {
            if port >= self.num_ports {
                return false;
            }
        }
        let meta = section.port().unwrap_or(0);
        let Some(queue) = self.queues.get_mut(qi) else {
            return false;
        };
        if queue.enqueue_pair(code as u8, meta, head, tail).is_err() {
            // Replace the section backlog with a single overflow marker.
            queue.clear();
            let _ = queue.enqueue(Response::EventQueueOverflow as u8, meta, &[]);
            self.logger.error("hpi-s: event queue overflow");
            return false;
        }
        true
    }

    /// Queue an event with a two-part payload (PD message data follows
    /// the event data).
    pub fn queue_pd_msg(
        &mut self,
        section: RegSection,
        code: Response,
        data1: &[u8],
        data2: &[u8],
    ) -> bool {
        self.queue_event_pair(section, code, data1, data2)
    }

    /// Queue a PD message packet event, honoring the port event mask.
    pub fn enqueue_pd_packet(
        &mut self,
        port: u8,
        packet: &PdPacket<'_>,
        code: Response,
        mask_bit: u32,
    ) {
        if !self.event_enabled(port, code as u8, mask_bit) {
            return;
        }
        let Some(section) = RegSection::for_port(port) else {
            return;
        };
        let head = [
            packet.sop,
            (packet.header & 0xFF) as u8,
            (packet.header >> 8) as u8,
            (packet.extd_header & 0xFF) as u8,
            (packet.extd_header >> 8) as u8,
        ];
        self.queue_event_pair(section, code, &head, packet.data);
    }

    fn event_enabled(&self, port: u8, code: u8, mask_bit: u32) -> bool {
        let mask = self
            .regs
            .port
            .get(usize::from(port))
            .map(|p| p.event_mask)
            .unwrap_or(0);
        let hit = mask & mask_bit != 0;
        self.app.is_event_enabled(port, code, hit)
    }

    /// Map a PD stack event onto the HPI event pipeline.
    ///
    /// Updates the affected status registers and queues the notification
    /// when the port event mask enables it.
    pub fn pd_event_handler(&mut self, port: u8, event: PdEvent, data: &[u8]) {
        if port >= self.num_ports {
            return;
        }

        // Connection state tracking happens regardless of the mask.
        match event {
            PdEvent::TypeCConnect => {
                if let Some(p) = self.regs.port.get_mut(usize::from(port)) {
                    p.type_c_status |= 0x01;
                }
            }
            PdEvent::TypeCDisconnect => {
                if let Some(p) = self.regs.port.get_mut(usize::from(port)) {
                    p.type_c_status &= !0x01;
                    p.cur_pdo = 0;
                    p.cur_rdo = 0;
                }
            }
            PdEvent::ContractComplete => {
                if data.len() >= 4 {
                    let rdo = u32::from_le_bytes([
                        data.first().copied().unwrap_or(0),
                        data.get(1).copied().unwrap_or(0),
                        data.get(2).copied().unwrap_or(0),
                        data.get(3).copied().unwrap_or(0),
                    ]);
                    if let Some(p) = self.regs.port.get_mut(usize::from(port)) {
                        p.cur_rdo = rdo;
                    }
                }
            }
            _ => {}
        }

        let (code, mask_bit) = Self::map_pd_event(event);
        if !self.event_enabled(port, code as u8, mask_bit) {
            return;
        }
        if let Some(section) = RegSection::for_port(port) {
            self.queue_event(section, code, data);
        }
    }

    fn map_pd_event(event: PdEvent) -> (Response, u32) {
        match event {
            PdEvent::TypeCConnect => (Response::ConnectDetect, event_mask::CC_CONNECT),
            PdEvent::TypeCDisconnect => (Response::DisconnectDetect, event_mask::CC_DISCONNECT),
            PdEvent::ContractComplete => (Response::NegotiationComplete, event_mask::CONTRACT),
            PdEvent::SwapComplete => (Response::SwapComplete, event_mask::CTRL_MSG),
            PdEvent::OcpFault => (Response::OcDetect, event_mask::OCP),
            PdEvent::OvpFault => (Response::OvDetect, event_mask::OVP),
            PdEvent::OtpFault => (Response::OtDetect, event_mask::OTP),
            PdEvent::UvpFault => (Response::UvDetect, event_mask::ERROR),
            PdEvent::ScFault => (Response::ScDetect, event_mask::ERROR),
            PdEvent::RcFault => (Response::RcDetect, event_mask::ERROR),
            PdEvent::VconnOcpFault => (Response::VconnOcDetect, event_mask::ERROR),
            PdEvent::PsRdyReceived => (Response::PsRdyReceived, event_mask::CTRL_MSG),
            PdEvent::GotoMinReceived => (Response::GotoMinReceived, event_mask::CTRL_MSG),
            PdEvent::AcceptReceived => (Response::AcceptReceived, event_mask::CTRL_MSG),
            PdEvent::RejectReceived => (Response::RejectReceived, event_mask::CTRL_MSG),
            PdEvent::WaitReceived => (Response::WaitReceived, event_mask::CTRL_MSG),
            PdEvent::HardResetReceived => (Response::HardResetReceived, event_mask::CTRL_MSG),
            PdEvent::HardResetSent => (Response::HardResetSent, event_mask::CTRL_MSG),
            PdEvent::SoftResetSent => (Response::SoftResetSent, event_mask::CTRL_MSG),
            PdEvent::CableResetSent => (Response::CableResetSent, event_mask::CTRL_MSG),
            PdEvent::SourceDisabled => (Response::SourceDisabled, event_mask::ERROR),
            PdEvent::SenderTimeout => (Response::SenderTimeout, event_mask::ERROR),
            PdEvent::VdmReceived => (Response::VdmReceived, event_mask::VDM_RCVD),
            PdEvent::SourceCapReceived => (Response::SourceCapReceived, event_mask::SRC_CAP),
            PdEvent::SinkCapReceived => (Response::SinkCapReceived, event_mask::SNK_CAP),
            PdEvent::AlertReceived => (Response::AlertReceived, event_mask::DATA_MSG),
            PdEvent::BatteryStatusReceived => {
                (Response::BatStatusReceived, event_mask::DATA_MSG)
            }
            PdEvent::NotSupportedReceived => (Response::NotSuppReceived, event_mask::CTRL_MSG),
            PdEvent::ErrorRecovery => (Response::ErrorRecovery, event_mask::ERROR),
            PdEvent::UnexpectedVoltage => (Response::UnexpectedVoltage, event_mask::ERROR),
            PdEvent::EmcaDetected => (Response::EmcaDetect, event_mask::EMCA),
            PdEvent::EmcaNotDetected => (Response::EmcaNotDetect, event_mask::EMCA),
            PdEvent::RpChangeDetected => (Response::RpChangeDetect, event_mask::MISC),
            PdEvent::DataResetReceived => (Response::DataResetReceived, event_mask::CTRL_MSG),
            PdEvent::DataResetComplete => (Response::DataResetComplete, event_mask::CTRL_MSG),
            PdEvent::UsbEntryComplete => (Response::UsbEntryComplete, event_mask::CTRL_MSG),
        }
    }

    // --- I2C interrupt path -------------------------------------------

    /// Service the I2C hardware. Call from the I2C interrupt handler.
    pub fn i2c_interrupt_handler(&mut self) {
        while let Some(event) = self.i2c.service() {
            match event {
                I2cEvent::AddrMatch => {
                    self.status.accessed = true;
                }
                I2cEvent::ReadRequest => self.handle_read_request(),
                I2cEvent::WriteDone(count) => self.handle_write_done(count),
                I2cEvent::ReadDone => self.handle_read_done(),
                I2cEvent::Fault => {
                    self.logger.error("hpi-s: i2c transaction fault");
                }
            }
        }
    }

    /// Account elapsed time for the transport watchdog. Call from a
    /// periodic timer.
    pub fn on_timer_tick(&mut self, elapsed: MillisDurationU32) {
        if self.i2c.on_tick(elapsed).is_some() {
            self.logger.error("hpi-s: i2c transfer timeout");
        }
    }

    fn handle_read_request(&mut self) {
        let window = match RegSpace::decode(self.status.pending_addr) {
            Some((section, part, offset)) => self.regs.read_window(section, part, offset),
            None => &[],
        };
        if window.is_empty() {
            // Reads past the valid space return padding so the EC cannot
            // stall the bus.
            self.i2c.write_response(&[0xFF]);
        } else {
            self.i2c.write_response(window);
        }
    }

    fn handle_read_done(&mut self) {
        // The EC drained pending UCSI data; release the interface.
        if let Some((RegSection::Ucsi, _, _)) = RegSpace::decode(self.status.pending_addr) {
            if self.ucsi.read_pending() {
                self.ucsi.clear_read_pending();
                self.clear_event(UCSI_READ_PENDING_EVENT);
            }
        }
    }

    fn handle_write_done(&mut self, count: u16) {
        if count < 2 {
            return;
        }
        let received = self.i2c.received();
        let lo = received.first().copied().unwrap_or(0);
        let hi = received.get(1).copied().unwrap_or(0);
        self.status.pending_addr = u16::from(lo) | (u16::from(hi) << 8);
        self.status.accessed = true;

        if count == 2 {
            // Address-only write: sets the read location.
            return;
        }
        // Command with payload: defer to the task and hold off further
        // writes until it has been handled.
        self.status.cmd_pending = true;
        self.i2c.set_ack(false);
    }

    // --- Main loop ------------------------------------------------------

    /// Handle deferred EC commands and deliver queued events. Call
    /// periodically from the firmware main loop.
    pub fn task(&mut self) {
        if self.status.cmd_pending {
            let mut frame = [0u8; SCRATCH];
            let len = {
                let received = self.i2c.received();
                let len = received.len();
                for (dst, src) in frame.iter_mut().zip(received.iter()) {
                    *dst = *src;
                }
                len
            };
            self.status.cmd_pending = false;
            if let Some(data) = frame.get(..len) {
                self.process_ec_write(data);
            }
            self.i2c.set_ack(true);
        }
        self.drain_queues();
    }

    fn process_ec_write(&mut self, frame: &[u8]) {
        let lo = frame.first().copied().unwrap_or(0);
        let hi = frame.get(1).copied().unwrap_or(0);
        let addr = u16::from(lo) | (u16::from(hi) << 8);
        let payload = frame.get(2..).unwrap_or(&[]);

        match RegSpace::decode(addr) {
            Some((RegSection::Dev, RegPart::Reg, offset)) => {
                self.dev_reg_write(offset as u8, payload);
            }
            Some((RegSection::Dev, RegPart::Flash, offset)) => {
                // Flash data staging is silent; the row command follows.
                let offset = usize::from(offset);
                for (i, byte) in payload.iter().enumerate() {
                    if let Some(slot) = self.regs.flash_mem.get_mut(offset + i) {
                        *slot = *byte;
                    }
                }
            }
            Some((section @ (RegSection::Port0 | RegSection::Port1), RegPart::Reg, offset)) => {
                let port = section.port().unwrap_or(0);
                if port >= self.num_ports {
                    self.respond_dev(Response::InvalidArgument);
                } else {
                    self.port_reg_write(port, offset as u8, payload);
                }
            }
            Some((
                section @ (RegSection::Port0 | RegSection::Port1),
                part @ (RegPart::PdDataWrite | RegPart::PdDataWriteH),
                offset,
            )) => {
                let port = section.port().unwrap_or(0);
                let offset = if part == RegPart::PdDataWriteH {
                    offset.saturating_add(0x100)
                } else {
                    offset
                };
                if port < self.num_ports {
                    self.regs.store_write_mem(port, offset, payload);
                }
            }
            Some((RegSection::Ucsi, _, offset)) => {
                let resp = self
                    .app
                    .ucsi_write(offset, payload)
                    .unwrap_or(Response::NotSupported);
                self.respond_dev(resp);
            }
            _ => {
                self.respond_dev(Response::InvalidCommand);
            }
        }
    }

    fn respond_dev(&mut self, code: Response) {
        self.queue_event(RegSection::Dev, code, &[]);
    }

    fn dev_reg_write(&mut self, offset: u8, payload: &[u8]) {
        let first = payload.first().copied().unwrap_or(0);
        let response = match offset {
            DEV_INTR => {
                self.ack_interrupts(first);
                None
            }
            DEV_JUMP_TO_BOOT => match first {
                JUMP_TO_BOOT_SIG | JUMP_TO_ALT_FW_SIG => {
                    self.app.set_bootloader_run_type(u32::from(first));
                    self.app.device_reset();
                    Some(Response::Success)
                }
                _ => Some(Response::InvalidArgument),
            },
            DEV_RESET => {
                if first != RESET_SIG {
                    Some(Response::InvalidArgument)
                } else {
                    match payload.get(1).copied().unwrap_or(0xFF) {
                        RESET_I2C_CMD => {
                            self.i2c.reset();
                            None
                        }
                        RESET_DEVICE_CMD => {
                            self.app.device_reset();
                            Some(Response::Success)
                        }
                        _ => Some(Response::InvalidCommand),
                    }
                }
            }
            DEV_ENTER_FLASH => match first {
                ENTER_FLASHING_SIG => {
                    self.app.flash_enter_mode(true);
                    Some(Response::Success)
                }
                0 => {
                    self.app.flash_enter_mode(false);
                    Some(Response::Success)
                }
                _ => Some(Response::InvalidArgument),
            },
            DEV_VALIDATE_FW => {
                if self.app.validate_firmware(first) {
                    Some(Response::Success)
                } else {
                    Some(Response::InvalidFw)
                }
            }
            DEV_FLASH_RW => Some(self.handle_flash_command(payload)),
            DEV_PORT_ENABLE => {
                let mut accepted = true;
                for port in 0..self.num_ports {
                    let enable = first & (1 << port) != 0;
                    accepted &= self.app.port_enable_request(port, enable);
                }
                if accepted {
                    self.regs.dev.port_enable = first;
                    Some(Response::Success)
                } else {
                    Some(Response::CmdFailed)
                }
            }
            DEV_SLEEP_CTRL => {
                self.regs.dev.sleep_ctrl = first;
                Some(Response::Success)
            }
            DEV_APP_PRIORITY => {
                if first <= 2 {
                    self.regs.dev.set_app_priority = first;
                    Some(Response::Success)
                } else {
                    Some(Response::InvalidArgument)
                }
            }
            DEV_UCSI_CONTROL => match UcsiControlCommand::from_u8(first) {
                Some(cmd) => {
                    if self.app.ucsi_command(cmd) {
                        let resp = self.ucsi.handle_control(&mut self.regs.dev, cmd);
                        if self.ucsi.read_pending() {
                            self.set_event(UCSI_READ_PENDING_EVENT);
                        }
                        Some(resp)
                    } else {
                        Some(Response::UcsiCommandFailed)
                    }
                }
                None => Some(Response::InvalidArgument),
            },
            DEV_SYS_PWR_STATE => {
                self.regs.dev.syspwr_state = first;
                self.app.update_sys_pwr_state(first);
                Some(Response::Success)
            }
            DEV_USERDEF_FIRST..=DEV_USERDEF_LAST => {
                self.regs.update(RegSection::Dev, u16::from(offset), payload);
                match self.userdef_handler {
                    Some(handler) => Some(handler(u16::from(offset), payload)),
                    None => Some(Response::Success),
                }
            }
            DEV_CONTROL => {
                self.regs.dev.dev_control = first;
                Some(Response::Success)
            }
            _ => Some(Response::InvalidCommand),
        };
        if let Some(code) = response {
            self.respond_dev(code);
        }
    }

    fn handle_flash_command(&mut self, payload: &[u8]) -> Response {
        let sig = payload.first().copied().unwrap_or(0);
        if sig != FLASH_READ_WRITE_SIG {
            return Response::InvalidArgument;
        }
        if !self.app.flash_access_allowed() {
            return Response::InvalidCommand;
        }
        let cmd = payload.get(1).copied().unwrap_or(0xFF);
        let row = u16::from(payload.get(2).copied().unwrap_or(0))
            | (u16::from(payload.get(3).copied().unwrap_or(0)) << 8);
        if row >= self.flash.row_count {
            return Response::InvalidArgument;
        }
        let row_size = usize::from(self.flash.row_size).min(MAX_FLASH_ROW_SIZE);

        match cmd {
            FLASH_ROW_READ_CMD => {
                let Some(window) = self.regs.flash_mem.get_mut(..row_size) else {
                    return Response::FlashUpdateFailed;
                };
                if self.app.flash_row_read(row, window) {
                    Response::FlashDataAvailable
                } else {
                    Response::FlashUpdateFailed
                }
            }
            FLASH_ROW_WRITE_CMD => {
                if row <= self.flash.bl_last_row {
                    return Response::InvalidArgument;
                }
                let Some(window) = self.regs.flash_mem.get(..row_size) else {
                    return Response::FlashUpdateFailed;
                };
                if self.app.flash_row_write(row, window) {
                    Response::Success
                } else {
                    Response::FlashUpdateFailed
                }
            }
            _ => Response::InvalidCommand,
        }
    }

    fn port_reg_write(&mut self, port: u8, offset: u8, payload: &[u8]) {
        let first = payload.first().copied().unwrap_or(0);
        let store = |regs: &mut RegSpace| {
            if let Some(section) = RegSection::for_port(port) {
                regs.update(section, u16::from(offset), payload);
            }
        };
        let response = match offset {
            // PD command initiation is not supported in this
            // configuration; the EC gets an explicit response.
            PORT_VDM_CTRL | PORT_ALT_MODE_CMD | PORT_APP_HW_CMD | PORT_SINK_RDO
            | PORT_SINK_PPS_AVS => Response::NotSupported,
            PORT_PD_CTRL => {
                if first == PD_CTRL_EC_INIT_COMPLETE {
                    self.status.ec_ready = true;
                    Response::Success
                } else {
                    Response::NotSupported
                }
            }
            PORT_SRC_PDO_SELECT | PORT_SINK_PDO_SELECT => {
                if self.status.pdo_update_disable {
                    Response::InvalidCommand
                } else {
                    store(&mut self.regs);
                    Response::Success
                }
            }
            PORT_EPR_SRC_SELECT | PORT_EPR_SNK_SELECT => {
                if first & !(VALID_EPR_MASK | AUTO_EPR_ENABLE_MASK) != 0 {
                    Response::InvalidArgument
                } else {
                    store(&mut self.regs);
                    Response::Success
                }
            }
            PORT_BC12_CONTROL => {
                store(&mut self.regs);
                self.app.update_bc_src_support(port, first);
                Response::Success
            }
            PORT_EVENT_MASK
            | PORT_SWAP_RESPONSE
            | PORT_ACTIVE_EC_MODES
            | PORT_VDM_EC_CTRL
            | PORT_CMD_TIMEOUT
            | PORT_FRS_ENABLE
            | PORT_CFET_CTRL
            | PORT_HOST_CAP
            | PORT_DFP_ALT_MASK
            | PORT_UFP_ALT_MASK
            | PORT_ALT_MODE_SVID => {
                store(&mut self.regs);
                Response::Success
            }
            PORT_USERDEF_FIRST..=PORT_USERDEF_LAST => {
                store(&mut self.regs);
                match self.userdef_handler {
                    Some(handler) => {
                        let section = u16::from(port) + 1;
                        handler((section << 12) | u16::from(offset), payload)
                    }
                    None => Response::Success,
                }
            }
            _ => Response::InvalidCommand,
        };
        if let Some(section) = RegSection::for_port(port) {
            self.queue_event(section, response, &[]);
        }
    }

    fn ack_interrupts(&mut self, bits: u8) {
        self.regs.dev.intr_stat &= !bits;
        if bits & UCSI_READ_PENDING_MASK != 0 {
            self.ucsi.clear_read_pending();
        }
        self.update_ec_int();
    }

    fn drain_queues(&mut self) {
        let sources: [(usize, u8, Option<u8>); EVENT_QUEUE_COUNT] = [
            (0, INTR_DEV, None),
            (1, INTR_PORT0, Some(0)),
            (2, INTR_PORT1, Some(1)),
        ];
        for (qi, bit, port) in sources {
            if self.regs.dev.intr_stat & bit != 0 {
                // The EC has not consumed the previous record yet.
                continue;
            }
            let mut scratch = [0u8; MAX_FLASH_ROW_SIZE + 8];
            let record = match self.queues.get_mut(qi) {
                Some(queue) => match queue.dequeue_into(&mut scratch) {
                    Ok(Some(record)) => record,
                    Ok(None) => continue,
                    Err(_) => {
                        // A record larger than the staging buffer cannot
                        // be delivered; drop the backlog instead of
                        // wedging the section.
                        queue.clear();
                        continue;
                    }
                },
                None => continue,
            };
            let len = usize::from(record.len);
            if let (Some(p), true) = (port, len > 0) {
                let payload = scratch.get(..len).unwrap_or(&[]);
                self.regs.stage_read_payload(p, payload);
            }
            self.regs.dev.response = record.code;
            self.regs.dev.response_length = len.min(usize::from(u8::MAX)) as u8;
            self.regs.dev.intr_stat |= bit;
            self.update_ec_int();
        }
    }

    // --- Register bookkeeping -------------------------------------------

    /// Whether any HPI access has occurred since startup.
    #[must_use]
    pub fn is_accessed(&self) -> bool {
        self.status.accessed
    }

    /// Whether the EC reported its initialization complete.
    #[must_use]
    pub fn is_ec_ready(&self) -> bool {
        self.status.ec_ready
    }

    /// Enable or disable PDO updates through the interface.
    pub fn update_pdo_change(&mut self, disable: bool) {
        self.status.pdo_update_disable = disable;
    }

    /// Set the HPI version register.
    pub fn set_hpi_version(&mut self, version: u32) {
        self.regs.dev.hpi_vers = version;
    }

    /// Set the extended HPI version register.
    pub fn set_hpi_version_ext(&mut self, version: u32) {
        self.regs.dev.hpi_vers_ext = version;
    }

    /// Update the device mode and boot mode reason registers.
    pub fn set_mode_regs(&mut self, device_mode: u8, mode_reason: u8) {
        self.regs.dev.device_mode = device_mode;
        self.regs.dev.boot_mode_reason = mode_reason;
    }

    /// Update the firmware version registers.
    pub fn update_versions(&mut self, bl: &FwVersion, fw1: &FwVersion, fw2: &FwVersion) {
        let mut dev_version = [0u8; 16];
        for (dst, src) in dev_version
            .iter_mut()
            .zip(bl.0.iter().chain(fw1.0.iter()))
        {
            *dst = *src;
        }
        self.regs.dev.dev_version = dev_version;
        self.regs.dev.fw_2_version = fw2.0;
    }

    /// Update the firmware binary location registers.
    pub fn update_fw_locations(&mut self, fw1_row: u16, fw2_row: u16) {
        self.regs.dev.fw_bin_loc = [fw1_row, fw2_row];
    }

    /// Set the device flash parameters.
    pub fn set_flash_params(&mut self, config: FlashConfig) {
        self.flash = config;
        self.regs.dev.bl_last_row = config.bl_last_row;
    }

    /// Record the watchdog reset count.
    pub fn set_reset_count(&mut self, count: u32) {
        self.regs.dev.wd_reset_count = count.min(u32::from(u8::MAX)) as u8;
    }

    /// Update the event mask for a PD port.
    pub fn set_port_event_mask(&mut self, port: u8, mask: u32) {
        if let Some(p) = self.regs.port.get_mut(usize::from(port)) {
            p.event_mask = mask;
        }
    }

    /// Update the BC 1.2 connection status for a port.
    pub fn set_port_bc_status(&mut self, port: u8, status: u8) {
        if let Some(p) = self.regs.port.get_mut(usize::from(port)) {
            p.bc12_status = status;
        }
    }

    /// Port Enable register value.
    #[must_use]
    pub fn get_port_enable(&self) -> u8 {
        self.regs.dev.port_enable
    }

    /// System Power State register value.
    #[must_use]
    pub fn get_sys_pwr_state(&self) -> u8 {
        self.regs.dev.syspwr_state
    }

    /// Consumer FET status register for a port.
    #[must_use]
    pub fn get_consumer_fet_status(&self, port: u8) -> u8 {
        self.regs
            .port
            .get(usize::from(port))
            .map(|p| p.vbus_cfet_ctrl)
            .unwrap_or(0)
    }

    /// Update the consumer FET status register for a port.
    pub fn update_consumer_fet_status(&mut self, port: u8, status: u8) {
        if let Some(p) = self.regs.port.get_mut(usize::from(port)) {
            p.vbus_cfet_ctrl = status;
        }
    }

    /// Whether EC control of VDMs is enabled for the port.
    #[must_use]
    pub fn is_vdm_ec_ctrl_enabled(&self, port: u8) -> bool {
        self.regs
            .port
            .get(usize::from(port))
            .map(|p| p.vdm_ec_ctrl & 0x01 != 0)
            .unwrap_or(false)
    }

    /// Whether extended message handling by the EC is enabled for the
    /// port. When disabled the firmware answers extended messages with
    /// NOT_SUPPORTED on its own.
    #[must_use]
    pub fn is_extd_msg_ec_ctrl_enabled(&self, port: u8) -> bool {
        self.regs
            .port
            .get(usize::from(port))
            .map(|p| p.vdm_ec_ctrl & 0x02 != 0)
            .unwrap_or(false)
    }

    /// Active EC alternate modes programmed by the EC.
    #[must_use]
    pub fn get_ec_active_modes(&self, port: u8) -> u8 {
        self.regs
            .port
            .get(usize::from(port))
            .map(|p| p.active_ec_modes)
            .unwrap_or(0)
    }

    /// Initialize the user-defined register region.
    pub fn init_userdef_regs(&mut self, reg_addr: u16, data: &[u8]) -> bool {
        let first = u32::from(DEV_USERDEF_FIRST);
        let last = u32::from(DEV_USERDEF_LAST);
        let end = u32::from(reg_addr) + data.len() as u32;
        if u32::from(reg_addr) < first || end > last + 1 {
            return false;
        }
        self.regs.update(RegSection::Dev, reg_addr, data);
        true
    }

    /// Install a handler for EC writes to the user-defined registers.
    pub fn set_userdef_write_handler(&mut self, handler: UserRegWriteHandler) {
        self.userdef_handler = Some(handler);
    }

    /// Write application-side data into a register image.
    pub fn update_regs(&mut self, section: RegSection, offset: u16, data: &[u8]) {
        self.regs.update(section, offset, data);
    }

    /// Direct read access to the register space (status reporting).
    #[must_use]
    pub fn regs(&self) -> &RegSpace {
        &self.regs
    }

    // --- UCSI ------------------------------------------------------------

    /// Clear the UCSI Status and Control registers.
    pub fn ucsi_reg_reset(&mut self) {
        self.ucsi.reset(&mut self.regs.dev);
        self.clear_event(UCSI_READ_PENDING_EVENT);
    }

    /// Set a bit in the UCSI Status register.
    pub fn ucsi_set_status_bit(&mut self, bit_idx: u8) {
        self.ucsi.set_status_bit(&mut self.regs.dev, bit_idx);
    }

    /// Clear a bit in the UCSI Status register.
    pub fn ucsi_clear_status_bit(&mut self, bit_idx: u8) {
        self.ucsi.clear_status_bit(&mut self.regs.dev, bit_idx);
    }

    /// Read a bit of the UCSI Status register.
    #[must_use]
    pub fn ucsi_status_bit(&self, bit_idx: u8) -> u8 {
        self.ucsi.status_bit(&self.regs.dev, bit_idx)
    }

    /// UCSI Control register value.
    #[must_use]
    pub fn ucsi_control(&self) -> u8 {
        self.ucsi.control(&self.regs.dev)
    }

    /// Signal a UCSI notification to the EC. Raises the UCSI read
    /// pending interrupt when the interface is started.
    pub fn ucsi_notify(&mut self) {
        self.ucsi.notify(&mut self.regs.dev);
        if self.ucsi.read_pending() {
            self.set_event(UCSI_READ_PENDING_EVENT);
        }
    }

    // --- Power management ------------------------------------------------

    /// Whether the device may enter Deep Sleep.
    #[must_use]
    pub fn sleep_allowed(&self) -> bool {
        !self.status.cmd_pending
            && self.regs.dev.intr_stat == 0
            && self.queues.iter().all(EventQueue::is_empty)
            && self.i2c.is_idle()
    }

    /// Prepare the interface for Deep Sleep: verifies idleness and arms
    /// wakeup on slave address match. Call [`Self::sleep_allowed`] first.
    pub fn sleep(&mut self) -> bool {
        if !self.sleep_allowed() {
            return false;
        }
        self.i2c.enable_wakeup();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::NoOpLogger;
    use crate::slave::hw_i2c::{
        HW_EVT_ADDR_READ, HW_EVT_ADDR_WRITE, HW_EVT_RX_AVAIL, HW_EVT_STOP,
    };
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::vec::Vec;

    #[derive(Default)]
    struct HwShared {
        pending: VecDeque<u32>,
        rx: VecDeque<u8>,
        tx: Vec<u8>,
        ack: Option<bool>,
        resets: usize,
        idle: bool,
        wakeup_armed: bool,
    }

    #[derive(Clone)]
    struct MockHw(Rc<RefCell<HwShared>>);

    impl MockHw {
        fn new() -> Self {
            let shared = HwShared {
                idle: true,
                ..HwShared::default()
            };
            Self(Rc::new(RefCell::new(shared)))
        }
    }

    impl I2cSlaveHw for MockHw {
        fn pending(&mut self) -> u32 {
            self.0.borrow_mut().pending.pop_front().unwrap_or(0)
        }

        fn read_fifo(&mut self, buf: &mut [u8]) -> usize {
            let mut shared = self.0.borrow_mut();
            let mut n = 0;
            for slot in buf.iter_mut() {
                match shared.rx.pop_front() {
                    Some(b) => {
                        *slot = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            n
        }

        fn write_fifo(&mut self, data: &[u8]) -> usize {
            self.0.borrow_mut().tx.extend_from_slice(data);
            data.len()
        }

        fn set_ack(&mut self, enable: bool) {
            self.0.borrow_mut().ack = Some(enable);
        }

        fn reset(&mut self) {
            self.0.borrow_mut().resets += 1;
        }

        fn is_idle(&self) -> bool {
            self.0.borrow().idle
        }

        fn enable_wakeup(&mut self) {
            self.0.borrow_mut().wakeup_armed = true;
        }
    }

    #[derive(Default)]
    struct MockApp {
        ec_int: Option<bool>,
        run_type: Option<u32>,
        resets: usize,
        flashing: bool,
        flash_writes: Vec<(u16, Vec<u8>)>,
        flash_row_data: Vec<u8>,
        sys_pwr: Option<u8>,
        bc12: Vec<(u8, u8)>,
        valid_fw: bool,
    }

    impl crate::slave::traits::EcInterruptPin for MockApp {
        fn set_ec_interrupt(&mut self, asserted: bool) {
            self.ec_int = Some(asserted);
        }
    }

    impl crate::slave::traits::FirmwareOps for MockApp {
        fn device_mode(&self) -> u8 {
            0x95
        }

        fn set_bootloader_run_type(&mut self, signature: u32) {
            self.run_type = Some(signature);
        }

        fn validate_firmware(&mut self, _fw_id: u8) -> bool {
            self.valid_fw
        }

        fn flash_enter_mode(&mut self, enable: bool) {
            self.flashing = enable;
        }

        fn flash_access_allowed(&self) -> bool {
            self.flashing
        }

        fn flash_row_read(&mut self, _row: u16, buf: &mut [u8]) -> bool {
            for (dst, src) in buf.iter_mut().zip(self.flash_row_data.iter()) {
                *dst = *src;
            }
            true
        }

        fn flash_row_write(&mut self, row: u16, data: &[u8]) -> bool {
            self.flash_writes.push((row, data.to_vec()));
            true
        }

        fn device_reset(&mut self) {
            self.resets += 1;
        }
    }

    impl crate::slave::traits::PlatformHooks for MockApp {
        fn update_sys_pwr_state(&mut self, state: u8) {
            self.sys_pwr = Some(state);
        }

        fn update_bc_src_support(&mut self, port: u8, enable: u8) {
            self.bc12.push((port, enable));
        }
    }

    type Slave = HpiSlave<MockHw, MockApp, NoOpLogger, 288, 256>;

    fn hw_config() -> HwConfig {
        HwConfig {
            slave_addr: 0x40,
            slave_mask: 0xFE,
            ec_int_port: 1,
            ec_int_pin: 2,
        }
    }

    fn flash_config() -> FlashConfig {
        FlashConfig {
            flash_size: 64 * 1024,
            row_size: 8,
            row_count: 256,
            bl_last_row: 10,
        }
    }

    fn slave() -> (Slave, MockHw) {
        let hw = MockHw::new();
        let s = HpiSlave::new(
            hw.clone(),
            MockApp::default(),
            NoOpLogger,
            hw_config(),
            flash_config(),
            2,
        )
        .unwrap();
        (s, hw)
    }

    /// Push a complete master write transaction and run the interrupt
    /// handler plus the task loop.
    fn ec_write(s: &mut Slave, hw: &MockHw, bytes: &[u8]) {
        {
            let mut shared = hw.0.borrow_mut();
            shared.pending.push_back(HW_EVT_ADDR_WRITE);
            shared.pending.push_back(HW_EVT_RX_AVAIL | HW_EVT_STOP);
            shared.rx.extend(bytes.iter().copied());
        }
        s.i2c_interrupt_handler();
        s.task();
    }

    /// Run a master read of the location selected by the last preamble.
    fn ec_read(s: &mut Slave, hw: &MockHw) -> Vec<u8> {
        {
            let mut shared = hw.0.borrow_mut();
            shared.tx.clear();
            shared.pending.push_back(HW_EVT_ADDR_READ);
            shared.pending.push_back(HW_EVT_STOP);
        }
        s.i2c_interrupt_handler();
        let out = hw.0.borrow().tx.clone();
        out
    }

    #[test]
    fn rejects_invalid_configuration() {
        let bad = HpiSlave::<MockHw, MockApp, NoOpLogger, 288, 256>::new(
            MockHw::new(),
            MockApp::default(),
            NoOpLogger,
            hw_config(),
            flash_config(),
            0,
        );
        assert!(bad.is_err());

        let bad = HpiSlave::<MockHw, MockApp, NoOpLogger, 64, 256>::new(
            MockHw::new(),
            MockApp::default(),
            NoOpLogger,
            hw_config(),
            flash_config(),
            1,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn address_only_write_selects_read_location() {
        let (mut s, hw) = slave();
        ec_write(&mut s, &hw, &[0x00, 0x00]);

        let out = ec_read(&mut s, &hw);
        assert_eq!(out[0], 0x95); // device_mode from the application
        assert_eq!(out.len(), 0x80);
        assert!(s.is_accessed());
    }

    #[test]
    fn out_of_range_read_returns_padding() {
        let (mut s, hw) = slave();
        ec_write(&mut s, &hw, &[0x80, 0x00]);
        let out = ec_read(&mut s, &hw);
        assert_eq!(out, vec![0xFF]);
    }

    #[test]
    fn device_reset_command_responds_and_resets() {
        let (mut s, hw) = slave();
        ec_write(&mut s, &hw, &[DEV_RESET, 0x00, RESET_SIG, RESET_DEVICE_CMD]);

        assert_eq!(s.app().resets, 1);
        assert_eq!(s.regs().dev.response, Response::Success as u8);
        assert_eq!(s.regs().dev.intr_stat & INTR_DEV, INTR_DEV);
        assert_eq!(s.app().ec_int, Some(true));
    }

    #[test]
    fn i2c_reset_command_resets_block_without_response() {
        let (mut s, hw) = slave();
        ec_write(&mut s, &hw, &[DEV_RESET, 0x00, RESET_SIG, RESET_I2C_CMD]);
        assert_eq!(hw.0.borrow().resets, 1);
        assert_eq!(s.regs().dev.intr_stat, 0);
        // Writes are acknowledged again once the command is handled.
        assert_eq!(hw.0.borrow().ack, Some(true));
    }

    #[test]
    fn interrupt_ack_releases_next_event() {
        let (mut s, hw) = slave();
        s.send_fw_ready_event();
        s.queue_event(RegSection::Dev, Response::Success, &[]);
        s.task();

        assert_eq!(s.regs().dev.response, Response::ResetComplete as u8);

        // EC acknowledges; the next record drains on the following task.
        ec_write(&mut s, &hw, &[DEV_INTR, 0x00, INTR_DEV]);
        assert_eq!(s.regs().dev.response, Response::Success as u8);
        assert_eq!(s.regs().dev.intr_stat & INTR_DEV, INTR_DEV);
    }

    #[test]
    fn ec_int_follows_interrupt_status() {
        let (mut s, _hw) = slave();
        s.send_fw_ready_event();
        s.task();
        assert_eq!(s.app().ec_int, Some(true));

        ec_write(&mut s, &_hw, &[DEV_INTR, 0x00, 0xFF]);
        assert_eq!(s.app().ec_int, Some(false));
    }

    #[test]
    fn jump_to_boot_records_run_type() {
        let (mut s, hw) = slave();
        ec_write(&mut s, &hw, &[DEV_JUMP_TO_BOOT, 0x00, JUMP_TO_BOOT_SIG]);
        assert_eq!(s.app().run_type, Some(u32::from(JUMP_TO_BOOT_SIG)));
        assert_eq!(s.app().resets, 1);
    }

    #[test]
    fn flash_row_write_uses_staged_data() {
        let (mut s, hw) = slave();
        s.app_mut().flashing = true;

        // Stage row data in the flash memory region (0x0200), then issue
        // the signed row-write command for row 0x20.
        ec_write(&mut s, &hw, &[0x00, 0x02, 1, 2, 3, 4, 5, 6, 7, 8]);
        ec_write(
            &mut s,
            &hw,
            &[
                DEV_FLASH_RW,
                0x00,
                FLASH_READ_WRITE_SIG,
                FLASH_ROW_WRITE_CMD,
                0x20,
                0x00,
            ],
        );

        assert_eq!(s.regs().dev.response, Response::Success as u8);
        assert_eq!(s.app().flash_writes.len(), 1);
        assert_eq!(s.app().flash_writes[0].0, 0x20);
        assert_eq!(s.app().flash_writes[0].1, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn flash_commands_require_flashing_mode() {
        let (mut s, hw) = slave();
        ec_write(
            &mut s,
            &hw,
            &[
                DEV_FLASH_RW,
                0x00,
                FLASH_READ_WRITE_SIG,
                FLASH_ROW_READ_CMD,
                0x20,
                0x00,
            ],
        );
        assert_eq!(s.regs().dev.response, Response::InvalidCommand as u8);
    }

    #[test]
    fn flash_write_protects_bootloader_rows() {
        let (mut s, hw) = slave();
        s.app_mut().flashing = true;
        ec_write(
            &mut s,
            &hw,
            &[
                DEV_FLASH_RW,
                0x00,
                FLASH_READ_WRITE_SIG,
                FLASH_ROW_WRITE_CMD,
                0x05,
                0x00,
            ],
        );
        assert_eq!(s.regs().dev.response, Response::InvalidArgument as u8);
        assert!(s.app().flash_writes.is_empty());
    }

    #[test]
    fn flash_row_read_stages_data_for_ec() {
        let (mut s, hw) = slave();
        s.app_mut().flashing = true;
        s.app_mut().flash_row_data = vec![9, 8, 7, 6, 5, 4, 3, 2];

        ec_write(
            &mut s,
            &hw,
            &[
                DEV_FLASH_RW,
                0x00,
                FLASH_READ_WRITE_SIG,
                FLASH_ROW_READ_CMD,
                0x30,
                0x00,
            ],
        );
        assert_eq!(s.regs().dev.response, Response::FlashDataAvailable as u8);

        // EC reads the flash data memory region.
        ec_write(&mut s, &hw, &[0x00, 0x02]);
        let out = ec_read(&mut s, &hw);
        assert_eq!(&out[..8], &[9, 8, 7, 6, 5, 4, 3, 2]);
    }

    #[test]
    fn validate_firmware_reports_invalid_image() {
        let (mut s, hw) = slave();
        ec_write(&mut s, &hw, &[DEV_VALIDATE_FW, 0x00, 1]);
        assert_eq!(s.regs().dev.response, Response::InvalidFw as u8);

        s.app_mut().valid_fw = true;
        ec_write(&mut s, &hw, &[DEV_INTR, 0x00, INTR_DEV]);
        ec_write(&mut s, &hw, &[DEV_VALIDATE_FW, 0x00, 1]);
        assert_eq!(s.regs().dev.response, Response::Success as u8);
    }

    #[test]
    fn pd_events_respect_port_event_mask() {
        let (mut s, _hw) = slave();
        s.set_port_event_mask(0, event_mask::CC_CONNECT);

        s.pd_event_handler(0, PdEvent::TypeCConnect, &[]);
        s.pd_event_handler(0, PdEvent::TypeCDisconnect, &[]);
        s.task();

        assert_eq!(s.regs().dev.response, Response::ConnectDetect as u8);
        assert_eq!(s.regs().dev.intr_stat & INTR_PORT0, INTR_PORT0);
        // The masked disconnect did not queue: status tracked anyway.
        assert_eq!(s.regs().port[0].type_c_status & 0x01, 0);
    }

    #[test]
    fn port_event_payload_lands_in_read_memory() {
        let (mut s, hw) = slave();
        s.set_port_event_mask(1, event_mask::SNK_CAP);
        s.pd_event_handler(1, PdEvent::SinkCapReceived, &[0x11, 0x22]);
        s.task();

        assert_eq!(s.regs().dev.response, Response::SinkCapReceived as u8);
        assert_eq!(s.regs().dev.response_length, 2);
        assert_eq!(s.regs().dev.intr_stat & INTR_PORT1, INTR_PORT1);

        // EC reads the port 1 read data memory.
        ec_write(&mut s, &hw, &[0x00, 0x24]);
        let out = ec_read(&mut s, &hw);
        assert_eq!(&out[..2], &[0x11, 0x22]);
    }

    #[test]
    fn contract_event_updates_current_rdo() {
        let (mut s, _hw) = slave();
        s.pd_event_handler(0, PdEvent::ContractComplete, &[0x2C, 0x91, 0x01, 0x13]);
        let rdo = s.regs().port[0].cur_rdo;
        assert_eq!(rdo, 0x1301_912C);
    }

    #[test]
    fn ec_init_complete_sets_ready() {
        let (mut s, hw) = slave();
        assert!(!s.is_ec_ready());
        ec_write(
            &mut s,
            &hw,
            &[PORT_PD_CTRL, 0x10, PD_CTRL_EC_INIT_COMPLETE],
        );
        assert!(s.is_ec_ready());
        assert_eq!(s.regs().dev.response, Response::Success as u8);
        assert_eq!(s.regs().dev.intr_stat & INTR_PORT0, INTR_PORT0);
    }

    #[test]
    fn pd_commands_are_not_supported() {
        let (mut s, hw) = slave();
        ec_write(&mut s, &hw, &[PORT_VDM_CTRL, 0x10, 0x01, 0x02]);
        assert_eq!(s.regs().dev.response, Response::NotSupported as u8);
    }

    #[test]
    fn event_mask_write_is_stored() {
        let (mut s, hw) = slave();
        ec_write(
            &mut s,
            &hw,
            &[PORT_EVENT_MASK, 0x10, 0xEF, 0xBE, 0xAD, 0xDE],
        );
        let mask = s.regs().port[0].event_mask;
        assert_eq!(mask, 0xDEAD_BEEF);
        assert_eq!(s.regs().dev.response, Response::Success as u8);
    }

    #[test]
    fn bc12_control_reaches_platform_hook() {
        let (mut s, hw) = slave();
        ec_write(&mut s, &hw, &[PORT_BC12_CONTROL, 0x20, 0x01]);
        assert_eq!(s.app().bc12, vec![(1, 1)]);
    }

    #[test]
    fn writes_to_missing_port_are_rejected() {
        let hw = MockHw::new();
        let mut s: Slave = HpiSlave::new(
            hw.clone(),
            MockApp::default(),
            NoOpLogger,
            hw_config(),
            flash_config(),
            1,
        )
        .unwrap();
        ec_write(&mut s, &hw, &[PORT_EVENT_MASK, 0x20, 0xFF]);
        assert_eq!(s.regs().dev.response, Response::InvalidArgument as u8);
    }

    #[test]
    fn userdef_write_handler_is_invoked() {
        fn handler(reg: u16, data: &[u8]) -> Response {
            if reg == 0x0041 && data == &[0xAB] {
                Response::Success
            } else {
                Response::InvalidArgument
            }
        }

        let (mut s, hw) = slave();
        s.set_userdef_write_handler(handler);
        ec_write(&mut s, &hw, &[0x41, 0x00, 0xAB]);
        assert_eq!(s.regs().dev.response, Response::Success as u8);
        assert_eq!(s.regs().dev.userdef_regs[1], 0xAB);
    }

    #[test]
    fn ucsi_connect_event_raises_read_pending_bit() {
        let (mut s, hw) = slave();
        ec_write(
            &mut s,
            &hw,
            &[DEV_UCSI_CONTROL, 0x00, UcsiControlCommand::Start as u8],
        );
        assert_eq!(s.regs().dev.response, Response::Success as u8);

        ec_write(&mut s, &hw, &[DEV_INTR, 0x00, INTR_DEV]);
        ec_write(
            &mut s,
            &hw,
            &[
                DEV_UCSI_CONTROL,
                0x00,
                UcsiControlCommand::SignalConnectEvent as u8,
            ],
        );
        assert_eq!(
            s.regs().dev.intr_stat & UCSI_READ_PENDING_MASK,
            UCSI_READ_PENDING_MASK
        );

        // Acknowledging the UCSI bit releases the interface back to HPI.
        ec_write(&mut s, &hw, &[DEV_INTR, 0x00, UCSI_READ_PENDING_MASK]);
        assert_eq!(s.regs().dev.intr_stat & UCSI_READ_PENDING_MASK, 0);
    }

    #[test]
    fn pd_packet_event_serializes_header_and_body() {
        let (mut s, hw) = slave();
        s.set_port_event_mask(0, event_mask::DATA_MSG);

        let packet = PdPacket {
            sop: 1,
            header: 0xABCD,
            extd_header: 0x0102,
            data: &[0xEE, 0xFF],
        };
        s.enqueue_pd_packet(0, &packet, Response::PdExtdMsgSop, event_mask::DATA_MSG);
        s.task();

        assert_eq!(s.regs().dev.response, Response::PdExtdMsgSop as u8);
        assert_eq!(s.regs().dev.response_length, 7);

        ec_write(&mut s, &hw, &[0x00, 0x14]);
        let out = ec_read(&mut s, &hw);
        assert_eq!(&out[..7], &[1, 0xCD, 0xAB, 0x02, 0x01, 0xEE, 0xFF]);
    }

    #[test]
    fn queued_pd_msg_concatenates_parts() {
        let (mut s, _hw) = slave();
        assert!(s.queue_pd_msg(
            RegSection::Port0,
            Response::VdmReceived,
            &[1, 2],
            &[3, 4]
        ));
        s.task();
        assert_eq!(s.regs().dev.response, Response::VdmReceived as u8);
        assert_eq!(s.regs().dev.response_length, 4);
    }

    #[test]
    fn dev_section_rejects_event_payload() {
        let (mut s, _hw) = slave();
        assert!(!s.queue_event(RegSection::Dev, Response::Success, &[1]));
        assert!(s.queue_event(RegSection::Dev, Response::Success, &[]));
    }

    #[test]
    fn hw_error_event_is_gated_by_sys_error_mask() {
        let (mut s, _hw) = slave();
        s.send_hw_error_event(0, SysHwError::MuxAccess);
        s.task();
        assert_eq!(s.regs().dev.response, 0);

        s.set_port_event_mask(0, event_mask::SYS_ERROR);
        s.send_hw_error_event(0, SysHwError::MuxAccess);
        s.task();
        assert_eq!(s.regs().dev.response, Response::HardwareError as u8);
        assert_eq!(s.regs().dev.response_length, 1);
    }

    #[test]
    fn userdef_init_checks_bounds() {
        let (mut s, _hw) = slave();
        assert!(s.init_userdef_regs(0x40, &[1, 2, 3]));
        assert_eq!(s.regs().dev.userdef_regs[0], 1);
        assert!(!s.init_userdef_regs(0x3F, &[1]));
        assert!(!s.init_userdef_regs(0x4E, &[1, 2, 3]));
    }

    #[test]
    fn versions_and_locations_land_in_registers() {
        let (mut s, _hw) = slave();
        let bl = FwVersion([1, 2, 3, 4, 5, 6, 7, 8]);
        let fw1 = FwVersion([11, 12, 13, 14, 15, 16, 17, 18]);
        let fw2 = FwVersion([21, 22, 23, 24, 25, 26, 27, 28]);
        s.update_versions(&bl, &fw1, &fw2);
        s.update_fw_locations(0x30, 0x80);
        s.set_hpi_version(0x0001_0203);

        let dev_version = s.regs().dev.dev_version;
        assert_eq!(&dev_version[..8], bl.as_bytes());
        assert_eq!(&dev_version[8..], fw1.as_bytes());
        let fw2_version = s.regs().dev.fw_2_version;
        assert_eq!(&fw2_version, fw2.as_bytes());
        let loc = s.regs().dev.fw_bin_loc;
        assert_eq!(loc, [0x30, 0x80]);
    }

    #[test]
    fn sleep_requires_quiescence() {
        let (mut s, hw) = slave();
        assert!(s.sleep_allowed());
        assert!(s.sleep());
        assert!(hw.0.borrow().wakeup_armed);

        s.send_fw_ready_event();
        assert!(!s.sleep_allowed());
        s.task();
        // Response still unacknowledged: interrupt pending.
        assert!(!s.sleep_allowed());

        ec_write(&mut s, &hw, &[DEV_INTR, 0x00, 0xFF]);
        assert!(s.sleep_allowed());
    }

    #[test]
    fn queue_overflow_is_replaced_with_marker() {
        let hw = MockHw::new();
        let mut s: HpiSlave<MockHw, MockApp, NoOpLogger, 288, 16> = HpiSlave::new(
            hw.clone(),
            MockApp::default(),
            NoOpLogger,
            hw_config(),
            flash_config(),
            1,
        )
        .unwrap();
        s.set_port_event_mask(0, u32::MAX);

        // Fill the tiny queue past capacity without draining.
        for _ in 0..4 {
            s.pd_event_handler(0, PdEvent::TypeCConnect, &[]);
        }
        s.task();
        assert_eq!(s.regs().dev.response, Response::EventQueueOverflow as u8);
    }

    #[test]
    fn deinit_restores_defaults() {
        let (mut s, _hw) = slave();
        s.send_fw_ready_event();
        s.task();
        s.deinit();

        assert_eq!(s.regs().dev.intr_stat, 0);
        assert!(!s.is_accessed());
        assert!(s.regs().dev.response == 0);
    }
}
