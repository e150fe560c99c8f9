// Licensed under the Apache-2.0 license

//! HPI master context and transaction engine.
//!
//! [`HpiMaster`] aggregates the slave registry, the pending-interrupt
//! latch, the event queue, and the response scratch buffer, and talks to
//! the bus through `embedded_hal::i2c::I2c`. Interrupt service routines
//! only latch a pending bit per slave; all bus traffic and event delivery
//! happens in [`HpiMaster::task`], called from the firmware main loop.

use embedded_hal::i2c::{I2c, SevenBitAddress};

use crate::common::Logger;
use crate::master::common::{
    MasterError, MasterEvent, SlaveDevice, SlaveEvent, ALL_VERSION_BYTES, ENTER_FLASHING_SIG,
    FLASH_READ_WRITE_SIG, FLASH_ROW_READ_CMD, FLASH_ROW_WRITE_CMD, INTR_REG_CLEAR_DEV,
    INTR_REG_CLEAR_PORT0, INTR_REG_CLEAR_PORT1, JUMP_TO_ALT_FW_SIG, JUMP_TO_BOOT_SIG,
    RESET_DEVICE_CMD, RESET_I2C_CMD, RESET_SIG, UNKNOWN_SLAVE_IDX,
};
use crate::master::common::DevRegister;
use crate::master::traits::EventHandler;
use crate::queue::EventQueue;

/// Port value reported for device-level (non port-specific) events.
pub const PORT_DEV: u8 = 0xFF;

/// Middleware-local failure code delivered through the error handler when
/// a slave stops responding on the bus. Outside the protocol code space.
pub const FAILURE_CODE_I2C: u8 = 0xF0;

/// Minimum response buffer size in bytes.
const RESP_BUF_MIN: usize = 64;

// Register addresses pack as section | memory part | offset. Sections and
// parts match the slave register map.
const SECTION_DEV: u16 = 0x0;
const SECTION_PORT0: u16 = 0x1;
const PART_REG: u16 = 0x0;
const PART_FLASH: u16 = 0x2;
const PART_PD_READ: u16 = 0x4;
const PART_PD_WRITE: u16 = 0x8;

const fn hpi_addr(section: u16, part: u16, offset: u16) -> u16 {
    (section << 12) | (part << 8) | (offset & 0xFF)
}

/// HPI master middleware context.
///
/// * `B` - the I2C bus the slaves hang off.
/// * `L` - logging seam.
/// * `MAX_SLAVES` - registry capacity (at most 8; one latch bit per slave).
/// * `QUEUE` - event queue size in bytes.
/// * `RESP` - response scratch buffer size, 64 bytes minimum.
pub struct HpiMaster<
    B: I2c<SevenBitAddress>,
    L: Logger,
    const MAX_SLAVES: usize = 4,
    const QUEUE: usize = 256,
    const RESP: usize = 64,
> {
    bus: B,
    logger: L,
    slaves: heapless::Vec<SlaveDevice, MAX_SLAVES>,
    intr_pending: u8,
    queue: EventQueue<QUEUE>,
}

impl<
        B: I2c<SevenBitAddress>,
        L: Logger,
        const MAX_SLAVES: usize,
        const QUEUE: usize,
        const RESP: usize,
    > HpiMaster<B, L, MAX_SLAVES, QUEUE, RESP>
{
    /// Create the master context. Fails when the configured capacities
    /// cannot satisfy the protocol (empty registry, more latch bits than
    /// the interrupt mask holds, undersized response buffer).
    pub fn new(bus: B, logger: L) -> Result<Self, MasterError> {
        if MAX_SLAVES == 0 || MAX_SLAVES > 8 || RESP < RESP_BUF_MIN {
            return Err(MasterError::InvalidArgs);
        }
        Ok(Self {
            bus,
            logger,
            slaves: heapless::Vec::new(),
            intr_pending: 0,
            queue: EventQueue::new(),
        })
    }

    /// Drop all registered slaves, queued events, and latched interrupts.
    pub fn reset(&mut self) {
        self.slaves.clear();
        self.intr_pending = 0;
        self.queue.clear();
    }

    /// Tear down the context and recover the bus.
    #[must_use]
    pub fn release(self) -> B {
        self.bus
    }

    /// Register one slave device sharing the bus. Call once per slave
    /// before servicing interrupts.
    pub fn register_slave(
        &mut self,
        addr: u8,
        intr_gpio_port: u8,
        intr_gpio_pin: u8,
        port_count: u8,
    ) -> Result<(), MasterError> {
        if addr == 0 || addr > 0x7F || port_count == 0 || port_count > 2 {
            return Err(MasterError::InvalidArgs);
        }
        if self.slaves.iter().any(|s| s.addr == addr) {
            return Err(MasterError::InvalidArgs);
        }
        self.slaves
            .push(SlaveDevice {
                addr,
                intr_gpio_port,
                intr_gpio_pin,
                port_count,
                intr_reg: 0,
                fail_count: 0,
            })
            .map_err(|_| MasterError::Failure)
    }

    /// Index of the registered slave with the given I2C address.
    #[must_use]
    pub fn slave_index_by_addr(&self, addr: u8) -> u8 {
        self.slaves
            .iter()
            .position(|s| s.addr == addr)
            .map_or(UNKNOWN_SLAVE_IDX, |i| i as u8)
    }

    /// Latch a pending interrupt for the slave wired to the given GPIO
    /// line. Call from the GPIO interrupt routine or poll from the main
    /// loop; the interrupt is handled by [`Self::task`]. Unknown lines
    /// are ignored.
    pub fn interrupt_handler(&mut self, gpio_port: u8, gpio_pin: u8) {
        if let Some(idx) = self
            .slaves
            .iter()
            .position(|s| s.intr_gpio_port == gpio_port && s.intr_gpio_pin == gpio_pin)
        {
            self.intr_pending |= 1 << idx;
        }
    }

    /// Whether the device may enter Deep Sleep: no latched interrupts and
    /// no queued events.
    #[must_use]
    pub fn sleep_allowed(&self) -> bool {
        self.intr_pending == 0 && self.queue.is_empty()
    }

    fn bus_write(&mut self, addr: u8, reg: u16, data: &[u8]) -> Result<(), MasterError> {
        let total = data.len() + 2;
        if total > RESP {
            return Err(MasterError::InvalidArgs);
        }
        let mut frame = [0u8; RESP];
        let preamble = [(reg & 0xFF) as u8, (reg >> 8) as u8];
        for (dst, src) in frame.iter_mut().zip(preamble.iter().chain(data.iter())) {
            *dst = *src;
        }
        let framed = frame.get(..total).ok_or(MasterError::InvalidArgs)?;
        self.bus
            .write(addr, framed)
            .map_err(|_| MasterError::I2cFailure)
    }

    fn bus_read(&mut self, addr: u8, reg: u16, buf: &mut [u8]) -> Result<(), MasterError> {
        let preamble = [(reg & 0xFF) as u8, (reg >> 8) as u8];
        self.bus
            .write_read(addr, &preamble, buf)
            .map_err(|_| MasterError::I2cFailure)
    }

    /// Read from an arbitrary 16-bit HPI register address.
    pub fn register_read(
        &mut self,
        addr: u8,
        reg: u16,
        buf: &mut [u8],
    ) -> Result<(), MasterError> {
        if buf.is_empty() {
            return Err(MasterError::InvalidArgs);
        }
        self.bus_read(addr, reg, buf)
    }

    /// Write to an arbitrary 16-bit HPI register address.
    pub fn register_write(&mut self, addr: u8, reg: u16, data: &[u8]) -> Result<(), MasterError> {
        if data.is_empty() {
            return Err(MasterError::InvalidArgs);
        }
        self.bus_write(addr, reg, data)
    }

    /// Read from a device-information register.
    pub fn dev_reg_read(&mut self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<(), MasterError> {
        self.register_read(addr, hpi_addr(SECTION_DEV, PART_REG, u16::from(reg)), buf)
    }

    /// Write to a device-information register.
    pub fn dev_reg_write(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<(), MasterError> {
        self.register_write(addr, hpi_addr(SECTION_DEV, PART_REG, u16::from(reg)), data)
    }

    fn port_section(port: u8) -> Result<u16, MasterError> {
        if port > 1 {
            return Err(MasterError::InvalidArgs);
        }
        Ok(SECTION_PORT0 + u16::from(port))
    }

    /// Read from a port-specific register.
    pub fn port_reg_read(
        &mut self,
        addr: u8,
        port: u8,
        reg: u8,
        buf: &mut [u8],
    ) -> Result<(), MasterError> {
        let section = Self::port_section(port)?;
        self.register_read(addr, hpi_addr(section, PART_REG, u16::from(reg)), buf)
    }

    /// Write to a port-specific register.
    pub fn port_reg_write(
        &mut self,
        addr: u8,
        port: u8,
        reg: u8,
        data: &[u8],
    ) -> Result<(), MasterError> {
        let section = Self::port_section(port)?;
        self.register_write(addr, hpi_addr(section, PART_REG, u16::from(reg)), data)
    }

    /// Read PD response data memory for a port. `offset` addresses into
    /// the read data memory; offsets past 255 select the upper fraction.
    pub fn pd_response_read(
        &mut self,
        addr: u8,
        port: u8,
        offset: u16,
        buf: &mut [u8],
    ) -> Result<(), MasterError> {
        let section = Self::port_section(port)?;
        let part = PART_PD_READ + (offset >> 8);
        self.register_read(addr, hpi_addr(section, part, offset), buf)
    }

    /// Write PD message data memory for a port.
    pub fn pd_response_write(
        &mut self,
        addr: u8,
        port: u8,
        offset: u16,
        data: &[u8],
    ) -> Result<(), MasterError> {
        let section = Self::port_section(port)?;
        let part = PART_PD_WRITE + (offset >> 8);
        self.register_write(addr, hpi_addr(section, part, offset), data)
    }

    /// Read from the flash data memory region of a slave.
    pub fn flash_read(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), MasterError> {
        self.register_read(addr, hpi_addr(SECTION_DEV, PART_FLASH, 0), buf)
    }

    /// Write to the flash data memory region of a slave.
    pub fn flash_write(&mut self, addr: u8, data: &[u8]) -> Result<(), MasterError> {
        self.register_write(addr, hpi_addr(SECTION_DEV, PART_FLASH, 0), data)
    }

    /// Request a jump to the bootloader. The slave confirms with a reset
    /// complete event once it comes back up.
    pub fn jump_to_boot(&mut self, addr: u8) -> Result<(), MasterError> {
        self.dev_reg_write(addr, DevRegister::JumpToBoot as u8, &[JUMP_TO_BOOT_SIG])
    }

    /// Request a jump to the alternate firmware image.
    pub fn jump_to_alt_firmware(&mut self, addr: u8) -> Result<(), MasterError> {
        self.dev_reg_write(addr, DevRegister::JumpToBoot as u8, &[JUMP_TO_ALT_FW_SIG])
    }

    /// Request a full device reset.
    pub fn device_reset(&mut self, addr: u8) -> Result<(), MasterError> {
        self.dev_reg_write(
            addr,
            DevRegister::ResetRequest as u8,
            &[RESET_SIG, RESET_DEVICE_CMD],
        )
    }

    /// Request a reset of the slave I2C block only.
    pub fn i2c_reset(&mut self, addr: u8) -> Result<(), MasterError> {
        self.dev_reg_write(
            addr,
            DevRegister::ResetRequest as u8,
            &[RESET_SIG, RESET_I2C_CMD],
        )
    }

    /// Request entry into flash update mode.
    pub fn enter_flashing_mode(&mut self, addr: u8) -> Result<(), MasterError> {
        self.dev_reg_write(addr, DevRegister::EnterFlashMode as u8, &[ENTER_FLASHING_SIG])
    }

    /// Request validation of a firmware image (1 or 2).
    pub fn validate_firmware(&mut self, addr: u8, fw_id: u8) -> Result<(), MasterError> {
        self.dev_reg_write(addr, DevRegister::ValidateFw as u8, &[fw_id])
    }

    /// Stage `data` in the flash data memory and request a row write.
    /// The slave reports the outcome through the response register.
    pub fn flash_row_write(&mut self, addr: u8, row: u16, data: &[u8]) -> Result<(), MasterError> {
        self.flash_write(addr, data)?;
        self.dev_reg_write(
            addr,
            DevRegister::FlashReadWrite as u8,
            &[
                FLASH_READ_WRITE_SIG,
                FLASH_ROW_WRITE_CMD,
                (row & 0xFF) as u8,
                (row >> 8) as u8,
            ],
        )
    }

    /// Request a flash row read. Once the slave reports flash data
    /// available, fetch the row with [`Self::flash_read`].
    pub fn request_flash_row_read(&mut self, addr: u8, row: u16) -> Result<(), MasterError> {
        self.dev_reg_write(
            addr,
            DevRegister::FlashReadWrite as u8,
            &[
                FLASH_READ_WRITE_SIG,
                FLASH_ROW_READ_CMD,
                (row & 0xFF) as u8,
                (row >> 8) as u8,
            ],
        )
    }

    /// Read the bootloader, FW1, and FW2 version records in one transfer.
    pub fn read_all_versions(
        &mut self,
        addr: u8,
        buf: &mut [u8; ALL_VERSION_BYTES],
    ) -> Result<(), MasterError> {
        self.dev_reg_read(addr, DevRegister::AllVersion as u8, buf)
    }

    /// Read the device mode register.
    pub fn read_device_mode(&mut self, addr: u8) -> Result<u8, MasterError> {
        let mut mode = [0u8; 1];
        self.dev_reg_read(addr, DevRegister::DeviceMode as u8, &mut mode)?;
        Ok(mode.first().copied().unwrap_or(0))
    }

    /// Handle latched slave interrupts and deliver queued events.
    ///
    /// Call periodically from the firmware main loop. For every pending
    /// slave the interrupt status register is read, the response for each
    /// asserted section is fetched and queued, and the interrupt source is
    /// cleared on the slave. Queued events then go to the handler in FIFO
    /// order. Transport failures bump the slave failure counter and reach
    /// the handler through `on_error`.
    pub fn task<H: EventHandler>(&mut self, handler: &mut H) {
        let pending = self.intr_pending;
        for idx in 0..self.slaves.len() {
            let bit = 1u8 << idx;
            if pending & bit == 0 {
                continue;
            }
            self.intr_pending &= !bit;
            match self.service_slave(idx) {
                Ok(()) => {
                    if let Some(slave) = self.slaves.get_mut(idx) {
                        slave.fail_count = 0;
                    }
                }
                Err(_) => {
                    if let Some(slave) = self.slaves.get_mut(idx) {
                        slave.fail_count = slave.fail_count.saturating_add(1);
                    }
                    self.logger.error("hpi-m: slave transaction failed");
                    let meta = Self::pack_meta(idx as u8, PORT_DEV);
                    if self.queue.enqueue(FAILURE_CODE_I2C, meta, &[]).is_err() {
                        self.logger.error("hpi-m: event queue overflow");
                    }
                }
            }
        }

        self.deliver_events(handler);
    }

    fn deliver_events<H: EventHandler>(&mut self, handler: &mut H) {
        let mut scratch = [0u8; RESP];
        loop {
            match self.queue.dequeue_into(&mut scratch) {
                Ok(Some(rec)) => {
                    let (slave_idx, port) = Self::unpack_meta(rec.meta);
                    let data = scratch.get(..usize::from(rec.len)).unwrap_or(&[]);
                    let event = SlaveEvent {
                        slave_idx,
                        port,
                        code: rec.code,
                        data,
                    };
                    let is_error = rec.code == FAILURE_CODE_I2C
                        || rec.code == MasterEvent::EventQueueOverflow as u8;
                    let consumed = if is_error {
                        handler.on_error(&event)
                    } else {
                        handler.on_event(&event)
                    };
                    if !consumed {
                        self.logger.debug("hpi-m: unhandled slave event");
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    // Scratch always covers queued payloads; bail out
                    // rather than spin on a malformed record.
                    self.queue.clear();
                    break;
                }
            }
        }
    }

    fn service_slave(&mut self, idx: usize) -> Result<(), MasterError> {
        let slave = self.slaves.get(idx).copied().ok_or(MasterError::InvalidArgs)?;

        let mut intr = [0u8; 1];
        self.dev_reg_read(slave.addr, DevRegister::InterruptStatus as u8, &mut intr)?;
        let status = intr.first().copied().unwrap_or(0);
        if let Some(entry) = self.slaves.get_mut(idx) {
            entry.intr_reg = status;
        }

        let sources = [
            (INTR_REG_CLEAR_DEV, PORT_DEV),
            (INTR_REG_CLEAR_PORT0, 0u8),
            (INTR_REG_CLEAR_PORT1, 1u8),
        ];
        for (mask, port) in sources {
            if status & mask == 0 {
                continue;
            }
            self.collect_response(idx as u8, slave.addr, port)?;
            self.dev_reg_write(slave.addr, DevRegister::InterruptStatus as u8, &[mask])?;
        }
        Ok(())
    }

    fn collect_response(&mut self, idx: u8, addr: u8, port: u8) -> Result<(), MasterError> {
        let mut hdr = [0u8; 2];
        self.dev_reg_read(addr, DevRegister::Response as u8, &mut hdr)?;
        let code = hdr.first().copied().unwrap_or(0);
        let len = usize::from(hdr.get(1).copied().unwrap_or(0));

        // Device-level responses carry no payload; port responses stage
        // their data in the port read data memory.
        let len = if port == PORT_DEV { 0 } else { len.min(RESP) };
        let meta = Self::pack_meta(idx, port);
        let queued = if len > 0 {
            let mut data = [0u8; RESP];
            let window = data.get_mut(..len).ok_or(MasterError::InvalidArgs)?;
            self.pd_response_read(addr, port, 0, window)?;
            let payload = data.get(..len).unwrap_or(&[]);
            self.queue.enqueue(code, meta, payload)
        } else {
            self.queue.enqueue(code, meta, &[])
        };
        if queued.is_err() {
            // The overflow marker reaches the application through the
            // error handler; the slave interrupt is still cleared.
            self.logger.error("hpi-m: event queue overflow");
            let _ = self
                .queue
                .enqueue(MasterEvent::EventQueueOverflow as u8, meta, &[]);
        }
        Ok(())
    }

    // Slave index and port share the queue meta byte. The registry holds
    // at most 8 slaves and each slave at most 2 ports, so a nibble each
    // is enough; 0xF in the port nibble marks a device-level event.
    fn pack_meta(idx: u8, port: u8) -> u8 {
        let port_nibble = if port == PORT_DEV { 0xF } else { port & 0x0F };
        (idx << 4) | port_nibble
    }

    fn unpack_meta(meta: u8) -> (u8, u8) {
        let port_nibble = meta & 0x0F;
        let port = if port_nibble == 0xF { PORT_DEV } else { port_nibble };
        (meta >> 4, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::NoOpLogger;
    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};
    use hex_literal::hex;
    use std::collections::HashMap;
    use std::vec::Vec;

    #[derive(Debug)]
    struct MockError;

    impl embedded_hal::i2c::Error for MockError {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    /// Register-model bus: writes land in a register map keyed by the
    /// 16-bit HPI address, reads are served back from it.
    #[derive(Default)]
    struct MockBus {
        regs: HashMap<u16, Vec<u8>>,
        writes: Vec<(u8, Vec<u8>)>,
        fail: bool,
    }

    impl MockBus {
        fn set_reg(&mut self, reg: u16, data: &[u8]) {
            self.regs.insert(reg, data.to_vec());
        }

        fn reg(&self, reg: u16) -> &[u8] {
            self.regs.get(&reg).map(Vec::as_slice).unwrap_or(&[])
        }
    }

    impl ErrorType for MockBus {
        type Error = MockError;
    }

    impl I2c<SevenBitAddress> for MockBus {
        fn transaction(
            &mut self,
            address: SevenBitAddress,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if self.fail {
                return Err(MockError);
            }
            let mut last_reg = 0u16;
            for op in operations.iter_mut() {
                match op {
                    Operation::Write(bytes) => {
                        self.writes.push((address, bytes.to_vec()));
                        if bytes.len() >= 2 {
                            last_reg = u16::from(bytes[0]) | (u16::from(bytes[1]) << 8);
                            if bytes.len() > 2 {
                                self.regs.insert(last_reg, bytes[2..].to_vec());
                            }
                        }
                    }
                    Operation::Read(buf) => {
                        let stored = self.regs.get(&last_reg).cloned().unwrap_or_default();
                        for (i, b) in buf.iter_mut().enumerate() {
                            *b = stored.get(i).copied().unwrap_or(0);
                        }
                    }
                }
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        events: Vec<(u8, u8, u8, Vec<u8>)>,
        errors: Vec<(u8, u8, u8)>,
    }

    impl EventHandler for RecordingHandler {
        fn on_event(&mut self, event: &SlaveEvent<'_>) -> bool {
            self.events
                .push((event.slave_idx, event.port, event.code, event.data.to_vec()));
            true
        }

        fn on_error(&mut self, event: &SlaveEvent<'_>) -> bool {
            self.errors.push((event.slave_idx, event.port, event.code));
            true
        }
    }

    type Master = HpiMaster<MockBus, NoOpLogger, 4, 256, 64>;

    fn master() -> Master {
        let mut m = Master::new(MockBus::default(), NoOpLogger).unwrap();
        m.register_slave(0x40, 2, 3, 2).unwrap();
        m
    }

    #[test]
    fn rejects_undersized_response_buffer() {
        let r: Result<HpiMaster<MockBus, NoOpLogger, 4, 256, 32>, _> =
            HpiMaster::new(MockBus::default(), NoOpLogger);
        assert_eq!(r.err(), Some(MasterError::InvalidArgs));
    }

    #[test]
    fn slave_registration_is_validated() {
        let mut m = master();
        assert_eq!(
            m.register_slave(0x80, 0, 0, 1),
            Err(MasterError::InvalidArgs)
        );
        assert_eq!(m.register_slave(0, 0, 0, 1), Err(MasterError::InvalidArgs));
        assert_eq!(
            m.register_slave(0x40, 0, 0, 1),
            Err(MasterError::InvalidArgs)
        );
        assert_eq!(
            m.register_slave(0x41, 0, 0, 3),
            Err(MasterError::InvalidArgs)
        );
        m.register_slave(0x42, 2, 4, 1).unwrap();
        assert_eq!(m.slave_index_by_addr(0x42), 1);
        assert_eq!(m.slave_index_by_addr(0x55), UNKNOWN_SLAVE_IDX);
    }

    #[test]
    fn register_write_frames_address_preamble() {
        let mut m = master();
        m.register_write(0x40, 0x1234, &[0xAB]).unwrap();
        let m = m.release();
        assert_eq!(m.writes.last().unwrap().1, vec![0x34, 0x12, 0xAB]);
    }

    #[test]
    fn device_level_event_is_delivered() {
        let mut m = master();
        {
            // Prime: device interrupt asserted, reset complete response.
            let mut bus = MockBus::default();
            bus.set_reg(0x0006, &[INTR_REG_CLEAR_DEV]);
            bus.set_reg(0x007E, &[MasterEvent::ResetComplete as u8, 0]);
            m = Master::new(bus, NoOpLogger).unwrap();
            m.register_slave(0x40, 2, 3, 2).unwrap();
        }

        m.interrupt_handler(2, 3);
        assert!(!m.sleep_allowed());

        let mut handler = RecordingHandler::default();
        m.task(&mut handler);

        assert_eq!(handler.events.len(), 1);
        let (idx, port, code, data) = &handler.events[0];
        assert_eq!(*idx, 0);
        assert_eq!(*port, PORT_DEV);
        assert_eq!(*code, MasterEvent::ResetComplete as u8);
        assert!(data.is_empty());
        assert!(m.sleep_allowed());

        // The interrupt source was cleared on the slave.
        let bus = m.release();
        assert_eq!(bus.reg(0x0006), &[INTR_REG_CLEAR_DEV]);
    }

    #[test]
    fn port_event_payload_comes_from_data_memory() {
        let mut bus = MockBus::default();
        bus.set_reg(0x0006, &[INTR_REG_CLEAR_PORT0]);
        bus.set_reg(0x007E, &[MasterEvent::ConnectDetect as u8, 2]);
        bus.set_reg(0x1400, &hex!("AABB"));

        let mut m = Master::new(bus, NoOpLogger).unwrap();
        m.register_slave(0x40, 2, 3, 2).unwrap();
        m.interrupt_handler(2, 3);

        let mut handler = RecordingHandler::default();
        m.task(&mut handler);

        assert_eq!(handler.events.len(), 1);
        let (_, port, code, data) = &handler.events[0];
        assert_eq!(*port, 0);
        assert_eq!(*code, MasterEvent::ConnectDetect as u8);
        assert_eq!(data, &vec![0xAA, 0xBB]);
    }

    #[test]
    fn transport_failure_reaches_error_handler() {
        let mut bus = MockBus::default();
        bus.fail = true;
        let mut m = Master::new(bus, NoOpLogger).unwrap();
        m.register_slave(0x40, 2, 3, 2).unwrap();
        m.interrupt_handler(2, 3);

        let mut handler = RecordingHandler::default();
        m.task(&mut handler);

        assert_eq!(handler.errors.len(), 1);
        assert_eq!(handler.errors[0].2, FAILURE_CODE_I2C);
        assert!(handler.events.is_empty());
    }

    #[test]
    fn ignores_unknown_interrupt_line() {
        let mut m = master();
        m.interrupt_handler(7, 7);
        assert!(m.sleep_allowed());
    }

    #[test]
    fn flash_row_write_stages_then_commands() {
        let mut m = master();
        m.flash_row_write(0x40, 0x0123, &[1, 2, 3, 4]).unwrap();
        let bus = m.release();

        // First write stages data in the flash memory region (0x0200),
        // second issues the signed row-write command.
        let n = bus.writes.len();
        assert_eq!(bus.writes[n - 2].1, vec![0x00, 0x02, 1, 2, 3, 4]);
        assert_eq!(
            bus.writes[n - 1].1,
            vec![
                0x0C,
                0x00,
                FLASH_READ_WRITE_SIG,
                FLASH_ROW_WRITE_CMD,
                0x23,
                0x01
            ]
        );
    }

    #[test]
    fn firmware_update_requests_use_signatures() {
        let mut m = master();
        m.jump_to_boot(0x40).unwrap();
        m.device_reset(0x40).unwrap();
        m.enter_flashing_mode(0x40).unwrap();
        let bus = m.release();

        assert_eq!(bus.writes[0].1, vec![0x07, 0x00, JUMP_TO_BOOT_SIG]);
        assert_eq!(
            bus.writes[1].1,
            vec![0x08, 0x00, RESET_SIG, RESET_DEVICE_CMD]
        );
        assert_eq!(bus.writes[2].1, vec![0x0A, 0x00, ENTER_FLASHING_SIG]);
    }

    #[test]
    fn pd_response_upper_fraction_selects_high_part() {
        let mut m = master();
        let mut buf = [0u8; 4];
        m.pd_response_read(0x40, 1, 0x0105, &mut buf).unwrap();
        let bus = m.release();
        // Section port1 (2), part pd-read upper (5), offset 0x05.
        assert_eq!(bus.writes[0].1, vec![0x05, 0x25]);
    }
}
