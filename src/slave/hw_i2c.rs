// Licensed under the Apache-2.0 license

//! HPI slave I2C transport.
//!
//! The transport is agnostic of the protocol it carries. It collects all
//! data the master writes into a scratch buffer owned by the protocol
//! layer and reports transaction boundaries upward; read requests are
//! delayed by clock stretching until the protocol layer supplies response
//! bytes with [`HpiI2c::write_response`]. Everything here runs from
//! interrupt context, so the handlers stay short and defer real work.

use fugit::MillisDurationU32;

/// Address match seen, master is going to write.
pub const HW_EVT_ADDR_WRITE: u32 = 1 << 0;
/// Address match seen, master requested a read.
pub const HW_EVT_ADDR_READ: u32 = 1 << 1;
/// Receive FIFO holds data.
pub const HW_EVT_RX_AVAIL: u32 = 1 << 2;
/// Stop condition signalled by the master.
pub const HW_EVT_STOP: u32 = 1 << 3;
/// Bus error detected by the block.
pub const HW_EVT_BUS_ERROR: u32 = 1 << 4;

/// Timeout period for I2C transfers. The block is reset when a
/// transaction does not complete within this period.
pub const XFER_TIMEOUT: MillisDurationU32 = MillisDurationU32::millis(500);

/// FIFO-level seam to the I2C slave hardware block.
///
/// Only slave operation is required. Implementations latch the event bits
/// until [`I2cSlaveHw::pending`] collects them.
pub trait I2cSlaveHw {
    /// Read and clear the pending hardware event bits (`HW_EVT_*`).
    fn pending(&mut self) -> u32;

    /// Drain the receive FIFO into `buf`, returning the byte count.
    fn read_fifo(&mut self, buf: &mut [u8]) -> usize;

    /// Fill the transmit FIFO from `data`, returning the byte count.
    fn write_fifo(&mut self, data: &[u8]) -> usize;

    /// Enable or disable the slave address acknowledgement. Disabling
    /// holds off the master while the protocol layer is not ready.
    fn set_ack(&mut self, enable: bool);

    /// Reset the block after an error or an explicit request.
    fn reset(&mut self);

    /// Whether the block is idle. Checked before Deep Sleep entry.
    fn is_idle(&self) -> bool;

    /// Arm wakeup on slave address match for Deep Sleep.
    fn enable_wakeup(&mut self);
}

/// States of the slave mode transaction state machine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum I2cSlaveState {
    /// Interface disabled.
    Disabled,
    /// Initialized, waiting to be enabled.
    Init,
    /// Ready, waiting for a preamble from the master.
    Idle,
    /// Master write in progress.
    Write,
    /// Master read in progress.
    Read,
    /// Stretching the clock until response data is available.
    ClkStretch,
    /// Transaction error detected.
    Error,
}

/// Transaction-level events reported to the protocol layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum I2cEvent {
    /// Slave address matched; a transaction is starting.
    AddrMatch,
    /// A master write completed with the given byte count in the scratch
    /// buffer.
    WriteDone(u16),
    /// The master requested a read; respond with
    /// [`HpiI2c::write_response`].
    ReadRequest,
    /// A master read transfer completed.
    ReadDone,
    /// Bus error or transfer timeout; the block was reset.
    Fault,
}

/// I2C slave transport context owning the scratch receive buffer.
pub struct HpiI2c<HW: I2cSlaveHw, const SCRATCH: usize> {
    hw: HW,
    state: I2cSlaveState,
    scratch: [u8; SCRATCH],
    write_count: u16,
    latched: u32,
    busy_time: MillisDurationU32,
}

impl<HW: I2cSlaveHw, const SCRATCH: usize> HpiI2c<HW, SCRATCH> {
    pub fn new(hw: HW) -> Self {
        Self {
            hw,
            state: I2cSlaveState::Init,
            scratch: [0; SCRATCH],
            write_count: 0,
            latched: 0,
            busy_time: MillisDurationU32::millis(0),
        }
    }

    /// Enable the interface: acknowledge the slave address and wait for a
    /// preamble.
    pub fn enable(&mut self) {
        self.hw.set_ack(true);
        self.state = I2cSlaveState::Idle;
    }

    /// Disable the interface and reset the block.
    pub fn disable(&mut self) {
        self.hw.set_ack(false);
        self.hw.reset();
        self.state = I2cSlaveState::Disabled;
        self.write_count = 0;
        self.latched = 0;
    }

    #[must_use]
    pub fn state(&self) -> I2cSlaveState {
        self.state
    }

    /// Data received in the last master write.
    #[must_use]
    pub fn received(&self) -> &[u8] {
        self.scratch
            .get(..usize::from(self.write_count))
            .unwrap_or(&[])
    }

    /// Service the hardware block. Call from the I2C interrupt handler
    /// repeatedly until it returns `None`.
    pub fn service(&mut self) -> Option<I2cEvent> {
        loop {
            self.latched |= self.hw.pending();
            if self.latched & HW_EVT_BUS_ERROR != 0 {
                self.latched &= !HW_EVT_BUS_ERROR;
                return Some(self.fault());
            }
            if self.latched & HW_EVT_ADDR_WRITE != 0 {
                self.latched &= !HW_EVT_ADDR_WRITE;
                self.state = I2cSlaveState::Write;
                self.write_count = 0;
                self.busy_time = MillisDurationU32::millis(0);
                return Some(I2cEvent::AddrMatch);
            }
            if self.latched & HW_EVT_RX_AVAIL != 0 {
                self.latched &= !HW_EVT_RX_AVAIL;
                self.drain_rx();
                continue;
            }
            if self.latched & HW_EVT_ADDR_READ != 0 {
                // Repeated start after a write closes the write phase
                // first; the read request follows on the next service.
                if self.state == I2cSlaveState::Write && self.write_count > 0 {
                    self.state = I2cSlaveState::Idle;
                    return Some(I2cEvent::WriteDone(self.write_count));
                }
                self.latched &= !HW_EVT_ADDR_READ;
                self.state = I2cSlaveState::ClkStretch;
                return Some(I2cEvent::ReadRequest);
            }
            if self.latched & HW_EVT_STOP != 0 {
                self.latched &= !HW_EVT_STOP;
                match self.state {
                    I2cSlaveState::Write if self.write_count > 0 => {
                        self.state = I2cSlaveState::Idle;
                        return Some(I2cEvent::WriteDone(self.write_count));
                    }
                    I2cSlaveState::Read | I2cSlaveState::ClkStretch => {
                        self.state = I2cSlaveState::Idle;
                        return Some(I2cEvent::ReadDone);
                    }
                    I2cSlaveState::Error => {
                        return Some(self.fault());
                    }
                    _ => {
                        self.state = I2cSlaveState::Idle;
                        continue;
                    }
                }
            }
            return None;
        }
    }

    fn drain_rx(&mut self) {
        if self.state != I2cSlaveState::Write {
            // Data without a preamble: flush and stay put.
            let mut sink = [0u8; 8];
            while self.hw.read_fifo(&mut sink) != 0 {}
            return;
        }
        let start = usize::from(self.write_count);
        match self.scratch.get_mut(start..) {
            Some(space) if !space.is_empty() => {
                let n = self.hw.read_fifo(space);
                self.write_count = self.write_count.saturating_add(n as u16);
            }
            _ => {
                // Write larger than the scratch buffer: NAK the rest.
                self.hw.set_ack(false);
                self.state = I2cSlaveState::Error;
            }
        }
    }

    fn fault(&mut self) -> I2cEvent {
        self.hw.reset();
        self.hw.set_ack(true);
        self.state = I2cSlaveState::Idle;
        self.write_count = 0;
        I2cEvent::Fault
    }

    /// Supply response data for a pending read request. Returns the byte
    /// count accepted by the transmit FIFO.
    pub fn write_response(&mut self, data: &[u8]) -> usize {
        let n = self.hw.write_fifo(data);
        self.state = I2cSlaveState::Read;
        n
    }

    /// Enable or disable the slave address acknowledgement.
    pub fn set_ack(&mut self, enable: bool) {
        self.hw.set_ack(enable);
    }

    /// Reset the block in response to an error or an explicit request.
    pub fn reset(&mut self) {
        self.hw.reset();
        self.state = I2cSlaveState::Idle;
        self.write_count = 0;
        self.latched = 0;
    }

    /// Whether the interface is idle and Deep Sleep entry is safe.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(
            self.state,
            I2cSlaveState::Idle | I2cSlaveState::Init | I2cSlaveState::Disabled
        ) && self.hw.is_idle()
    }

    /// Arm wakeup on address match before Deep Sleep.
    pub fn enable_wakeup(&mut self) {
        self.hw.enable_wakeup();
    }

    /// Account elapsed time for the transfer watchdog. Resets the block
    /// and reports a fault when a transaction stalls past the timeout.
    pub fn on_tick(&mut self, elapsed: MillisDurationU32) -> Option<I2cEvent> {
        match self.state {
            I2cSlaveState::Write
            | I2cSlaveState::Read
            | I2cSlaveState::ClkStretch
            | I2cSlaveState::Error => {
                self.busy_time += elapsed;
                if self.busy_time >= XFER_TIMEOUT {
                    self.busy_time = MillisDurationU32::millis(0);
                    return Some(self.fault());
                }
                None
            }
            _ => {
                self.busy_time = MillisDurationU32::millis(0);
                None
            }
        }
    }
}
