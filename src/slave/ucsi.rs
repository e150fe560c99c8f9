// Licensed under the Apache-2.0 license

//! UCSI bridge.
//!
//! The UCSI register space shares the slave I2C interface with HPI. This
//! module owns the UCSI Status and Control registers in the device
//! section, tracks pending EC reads of UCSI data, and arbitrates which
//! protocol currently owns the interface.

use crate::slave::common::{I2cOwner, Response, UcsiControlCommand, UcsiStatusValue};
use crate::slave::regs::DevRegisters;

/// UCSI interface state carried alongside the register images.
pub struct UcsiState {
    read_pending: bool,
    owner: I2cOwner,
    active: bool,
}

impl Default for UcsiState {
    fn default() -> Self {
        Self::new()
    }
}

impl UcsiState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            read_pending: false,
            owner: I2cOwner::Hpi,
            active: false,
        }
    }

    /// Clear the Status and Control registers and release the interface.
    pub fn reset(&mut self, dev: &mut DevRegisters) {
        dev.ucsi_status = 0;
        dev.ucsi_control = 0;
        self.read_pending = false;
        self.owner = I2cOwner::Hpi;
        self.active = false;
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn owner(&self) -> I2cOwner {
        self.owner
    }

    /// Whether the EC still owes a read of pending UCSI data. HPI
    /// ownership is blocked until it drains.
    #[must_use]
    pub fn read_pending(&self) -> bool {
        self.read_pending
    }

    /// Record that UCSI data waits for the EC.
    pub fn set_read_pending(&mut self) {
        self.read_pending = true;
        self.owner = I2cOwner::Ucsi;
    }

    /// The EC drained the pending UCSI data.
    pub fn clear_read_pending(&mut self) {
        self.read_pending = false;
        self.owner = I2cOwner::Hpi;
    }

    /// Set one bit in the UCSI Status register.
    pub fn set_status_bit(&mut self, dev: &mut DevRegisters, bit_idx: u8) {
        dev.ucsi_status |= 1 << bit_idx;
    }

    /// Clear one bit in the UCSI Status register.
    pub fn clear_status_bit(&mut self, dev: &mut DevRegisters, bit_idx: u8) {
        dev.ucsi_status &= !(1 << bit_idx);
    }

    /// Read one bit of the UCSI Status register.
    #[must_use]
    pub fn status_bit(&self, dev: &DevRegisters, bit_idx: u8) -> u8 {
        (dev.ucsi_status >> bit_idx) & 1
    }

    /// Current UCSI Control register value.
    #[must_use]
    pub fn control(&self, dev: &DevRegisters) -> u8 {
        dev.ucsi_control
    }

    /// Record a pending UCSI notification for the EC. No effect while
    /// the interface is stopped.
    pub fn notify(&mut self, dev: &mut DevRegisters) {
        if self.active {
            dev.ucsi_status = UcsiStatusValue::EventPending as u8;
            self.set_read_pending();
        }
    }

    /// Handle an EC write to the UCSI Control register.
    pub fn handle_control(&mut self, dev: &mut DevRegisters, cmd: UcsiControlCommand) -> Response {
        dev.ucsi_control = cmd as u8;
        match cmd {
            UcsiControlCommand::Start => {
                self.active = true;
                dev.ucsi_status = UcsiStatusValue::Started as u8;
            }
            UcsiControlCommand::Stop => {
                self.active = false;
                self.read_pending = false;
                self.owner = I2cOwner::Hpi;
                dev.ucsi_status = 0;
            }
            UcsiControlCommand::Silence => {
                if !self.active {
                    return Response::UcsiCommandFailed;
                }
                dev.ucsi_status = UcsiStatusValue::Started as u8;
            }
            UcsiControlCommand::SignalConnectEvent => {
                if !self.active {
                    return Response::UcsiCommandFailed;
                }
                dev.ucsi_status = UcsiStatusValue::EventPending as u8;
                self.set_read_pending();
            }
        }
        Response::Success
    }
}
