// Licensed under the Apache-2.0 license

//! Application seams for the HPI slave middleware.
//!
//! The integrating firmware supplies the pieces the middleware cannot
//! know: the EC interrupt pin, flash and firmware-image handling, and a
//! few platform policies. The seams are decomposed so an application only
//! implements what its configuration needs; [`SlaveApplication`] composes
//! them and is implemented automatically.

use crate::slave::common::{Response, UcsiControlCommand};

/// Control of the EC_INT interrupt line.
pub trait EcInterruptPin {
    /// Drive the EC_INT pin. `asserted` follows the protocol view; the
    /// implementation owns the electrical polarity.
    fn set_ec_interrupt(&mut self, asserted: bool);
}

/// Firmware-update bookkeeping operations.
pub trait FirmwareOps {
    /// Current device mode register value.
    fn device_mode(&self) -> u8;

    /// Record the firmware run type signature used by the bootloader on
    /// the next startup.
    fn set_bootloader_run_type(&mut self, signature: u32);

    /// Validate the given firmware image (1 or 2).
    fn validate_firmware(&mut self, fw_id: u8) -> bool;

    /// Enter or leave flashing mode.
    fn flash_enter_mode(&mut self, enable: bool);

    /// Whether flash read/write commands are currently permitted.
    fn flash_access_allowed(&self) -> bool;

    /// Read one flash row into `buf`.
    fn flash_row_read(&mut self, row: u16, buf: &mut [u8]) -> bool;

    /// Write one flash row from `data`.
    fn flash_row_write(&mut self, row: u16, data: &[u8]) -> bool;

    /// Perform a full device reset. Called after the reset request has
    /// been acknowledged to the EC.
    fn device_reset(&mut self);
}

/// Platform policies with workable defaults.
pub trait PlatformHooks {
    /// The EC changed the system power state register.
    fn update_sys_pwr_state(&mut self, _state: u8) {}

    /// The EC requested a port enable state change. Return `false` to
    /// reject the request.
    fn port_enable_request(&mut self, _port: u8, _enable: bool) -> bool {
        true
    }

    /// The EC changed the BC 1.2 source support setting for a port.
    fn update_bc_src_support(&mut self, _port: u8, _enable: u8) {}

    /// Gate event reporting beyond the port event mask. `mask_hit` is the
    /// result of the register mask check; the default accepts it.
    fn is_event_enabled(&self, _port: u8, _code: u8, mask_hit: bool) -> bool {
        mask_hit
    }

    /// Handle an EC write into the UCSI register space. Return the
    /// response to report, or `None` when the write is not understood.
    fn ucsi_write(&mut self, _offset: u16, _data: &[u8]) -> Option<Response> {
        None
    }

    /// A UCSI control command was accepted. Return `false` to fail it.
    fn ucsi_command(&mut self, _cmd: UcsiControlCommand) -> bool {
        true
    }
}

/// Full application seam of the slave middleware.
pub trait SlaveApplication: EcInterruptPin + FirmwareOps + PlatformHooks {}

impl<T> SlaveApplication for T where T: EcInterruptPin + FirmwareOps + PlatformHooks {}

/// Handler for EC writes to the user-defined register region. Returns the
/// response code to report.
pub type UserRegWriteHandler = fn(reg_addr: u16, data: &[u8]) -> Response;
