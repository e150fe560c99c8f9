// Licensed under the Apache-2.0 license

//! HPI slave middleware.
//!
//! The slave half runs inside the USB PD controller firmware. It exposes
//! the HPI register space to the host processor (EC) over an I2C slave
//! interface with an interrupt line, and implements the transport, the
//! protocol register handling, event signalling, and the firmware-update
//! bookkeeping. EC writes are latched in interrupt context and handled by
//! the periodic task; events flow back through per-section queues, the
//! response registers, and the EC_INT pin.

pub mod common;
pub mod engine;
pub mod hw_i2c;
pub mod regs;
pub mod traits;
pub mod ucsi;

pub use common::{
    FlashConfig, HwConfig, PdEvent, PdPacket, RegPart, RegSection, Response, SlaveError,
};
pub use engine::HpiSlave;
pub use hw_i2c::{HpiI2c, I2cEvent, I2cSlaveHw, I2cSlaveState};
pub use traits::{
    EcInterruptPin, FirmwareOps, PlatformHooks, SlaveApplication, UserRegWriteHandler,
};
