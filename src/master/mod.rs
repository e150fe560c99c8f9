// Licensed under the Apache-2.0 license

//! HPI master middleware.
//!
//! The master half lets an embedded controller monitor and control HPI
//! slave devices (USB PD controllers) over an I2C bus with one interrupt
//! GPIO per slave. Slave events are latched in interrupt context and
//! handled asynchronously from the main loop through an event queue.

pub mod common;
pub mod controller;
pub mod traits;

pub use common::{
    DevRegister, MasterError, MasterEvent, PortRegister, SlaveDevice, SlaveEvent,
};
pub use controller::{HpiMaster, FAILURE_CODE_I2C, PORT_DEV};
pub use traits::EventHandler;
