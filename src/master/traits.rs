// Licensed under the Apache-2.0 license

//! Application seams for the HPI master middleware.
//!
//! The I2C transport seam is `embedded_hal::i2c::I2c` itself: the
//! middleware frames every transfer with the 16-bit register address
//! preamble and hands the framed transaction to the bus implementation.
//! Event delivery to the integrating firmware goes through [`EventHandler`].

use crate::master::common::SlaveEvent;

/// Delivery seam for slave events and middleware-detected errors.
///
/// Both methods return `true` when the application consumed the event and
/// `false` when it wants the middleware to log it as unhandled.
pub trait EventHandler {
    /// Called for every event or response dequeued from a slave device.
    fn on_event(&mut self, event: &SlaveEvent<'_>) -> bool;

    /// Called for transport failures and queue overflow conditions.
    fn on_error(&mut self, event: &SlaveEvent<'_>) -> bool;
}
