//! One-wire bus transport consumed by the controller
//!
//! The physical layer (reset pulse timing, bit slots, strong pull-up) belongs to the
//! platform. A bus is shared by every unit on it, so all operations take it by `&mut`
//! and a transaction always runs to completion before the next one starts.

use crate::types::Address;

/// Blocking one-wire bus master
#[cfg(feature = "blocking")]
pub trait OneWire {
    /// Bus error type
    type Error;

    /// Issue a reset pulse
    fn reset(&mut self) -> Result<(), Self::Error>;
    /// Address a single device (match ROM)
    fn select(&mut self, address: &Address) -> Result<(), Self::Error>;
    /// Write one byte
    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error>;
    /// Read one byte
    fn read_byte(&mut self) -> Result<u8, Self::Error>;
}

/// Async one-wire bus master
#[cfg(feature = "async")]
#[allow(async_fn_in_trait)]
pub trait AsyncOneWire {
    /// Bus error type
    type Error;

    /// Issue a reset pulse
    async fn reset(&mut self) -> Result<(), Self::Error>;
    /// Address a single device (match ROM)
    async fn select(&mut self, address: &Address) -> Result<(), Self::Error>;
    /// Write one byte
    async fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error>;
    /// Read one byte
    async fn read_byte(&mut self) -> Result<u8, Self::Error>;
}
