use crate::hw_def::*;

use core::convert::Infallible;
use core::fmt;

use embedded_hal::pwm::{ErrorType, SetDutyCycle};

#[cfg(feature="defmt")]
use defmt::Format;

/// DS18B20 temperature sensor at a fixed address on a shared one-wire bus
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Ds18b20 {
    pub(crate) address: Address,
}

/// Errors from a bus transaction with the sensor
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Debug)]
pub enum Error<E> {
    /// One-wire bus error
    Bus(E),
    /// Scratchpad checksum did not match its contents
    CrcMismatch {
        /// CRC computed over the first eight scratchpad bytes
        expected: u8,
        /// CRC byte read from the device
        found: u8,
    },
}
impl<E> From<ProtocolError> for Error<E> {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::CrcMismatch { expected, found } => Error::CrcMismatch { expected, found },
        }
    }
}

/// Failure to decode a scratchpad read off the bus
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProtocolError {
    /// Scratchpad checksum did not match its contents
    CrcMismatch {
        /// CRC computed over the first eight scratchpad bytes
        expected: u8,
        /// CRC byte read from the device
        found: u8,
    },
}
impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::CrcMismatch { expected, found } => {
                write!(f, "scratchpad crc mismatch (expected 0x{expected:02X}, found 0x{found:02X})")
            }
        }
    }
}

/// Temperature in 1/100ths of a degree centigrade
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct CentiCelsius(pub i32);
impl CentiCelsius {
    /// Convert from whole or fractional degrees, truncating toward zero
    pub fn from_degrees(degrees: f32) -> Self {
        Self((degrees * 100.0) as i32)
    }
    /// Convert a raw 12 bit two's complement sensor count (1/16 °C per LSB)
    pub const fn from_raw(raw: i16) -> Self {
        Self(raw as i32 * 100 / RAW_COUNTS_PER_DEGREE)
    }
    /// Get temperature in degrees centigrade
    pub fn degrees(self) -> f32 {
        self.0 as f32 / 100.0
    }
}
impl fmt::Display for CentiCelsius {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// 64 bit ROM address of a one-wire device: family code, 48 bit serial, CRC
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Address(pub [u8; 8]);
impl Address {
    /// Family code byte (0x28 for a DS18B20)
    pub fn family_code(&self) -> u8 {
        self.0[0]
    }
    /// Get the raw address bytes
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}
impl From<[u8; 8]> for Address {
    fn from(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }
}
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Heating zone a unit controls
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum UnitId {
    /// Reference unit '0', measures ambient and drives no heater
    Reference,
    /// Zone 'A'
    A,
    /// Zone 'B'
    B,
    /// Zone 'C'
    C,
    /// Zone 'D'
    D,
}
impl UnitId {
    /// Single character tag used in reports
    pub fn as_char(self) -> char {
        match self {
            UnitId::Reference => '0',
            UnitId::A => 'A',
            UnitId::B => 'B',
            UnitId::C => 'C',
            UnitId::D => 'D',
        }
    }
}
impl TryFrom<char> for UnitId {
    type Error = InvalidUnitId;
    fn try_from(tag: char) -> Result<Self, Self::Error> {
        match tag {
            '0' => Ok(UnitId::Reference),
            'A' => Ok(UnitId::A),
            'B' => Ok(UnitId::B),
            'C' => Ok(UnitId::C),
            'D' => Ok(UnitId::D),
            other => Err(InvalidUnitId(other)),
        }
    }
}
impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Character that does not name a unit
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InvalidUnitId(pub char);

/// Gains and limits shared by all units of an installation
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Settings {
    /// proportional gain
    pub kp: f32,
    /// integral gain
    pub ki: f32,
    /// derivative gain
    pub kd: f32,
    /// the integral error is clamped to +/- this value (1/100 °C × ticks)
    pub windup_limit: u32,
    /// readings above this (whole degrees) count as limit errors
    pub high_temperature_limit: u16,
    /// a unit halts once either error count exceeds this
    pub max_error_count: u8,
}
impl Settings {
    /// Create settings with the default maximum error count
    pub const fn new(kp: f32, ki: f32, kd: f32, windup_limit: u32, high_temperature_limit: u16) -> Self {
        Self {
            kp,
            ki,
            kd,
            windup_limit,
            high_temperature_limit,
            max_error_count: MAX_ERROR_COUNT,
        }
    }
    /// Override the maximum error count
    pub const fn with_max_error_count(mut self, max_error_count: u8) -> Self {
        self.max_error_count = max_error_count;
        self
    }
    pub(crate) fn windup(&self) -> i32 {
        i32::try_from(self.windup_limit).unwrap_or(i32::MAX)
    }
    pub(crate) fn high_limit(&self) -> CentiCelsius {
        CentiCelsius(self.high_temperature_limit as i32 * 100)
    }
}

/// Output type of a reference unit, which never drives a heater
///
/// The type has no values, so a `ControlUnit<NoOutput>` can hold no output and
/// no duty cycle write can ever be issued for it.
#[derive(Debug)]
pub enum NoOutput {}
impl ErrorType for NoOutput {
    type Error = Infallible;
}
impl SetDutyCycle for NoOutput {
    fn max_duty_cycle(&self) -> u16 {
        match *self {}
    }
    fn set_duty_cycle(&mut self, _duty: u16) -> Result<(), Self::Error> {
        match *self {}
    }
}

/// Convert an output duty value (0-255) to whole percent
pub fn duty_percent(value: u8) -> u8 {
    (value as u16 * 100 / OUTPUT_MAX as u16) as u8
}
