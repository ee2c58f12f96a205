//! DS18B20 command bytes and controller limits

use crate::types::CentiCelsius;

/// Start temperature conversion (up to 750 ms in 12 bit mode)
pub const CMD_CONVERT_T: u8 = 0x44;
/// Read the 9 byte scratchpad
pub const CMD_READ_SCRATCHPAD: u8 = 0xBE;

/// Scratchpad length in bytes, the last byte is the CRC over the first eight
pub const SCRATCHPAD_LEN: usize = 9;
/// Raw temperature LSB is 1/16 °C in 12 bit mode
pub const RAW_COUNTS_PER_DEGREE: i32 = 16;

/// Reported in place of a temperature when the last sensor read failed
pub const TEMPERATURE_UNAVAILABLE: f32 = -999.0;
/// Ambient input value signalling that the reference temperature is unknown
pub const AMBIENT_UNAVAILABLE: f32 = TEMPERATURE_UNAVAILABLE;

/// Target offset of a unit configured without one (-1.00 °C)
pub const DEFAULT_TARGET_OFFSET: CentiCelsius = CentiCelsius(-100);
/// Upper bound of the reported target offset (99.99 °C)
pub const MAX_REPORTED_OFFSET: CentiCelsius = CentiCelsius(9999);

/// Highest output duty value
pub const OUTPUT_MAX: u8 = 255;

/// Error count above which a unit halts
pub const MAX_ERROR_COUNT: u8 = 5;
/// Error counters saturate here
pub const ERROR_COUNT_CEILING: u8 = 250;
