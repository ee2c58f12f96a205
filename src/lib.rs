//! This is a platform-agnostic Rust PID heater controller for zones measured by DS18B20
//! one-wire digital temperature sensors and heated through a PWM output, using the
//! [`embedded-hal`] PWM trait and either a blocking or an async one-wire bus.
//!
//! [`embedded-hal`]: https://github.com/rust-embedded/embedded-hal/tree/master/embedded-hal
//!
//! This crate allows you to:
//! - Read a DS18B20 scratchpad with CRC validation and decode the 12 bit temperature.
//! - Pipeline conversions: each tick reads the previous conversion and starts the next.
//! - Run a PID loop against an ambient reference plus a per-zone target offset, with an
//!   integral windup clamp and a 0-255 output.
//! - Track sensor read failures and over-temperature readings, halting a zone for good
//!   once either count exceeds a threshold.
//! - Drain averaged temperature and output for periodic logging.
//!
//! The physical one-wire layer is not part of this crate: implement [`OneWire`] (or
//! [`AsyncOneWire`]) for your platform's bus master. One bus is normally shared by every
//! unit, which is why it is passed into each call rather than owned by a unit.
//!
//! ## Features
//!
//! - `async`: Enables the async API.
//! - `blocking`: Enables the blocking API.
//! - `defmt`: Enables logging using the `defmt` framework.
//! - `log`: Enables logging using the `log` framework.
//!
//! ## Control
//!
//! On every tick the proportional error is `ambient + offset - temperature` in 1/100ths of
//! a degree. The integral accumulates it and is clamped to `±windup_limit`; the derivative
//! is the difference to the previous tick. The output `kp*P + ki*I + kd*D` is clamped to
//! 0-255 and forced to zero while the ambient reading is unavailable, the sensor read
//! failed, or the unit is halted.
//!
//! A unit configured without an output (the reference unit) never writes a duty cycle; its
//! temperature serves as the ambient input for the heated units.
//!
//! ## Blocking Example:
//!
//! ```ignore
//! use heater_pid::{Address, ControlUnit, Settings, UnitId};
//!
//! // Platform-specific
//! let mut bus = /* heater_pid::OneWire instance */;
//! let pwm = /* embedded_hal::pwm::SetDutyCycle instance */;
//!
//! let settings = Settings::new(10.0, 0.05, 20.0, 5_000, 60);
//! let mut ambient = ControlUnit::reference(UnitId::Reference, Address(REF_ROM), settings);
//! let mut zone_a = ControlUnit::configure(UnitId::A, Address(A_ROM), Some(5.0), Some(pwm), settings).unwrap();
//!
//! ambient.begin_conversion(&mut bus).unwrap();
//! zone_a.begin_conversion(&mut bus).unwrap();
//!
//! let mut samples = 0;
//! loop {
//!     // Platform-specific: wait for the next one second tick
//!     sleep_secs(1);
//!
//!     ambient.update(&mut bus, heater_pid::AMBIENT_UNAVAILABLE).unwrap();
//!     zone_a.update(&mut bus, ambient.current_temperature()).unwrap();
//!     samples += 1;
//!
//!     if samples == 60 {
//!         println!("A: {} °C, {} %",
//!             zone_a.average_temperature(samples).unwrap(),
//!             heater_pid::duty_percent(zone_a.average_output(samples).unwrap()));
//!         samples = 0;
//!     }
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![no_std]

#[cfg(not(any(feature = "async", feature = "blocking")))]
compile_error!("At least one of \"async\" and \"blocking\" features must be enabled");

#[cfg(all(feature = "defmt", feature = "log"))]
compile_error!("Features \"defmt\" and \"log\" are mutually exclusive and cannot be enabled together");

#[cfg(test)]
extern crate std;

#[macro_use]
mod fmt;

mod bus;
mod device_impl;
mod hw_def;
mod types;
mod unit;

pub use crate::{bus::*, device_impl::decode_scratchpad, hw_def::*, types::*, unit::*};
