use crate::hw_def::*;
use crate::types::*;

#[cfg(feature = "async")]
use crate::bus::AsyncOneWire;
#[cfg(feature = "blocking")]
use crate::bus::OneWire;

use core::mem;

use embedded_hal::pwm::SetDutyCycle;

#[cfg(feature="defmt")]
use defmt::Format;

/// PID heater controller for one zone
///
/// Each tick reads the conversion started on the previous tick, immediately starts the
/// next one, and drives the heater output from the error against the ambient reference
/// plus the unit's target offset. Sensor and over-temperature failures are counted; once
/// either count exceeds [`Settings::max_error_count`] the unit halts for good with its
/// output held at zero.
#[derive(Debug)]
pub struct ControlUnit<P> {
    id: UnitId,
    sensor: Ds18b20,
    target_offset: CentiCelsius,
    output: Option<P>,
    settings: Settings,

    temperature: Option<CentiCelsius>,
    error_p: i32,
    error_p_previous: i32,
    error_i: i32,
    error_d: i32,
    output_value: u8,

    sum_temperature: i64,
    sum_output: u64,

    sensor_error_count: u8,
    limit_error_count: u8,
    report_flag: bool,
    halted: bool,
}

/// PID error terms after the last successful read, in 1/100 °C
#[cfg_attr(feature = "defmt", derive(Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ErrorTerms {
    /// ambient + offset - temperature
    pub proportional: i32,
    /// accumulated proportional error, clamped to the windup limit
    pub integral: i32,
    /// change of the proportional error since the previous read
    pub derivative: i32,
}

impl ControlUnit<NoOutput> {
    /// Create a reference unit: no target offset and no heater output
    ///
    /// Its temperature is meant to be fed to the other units as their ambient input.
    pub fn reference(id: UnitId, address: Address, settings: Settings) -> Self {
        Self::blank(id, address, DEFAULT_TARGET_OFFSET, None, settings)
    }
}

impl<P> ControlUnit<P>
where
    P: SetDutyCycle,
{
    /// Configure a unit
    ///
    /// `target_offset` is in degrees above ambient; `None` leaves the unit without an
    /// offset (-1.00 °C). A provided output is switched fully off before the unit is
    /// returned. The address is not validated, a wrong one shows up as failed reads.
    pub fn configure(
        id: UnitId,
        address: Address,
        target_offset: Option<f32>,
        mut output: Option<P>,
        settings: Settings,
    ) -> Result<Self, P::Error> {
        if let Some(pwm) = output.as_mut() {
            pwm.set_duty_cycle_fully_off()?;
        }
        let target_offset = target_offset.map_or(DEFAULT_TARGET_OFFSET, CentiCelsius::from_degrees);
        Ok(Self::blank(id, address, target_offset, output, settings))
    }

    fn blank(id: UnitId, address: Address, target_offset: CentiCelsius, output: Option<P>, settings: Settings) -> Self {
        Self {
            id,
            sensor: Ds18b20::new(address),
            target_offset,
            output,
            settings,
            temperature: None,
            error_p: 0,
            error_p_previous: 0,
            error_i: 0,
            error_d: 0,
            output_value: 0,
            sum_temperature: 0,
            sum_output: 0,
            sensor_error_count: 0,
            limit_error_count: 0,
            report_flag: false,
            halted: false,
        }
    }

    /// Ask the sensor to start a conversion; the result is ready up to 750 ms later
    ///
    /// Call once ahead of the first [`update`](Self::update); `update` requests every
    /// following conversion itself.
    #[cfg(feature = "blocking")]
    pub fn begin_conversion<B: OneWire>(&self, bus: &mut B) -> Result<(), Error<B::Error>> {
        self.sensor.start_conversion(bus)
    }

    /// Run one control tick
    ///
    /// `ambient` is the reference temperature in degrees, [`AMBIENT_UNAVAILABLE`] (or any
    /// non-finite value) when it is unknown, in which case the heater stays off. Sensor
    /// failures are absorbed into the error counters; only a failing output is reported.
    #[cfg(feature = "blocking")]
    pub fn update<B: OneWire>(&mut self, bus: &mut B, ambient: f32) -> Result<(), P::Error> {
        let reading = self.absorb(self.sensor.read_temperature(bus));
        if self.sensor.start_conversion(bus).is_err() {
            warn!("unit {}: failed to start conversion", self.id.as_char());
        }
        self.apply(reading, ambient);
        self.write_output()
    }

    /// Ask the sensor to start a conversion; the result is ready up to 750 ms later
    #[cfg(feature = "async")]
    pub async fn begin_conversion_async<B: AsyncOneWire>(&self, bus: &mut B) -> Result<(), Error<B::Error>> {
        self.sensor.start_conversion_async(bus).await
    }

    /// Run one control tick, see [`update`](Self::update)
    #[cfg(feature = "async")]
    pub async fn update_async<B: AsyncOneWire>(&mut self, bus: &mut B, ambient: f32) -> Result<(), P::Error> {
        let reading = self.absorb(self.sensor.read_temperature_async(bus).await);
        if self.sensor.start_conversion_async(bus).await.is_err() {
            warn!("unit {}: failed to start conversion", self.id.as_char());
        }
        self.apply(reading, ambient);
        self.write_output()
    }

    fn absorb<E>(&self, reading: Result<CentiCelsius, Error<E>>) -> Option<CentiCelsius> {
        match reading {
            Ok(temp) => Some(temp),
            Err(Error::Bus(_)) => {
                warn!("unit {}: bus error reading sensor", self.id.as_char());
                None
            }
            Err(Error::CrcMismatch { .. }) => None,
        }
    }

    fn apply(&mut self, reading: Option<CentiCelsius>, ambient: f32) {
        self.temperature = reading;
        match reading {
            Some(temp) => {
                self.error_p_previous = self.error_p;
                self.error_p = (ambient * 100.0 - temp.0 as f32 + self.target_offset.0 as f32) as i32;
                let windup = self.settings.windup();
                self.error_i = self.error_i.saturating_add(self.error_p).clamp(-windup, windup);
                // single sample difference, noisy at short tick periods
                self.error_d = self.error_p.saturating_sub(self.error_p_previous);

                let Settings { kp, ki, kd, .. } = self.settings;
                let raw = kp * self.error_p as f32 + ki * self.error_i as f32 + kd * self.error_d as f32;
                self.output_value = if ambient_available(ambient) { clamp_output(raw) } else { 0 };

                self.sum_temperature = self.sum_temperature.saturating_add(temp.0 as i64);
                self.sum_output = self.sum_output.saturating_add(self.output_value as u64);

                if temp > self.settings.high_limit() {
                    self.limit_error_count = self.limit_error_count.saturating_add(1).min(ERROR_COUNT_CEILING);
                    warn!("unit {}: {:?} above limit, count={}", self.id.as_char(), temp, self.limit_error_count);
                }
            }
            None => {
                self.output_value = 0;
                self.sensor_error_count = self.sensor_error_count.saturating_add(1).min(ERROR_COUNT_CEILING);
                self.report_flag = true;
            }
        }

        let max = self.settings.max_error_count;
        if !self.halted && (self.sensor_error_count > max || self.limit_error_count > max) {
            self.halted = true;
            error!(
                "unit {}: halted, sensor errors={}, limit errors={}",
                self.id.as_char(),
                self.sensor_error_count,
                self.limit_error_count
            );
        }
        if self.halted {
            self.output_value = 0;
        }

        trace!(
            "unit {}: t={:?} p={} i={} d={} out={}",
            self.id.as_char(),
            self.temperature,
            self.error_p,
            self.error_i,
            self.error_d,
            self.output_value
        );
    }

    fn write_output(&mut self) -> Result<(), P::Error> {
        if let Some(pwm) = self.output.as_mut() {
            pwm.set_duty_cycle_fraction(self.output_value as u16, OUTPUT_MAX as u16)?;
        }
        Ok(())
    }

    /// Get the unit identity
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Get the sensor ROM address
    pub fn address(&self) -> &Address {
        self.sensor.address()
    }

    /// Get the heater output, `None` for a reference unit
    pub fn output(&self) -> Option<&P> {
        self.output.as_ref()
    }

    /// Target offset in degrees, clamped to -1.00..=99.99 for display
    pub fn target_offset(&self) -> f32 {
        self.target_offset.clamp(DEFAULT_TARGET_OFFSET, MAX_REPORTED_OFFSET).degrees()
    }

    /// Get the gains and limits in use
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the gains and limits; takes effect on the next tick
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Last temperature, `None` if the last read failed
    pub fn temperature(&self) -> Option<CentiCelsius> {
        self.temperature
    }

    /// Last temperature in degrees, [`TEMPERATURE_UNAVAILABLE`] if the last read failed
    pub fn current_temperature(&self) -> f32 {
        self.temperature.map_or(TEMPERATURE_UNAVAILABLE, CentiCelsius::degrees)
    }

    /// Output value written on the last tick (0-255)
    pub fn current_output(&self) -> u8 {
        self.output_value
    }

    /// PID error terms after the last successful read
    pub fn error_terms(&self) -> ErrorTerms {
        ErrorTerms {
            proportional: self.error_p,
            integral: self.error_i,
            derivative: self.error_d,
        }
    }

    /// Average temperature over `samples` successful reads, then restart averaging
    ///
    /// The caller tracks the sample count. Returns `None`, leaving the sum untouched, when
    /// `samples` is zero.
    pub fn average_temperature(&mut self, samples: u16) -> Option<CentiCelsius> {
        if samples == 0 {
            return None;
        }
        let sum = mem::take(&mut self.sum_temperature);
        let average = sum / samples as i64;
        Some(CentiCelsius(i32::try_from(average).unwrap_or(if average < 0 { i32::MIN } else { i32::MAX })))
    }

    /// Average output over `samples` successful reads, then restart averaging
    pub fn average_output(&mut self, samples: u16) -> Option<u8> {
        if samples == 0 {
            return None;
        }
        let sum = mem::take(&mut self.sum_output);
        Some(u8::try_from(sum / samples as u64).unwrap_or(OUTPUT_MAX))
    }

    /// Number of failed sensor reads (saturates at 250)
    pub fn sensor_error_count(&self) -> u8 {
        self.sensor_error_count
    }

    /// Number of reads above the high temperature limit (saturates at 250)
    pub fn limit_error_count(&self) -> u8 {
        self.limit_error_count
    }

    /// Whether a sensor read failed since the flag was last consumed; clears the flag
    pub fn consume_report_flag(&mut self) -> bool {
        mem::take(&mut self.report_flag)
    }

    /// Clear the sensor failure report flag
    pub fn clear_report_flag(&mut self) {
        self.report_flag = false;
    }

    /// Whether the unit has halted; permanent once set
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Forgive sporadic errors (meant for a daily maintenance cycle); no effect once halted
    pub fn clear_error_counts(&mut self) {
        if !self.halted {
            self.sensor_error_count = 0;
            self.limit_error_count = 0;
        }
    }
}

fn ambient_available(ambient: f32) -> bool {
    ambient.is_finite() && ambient != AMBIENT_UNAVAILABLE
}

fn clamp_output(raw: f32) -> u8 {
    // NaN casts to 0
    raw.clamp(0.0, OUTPUT_MAX as f32) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_clamps_to_byte_range() {
        assert_eq!(clamp_output(-12.0), 0);
        assert_eq!(clamp_output(127.9), 127);
        assert_eq!(clamp_output(1e9), 255);
        assert_eq!(clamp_output(f32::NAN), 0);
    }

    #[test]
    fn ambient_sentinel_and_non_finite_are_unavailable() {
        assert!(ambient_available(21.5));
        assert!(!ambient_available(AMBIENT_UNAVAILABLE));
        assert!(!ambient_available(f32::NAN));
        assert!(!ambient_available(f32::INFINITY));
    }

    #[test]
    fn pid_terms_follow_reading() {
        let settings = Settings::new(1.0, 0.5, 2.0, 1_000, 90);
        let mut unit = ControlUnit::reference(UnitId::Reference, Address([0x28, 0, 0, 0, 0, 0, 0, 0]), settings);

        unit.apply(Some(CentiCelsius(2000)), 21.0);
        // 2100 - 2000 - 100
        assert_eq!(unit.error_terms(), ErrorTerms { proportional: 0, integral: 0, derivative: 0 });
        assert_eq!(unit.current_output(), 0);

        unit.apply(Some(CentiCelsius(1900)), 21.0);
        assert_eq!(unit.error_terms(), ErrorTerms { proportional: 100, integral: 100, derivative: 100 });
        // 100 + 50 + 200
        assert_eq!(unit.current_output(), 255);

        unit.apply(Some(CentiCelsius(1950)), 21.0);
        assert_eq!(unit.error_terms(), ErrorTerms { proportional: 50, integral: 150, derivative: -50 });
        // 50 + 75 - 100
        assert_eq!(unit.current_output(), 25);
    }

    #[test]
    fn integral_is_clamped_to_windup() {
        let settings = Settings::new(0.0, 1.0, 0.0, 250, 90);
        let mut unit = ControlUnit::reference(UnitId::Reference, Address([0; 8]), settings);
        for _ in 0..10 {
            unit.apply(Some(CentiCelsius(0)), 2.0);
            assert!(unit.error_terms().integral.abs() <= 250);
        }
        assert_eq!(unit.error_terms().integral, 250);
        for _ in 0..10 {
            unit.apply(Some(CentiCelsius(1000)), 2.0);
            assert!(unit.error_terms().integral.abs() <= 250);
        }
        assert_eq!(unit.error_terms().integral, -250);
    }

    #[test]
    fn repeated_over_limit_readings_halt() {
        let settings = Settings::new(1.0, 0.0, 0.0, 1_000, 50).with_max_error_count(1);
        let mut unit = ControlUnit::reference(UnitId::Reference, Address([0; 8]), settings);

        unit.apply(Some(CentiCelsius(6000)), 80.0);
        assert_eq!(unit.limit_error_count(), 1);
        assert!(!unit.is_halted());
        assert_eq!(unit.current_output(), 255);

        unit.apply(Some(CentiCelsius(6000)), 80.0);
        assert_eq!(unit.limit_error_count(), 2);
        assert!(unit.is_halted());
        assert_eq!(unit.current_output(), 0);
    }

    #[test]
    fn accumulators_saturate_instead_of_overflowing() {
        let settings = Settings::new(100.0, 0.0, 0.0, 1_000, 90);
        let mut unit = ControlUnit::reference(UnitId::Reference, Address([0; 8]), settings);

        unit.sum_output = u64::MAX - 100;
        unit.sum_temperature = i64::MAX - 100;
        for _ in 0..2 {
            // 9000 - 8000 - 100
            unit.apply(Some(CentiCelsius(8000)), 90.0);
            assert_eq!(unit.current_output(), 255);
        }
        assert_eq!(unit.sum_output, u64::MAX);
        assert_eq!(unit.sum_temperature, i64::MAX);
        assert_eq!(unit.average_output(1), Some(OUTPUT_MAX));
        assert_eq!(unit.average_temperature(1), Some(CentiCelsius(i32::MAX)));

        unit.sum_temperature = i64::MIN + 100;
        unit.apply(Some(CentiCelsius(-5000)), -40.0);
        assert_eq!(unit.sum_temperature, i64::MIN);
        assert_eq!(unit.average_temperature(1), Some(CentiCelsius(i32::MIN)));
    }

    #[test]
    fn short_sample_count_saturates_average() {
        let settings = Settings::new(0.0, 0.0, 0.0, 1_000, 150);
        let mut unit = ControlUnit::reference(UnitId::Reference, Address([0; 8]), settings);
        unit.sum_temperature = 3 * i32::MAX as i64;
        assert_eq!(unit.average_temperature(2), Some(CentiCelsius(i32::MAX)));
        unit.sum_temperature = 3 * i32::MIN as i64;
        assert_eq!(unit.average_temperature(2), Some(CentiCelsius(i32::MIN)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn settings() -> impl Strategy<Value = Settings> {
            (-50.0f32..50.0, -5.0f32..5.0, -50.0f32..50.0, 0u32..100_000, 0u16..150, 0u8..10).prop_map(
                |(kp, ki, kd, windup_limit, high_temperature_limit, max_error_count)| {
                    Settings::new(kp, ki, kd, windup_limit, high_temperature_limit).with_max_error_count(max_error_count)
                },
            )
        }

        fn tick() -> impl Strategy<Value = (Option<CentiCelsius>, f32)> {
            (
                prop::option::of((-5500i32..12500).prop_map(CentiCelsius)),
                prop_oneof![
                    1 => Just(AMBIENT_UNAVAILABLE),
                    1 => Just(f32::NAN),
                    8 => -40.0f32..60.0,
                ],
            )
        }

        proptest! {
            #[test]
            fn output_and_integral_stay_bounded(
                settings in settings(),
                ticks in prop::collection::vec(tick(), 1..80),
            ) {
                let mut unit = ControlUnit::reference(UnitId::Reference, Address([0x28, 0, 0, 0, 0, 0, 0, 0]), settings);
                let windup = settings.windup();
                let mut was_halted = false;

                for (reading, ambient) in ticks {
                    unit.apply(reading, ambient);

                    prop_assert!(unit.error_terms().integral.abs() <= windup);
                    if unit.is_halted() || reading.is_none() || !ambient_available(ambient) {
                        prop_assert_eq!(unit.current_output(), 0);
                    }
                    prop_assert!(!was_halted || unit.is_halted());
                    was_halted = unit.is_halted();

                    unit.clear_error_counts();
                    prop_assert_eq!(unit.is_halted(), was_halted);
                }
            }
        }
    }
}
