//! Scaling factors for the different number fields.
//!
//! The SDP transmits every electrical value as an unsigned decimal integer. How many decimal places
//! are implied depends on where the value comes from: setpoints carry one less digit than
//! measurements, and the LCD dump uses its own layout again.

/// Divisors for converting raw field values to volts, amps and watts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingFactors {
    /// Raw units per volt (e.g. 10 means the raw value is in tenths of a volt).
    pub voltage_divisor: u32,
    /// Raw units per amp (e.g. 100 means the raw value is in hundredths of an amp).
    pub current_divisor: u32,
    /// Raw units per watt. Only the LCD dump reports power.
    pub power_divisor: u32,
}

impl Default for ScalingFactors {
    /// Default to the setpoint scaling, used by every command parameter.
    fn default() -> Self {
        Self::SETPOINT
    }
}

impl ScalingFactors {
    /// Setpoints, limits, maximums, presets and program items. `uuu` is 0.1 V, `iii` is 0.01 A.
    pub const SETPOINT: Self = Self::new(10, 100, 1);
    /// Measured output (`GETD`) has one more decimal digit than the setpoints.
    pub const MEASURED: Self = Self::new(100, 1000, 1);
    /// Readings shown in the upper half of the LCD.
    pub const LCD_READING: Self = Self::new(100, 1000, 100);
    /// Setpoints shown in the lower half of the LCD.
    pub const LCD_SETPOINT: Self = Self::new(10, 100, 1);

    /// Create a new `ScalingFactors` instance with the specified divisor values.
    pub const fn new(voltage_divisor: u32, current_divisor: u32, power_divisor: u32) -> Self {
        Self {
            voltage_divisor,
            current_divisor,
            power_divisor,
        }
    }

    /// Convert a raw voltage field to volts.
    #[inline]
    pub fn raw_to_volts(&self, raw: u16) -> f64 {
        raw as f64 / self.voltage_divisor as f64
    }

    /// Convert volts to a raw voltage field, rounding half away from zero.
    ///
    /// Returns `None` for values that are not finite. Range checking is up to the caller.
    #[inline]
    pub fn volts_to_raw(&self, volts: f64) -> Option<i64> {
        round_half_away_from_zero(volts * self.voltage_divisor as f64)
    }

    /// Convert a raw current field to amps.
    #[inline]
    pub fn raw_to_amps(&self, raw: u16) -> f64 {
        raw as f64 / self.current_divisor as f64
    }

    /// Convert amps to a raw current field, rounding half away from zero.
    #[inline]
    pub fn amps_to_raw(&self, amps: f64) -> Option<i64> {
        round_half_away_from_zero(amps * self.current_divisor as f64)
    }

    /// Convert a raw power field to watts.
    #[inline]
    pub fn raw_to_watts(&self, raw: u16) -> f64 {
        raw as f64 / self.power_divisor as f64
    }
}

// Above this every f64 is already an integer.
const EXACT_INTEGER_LIMIT: f64 = 4_503_599_627_370_496.0;

/// Round to the nearest integer, ties away from zero (C `round()` semantics).
///
/// Implemented on top of truncation so it works without `std` or `libm`. The fractional part
/// `value - trunc(value)` is exact for every value below 2^52, so ties are detected exactly.
pub fn round_half_away_from_zero(value: f64) -> Option<i64> {
    // Also rejects NaN, which fails every comparison.
    if !(value > -EXACT_INTEGER_LIMIT && value < EXACT_INTEGER_LIMIT) {
        return None;
    }

    let truncated = value as i64;
    let fraction = value - truncated as f64;
    if fraction >= 0.5 {
        Some(truncated + 1)
    } else if fraction <= -0.5 {
        Some(truncated - 1)
    } else {
        Some(truncated)
    }
}
