//! Empirical calibration for the yellow geared DC motor on the sorter wheel.
//!
//! The degree fit was measured between speed 15 (`k = 84`) and speed 34 (`k = 69`) and is
//! linear in between. Outside roughly 15..=30 the result is not meaningful, and it drifts
//! with motor temperature.
//!
//! # Example
//! ```rust
//! use dmc_core::utils::math::calibration::angle_to_duration_ms;
//! assert_eq!(angle_to_duration_ms(20, 180), Some(720));
//! ```

/// Speed at which the fit yields `ANGLE_K_BASE`.
pub const ANGLE_K_SPEED: i64 = 15;
/// Milliseconds-times-speed per degree at `ANGLE_K_SPEED`.
pub const ANGLE_K_BASE: i64 = 84;

/// Calibration factor `k` for the given speed.
///
/// `k = 84 - (speed - 15) * 28 / 35`, truncating toward zero.
pub fn angle_factor(speed: u8) -> i64 {
    ANGLE_K_BASE - ((i64::from(speed) - ANGLE_K_SPEED) * 28) / 35
}

/// Drive time in milliseconds to turn `degrees` at `speed`.
///
/// Returns `None` for a zero speed or when the fit goes negative (very high speeds).
/// Durations beyond `u32::MAX` saturate.
pub fn angle_to_duration_ms(
    speed: u8,
    degrees: u32,
) -> Option<u32> {
    if speed == 0 {
        return None;
    }
    let ms = i64::from(degrees) * angle_factor(speed) / i64::from(speed);
    if ms < 0 {
        return None;
    }
    Some(u32::try_from(ms).unwrap_or(u32::MAX))
}

/// Linear ramp target at `elapsed_ms` into a ramp of `total_ms`.
///
/// Elapsed time past the end of the ramp holds at `to`.
pub fn ramp_target(
    from: u8,
    to: u8,
    elapsed_ms: u64,
    total_ms: u32,
) -> u8 {
    if total_ms == 0 {
        return to;
    }
    let total = i64::from(total_ms);
    let elapsed = (elapsed_ms.min(total_ms as u64)) as i64;
    let span = i64::from(to) - i64::from(from);
    let speed = i64::from(from) + span * elapsed / total;
    speed.clamp(0, i64::from(u8::MAX)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_matches_measured_points() {
        assert_eq!(angle_factor(15), 84);
        assert_eq!(angle_factor(20), 80);
        assert_eq!(angle_factor(30), 72);
    }

    #[test]
    fn half_turn_at_twenty() {
        assert_eq!(angle_to_duration_ms(20, 180), Some(720));
    }

    #[test]
    fn low_speed_truncates_toward_zero() {
        // (6 - 15) * 28 = -252, / 35 = -7.2 -> -7
        assert_eq!(angle_factor(6), 91);
    }

    #[test]
    fn degenerate_speeds() {
        assert_eq!(angle_to_duration_ms(0, 90), None);
        assert_eq!(angle_to_duration_ms(255, 90), None);
    }

    #[test]
    fn huge_angles_saturate() {
        assert_eq!(angle_to_duration_ms(15, u32::MAX), Some(u32::MAX));
        assert_eq!(angle_to_duration_ms(15, 1_000_000_000), Some(u32::MAX));
    }

    #[test]
    fn ramp_interpolates_both_ways() {
        assert_eq!(ramp_target(10, 40, 0, 900), 10);
        assert_eq!(ramp_target(10, 40, 300, 900), 20);
        assert_eq!(ramp_target(10, 40, 2000, 900), 40);
        assert_eq!(ramp_target(40, 10, 450, 900), 25);
        assert_eq!(ramp_target(40, 10, 0, 0), 10);
    }
}
