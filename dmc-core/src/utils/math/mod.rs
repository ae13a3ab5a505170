//! Motion math for open-loop DC motor control.
//!
//! - `calibration`: empirical degree-to-time fit and linear ramp interpolation

pub mod calibration;
