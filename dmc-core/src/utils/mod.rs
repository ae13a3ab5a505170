//! Utility re-exports and helper macros for the DRV8830 motor controller.
//!
//! - `clock`: the millisecond clock the timed motions run against
//! - `controllers`: the DRV8830 driver and the two-motor command dispatcher
//! - `math`: degree calibration and ramp interpolation
//!
//! The `mk_static!` macro simplifies static initialization in no-std contexts.

pub mod clock;
pub mod controllers;
pub mod math;

pub use clock::{Clock, EmbassyClock};
pub use controllers::{
    CommandReport, Failure, MotionProfile, MotorCommand, MotorId, Outcome, Rotation,
    SystemController, MOTOR_CHANNEL, REPORT_CHANNEL,
};
pub use controllers::drv8830::{Address, Direction, Drv8830, DriverError, FaultStatus, Mode};

#[macro_export]
/// Initialize a no-std static cell and write the given value into it.
///
/// This macro creates a `static_cell::StaticCell` for type `$t` and initializes
/// it with `$val`, returning a mutable reference to the stored value.
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        STATIC_CELL.uninit().write($val)
    }};
}
