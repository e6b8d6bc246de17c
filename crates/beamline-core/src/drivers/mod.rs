//! Built-in software drivers.
//!
//! These drivers simulate devices entirely in memory. They serve as reference
//! implementations of the driver contract and let a framework run without hardware.

mod soft_analog;
mod soft_double;
mod soft_mce;
mod soft_motor;

pub use soft_mce::SoftMceRuntime;

use crate::driver::Driver;
use crate::error::CoreResult;
use crate::monitor::MonitorConfig;

/// Type names of the built-in drivers, in registration order.
pub const BUILTIN_DRIVERS: [&str; 6] = [
    "soft_motor",
    "soft_ainput",
    "soft_aoutput",
    "soft_linked_ainput",
    "soft_double",
    "soft_mce",
];

/// Build every built-in driver. `monitor` configures the threads of `soft_mce` records.
pub fn builtin(monitor: &MonitorConfig) -> CoreResult<Vec<Driver>> {
    Ok(vec![
        soft_motor::driver()?,
        soft_analog::input_driver()?,
        soft_analog::output_driver()?,
        soft_analog::linked_input_driver()?,
        soft_double::driver()?,
        soft_mce::driver(monitor.clone())?,
    ])
}
