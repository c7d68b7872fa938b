//! Screen and torch control for the sunrise.
//!
//! - [`ColorRamp`]: the fixed dawn palette
//! - [`AmbientEffector`]: brightness and torch behind capability traits
//! - [`SunriseRamp`]: once-per-second driver from dark to daylight

mod color;
mod device;
mod effector;
mod ramp;

pub use color::{ColorRamp, Rgb, SUNRISE_COLORS};
pub use device::{
    BrightnessControl, SimulatedBacklight, SimulatedTorch, SysfsBacklight, SysfsLed, TorchControl,
    Unsupported,
};
pub use effector::{AmbientEffector, LightPolicy, LightState, DEFAULT_BASELINE};
pub use ramp::{RampStatus, SunriseRamp, RAMP_TICK};
