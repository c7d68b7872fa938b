//! # Dawnlight Core Library
//!
//! Core logic for a sunrise alarm clock: before an alarm rings, the screen
//! and torch brighten through a dawn palette; at the ring instant the alarm
//! sound fades in until the user snoozes or dismisses it. The `dawnlight`
//! CLI is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Alarm Engine**: polls the alarm repository every second and drives a
//!   single active alarm through `Idle -> Sunrising -> Ringing -> Idle`
//! - **Ambient**: sunrise colour ramp plus brightness/torch effects behind
//!   capability traits
//! - **Audio**: looping alarm sound with stepwise fade in and fade out
//! - **Storage**: TOML alarm store and TOML configuration
//!
//! ## Key Components
//!
//! - [`AlarmEngine`]: the alarm state machine
//! - [`SunriseRamp`]: dark-to-daylight driver
//! - [`AudioFader`]: volume fades over a sound device
//! - [`EventBus`]: ordered broadcast of engine [`Event`]s
//! - [`AlarmStore`]: alarm persistence
//! - [`Config`]: application configuration

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod alarm;
pub mod ambient;
pub mod audio;
pub mod error;
pub mod events;
pub mod notify;
pub mod storage;
pub mod timer;

pub use alarm::{AlarmEngine, AlarmRecord, AlarmRepository, AlarmSound, EngineSettings, Phase, TickOutcome};
pub use ambient::{AmbientEffector, ColorRamp, Rgb, SunriseRamp};
pub use audio::{AudioFader, FadeDirection};
pub use error::{CapabilityError, ConfigError, CoreError, EngineError, RepositoryError, ValidationError};
pub use events::{Event, EventBus};
pub use notify::{WakeHint, WakeNotifier};
pub use storage::{AlarmStore, Config};

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
