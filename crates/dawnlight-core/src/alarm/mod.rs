//! Alarm definitions, the repository seam and the alarm engine.

mod engine;
mod record;
mod repository;
mod state;

pub use engine::{AlarmEngine, EngineBuilder, EngineSettings, TickOutcome};
pub use record::{
    parse_time_of_day, AlarmPatch, AlarmRecord, AlarmSound, Occurrence, DEFAULT_SUNRISE_MINUTES,
};
pub use repository::{AlarmRepository, MemoryAlarmRepository};
pub use state::{EngineSnapshot, Phase};
