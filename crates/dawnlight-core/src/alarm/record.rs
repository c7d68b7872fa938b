use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Sunrise duration used when a record does not carry one.
pub const DEFAULT_SUNRISE_MINUTES: u32 = 30;

/// Built-in alarm sounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlarmSound {
    #[default]
    Birds,
    Ocean,
    Rain,
    Forest,
    Chimes,
}

impl AlarmSound {
    pub const ALL: [AlarmSound; 5] = [
        AlarmSound::Birds,
        AlarmSound::Ocean,
        AlarmSound::Rain,
        AlarmSound::Forest,
        AlarmSound::Chimes,
    ];

    /// Stable selector key, as stored in alarm records.
    pub fn key(&self) -> &'static str {
        match self {
            AlarmSound::Birds => "birds",
            AlarmSound::Ocean => "ocean",
            AlarmSound::Rain => "rain",
            AlarmSound::Forest => "forest",
            AlarmSound::Chimes => "chimes",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AlarmSound::Birds => "Birds Chirping",
            AlarmSound::Ocean => "Ocean Waves",
            AlarmSound::Rain => "Gentle Rain",
            AlarmSound::Forest => "Forest Ambience",
            AlarmSound::Chimes => "Wind Chimes",
        }
    }

    /// Asset file name relative to the sounds directory.
    pub fn file_name(&self) -> String {
        format!("{}.mp3", self.key())
    }
}

impl fmt::Display for AlarmSound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for AlarmSound {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlarmSound::ALL
            .into_iter()
            .find(|sound| sound.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "sound".into(),
                message: format!("unknown sound '{s}'"),
            })
    }
}

/// A stored alarm definition.
///
/// Owned by the repository; the engine only reads it, apart from asking
/// the repository to disable a one-shot alarm after it rings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRecord {
    pub id: String,
    pub hour: u32,
    pub minute: u32,
    /// Weekdays the alarm repeats on, 0 = Sunday. Empty means one-shot.
    #[serde(default)]
    pub repeat: Vec<u8>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minutes of sunrise before the ring instant.
    #[serde(default = "default_sunrise_duration")]
    pub sunrise_duration: u32,
    #[serde(default)]
    pub sound: AlarmSound,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

fn default_sunrise_duration() -> u32 {
    DEFAULT_SUNRISE_MINUTES
}

/// One concrete firing of an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub date: NaiveDate,
    pub sunrise_start: NaiveDateTime,
    pub ring_at: NaiveDateTime,
}

impl Occurrence {
    pub fn in_sunrise_window(&self, now: NaiveDateTime) -> bool {
        now >= self.sunrise_start && now < self.ring_at
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        now >= self.ring_at
    }
}

impl AlarmRecord {
    pub fn new(id: impl Into<String>, hour: u32, minute: u32) -> Self {
        Self {
            id: id.into(),
            hour,
            minute,
            repeat: Vec::new(),
            enabled: true,
            sunrise_duration: DEFAULT_SUNRISE_MINUTES,
            sound: AlarmSound::default(),
            label: String::new(),
            created_at: None,
        }
    }

    pub fn with_repeat(mut self, days: impl IntoIterator<Item = u8>) -> Self {
        self.repeat = days.into_iter().collect();
        self
    }

    pub fn with_sunrise(mut self, minutes: u32) -> Self {
        self.sunrise_duration = minutes;
        self
    }

    pub fn with_sound(mut self, sound: AlarmSound) -> Self {
        self.sound = sound;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Check the record invariants.
    ///
    /// # Errors
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.hour > 23 || self.minute > 59 {
            return Err(ValidationError::InvalidTime {
                hour: self.hour,
                minute: self.minute,
            });
        }
        let mut seen = [false; 7];
        for &day in &self.repeat {
            let slot = seen
                .get_mut(day as usize)
                .ok_or(ValidationError::RepeatDayOutOfRange(day))?;
            if *slot {
                return Err(ValidationError::DuplicateRepeatDay(day));
            }
            *slot = true;
        }
        if self.sunrise_duration == 0 {
            return Err(ValidationError::InvalidValue {
                field: "sunrise_duration".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    pub fn is_one_shot(&self) -> bool {
        self.repeat.is_empty()
    }

    /// One-shot alarms are valid every day; repeating alarms only on their weekdays.
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        if self.is_one_shot() {
            return true;
        }
        let weekday = date.weekday().num_days_from_sunday() as u8;
        self.repeat.contains(&weekday)
    }

    pub fn sunrise(&self) -> Duration {
        Duration::minutes(i64::from(self.sunrise_duration.max(1)))
    }

    /// The occurrence ringing on `date`, if the alarm is valid that day.
    pub fn occurrence_on(&self, date: NaiveDate) -> Option<Occurrence> {
        if !self.is_valid_on(date) {
            return None;
        }
        let ring_at = date.and_hms_opt(self.hour, self.minute, 0)?;
        Some(Occurrence {
            date,
            sunrise_start: ring_at - self.sunrise(),
            ring_at,
        })
    }

    /// `HH:MM` rendering of the ring time.
    pub fn time_label(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }
}

/// Partial update applied by [`crate::storage::AlarmStore::update`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlarmPatch {
    pub hour: Option<u32>,
    pub minute: Option<u32>,
    pub repeat: Option<Vec<u8>>,
    pub enabled: Option<bool>,
    pub sunrise_duration: Option<u32>,
    pub sound: Option<AlarmSound>,
    pub label: Option<String>,
}

impl AlarmPatch {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    pub fn apply(&self, record: &mut AlarmRecord) {
        if let Some(hour) = self.hour {
            record.hour = hour;
        }
        if let Some(minute) = self.minute {
            record.minute = minute;
        }
        if let Some(ref repeat) = self.repeat {
            record.repeat = repeat.clone();
        }
        if let Some(enabled) = self.enabled {
            record.enabled = enabled;
        }
        if let Some(minutes) = self.sunrise_duration {
            record.sunrise_duration = minutes;
        }
        if let Some(sound) = self.sound {
            record.sound = sound;
        }
        if let Some(ref label) = self.label {
            record.label = label.clone();
        }
    }
}

/// Parse an `HH:MM` time of day.
///
/// # Errors
/// Returns a validation error for malformed or out-of-range input.
pub fn parse_time_of_day(input: &str) -> Result<(u32, u32), ValidationError> {
    let invalid = || ValidationError::InvalidValue {
        field: "time".into(),
        message: format!("expected HH:MM, got '{input}'"),
    };
    let (h, m) = input.trim().split_once(':').ok_or_else(invalid)?;
    let hour: u32 = h.parse().map_err(|_| invalid())?;
    let minute: u32 = m.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(ValidationError::InvalidTime { hour, minute });
    }
    Ok((hour, minute))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn one_shot_is_valid_every_day() {
        let alarm = AlarmRecord::new("a", 7, 0);
        for day in 1..=7 {
            assert!(alarm.is_valid_on(date(2024, 1, day)));
        }
    }

    #[test]
    fn repeat_days_use_sunday_as_zero() {
        // 2024-01-07 is a Sunday, 2024-01-09 a Tuesday
        let alarm = AlarmRecord::new("a", 7, 0).with_repeat([0, 1, 3, 5]);
        assert!(alarm.is_valid_on(date(2024, 1, 7)));
        assert!(alarm.is_valid_on(date(2024, 1, 8)));
        assert!(!alarm.is_valid_on(date(2024, 1, 9)));
        assert!(alarm.is_valid_on(date(2024, 1, 10)));
    }

    #[test]
    fn occurrence_subtracts_sunrise_duration() {
        let alarm = AlarmRecord::new("a", 0, 10).with_sunrise(30);
        let occ = alarm.occurrence_on(date(2024, 1, 2)).unwrap();
        assert_eq!(occ.ring_at, date(2024, 1, 2).and_hms_opt(0, 10, 0).unwrap());
        assert_eq!(
            occ.sunrise_start,
            date(2024, 1, 1).and_hms_opt(23, 40, 0).unwrap()
        );
        assert!(occ.in_sunrise_window(date(2024, 1, 1).and_hms_opt(23, 59, 0).unwrap()));
        assert!(!occ.in_sunrise_window(occ.ring_at));
        assert!(occ.is_due(occ.ring_at));
    }

    #[test]
    fn validate_rejects_bad_records() {
        assert!(AlarmRecord::new("a", 24, 0).validate().is_err());
        assert_eq!(
            AlarmRecord::new("a", 7, 0).with_repeat([1, 7]).validate(),
            Err(ValidationError::RepeatDayOutOfRange(7))
        );
        assert_eq!(
            AlarmRecord::new("a", 7, 0).with_repeat([2, 2]).validate(),
            Err(ValidationError::DuplicateRepeatDay(2))
        );
        assert!(AlarmRecord::new("a", 7, 0).with_sunrise(0).validate().is_err());
        assert!(AlarmRecord::new("a", 7, 0).with_repeat([0, 6]).validate().is_ok());
    }

    #[test]
    fn parse_time_of_day_accepts_padded_and_bare() {
        assert_eq!(parse_time_of_day("07:05"), Ok((7, 5)));
        assert_eq!(parse_time_of_day("7:5"), Ok((7, 5)));
        assert!(parse_time_of_day("25:00").is_err());
        assert!(parse_time_of_day("0700").is_err());
    }

    #[test]
    fn sound_parses_case_insensitively() {
        assert_eq!("Ocean".parse::<AlarmSound>(), Ok(AlarmSound::Ocean));
        assert!("thunder".parse::<AlarmSound>().is_err());
        assert_eq!(AlarmSound::Rain.file_name(), "rain.mp3");
    }

    #[test]
    fn record_defaults_fill_missing_fields() {
        let record: AlarmRecord = serde_json::from_str(r#"{"id":"x","hour":6,"minute":30}"#).unwrap();
        assert!(record.enabled);
        assert_eq!(record.sunrise_duration, DEFAULT_SUNRISE_MINUTES);
        assert_eq!(record.sound, AlarmSound::Birds);
        assert!(record.is_one_shot());
    }
}
