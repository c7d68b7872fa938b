//! Advisory OS wake hints.
//!
//! The engine does not depend on these for correctness. They exist so the
//! platform can wake the process (or show a notification) around the ring
//! time even when the tick loop is suspended.

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::alarm::AlarmRecord;

pub const HINT_TITLE: &str = "Sunrise Alarm";
pub const HINT_BODY: &str = "Time to wake up!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WakeHint {
    /// Repeats every week on `weekday` (0 = Sunday).
    Weekly { weekday: u8, hour: u32, minute: u32 },
    Daily { hour: u32, minute: u32 },
    Once { at: NaiveDateTime },
}

/// Wake hints for `alarm`: one per repeat day, a single daily hint when all
/// seven days repeat, or the next occurrence of a one-shot alarm (tomorrow
/// if today's time has passed). Disabled alarms get none.
pub fn wake_hints(alarm: &AlarmRecord, now: NaiveDateTime) -> Vec<WakeHint> {
    if !alarm.enabled {
        return Vec::new();
    }
    let (hour, minute) = (alarm.hour, alarm.minute);
    if alarm.repeat.len() >= 7 {
        return vec![WakeHint::Daily { hour, minute }];
    }
    if !alarm.is_one_shot() {
        return alarm
            .repeat
            .iter()
            .map(|&weekday| WakeHint::Weekly { weekday, hour, minute })
            .collect();
    }
    let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) else {
        return Vec::new();
    };
    let mut at = now.date().and_time(time);
    if at <= now {
        at += Duration::days(1);
    }
    vec![WakeHint::Once { at }]
}

/// Receives wake hints; no response is expected.
pub trait WakeNotifier: Send + Sync {
    fn schedule(&self, alarm: &AlarmRecord, hints: &[WakeHint]);
    fn cancel(&self, alarm_id: &str);
}

/// Drops every hint.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl WakeNotifier for NoopNotifier {
    fn schedule(&self, _alarm: &AlarmRecord, _hints: &[WakeHint]) {}
    fn cancel(&self, _alarm_id: &str) {}
}

/// Writes hints to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl WakeNotifier for TracingNotifier {
    fn schedule(&self, alarm: &AlarmRecord, hints: &[WakeHint]) {
        for hint in hints {
            tracing::info!(alarm = %alarm.id, ?hint, "{HINT_TITLE}: {HINT_BODY}");
        }
    }

    fn cancel(&self, alarm_id: &str) {
        tracing::info!(alarm = alarm_id, "wake hints cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn one_shot_in_the_past_moves_to_tomorrow() {
        let alarm = AlarmRecord::new("a", 7, 0);
        assert_eq!(wake_hints(&alarm, at(6, 0)), vec![WakeHint::Once { at: at(7, 0) }]);
        assert_eq!(
            wake_hints(&alarm, at(7, 0)),
            vec![WakeHint::Once {
                at: at(7, 0) + Duration::days(1)
            }]
        );
    }

    #[test]
    fn repeat_days_become_weekly_hints() {
        let alarm = AlarmRecord::new("a", 6, 45).with_repeat([1, 3]);
        assert_eq!(
            wake_hints(&alarm, at(0, 0)),
            vec![
                WakeHint::Weekly { weekday: 1, hour: 6, minute: 45 },
                WakeHint::Weekly { weekday: 3, hour: 6, minute: 45 },
            ]
        );
    }

    #[test]
    fn every_day_collapses_to_daily() {
        let alarm = AlarmRecord::new("a", 6, 45).with_repeat(0..7);
        assert_eq!(wake_hints(&alarm, at(0, 0)), vec![WakeHint::Daily { hour: 6, minute: 45 }]);
        assert!(wake_hints(&alarm.disabled(), at(0, 0)).is_empty());
    }
}
