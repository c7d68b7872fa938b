//! Engine phase bookkeeping and alarm selection.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::record::{AlarmRecord, Occurrence};
use crate::ambient::RampStatus;
use crate::audio::FadeDirection;
use crate::timer::TimerHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Sunrising,
    Ringing,
    /// Reported while a snooze re-ring is pending; the engine itself is idle.
    Snoozed,
}

/// A snoozed alarm waiting for its delay to elapse.
pub(crate) struct PendingSnooze {
    pub token: u64,
    pub alarm: AlarmRecord,
    pub due: NaiveDateTime,
    /// Set when the delay elapsed while another alarm held the slot.
    pub fired: bool,
    pub timer: TimerHandle,
}

/// State owned exclusively by the engine.
pub(crate) struct EngineState {
    pub phase: Phase,
    pub active_alarm: Option<AlarmRecord>,
    pub phase_since: Option<NaiveDateTime>,
    pub occurrence: Option<Occurrence>,
    /// Alarm id -> date of the last occurrence that rang or was dismissed.
    pub handled: HashMap<String, NaiveDate>,
    /// Snoozed alarms waiting to ring again, in snooze order.
    pub snoozes: Vec<PendingSnooze>,
    /// Bumped on every transition; stale ramp callbacks compare against it.
    pub session: u64,
    pub next_snooze_token: u64,
}

impl EngineState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            active_alarm: None,
            phase_since: None,
            occurrence: None,
            handled: HashMap::new(),
            snoozes: Vec::new(),
            session: 0,
            next_snooze_token: 0,
        }
    }

    pub fn enter(&mut self, phase: Phase, alarm: Option<AlarmRecord>, occurrence: Option<Occurrence>, now: NaiveDateTime) {
        self.phase = phase;
        self.active_alarm = alarm;
        self.occurrence = occurrence;
        self.phase_since = Some(now);
        self.session += 1;
    }

    pub fn to_idle(&mut self, now: NaiveDateTime) {
        self.enter(Phase::Idle, None, None, now);
    }

    pub fn mark_handled(&mut self, alarm_id: &str, date: NaiveDate) {
        self.handled.insert(alarm_id.to_string(), date);
    }

    /// Forget handled occurrences older than yesterday.
    pub fn prune_handled(&mut self, today: NaiveDate) {
        if let Some(cutoff) = today.pred_opt() {
            self.handled.retain(|_, date| *date >= cutoff);
        }
    }

    /// Drop every pending snooze, cancelling its timer.
    pub fn clear_snoozes(&mut self) {
        for pending in self.snoozes.drain(..) {
            pending.timer.cancel();
        }
    }

    pub fn reported_phase(&self) -> Phase {
        if self.phase == Phase::Idle && !self.snoozes.is_empty() {
            Phase::Snoozed
        } else {
            self.phase
        }
    }
}

/// Public view of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub phase: Phase,
    pub active_alarm: Option<AlarmRecord>,
    pub phase_since: Option<NaiveDateTime>,
    pub ring_at: Option<NaiveDateTime>,
    pub snoozed_alarm: Option<AlarmRecord>,
    pub snooze_due: Option<NaiveDateTime>,
    pub ramp: Option<RampStatus>,
    pub volume: f64,
    pub fade: FadeDirection,
}

/// Pick the alarm that should take the idle slot at `now`.
///
/// Considers today's occurrence and tomorrow's (for sunrise windows that
/// begin before midnight). An occurrence qualifies when `now` is inside its
/// sunrise window, or at/after its ring instant and within `late_limit`.
/// Occurrences in `handled` are skipped. Earliest ring instant wins; equal
/// instants keep stored order.
pub(crate) fn select_candidate(
    alarms: &[AlarmRecord],
    now: NaiveDateTime,
    handled: &HashMap<String, NaiveDate>,
    late_limit: Option<Duration>,
) -> Option<(AlarmRecord, Occurrence)> {
    let today = now.date();
    let dates = [Some(today), today.succ_opt()];
    let mut best: Option<(&AlarmRecord, Occurrence)> = None;

    for alarm in alarms.iter().filter(|a| a.enabled) {
        if let Err(e) = alarm.validate() {
            tracing::debug!(alarm = %alarm.id, "skipping invalid alarm: {e}");
            continue;
        }
        let occurrence = dates
            .iter()
            .flatten()
            .filter_map(|&date| alarm.occurrence_on(date))
            .filter(|occ| handled.get(&alarm.id) != Some(&occ.date))
            .find(|occ| is_live(occ, now, late_limit));
        let Some(occurrence) = occurrence else {
            continue;
        };
        let earlier = best.as_ref().map_or(true, |(_, b)| occurrence.ring_at < b.ring_at);
        if earlier {
            best = Some((alarm, occurrence));
        }
    }

    best.map(|(alarm, occ)| (alarm.clone(), occ))
}

/// Inside the sunrise window, or rung no longer than `late_limit` ago.
fn is_live(occ: &Occurrence, now: NaiveDateTime, late_limit: Option<Duration>) -> bool {
    occ.in_sunrise_window(now) || (occ.is_due(now) && late_limit.map_or(true, |limit| now < occ.ring_at + limit))
}

/// The occurrence a manual trigger of `alarm` at `now` stands for: the one
/// the idle slot would pick, else the next one to come, else today's.
pub(crate) fn occurrence_for_trigger(
    alarm: &AlarmRecord,
    now: NaiveDateTime,
    late_limit: Option<Duration>,
) -> Option<Occurrence> {
    let today = now.date();
    let occurrences: Vec<Occurrence> = [Some(today), today.succ_opt()]
        .into_iter()
        .flatten()
        .filter_map(|date| alarm.occurrence_on(date))
        .collect();
    occurrences
        .iter()
        .find(|occ| is_live(occ, now, late_limit))
        .or_else(|| occurrences.iter().find(|occ| occ.ring_at > now))
        .or_else(|| occurrences.first())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        // March 2024: the 4th is a Monday
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn nothing_outside_windows() {
        let alarms = vec![AlarmRecord::new("a", 7, 0)];
        assert!(select_candidate(&alarms, at(4, 6, 29), &HashMap::new(), None).is_none());
        assert!(select_candidate(&alarms, at(4, 6, 30), &HashMap::new(), None).is_some());
    }

    #[test]
    fn earliest_ring_wins_then_stored_order() {
        let alarms = vec![
            AlarmRecord::new("late", 7, 10).with_sunrise(60),
            AlarmRecord::new("a", 7, 0),
            AlarmRecord::new("b", 7, 0),
        ];
        let (alarm, _) = select_candidate(&alarms, at(4, 6, 45), &HashMap::new(), None).unwrap();
        assert_eq!(alarm.id, "a");
    }

    #[test]
    fn disabled_and_off_day_alarms_are_ignored() {
        let alarms = vec![
            AlarmRecord::new("off", 7, 0).disabled(),
            // the 5th is a Tuesday
            AlarmRecord::new("mwf", 7, 0).with_repeat([1, 3, 5]),
        ];
        assert!(select_candidate(&alarms, at(5, 6, 50), &HashMap::new(), None).is_none());
        assert!(select_candidate(&alarms, at(4, 6, 50), &HashMap::new(), None).is_some());
    }

    #[test]
    fn handled_occurrence_is_skipped() {
        let alarms = vec![AlarmRecord::new("a", 7, 0)];
        let mut handled = HashMap::new();
        handled.insert("a".to_string(), at(4, 0, 0).date());
        assert!(select_candidate(&alarms, at(4, 7, 5), &handled, None).is_none());
    }

    #[test]
    fn late_limit_bounds_the_ring() {
        let alarms = vec![AlarmRecord::new("a", 7, 0)];
        let limit = Some(Duration::minutes(60));
        assert!(select_candidate(&alarms, at(4, 7, 59), &HashMap::new(), limit).is_some());
        assert!(select_candidate(&alarms, at(4, 8, 0), &HashMap::new(), limit).is_none());
        assert!(select_candidate(&alarms, at(4, 15, 0), &HashMap::new(), None).is_some());
    }

    #[test]
    fn sunrise_window_can_start_before_midnight() {
        let alarms = vec![AlarmRecord::new("a", 0, 10).with_sunrise(30)];
        let limit = Some(Duration::minutes(60));
        let (_, occ) = select_candidate(&alarms, at(4, 23, 45), &HashMap::new(), limit).unwrap();
        assert_eq!(occ.ring_at, at(5, 0, 10));
        assert!(occ.in_sunrise_window(at(4, 23, 45)));
    }

    #[test]
    fn trigger_picks_the_occurrence_in_play() {
        let limit = Some(Duration::minutes(60));
        let midnight = AlarmRecord::new("a", 0, 10).with_sunrise(30);
        let occ = occurrence_for_trigger(&midnight, at(4, 23, 50), limit).unwrap();
        assert_eq!(occ.date, at(5, 0, 0).date());

        // before the window opens: the next one to come
        let morning = AlarmRecord::new("b", 7, 0);
        let occ = occurrence_for_trigger(&morning, at(4, 5, 0), limit).unwrap();
        assert_eq!(occ.date, at(4, 0, 0).date());
        let occ = occurrence_for_trigger(&morning, at(4, 22, 0), limit).unwrap();
        assert_eq!(occ.date, at(5, 0, 0).date());

        // rung a few minutes ago: still today's
        let occ = occurrence_for_trigger(&morning, at(4, 7, 20), limit).unwrap();
        assert_eq!(occ.date, at(4, 0, 0).date());
    }

    #[test]
    fn reported_phase_shows_pending_snooze() {
        let mut state = EngineState::new();
        assert_eq!(state.reported_phase(), Phase::Idle);
        state.enter(Phase::Ringing, Some(AlarmRecord::new("a", 7, 0)), None, at(4, 7, 0));
        assert_eq!(state.reported_phase(), Phase::Ringing);
        assert_eq!(state.session, 1);
    }
}
