//! Alarm engine.
//!
//! Polls the alarm repository once per tick and moves a single active alarm
//! through its phases:
//!
//! ```text
//! Idle ──window opens──► Sunrising ──ring instant──► Ringing ──dismiss──► Idle
//!   │                        │                          │
//!   └──ring instant──────────┼─────────────────────────►│
//!                            └──alarm disabled──► Idle  └──snooze──► Idle (+ pending re-ring)
//! ```
//!
//! Only one alarm occupies the slot at a time. Phase transitions are
//! serialized by the state mutex; events are published after the lock is
//! released so handlers may call back into the engine.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDateTime, Utc};
use serde::Serialize;

use super::record::{AlarmRecord, Occurrence};
use super::repository::AlarmRepository;
use super::state::{occurrence_for_trigger, select_candidate, EngineSnapshot, EngineState, PendingSnooze, Phase};
use crate::ambient::{AmbientEffector, SunriseRamp};
use crate::audio::{AudioFader, FadeSteps, NoAudio};
use crate::error::{CoreError, EngineError, RepositoryError};
use crate::events::{Event, EventBus, HandlerError, SubscriptionId};
use crate::lock;
use crate::notify::{wake_hints, NoopNotifier, WakeNotifier};
use crate::timer::{spawn_interval, spawn_once, Clock, SystemClock, TimerHandle};

/// Timing knobs for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub tick_interval: StdDuration,
    pub ring_fade_in: StdDuration,
    pub silence_fade_out: StdDuration,
    pub default_snooze_minutes: u32,
    /// How long after its ring instant an unhandled occurrence may still ring.
    /// `None` rings any occurrence of the current day that has passed.
    pub late_ring_limit: Option<Duration>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval: StdDuration::from_secs(1),
            ring_fade_in: StdDuration::from_secs(30),
            silence_fade_out: StdDuration::from_secs(2),
            default_snooze_minutes: 9,
            late_ring_limit: Some(Duration::minutes(60)),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    /// The repository could not be read.
    Skipped,
    Unchanged,
    SunriseStarted { alarm_id: String },
    Triggered { alarm_id: String },
    SunriseCancelled { alarm_id: String },
}

/// Work collected under the state lock and carried out after it is released.
#[derive(Default)]
struct Effects {
    events: Vec<Event>,
    disable: Option<String>,
}

struct Inner {
    repository: Arc<dyn AlarmRepository>,
    ramp: SunriseRamp,
    fader: AudioFader,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn WakeNotifier>,
    bus: EventBus,
    settings: EngineSettings,
    state: Mutex<EngineState>,
    driver: Mutex<Option<TimerHandle>>,
}

pub struct EngineBuilder {
    repository: Arc<dyn AlarmRepository>,
    ramp: Option<SunriseRamp>,
    fader: Option<AudioFader>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn WakeNotifier>,
    settings: EngineSettings,
}

impl EngineBuilder {
    pub fn ramp(mut self, ramp: SunriseRamp) -> Self {
        self.ramp = Some(ramp);
        self
    }

    pub fn fader(mut self, fader: AudioFader) -> Self {
        self.fader = Some(fader);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn WakeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> AlarmEngine {
        let ramp = self
            .ramp
            .unwrap_or_else(|| SunriseRamp::new(AmbientEffector::unsupported()));
        let fader = self
            .fader
            .unwrap_or_else(|| AudioFader::new(Arc::new(NoAudio), FadeSteps::default()));
        AlarmEngine {
            inner: Arc::new(Inner {
                repository: self.repository,
                ramp,
                fader,
                clock: self.clock,
                notifier: self.notifier,
                bus: EventBus::new(),
                settings: self.settings,
                state: Mutex::new(EngineState::new()),
                driver: Mutex::new(None),
            }),
        }
    }
}

/// The alarm engine. Cheap to clone; all clones share one engine.
#[derive(Clone)]
pub struct AlarmEngine {
    inner: Arc<Inner>,
}

impl AlarmEngine {
    pub fn builder(repository: Arc<dyn AlarmRepository>) -> EngineBuilder {
        EngineBuilder {
            repository,
            ramp: None,
            fader: None,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(NoopNotifier),
            settings: EngineSettings::default(),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Prepare audio, publish wake hints and start the tick loop.
    ///
    /// Returns false if the loop was already running.
    pub fn initialize(&self) -> bool {
        let mut driver = lock(&self.inner.driver);
        if driver.is_some() {
            tracing::debug!("alarm engine already initialized");
            return false;
        }
        self.inner.fader.initialize();
        self.publish_wake_hints();

        let weak = Arc::downgrade(&self.inner);
        *driver = Some(spawn_interval(self.inner.settings.tick_interval, move || {
            match weak.upgrade() {
                Some(inner) => {
                    AlarmEngine { inner }.tick();
                    ControlFlow::Continue(())
                }
                None => ControlFlow::Break(()),
            }
        }));
        tracing::info!(interval = ?self.inner.settings.tick_interval, "alarm engine started");
        true
    }

    /// Stop the tick loop, silence audio and restore the ambient devices.
    pub fn stop_all(&self) {
        if let Some(driver) = lock(&self.inner.driver).take() {
            driver.cancel();
        }
        self.inner.fader.stop();
        self.inner.ramp.reset();

        let now = self.inner.clock.now();
        let mut state = lock(&self.inner.state);
        state.clear_snoozes();
        state.to_idle(now);
        tracing::info!("alarm engine stopped");
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.driver).is_some()
    }

    /// Push wake hints for every stored alarm to the notifier.
    pub fn publish_wake_hints(&self) {
        let alarms = match self.inner.repository.list() {
            Ok(alarms) => alarms,
            Err(e) => {
                tracing::warn!("could not publish wake hints: {e}");
                return;
            }
        };
        let now = self.inner.clock.now();
        for alarm in &alarms {
            if alarm.enabled {
                self.inner.notifier.schedule(alarm, &wake_hints(alarm, now));
            } else {
                self.inner.notifier.cancel(&alarm.id);
            }
        }
    }

    // ── Tick ─────────────────────────────────────────────────────────

    /// Evaluate all alarms against the engine clock.
    pub fn tick(&self) -> TickOutcome {
        self.tick_at(self.inner.clock.now())
    }

    /// Evaluate all alarms at `now`.
    pub fn tick_at(&self, now: NaiveDateTime) -> TickOutcome {
        let alarms = match self.inner.repository.list() {
            Ok(alarms) => alarms,
            Err(e) => {
                tracing::warn!("alarm repository unavailable, tick skipped: {e}");
                return TickOutcome::Skipped;
            }
        };

        let mut fx = Effects::default();
        let outcome = {
            let mut state = lock(&self.inner.state);
            state.prune_handled(now.date());
            match state.phase {
                Phase::Idle | Phase::Snoozed => self.evaluate_idle(&mut state, &alarms, now, &mut fx),
                Phase::Sunrising => self.evaluate_sunrise(&mut state, &alarms, now, &mut fx),
                Phase::Ringing => TickOutcome::Unchanged,
            }
        };
        self.apply(fx);
        if outcome != TickOutcome::Unchanged {
            tracing::debug!(?outcome, %now, "tick");
        }
        outcome
    }

    fn evaluate_idle(
        &self,
        state: &mut EngineState,
        alarms: &[AlarmRecord],
        now: NaiveDateTime,
        fx: &mut Effects,
    ) -> TickOutcome {
        // A snooze that elapsed while another alarm held the slot goes first.
        if let Some(index) = state.snoozes.iter().position(|s| s.fired) {
            let pending = state.snoozes.remove(index);
            let alarm_id = pending.alarm.id.clone();
            self.ring(state, pending.alarm, None, true, now, fx);
            return TickOutcome::Triggered { alarm_id };
        }

        let Some((alarm, occurrence)) =
            select_candidate(alarms, now, &state.handled, self.inner.settings.late_ring_limit)
        else {
            return TickOutcome::Unchanged;
        };
        let alarm_id = alarm.id.clone();
        if occurrence.is_due(now) {
            self.ring(state, alarm, Some(occurrence), false, now, fx);
            TickOutcome::Triggered { alarm_id }
        } else {
            self.start_sunrise(state, alarm, occurrence, now, fx);
            TickOutcome::SunriseStarted { alarm_id }
        }
    }

    fn evaluate_sunrise(
        &self,
        state: &mut EngineState,
        alarms: &[AlarmRecord],
        now: NaiveDateTime,
        fx: &mut Effects,
    ) -> TickOutcome {
        let (Some(active), Some(occurrence)) = (state.active_alarm.clone(), state.occurrence) else {
            state.to_idle(now);
            return TickOutcome::Unchanged;
        };

        match alarms.iter().find(|a| a.id == active.id) {
            Some(current) if current.enabled => {
                if occurrence.is_due(now) {
                    self.ring(state, current.clone(), Some(occurrence), false, now, fx);
                    TickOutcome::Triggered { alarm_id: active.id }
                } else {
                    TickOutcome::Unchanged
                }
            }
            _ => {
                tracing::info!(alarm = %active.id, "alarm disabled during sunrise; ramp cancelled");
                self.inner.ramp.reset();
                state.to_idle(now);
                let alarm_id = active.id.clone();
                fx.events.push(Event::SunriseCancelled {
                    alarm: active,
                    at: Utc::now(),
                });
                TickOutcome::SunriseCancelled { alarm_id }
            }
        }
    }

    fn start_sunrise(
        &self,
        state: &mut EngineState,
        alarm: AlarmRecord,
        occurrence: Occurrence,
        now: NaiveDateTime,
        fx: &mut Effects,
    ) {
        state.enter(Phase::Sunrising, Some(alarm.clone()), Some(occurrence), now);
        let session = state.session;

        let on_progress = {
            let weak = Arc::downgrade(&self.inner);
            move |color, progress| {
                if let Some(inner) = sunrise_session(&weak, session) {
                    inner.bus.emit(&Event::SunriseProgress { color, progress });
                }
            }
        };
        let on_complete = {
            let weak = Arc::downgrade(&self.inner);
            let alarm = alarm.clone();
            move || {
                if let Some(inner) = sunrise_session(&weak, session) {
                    inner.bus.emit(&Event::SunriseComplete {
                        alarm,
                        at: Utc::now(),
                    });
                }
            }
        };
        if let Err(e) = self
            .inner
            .ramp
            .start(alarm.sunrise_duration, on_progress, on_complete)
        {
            tracing::warn!(alarm = %alarm.id, "{e}");
        }

        tracing::info!(alarm = %alarm.id, ring_at = %occurrence.ring_at, "sunrise started");
        fx.events.push(Event::SunriseStarted {
            duration: alarm.sunrise_duration,
            alarm,
            at: Utc::now(),
        });
    }

    fn ring(
        &self,
        state: &mut EngineState,
        alarm: AlarmRecord,
        occurrence: Option<Occurrence>,
        snoozed: bool,
        now: NaiveDateTime,
        fx: &mut Effects,
    ) {
        if let Some(occ) = occurrence {
            state.mark_handled(&alarm.id, occ.date);
        }
        // The light stays where the sunrise left it until snooze or dismiss.
        self.inner.ramp.stop();
        state.enter(Phase::Ringing, Some(alarm.clone()), occurrence, now);

        match self.inner.fader.load(alarm.sound.key()) {
            Ok(()) => self.inner.fader.fade_in(self.inner.settings.ring_fade_in),
            Err(e) => tracing::warn!(alarm = %alarm.id, "alarm sound unavailable, ringing silently: {e}"),
        }
        if !snoozed && alarm.is_one_shot() {
            fx.disable = Some(alarm.id.clone());
        }

        tracing::info!(alarm = %alarm.id, snoozed, "alarm ringing");
        fx.events.push(Event::AlarmTriggered {
            alarm,
            snoozed,
            at: Utc::now(),
        });
    }

    fn silence(&self) {
        self.inner.fader.fade_out(self.inner.settings.silence_fade_out);
        self.inner.ramp.reset();
    }

    fn apply(&self, fx: Effects) {
        for event in &fx.events {
            self.inner.bus.emit(event);
        }
        if let Some(id) = fx.disable {
            self.disable_one_shot(&id);
        }
    }

    fn disable_one_shot(&self, id: &str) {
        match self.inner.repository.set_enabled(id, false) {
            Ok(Some(alarm)) => {
                self.inner.notifier.cancel(&alarm.id);
                tracing::debug!(alarm = id, "one-shot alarm disabled");
            }
            Ok(None) => tracing::debug!(alarm = id, "one-shot alarm vanished before it could be disabled"),
            Err(e) => tracing::warn!(alarm = id, "failed to disable one-shot alarm: {e}"),
        }
    }

    // ── User actions ─────────────────────────────────────────────────

    /// Silence the ringing alarm and ring it again after `minutes`, without
    /// a sunrise.
    ///
    /// # Errors
    /// `EngineError::InvalidOperation` when nothing is ringing or `minutes`
    /// is zero. The engine state is unchanged in that case.
    pub fn snooze(&self, minutes: u32) -> Result<(), EngineError> {
        if minutes == 0 {
            return Err(EngineError::InvalidOperation("snooze needs at least one minute".into()));
        }
        let now = self.inner.clock.now();
        let event = {
            let mut state = lock(&self.inner.state);
            let alarm = match (state.phase, state.active_alarm.clone()) {
                (Phase::Ringing, Some(alarm)) => alarm,
                (phase, _) => {
                    tracing::info!(?phase, "snooze ignored: no ringing alarm");
                    return Err(EngineError::InvalidOperation(format!(
                        "snooze requires a ringing alarm (phase is {phase:?})"
                    )));
                }
            };

            self.silence();
            state.to_idle(now);

            state.next_snooze_token += 1;
            let token = state.next_snooze_token;
            let weak = Arc::downgrade(&self.inner);
            let timer = spawn_once(StdDuration::from_secs(u64::from(minutes) * 60), move || {
                if let Some(inner) = weak.upgrade() {
                    AlarmEngine { inner }.snooze_elapsed(token);
                }
            });
            tracing::info!(alarm = %alarm.id, minutes, "alarm snoozed");
            state.snoozes.push(PendingSnooze {
                token,
                alarm,
                due: now + Duration::minutes(i64::from(minutes)),
                fired: false,
                timer,
            });
            Event::AlarmSnoozed {
                minutes,
                at: Utc::now(),
            }
        };
        self.inner.bus.emit(&event);
        Ok(())
    }

    /// Snooze for the configured default number of minutes.
    ///
    /// # Errors
    /// See [`AlarmEngine::snooze`].
    pub fn snooze_default(&self) -> Result<(), EngineError> {
        self.snooze(self.inner.settings.default_snooze_minutes)
    }

    fn snooze_elapsed(&self, token: u64) {
        let now = self.inner.clock.now();
        let mut fx = Effects::default();
        {
            let mut state = lock(&self.inner.state);
            let Some(index) = state.snoozes.iter().position(|s| s.token == token) else {
                return;
            };
            if matches!(state.phase, Phase::Idle | Phase::Snoozed) {
                let pending = state.snoozes.remove(index);
                tracing::info!(alarm = %pending.alarm.id, "snooze elapsed");
                self.ring(&mut state, pending.alarm, None, true, now, &mut fx);
            } else {
                tracing::info!("snooze elapsed while another alarm is active; re-ring deferred");
                state.snoozes[index].fired = true;
            }
        }
        self.apply(fx);
    }

    /// Stop the sunrise or ring, restore the ambient devices and go idle.
    ///
    /// In the reported [`Phase::Snoozed`] state (idle with a re-ring
    /// pending) dismiss cancels the pending snoozes and emits
    /// `alarm_dismissed`, so the user can call off a snoozed alarm early.
    /// A plain idle engine returns false and emits nothing.
    pub fn dismiss(&self) -> bool {
        let now = self.inner.clock.now();
        {
            let mut state = lock(&self.inner.state);
            match state.reported_phase() {
                Phase::Sunrising | Phase::Ringing => {
                    if let (Some(alarm), Some(occ)) = (state.active_alarm.clone(), state.occurrence) {
                        state.mark_handled(&alarm.id, occ.date);
                    }
                    self.silence();
                    state.to_idle(now);
                    tracing::info!("alarm dismissed");
                }
                Phase::Snoozed => {
                    state.clear_snoozes();
                    tracing::info!("pending snooze dismissed");
                }
                Phase::Idle => {
                    tracing::debug!("dismiss ignored: nothing active");
                    return false;
                }
            }
        }
        self.inner.bus.emit(&Event::AlarmDismissed { at: Utc::now() });
        true
    }

    /// Ring `alarm_id` now, e.g. when the user taps its OS notification.
    ///
    /// Returns false when another alarm holds the slot.
    ///
    /// # Errors
    /// Repository failures and unknown ids.
    pub fn trigger_by_id(&self, alarm_id: &str) -> Result<bool, CoreError> {
        let alarm = self
            .inner
            .repository
            .list()?
            .into_iter()
            .find(|a| a.id == alarm_id)
            .ok_or_else(|| RepositoryError::NotFound(alarm_id.to_string()))?;

        let now = self.inner.clock.now();
        let mut fx = Effects::default();
        let rang = {
            let mut state = lock(&self.inner.state);
            let occurrence = match state.phase {
                Phase::Idle | Phase::Snoozed => {
                    Some(occurrence_for_trigger(&alarm, now, self.inner.settings.late_ring_limit))
                }
                // ring the occurrence whose sunrise is already running
                Phase::Sunrising if state.active_alarm.as_ref().is_some_and(|a| a.id == alarm_id) => {
                    Some(state.occurrence)
                }
                Phase::Sunrising | Phase::Ringing => None,
            };
            match occurrence {
                Some(occurrence) => self.ring(&mut state, alarm, occurrence, false, now, &mut fx),
                None => tracing::info!(alarm = alarm_id, "trigger ignored: another alarm is active"),
            }
            occurrence.is_some()
        };
        self.apply(fx);
        Ok(rang)
    }

    // ── Subscribers ──────────────────────────────────────────────────

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.bus.unsubscribe(id)
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// The state-machine phase. Idle while a snooze is pending.
    pub fn phase(&self) -> Phase {
        lock(&self.inner.state).phase
    }

    pub fn active_alarm(&self) -> Option<AlarmRecord> {
        lock(&self.inner.state).active_alarm.clone()
    }

    pub fn is_alarm_active(&self) -> bool {
        self.phase() == Phase::Ringing
    }

    pub fn is_sunrise_active(&self) -> bool {
        self.phase() == Phase::Sunrising
    }

    pub fn ramp(&self) -> &SunriseRamp {
        &self.inner.ramp
    }

    pub fn fader(&self) -> &AudioFader {
        &self.inner.fader
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let state = lock(&self.inner.state);
        let next_snooze = state.snoozes.iter().min_by_key(|s| s.due);
        let fade = self.inner.fader.fade_state();
        EngineSnapshot {
            phase: state.reported_phase(),
            active_alarm: state.active_alarm.clone(),
            phase_since: state.phase_since,
            ring_at: state.occurrence.map(|o| o.ring_at),
            snoozed_alarm: next_snooze.map(|s| s.alarm.clone()),
            snooze_due: next_snooze.map(|s| s.due),
            ramp: self.inner.ramp.status(),
            volume: fade.volume,
            fade: fade.direction,
        }
    }
}

/// The engine, if `session` is still the live sunrise.
fn sunrise_session(weak: &Weak<Inner>, session: u64) -> Option<Arc<Inner>> {
    let inner = weak.upgrade()?;
    let live = {
        let state = lock(&inner.state);
        state.session == session && state.phase == Phase::Sunrising
    };
    live.then_some(inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::MemoryAlarmRepository;
    use crate::timer::ManualClock;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        // 2024-03-04 is a Monday
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(h, m, s).unwrap()
    }

    fn engine(alarms: Vec<AlarmRecord>) -> (AlarmEngine, Arc<MemoryAlarmRepository>, Arc<Mutex<Vec<String>>>) {
        engine_with_clock(alarms, Arc::new(ManualClock::new(at(0, 0, 0))))
    }

    fn engine_with_clock(
        alarms: Vec<AlarmRecord>,
        clock: Arc<ManualClock>,
    ) -> (AlarmEngine, Arc<MemoryAlarmRepository>, Arc<Mutex<Vec<String>>>) {
        let repo = Arc::new(MemoryAlarmRepository::new(alarms));
        let engine = AlarmEngine::builder(repo.clone()).clock(clock).build();
        let names = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&names);
        engine.subscribe(move |e| {
            if e.name() != "sunrise_progress" {
                sink.lock().unwrap().push(e.name().to_string());
            }
            Ok(())
        });
        (engine, repo, names)
    }

    #[tokio::test(start_paused = true)]
    async fn sunrise_then_ring_then_dismiss() {
        let (engine, repo, names) = engine(vec![AlarmRecord::new("a", 7, 0).with_repeat([1])]);

        assert_eq!(engine.tick_at(at(6, 29, 59)), TickOutcome::Unchanged);
        assert_eq!(
            engine.tick_at(at(6, 30, 0)),
            TickOutcome::SunriseStarted { alarm_id: "a".into() }
        );
        assert!(engine.is_sunrise_active());
        assert!(engine.ramp().is_running());

        assert_eq!(
            engine.tick_at(at(7, 0, 0)),
            TickOutcome::Triggered { alarm_id: "a".into() }
        );
        assert!(engine.is_alarm_active());
        assert!(!engine.ramp().is_running());
        // repeating alarms stay enabled
        assert!(repo.get("a").unwrap().enabled);

        assert!(engine.dismiss());
        assert_eq!(engine.phase(), Phase::Idle);
        // the dismissed occurrence does not ring again today
        assert_eq!(engine.tick_at(at(7, 0, 5)), TickOutcome::Unchanged);
        assert_eq!(
            *names.lock().unwrap(),
            vec!["sunrise_started", "alarm_triggered", "alarm_dismissed"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_is_disabled_after_ringing() {
        let (engine, repo, _) = engine(vec![AlarmRecord::new("once", 7, 0)]);
        engine.tick_at(at(7, 0, 0));
        assert!(engine.is_alarm_active());
        assert!(!repo.get("once").unwrap().enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn repository_failure_skips_tick() {
        let (engine, repo, names) = engine(vec![AlarmRecord::new("a", 7, 0)]);
        repo.set_offline(true);
        assert_eq!(engine.tick_at(at(7, 0, 0)), TickOutcome::Skipped);
        assert_eq!(engine.phase(), Phase::Idle);
        assert!(names.lock().unwrap().is_empty());

        repo.set_offline(false);
        assert!(matches!(engine.tick_at(at(7, 0, 1)), TickOutcome::Triggered { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_mid_sunrise_cancels_ramp() {
        let (engine, repo, names) = engine(vec![AlarmRecord::new("a", 7, 0)]);
        engine.tick_at(at(6, 40, 0));
        assert!(engine.is_sunrise_active());

        repo.set_enabled("a", false).unwrap();
        assert_eq!(
            engine.tick_at(at(6, 40, 1)),
            TickOutcome::SunriseCancelled { alarm_id: "a".into() }
        );
        assert_eq!(engine.phase(), Phase::Idle);
        assert!(!engine.ramp().is_running());
        assert_eq!(names.lock().unwrap().last().map(String::as_str), Some("sunrise_cancelled"));
    }

    #[tokio::test(start_paused = true)]
    async fn snooze_outside_ringing_is_reported() {
        let (engine, _, names) = engine(vec![AlarmRecord::new("a", 7, 0)]);
        assert!(matches!(engine.snooze(9), Err(EngineError::InvalidOperation(_))));
        engine.tick_at(at(6, 45, 0));
        assert!(engine.snooze(9).is_err());
        assert!(engine.is_sunrise_active());
        assert_eq!(*names.lock().unwrap(), vec!["sunrise_started"]);
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_cancels_pending_snooze() {
        let (engine, _, _) = engine(vec![AlarmRecord::new("a", 7, 0)]);
        engine.tick_at(at(7, 0, 0));
        engine.snooze(5).unwrap();
        assert_eq!(engine.snapshot().phase, Phase::Snoozed);

        assert!(engine.dismiss());
        assert_eq!(engine.snapshot().phase, Phase::Idle);
        tokio::time::sleep(StdDuration::from_secs(6 * 60)).await;
        assert_eq!(engine.phase(), Phase::Idle);
        // nothing left to call off
        assert!(!engine.dismiss());
    }

    #[tokio::test(start_paused = true)]
    async fn notification_trigger_rings_named_alarm() {
        let (engine, _, _) = engine(vec![AlarmRecord::new("a", 7, 0), AlarmRecord::new("b", 8, 0)]);
        assert!(engine.trigger_by_id("b").unwrap());
        assert_eq!(engine.active_alarm().unwrap().id, "b");
        assert!(!engine.trigger_by_id("a").unwrap());
        assert!(engine.trigger_by_id("zzz").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_during_sunrise_across_midnight_handles_that_occurrence() {
        let clock = Arc::new(ManualClock::new(at(23, 45, 0)));
        let daily = AlarmRecord::new("a", 0, 10)
            .with_repeat([0, 1, 2, 3, 4, 5, 6])
            .with_sunrise(30);
        let (engine, _, _) = engine_with_clock(vec![daily], clock.clone());

        assert_eq!(
            engine.tick_at(at(23, 45, 0)),
            TickOutcome::SunriseStarted { alarm_id: "a".into() }
        );
        clock.set(at(23, 50, 0));
        assert!(engine.trigger_by_id("a").unwrap());
        assert_eq!(engine.snapshot().ring_at, Some(at(0, 10, 0) + Duration::days(1)));

        clock.set(at(23, 55, 0));
        assert!(engine.dismiss());
        assert_eq!(engine.tick_at(at(23, 55, 1)), TickOutcome::Unchanged);
        assert_eq!(engine.tick_at(at(0, 10, 0) + Duration::days(1)), TickOutcome::Unchanged);
        assert_eq!(engine.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_from_idle_marks_the_coming_occurrence() {
        let clock = Arc::new(ManualClock::new(at(6, 0, 0)));
        let (engine, _, _) = engine_with_clock(vec![AlarmRecord::new("a", 7, 0).with_repeat([1])], clock);

        assert!(engine.trigger_by_id("a").unwrap());
        assert_eq!(engine.snapshot().ring_at, Some(at(7, 0, 0)));
        assert!(engine.dismiss());
        // the early ring counts for this morning
        assert_eq!(engine.tick_at(at(6, 45, 0)), TickOutcome::Unchanged);
        assert_eq!(engine.tick_at(at(7, 0, 0)), TickOutcome::Unchanged);
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_when_idle_does_nothing() {
        let (engine, _, names) = engine(vec![AlarmRecord::new("a", 7, 0).with_repeat([1])]);
        assert!(!engine.dismiss());
        assert_eq!(engine.phase(), Phase::Idle);
        assert_eq!(engine.snapshot().phase, Phase::Idle);
        assert!(names.lock().unwrap().is_empty());

        // also after a completed wake
        engine.tick_at(at(7, 0, 0));
        assert!(engine.dismiss());
        assert!(!engine.dismiss());
        assert_eq!(*names.lock().unwrap(), vec!["alarm_triggered", "alarm_dismissed"]);
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_is_idempotent() {
        let (engine, _, _) = engine(Vec::new());
        assert!(engine.initialize());
        assert!(!engine.initialize());
        assert!(engine.is_running());
        engine.stop_all();
        assert!(!engine.is_running());
    }
}
