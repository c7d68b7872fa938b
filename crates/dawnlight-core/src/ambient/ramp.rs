//! Sunrise ramp.
//!
//! Drives the [`AmbientEffector`] once per second from dark to full daylight
//! over the requested duration and reports each step to the caller. Only one
//! ramp can run at a time; a second `start` is rejected while the first keeps
//! running.
//!
//! ```text
//! start ──tick──► progress = step / total ──► ... ──► progress = 1 ──► on_complete
//!   │
//!   └── stop()  cancels ticking          reset()  stop + restore baseline
//! ```

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use super::color::{ColorRamp, Rgb};
use super::effector::AmbientEffector;
use crate::error::EngineError;
use crate::lock;
use crate::timer::{spawn_interval, TimerHandle};

/// Interval between ramp steps.
pub const RAMP_TICK: Duration = Duration::from_secs(1);

pub type ProgressFn = Arc<dyn Fn(Rgb, f64) + Send + Sync>;
pub type CompleteFn = Box<dyn FnOnce() + Send>;

/// Live state of one ramp, created on start and dropped on stop or completion.
struct RampState {
    started_at: Instant,
    duration_minutes: u32,
    total_steps: u64,
    step: u64,
    last_progress: f64,
    timer: TimerHandle,
    on_progress: ProgressFn,
    on_complete: Option<CompleteFn>,
}

/// Read-only view of a running ramp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RampStatus {
    pub duration_minutes: u32,
    pub step: u64,
    pub total_steps: u64,
    pub progress: f64,
    pub elapsed_secs: u64,
}

struct Slot {
    ramp: Option<RampState>,
    generation: u64,
}

struct Inner {
    effector: AmbientEffector,
    state: Mutex<Slot>,
}

#[derive(Clone)]
pub struct SunriseRamp {
    inner: Arc<Inner>,
}

impl SunriseRamp {
    pub fn new(effector: AmbientEffector) -> Self {
        Self {
            inner: Arc::new(Inner {
                effector,
                state: Mutex::new(Slot {
                    ramp: None,
                    generation: 0,
                }),
            }),
        }
    }

    pub fn effector(&self) -> &AmbientEffector {
        &self.inner.effector
    }

    /// Begin a ramp of `duration_minutes`.
    ///
    /// # Errors
    /// `EngineError::ConcurrentStartRejected` if a ramp is already running;
    /// the running ramp is left untouched.
    pub fn start<P, C>(&self, duration_minutes: u32, on_progress: P, on_complete: C) -> Result<(), EngineError>
    where
        P: Fn(Rgb, f64) + Send + Sync + 'static,
        C: FnOnce() + Send + 'static,
    {
        let mut slot = lock(&self.inner.state);
        if slot.ramp.is_some() {
            tracing::warn!("sunrise ramp already running; start ignored");
            return Err(EngineError::ConcurrentStartRejected);
        }

        slot.generation += 1;
        let generation = slot.generation;
        let total_steps = (u64::from(duration_minutes) * 60).max(1);

        self.inner.effector.capture_baseline();
        self.inner.effector.set_brightness(0.0);

        let weak = Arc::downgrade(&self.inner);
        let timer = spawn_interval(RAMP_TICK, move || ramp_step(&weak, generation));

        slot.ramp = Some(RampState {
            started_at: Instant::now(),
            duration_minutes,
            total_steps,
            step: 0,
            last_progress: 0.0,
            timer,
            on_progress: Arc::new(on_progress),
            on_complete: Some(Box::new(on_complete)),
        });
        tracing::info!(duration_minutes, total_steps, "sunrise ramp started");
        Ok(())
    }

    /// Cancel ticking. Does not touch brightness or light.
    pub fn stop(&self) {
        let mut slot = lock(&self.inner.state);
        slot.generation += 1;
        if let Some(ramp) = slot.ramp.take() {
            ramp.timer.cancel();
            tracing::info!(step = ramp.step, "sunrise ramp stopped");
        }
    }

    /// Stop, then restore baseline brightness and switch the light off.
    pub fn reset(&self) {
        self.stop();
        self.inner.effector.restore();
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.state).ramp.is_some()
    }

    /// Progress of the running ramp, 0 when idle.
    pub fn progress(&self) -> f64 {
        lock(&self.inner.state)
            .ramp
            .as_ref()
            .map_or(0.0, |r| r.last_progress)
    }

    pub fn status(&self) -> Option<RampStatus> {
        let slot = lock(&self.inner.state);
        slot.ramp.as_ref().map(|r| RampStatus {
            duration_minutes: r.duration_minutes,
            step: r.step,
            total_steps: r.total_steps,
            progress: r.last_progress,
            elapsed_secs: r.started_at.elapsed().as_secs(),
        })
    }
}

fn ramp_step(weak: &Weak<Inner>, generation: u64) -> ControlFlow<()> {
    let Some(inner) = weak.upgrade() else {
        return ControlFlow::Break(());
    };

    let (color, progress, on_progress, on_complete) = {
        let mut slot = lock(&inner.state);
        if slot.generation != generation {
            return ControlFlow::Break(());
        }
        let Some(ramp) = slot.ramp.as_mut() else {
            return ControlFlow::Break(());
        };

        ramp.step += 1;
        let raw = (ramp.step as f64 / ramp.total_steps as f64).clamp(0.0, 1.0);
        let progress = raw.max(ramp.last_progress);
        ramp.last_progress = progress;
        let color = ColorRamp::sample(progress);
        let on_progress = Arc::clone(&ramp.on_progress);

        // Effector writes happen under the slot lock so stop()/reset() cannot
        // interleave with a half-applied step.
        inner.effector.apply_progress(progress);

        let on_complete = if ramp.step >= ramp.total_steps {
            let on_complete = ramp.on_complete.take();
            slot.ramp = None;
            tracing::info!("sunrise ramp complete");
            on_complete
        } else {
            None
        };
        (color, progress, on_progress, on_complete)
    };

    on_progress(color, progress);
    match on_complete {
        Some(done) => {
            done();
            ControlFlow::Break(())
        }
        None => ControlFlow::Continue(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ambient::device::{SimulatedBacklight, SimulatedTorch};
    use crate::ambient::effector::{LightPolicy, LightState};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Rig {
        ramp: SunriseRamp,
        backlight: Arc<SimulatedBacklight>,
        torch: Arc<SimulatedTorch>,
        progress: Arc<Mutex<Vec<f64>>>,
        completions: Arc<AtomicUsize>,
    }

    fn rig() -> Rig {
        let backlight = Arc::new(SimulatedBacklight::new(0.6));
        let torch = Arc::new(SimulatedTorch::new());
        let effector = AmbientEffector::new(backlight.clone(), torch.clone(), LightPolicy::default());
        Rig {
            ramp: SunriseRamp::new(effector),
            backlight,
            torch,
            progress: Arc::new(Mutex::new(Vec::new())),
            completions: Arc::new(AtomicUsize::new(0)),
        }
    }

    impl Rig {
        fn start(&self, minutes: u32) -> Result<(), EngineError> {
            let progress = Arc::clone(&self.progress);
            let completions = Arc::clone(&self.completions);
            self.ramp.start(
                minutes,
                move |_, p| progress.lock().unwrap().push(p),
                move || {
                    completions.fetch_add(1, Ordering::SeqCst);
                },
            )
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_to_completion_exactly_once() {
        for minutes in [1, 2, 5] {
            let rig = rig();
            rig.start(minutes).unwrap();
            tokio::time::sleep(Duration::from_secs(u64::from(minutes) * 60) + Duration::from_millis(500)).await;

            let progress = rig.progress.lock().unwrap().clone();
            assert_eq!(progress.len(), minutes as usize * 60);
            assert_eq!(*progress.last().unwrap(), 1.0);
            assert!(progress.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(rig.completions.load(Ordering::SeqCst), 1);
            assert!(!rig.ramp.is_running());

            tokio::time::sleep(Duration::from_secs(120)).await;
            assert_eq!(rig.completions.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected_and_first_keeps_running() {
        let rig = rig();
        rig.start(1).unwrap();
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        let before = rig.ramp.status().unwrap();

        assert_eq!(rig.start(5), Err(EngineError::ConcurrentStartRejected));
        assert_eq!(rig.ramp.status().unwrap(), before);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(rig.completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn brightness_tracks_progress_and_light_ends_on() {
        let rig = rig();
        rig.start(1).unwrap();
        assert_eq!(rig.backlight.level(), 0.0);

        tokio::time::sleep(Duration::from_millis(30_500)).await;
        assert!((rig.backlight.level() - 0.5).abs() < 1e-9);
        assert!(matches!(rig.ramp.effector().light(), LightState::Pulsing { .. }));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(rig.backlight.level(), 1.0);
        assert_eq!(rig.ramp.effector().light(), LightState::On);
        assert!(rig.torch.is_on());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_freezes_progress_and_reset_restores() {
        let rig = rig();
        rig.start(1).unwrap();
        tokio::time::sleep(Duration::from_millis(45_500)).await;
        rig.ramp.stop();
        rig.ramp.stop();
        let delivered = rig.progress.lock().unwrap().len();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(rig.progress.lock().unwrap().len(), delivered);
        assert_eq!(rig.completions.load(Ordering::SeqCst), 0);
        assert!(rig.torch.toggles() > 0);

        rig.ramp.reset();
        assert!((rig.backlight.level() - 0.6).abs() < 1e-9);
        assert!(!rig.torch.is_on());
        assert_eq!(rig.ramp.effector().light(), LightState::Off);
    }

    #[test]
    fn reset_without_start_uses_default_baseline() {
        let rig = rig();
        rig.ramp.reset();
        assert_eq!(rig.ramp.effector().level(), Some(0.5));
        assert!(!rig.ramp.is_running());
        assert_eq!(rig.ramp.progress(), 0.0);
    }
}
