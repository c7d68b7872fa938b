//! Brightness and auxiliary light driver.
//!
//! The effector owns both capabilities exclusively. Device failures are
//! logged and swallowed so a ramp always runs its full timeline.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::device::{BrightnessControl, TorchControl, Unsupported};
use crate::lock;
use crate::timer::{spawn_interval, TimerHandle};

/// Brightness restored when no baseline could be read.
pub const DEFAULT_BASELINE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum LightState {
    Off,
    On,
    Pulsing { period_ms: u64 },
}

/// How the auxiliary light follows ramp progress.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightPolicy {
    /// Progress at which pulsing begins.
    pub pulse_start: f64,
    /// Progress from which the light is held steadily on.
    pub steady_at: f64,
    pub max_period_ms: u64,
    pub min_period_ms: u64,
}

impl Default for LightPolicy {
    fn default() -> Self {
        Self {
            pulse_start: 0.3,
            steady_at: 0.94,
            max_period_ms: 1000,
            min_period_ms: 200,
        }
    }
}

impl LightPolicy {
    /// Off below `pulse_start`, steady from `steady_at`, pulsing in between
    /// with a period falling linearly from `max_period_ms` towards
    /// `min_period_ms` across `[pulse_start, 1]`.
    pub fn light_for(&self, progress: f64) -> LightState {
        if progress < self.pulse_start {
            return LightState::Off;
        }
        if progress >= self.steady_at {
            return LightState::On;
        }
        let span = (1.0 - self.pulse_start).max(f64::EPSILON);
        let fraction = ((progress - self.pulse_start) / span).clamp(0.0, 1.0);
        let max = self.max_period_ms as f64;
        let min = self.min_period_ms.min(self.max_period_ms) as f64;
        let period = (max - (max - min) * fraction).clamp(min, max);
        LightState::Pulsing {
            period_ms: period.round() as u64,
        }
    }
}

struct EffectorState {
    light: LightState,
    torch_lit: bool,
    pulse: Option<TimerHandle>,
    pulse_generation: u64,
    baseline: Option<f64>,
    level: Option<f64>,
}

struct Inner {
    brightness: Arc<dyn BrightnessControl>,
    torch: Arc<dyn TorchControl>,
    policy: LightPolicy,
    state: Mutex<EffectorState>,
}

/// Cloneable handle to the ambient effector.
#[derive(Clone)]
pub struct AmbientEffector {
    inner: Arc<Inner>,
}

impl AmbientEffector {
    pub fn new(
        brightness: Arc<dyn BrightnessControl>,
        torch: Arc<dyn TorchControl>,
        policy: LightPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                brightness,
                torch,
                policy,
                state: Mutex::new(EffectorState {
                    light: LightState::Off,
                    torch_lit: false,
                    pulse: None,
                    pulse_generation: 0,
                    baseline: None,
                    level: None,
                }),
            }),
        }
    }

    /// An effector with no hardware behind it.
    pub fn unsupported() -> Self {
        Self::new(Arc::new(Unsupported), Arc::new(Unsupported), LightPolicy::default())
    }

    pub fn policy(&self) -> LightPolicy {
        self.inner.policy
    }

    pub fn light(&self) -> LightState {
        lock(&self.inner.state).light
    }

    pub fn torch_lit(&self) -> bool {
        lock(&self.inner.state).torch_lit
    }

    /// Last brightness level this effector applied.
    pub fn level(&self) -> Option<f64> {
        lock(&self.inner.state).level
    }

    pub fn baseline(&self) -> Option<f64> {
        lock(&self.inner.state).baseline
    }

    /// Remember the current device brightness for [`AmbientEffector::restore`].
    pub fn capture_baseline(&self) {
        let read = self.inner.brightness.brightness();
        let mut state = lock(&self.inner.state);
        match read {
            Ok(level) => state.baseline = Some(level),
            Err(e) => {
                tracing::warn!("could not read baseline brightness: {e}");
            }
        }
    }

    pub fn set_brightness(&self, level: f64) {
        let level = level.clamp(0.0, 1.0);
        if let Err(e) = self.inner.brightness.set_brightness(level) {
            tracing::warn!("set_brightness({level:.3}) failed: {e}");
        }
        lock(&self.inner.state).level = Some(level);
    }

    pub fn set_light(&self, light: LightState) {
        let mut state = lock(&self.inner.state);
        if state.light == light {
            return;
        }
        // Any running pulse loop belongs to the previous state.
        if let Some(pulse) = state.pulse.take() {
            pulse.cancel();
        }
        state.pulse_generation += 1;
        state.light = light;

        match light {
            LightState::Off => self.drive_torch(&mut state, false),
            LightState::On => self.drive_torch(&mut state, true),
            LightState::Pulsing { period_ms } => {
                let generation = state.pulse_generation;
                let weak = Arc::downgrade(&self.inner);
                state.pulse = Some(spawn_interval(
                    Duration::from_millis(period_ms),
                    move || pulse_step(&weak, generation),
                ));
            }
        }
    }

    pub fn turn_off(&self) {
        self.set_light(LightState::Off);
    }

    /// Brightness follows progress; the light follows the policy.
    pub fn apply_progress(&self, progress: f64) {
        self.set_brightness(progress);
        self.set_light(self.inner.policy.light_for(progress));
    }

    /// Light off, brightness back to the captured baseline.
    pub fn restore(&self) {
        self.turn_off();
        let baseline = self.baseline().unwrap_or(DEFAULT_BASELINE);
        self.set_brightness(baseline);
        tracing::debug!("ambient restored to baseline {baseline:.3}");
    }

    fn drive_torch(&self, state: &mut EffectorState, on: bool) {
        if let Err(e) = self.inner.torch.set_torch(on) {
            tracing::warn!("torch {} failed: {e}", if on { "on" } else { "off" });
        }
        state.torch_lit = on;
    }
}

fn pulse_step(weak: &Weak<Inner>, generation: u64) -> ControlFlow<()> {
    let Some(inner) = weak.upgrade() else {
        return ControlFlow::Break(());
    };
    let mut state = lock(&inner.state);
    if state.pulse_generation != generation {
        return ControlFlow::Break(());
    }
    let next = !state.torch_lit;
    if let Err(e) = inner.torch.set_torch(next) {
        tracing::warn!("torch pulse failed: {e}");
    }
    state.torch_lit = next;
    ControlFlow::Continue(())
}
