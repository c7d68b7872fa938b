//! Volume fades on a single sound handle.
//!
//! A fade is a fixed number of equal steps on a periodic timer. Starting a
//! fade cancels the one in flight, so at most one fade timer exists per
//! handle. Volume is always kept in `[0, 1]`.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::device::{SoundDevice, SoundHandle};
use crate::error::CapabilityError;
use crate::lock;
use crate::timer::{spawn_interval, TimerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FadeDirection {
    None,
    In,
    Out,
}

/// Step granularity of fades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FadeSteps {
    pub fade_in: u32,
    pub fade_out: u32,
}

impl Default for FadeSteps {
    fn default() -> Self {
        Self {
            fade_in: 100,
            fade_out: 50,
        }
    }
}

/// Observable fade state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FadeState {
    pub volume: f64,
    pub direction: FadeDirection,
    pub duration: Duration,
    pub step: u32,
    pub steps: u32,
}

struct Fade {
    from: f64,
    to: f64,
    step: u32,
    steps: u32,
    duration: Duration,
    direction: FadeDirection,
    timer: TimerHandle,
}

struct FaderState {
    handle: Option<Box<dyn SoundHandle>>,
    sound: Option<String>,
    playing: bool,
    volume: f64,
    fade: Option<Fade>,
    generation: u64,
}

impl FaderState {
    fn cancel_fade(&mut self) {
        self.generation += 1;
        if let Some(fade) = self.fade.take() {
            fade.timer.cancel();
        }
    }

    fn apply_volume(&mut self, volume: f64) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(handle) = self.handle.as_mut() {
            if let Err(e) = handle.set_volume(self.volume) {
                tracing::warn!("set_volume failed: {e}");
            }
        }
    }

    fn halt(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            if let Err(e) = handle.stop() {
                tracing::warn!("sound stop failed: {e}");
            }
        }
        self.playing = false;
    }
}

struct Inner {
    device: Arc<dyn SoundDevice>,
    steps: FadeSteps,
    state: Mutex<FaderState>,
}

/// Cloneable handle to the audio fader.
#[derive(Clone)]
pub struct AudioFader {
    inner: Arc<Inner>,
}

impl AudioFader {
    pub fn new(device: Arc<dyn SoundDevice>, steps: FadeSteps) -> Self {
        Self {
            inner: Arc::new(Inner {
                device,
                steps,
                state: Mutex::new(FaderState {
                    handle: None,
                    sound: None,
                    playing: false,
                    volume: 0.0,
                    fade: None,
                    generation: 0,
                }),
            }),
        }
    }

    /// Prepare the output device. Failure leaves the fader usable but silent.
    pub fn initialize(&self) {
        if let Err(e) = self.inner.device.initialize() {
            tracing::warn!("audio initialisation failed: {e}");
        }
    }

    /// Replace the loaded sound. The previous handle is released before the
    /// new one is opened.
    ///
    /// # Errors
    /// Returns the device error when the new sound cannot be opened; the fader
    /// is then empty.
    pub fn load(&self, sound: &str) -> Result<(), CapabilityError> {
        let mut state = lock(&self.inner.state);
        state.cancel_fade();
        release(&mut state);

        let handle = self.inner.device.open(sound, true, 0.0)?;
        state.handle = Some(handle);
        state.sound = Some(sound.to_string());
        state.volume = 0.0;
        tracing::debug!(sound, "sound loaded");
        Ok(())
    }

    /// Start playback if needed and fade from the current volume to 1.
    pub fn fade_in(&self, duration: Duration) {
        let mut state = lock(&self.inner.state);
        if state.handle.is_none() {
            tracing::debug!("fade_in with nothing loaded");
            return;
        }
        if !state.playing {
            if let Some(handle) = state.handle.as_mut() {
                if let Err(e) = handle.play() {
                    tracing::warn!("sound play failed: {e}");
                }
            }
            state.playing = true;
        }
        self.begin_fade(&mut state, 1.0, self.inner.steps.fade_in, duration, FadeDirection::In);
    }

    /// Fade from the current volume to 0, then stop playback.
    pub fn fade_out(&self, duration: Duration) {
        let mut state = lock(&self.inner.state);
        if state.handle.is_none() {
            return;
        }
        if state.volume <= 0.0 {
            state.cancel_fade();
            state.halt();
            return;
        }
        self.begin_fade(&mut state, 0.0, self.inner.steps.fade_out, duration, FadeDirection::Out);
    }

    /// Immediate volume change; cancels any fade.
    pub fn set_volume(&self, volume: f64) {
        let mut state = lock(&self.inner.state);
        state.cancel_fade();
        state.apply_volume(volume);
    }

    /// Hard stop. The sound stays loaded.
    pub fn stop(&self) {
        let mut state = lock(&self.inner.state);
        state.cancel_fade();
        state.halt();
        state.volume = 0.0;
    }

    /// Hard stop and release the handle. No fade timer survives this call.
    pub fn unload(&self) {
        let mut state = lock(&self.inner.state);
        state.cancel_fade();
        release(&mut state);
    }

    pub fn volume(&self) -> f64 {
        lock(&self.inner.state).volume
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.inner.state).playing
    }

    pub fn is_loaded(&self) -> bool {
        lock(&self.inner.state).handle.is_some()
    }

    pub fn loaded_sound(&self) -> Option<String> {
        lock(&self.inner.state).sound.clone()
    }

    pub fn fade_state(&self) -> FadeState {
        let state = lock(&self.inner.state);
        match &state.fade {
            Some(fade) => FadeState {
                volume: state.volume,
                direction: fade.direction,
                duration: fade.duration,
                step: fade.step,
                steps: fade.steps,
            },
            None => FadeState {
                volume: state.volume,
                direction: FadeDirection::None,
                duration: Duration::ZERO,
                step: 0,
                steps: 0,
            },
        }
    }

    fn begin_fade(
        &self,
        state: &mut FaderState,
        to: f64,
        steps: u32,
        duration: Duration,
        direction: FadeDirection,
    ) {
        state.cancel_fade();
        let steps = steps.max(1);
        let generation = state.generation;
        let weak = Arc::downgrade(&self.inner);
        let timer = spawn_interval(duration / steps, move || fade_step(&weak, generation));
        state.fade = Some(Fade {
            from: state.volume,
            to,
            step: 0,
            steps,
            duration,
            direction,
            timer,
        });
        tracing::debug!(?direction, from = state.volume, to, ?duration, "fade started");
    }
}

fn release(state: &mut FaderState) {
    state.halt();
    if let Some(handle) = state.handle.take() {
        handle.release();
    }
    state.sound = None;
    state.volume = 0.0;
}

fn fade_step(weak: &Weak<Inner>, generation: u64) -> ControlFlow<()> {
    let Some(inner) = weak.upgrade() else {
        return ControlFlow::Break(());
    };
    let mut state = lock(&inner.state);
    if state.generation != generation {
        return ControlFlow::Break(());
    }
    let Some(fade) = state.fade.as_mut() else {
        return ControlFlow::Break(());
    };

    fade.step += 1;
    let done = fade.step >= fade.steps;
    let volume = if done {
        fade.to
    } else {
        fade.from + (fade.to - fade.from) * f64::from(fade.step) / f64::from(fade.steps)
    };
    let direction = fade.direction;
    state.apply_volume(volume);

    if !done {
        return ControlFlow::Continue(());
    }
    state.fade = None;
    if direction == FadeDirection::Out {
        state.halt();
    }
    tracing::debug!(?direction, volume = state.volume, "fade finished");
    ControlFlow::Break(())
}
