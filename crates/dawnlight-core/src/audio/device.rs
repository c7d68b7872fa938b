//! Sound output capability.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::CapabilityError;
use crate::lock;

/// Opens sounds by selector key.
pub trait SoundDevice: Send + Sync {
    /// Prepare the output (audio session, mixer). Called once by the engine.
    fn initialize(&self) -> Result<(), CapabilityError> {
        Ok(())
    }

    fn open(&self, sound: &str, looping: bool, volume: f64) -> Result<Box<dyn SoundHandle>, CapabilityError>;
}

/// One loaded sound. Released exactly once through [`SoundHandle::release`].
pub trait SoundHandle: Send {
    fn play(&mut self) -> Result<(), CapabilityError>;
    fn stop(&mut self) -> Result<(), CapabilityError>;
    fn set_volume(&mut self, volume: f64) -> Result<(), CapabilityError>;
    fn release(self: Box<Self>);
}

/// Device without audio output; every open fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAudio;

impl SoundDevice for NoAudio {
    fn open(&self, _sound: &str, _looping: bool, _volume: f64) -> Result<Box<dyn SoundHandle>, CapabilityError> {
        Err(CapabilityError::unavailable("audio", "no output device"))
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SimulatedPlayback {
    pub sound: Option<String>,
    pub playing: bool,
    pub volume: f64,
    pub volume_changes: usize,
}

#[derive(Debug, Default)]
struct SimulatedShared {
    playback: Mutex<SimulatedPlayback>,
    live_handles: AtomicUsize,
    opened: AtomicUsize,
}

/// In-memory sound device. Tracks live handles so leaks are observable.
#[derive(Debug, Default, Clone)]
pub struct SimulatedSoundDevice {
    shared: Arc<SimulatedShared>,
}

impl SimulatedSoundDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn playback(&self) -> SimulatedPlayback {
        lock(&self.shared.playback).clone()
    }

    /// Handles opened and not yet released.
    pub fn live_handles(&self) -> usize {
        self.shared.live_handles.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }
}

impl SoundDevice for SimulatedSoundDevice {
    fn open(&self, sound: &str, _looping: bool, volume: f64) -> Result<Box<dyn SoundHandle>, CapabilityError> {
        self.shared.live_handles.fetch_add(1, Ordering::SeqCst);
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        {
            let mut playback = lock(&self.shared.playback);
            playback.sound = Some(sound.to_string());
            playback.playing = false;
            playback.volume = volume;
        }
        tracing::debug!(sound, "simulated sound opened");
        Ok(Box::new(SimulatedHandle {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct SimulatedHandle {
    shared: Arc<SimulatedShared>,
}

impl SoundHandle for SimulatedHandle {
    fn play(&mut self) -> Result<(), CapabilityError> {
        lock(&self.shared.playback).playing = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CapabilityError> {
        lock(&self.shared.playback).playing = false;
        Ok(())
    }

    fn set_volume(&mut self, volume: f64) -> Result<(), CapabilityError> {
        let mut playback = lock(&self.shared.playback);
        playback.volume = volume;
        playback.volume_changes += 1;
        Ok(())
    }

    fn release(self: Box<Self>) {
        self.shared.live_handles.fetch_sub(1, Ordering::SeqCst);
        let mut playback = lock(&self.shared.playback);
        playback.sound = None;
        playback.playing = false;
    }
}
