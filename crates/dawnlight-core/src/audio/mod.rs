//! Alarm sound playback with linear volume fades.

mod device;
mod fader;
#[cfg(feature = "native-audio")]
mod native;

pub use device::{NoAudio, SimulatedPlayback, SimulatedSoundDevice, SoundDevice, SoundHandle};
pub use fader::{AudioFader, FadeDirection, FadeState, FadeSteps};
#[cfg(feature = "native-audio")]
pub use native::NativeSoundDevice;
