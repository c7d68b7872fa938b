//! Speaker output through cpal, with alarm sounds decoded by symphonia.
//!
//! One output stream lives on a dedicated thread for the lifetime of the
//! device. Each opened sound becomes a voice in a shared mixer; the stream
//! callback sums the playing voices. Sounds are decoded once, converted to
//! stereo at the output rate and cached by file name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as DecodeError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::device::{SoundDevice, SoundHandle};
use crate::alarm::AlarmSound;
use crate::error::CapabilityError;
use crate::lock;

const CAPABILITY: &str = "audio";

/// One playing (or paused) sound. Samples are interleaved stereo.
struct Voice {
    samples: Arc<[f32]>,
    looping: bool,
    position: AtomicUsize,
    playing: AtomicBool,
    volume: AtomicU32,
}

impl Voice {
    fn new(samples: Arc<[f32]>, looping: bool, volume: f64) -> Self {
        Self {
            samples,
            looping,
            position: AtomicUsize::new(0),
            playing: AtomicBool::new(false),
            volume: AtomicU32::new((volume as f32).to_bits()),
        }
    }

    fn set_volume(&self, volume: f64) {
        self.volume.store((volume.clamp(0.0, 1.0) as f32).to_bits(), Ordering::Relaxed);
    }

    /// Add this voice into `out`, `channels` samples per frame.
    fn mix_into(&self, out: &mut [f32], channels: usize) {
        if !self.playing.load(Ordering::Acquire) || channels == 0 {
            return;
        }
        let frames = self.samples.len() / 2;
        if frames == 0 {
            return;
        }
        let volume = f32::from_bits(self.volume.load(Ordering::Relaxed));
        let mut pos = self.position.load(Ordering::Relaxed);

        for frame in out.chunks_mut(channels) {
            if pos >= frames {
                if !self.looping {
                    self.playing.store(false, Ordering::Release);
                    break;
                }
                pos = 0;
            }
            let left = self.samples[pos * 2] * volume;
            let right = self.samples[pos * 2 + 1] * volume;
            match frame {
                [mono] => *mono += (left + right) * 0.5,
                [l, r, ..] => {
                    *l += left;
                    *r += right;
                }
                [] => {}
            }
            pos += 1;
        }
        self.position.store(pos, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct Mixer {
    voices: Mutex<Vec<Arc<Voice>>>,
}

impl Mixer {
    /// Called from the stream callback. Skips a buffer rather than wait on
    /// an open or release in progress.
    fn fill(&self, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        let Ok(voices) = self.voices.try_lock() else {
            return;
        };
        for voice in voices.iter() {
            voice.mix_into(out, channels);
        }
    }

    fn add(&self, voice: Arc<Voice>) {
        lock(&self.voices).push(voice);
    }

    fn remove(&self, voice: &Arc<Voice>) {
        lock(&self.voices).retain(|v| !Arc::ptr_eq(v, voice));
    }
}

/// The default output device of the default cpal host.
pub struct NativeSoundDevice {
    sounds_dir: PathBuf,
    mixer: Arc<Mixer>,
    output_rate: u32,
    cache: Mutex<HashMap<PathBuf, Arc<[f32]>>>,
    stop: Arc<AtomicBool>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl NativeSoundDevice {
    /// Open the default output device. Sound files are looked up in
    /// `sounds_dir` by [`AlarmSound::file_name`].
    ///
    /// # Errors
    /// No output device, or the stream could not be built or started.
    pub fn open_default(sounds_dir: PathBuf) -> Result<Self, CapabilityError> {
        let mixer = Arc::new(Mixer::default());
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let thread = {
            let mixer = Arc::clone(&mixer);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("dawnlight-audio".into())
                .spawn(move || run_output_stream(mixer, stop, ready_tx))
                .map_err(|e| CapabilityError::unavailable(CAPABILITY, e.to_string()))?
        };

        let output_rate = match ready_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => return Err(CapabilityError::unavailable(CAPABILITY, "audio thread exited")),
        };
        tracing::info!(rate = output_rate, dir = %sounds_dir.display(), "audio output ready");

        Ok(Self {
            sounds_dir,
            mixer,
            output_rate,
            cache: Mutex::new(HashMap::new()),
            stop,
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn sounds_dir(&self) -> &Path {
        &self.sounds_dir
    }

    fn samples_for(&self, sound: &str) -> Result<Arc<[f32]>, CapabilityError> {
        let path = self.sounds_dir.join(sound_file(sound));
        if let Some(samples) = lock(&self.cache).get(&path) {
            return Ok(Arc::clone(samples));
        }
        let samples: Arc<[f32]> = decode_file(&path, self.output_rate)?.into();
        lock(&self.cache).insert(path, Arc::clone(&samples));
        Ok(samples)
    }
}

impl SoundDevice for NativeSoundDevice {
    fn open(&self, sound: &str, looping: bool, volume: f64) -> Result<Box<dyn SoundHandle>, CapabilityError> {
        let samples = self.samples_for(sound)?;
        let voice = Arc::new(Voice::new(samples, looping, volume));
        self.mixer.add(Arc::clone(&voice));
        tracing::debug!(sound, "sound opened");
        Ok(Box::new(NativeHandle {
            voice,
            mixer: Arc::clone(&self.mixer),
        }))
    }
}

impl Drop for NativeSoundDevice {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = lock(&self.thread).take() {
            let _ = handle.join();
        }
    }
}

struct NativeHandle {
    voice: Arc<Voice>,
    mixer: Arc<Mixer>,
}

impl SoundHandle for NativeHandle {
    fn play(&mut self) -> Result<(), CapabilityError> {
        self.voice.playing.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CapabilityError> {
        self.voice.playing.store(false, Ordering::Release);
        self.voice.position.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn set_volume(&mut self, volume: f64) -> Result<(), CapabilityError> {
        self.voice.set_volume(volume);
        Ok(())
    }

    fn release(self: Box<Self>) {
        self.voice.playing.store(false, Ordering::Release);
        self.mixer.remove(&self.voice);
    }
}

/// `birds` -> `birds.mp3`; unknown selectors are taken as file names.
fn sound_file(sound: &str) -> String {
    AlarmSound::from_str(sound).map_or_else(|_| sound.to_string(), |s| s.file_name())
}

/// Owns the cpal stream until `stop` is set. Reports the output sample rate,
/// or why the stream could not start, through `ready`.
fn run_output_stream(
    mixer: Arc<Mixer>,
    stop: Arc<AtomicBool>,
    ready: mpsc::SyncSender<Result<u32, CapabilityError>>,
) {
    let stream = match build_default_stream(mixer) {
        Ok((stream, rate)) => {
            if let Err(e) = stream.play() {
                let _ = ready.send(Err(CapabilityError::unavailable(CAPABILITY, e.to_string())));
                return;
            }
            let _ = ready.send(Ok(rate));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while !stop.load(Ordering::Acquire) {
        thread::sleep(Duration::from_millis(50));
    }
    drop(stream);
    tracing::debug!("audio output stopped");
}

fn build_default_stream(mixer: Arc<Mixer>) -> Result<(cpal::Stream, u32), CapabilityError> {
    let unavailable = |reason: String| CapabilityError::unavailable(CAPABILITY, reason);

    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| unavailable("no output device".into()))?;
    let supported = device.default_output_config().map_err(|e| unavailable(e.to_string()))?;
    let rate = supported.sample_rate().0;
    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    let stream = match format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer),
        SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer),
        SampleFormat::I32 => build_stream::<i32>(&device, &config, mixer),
        other => Err(unavailable(format!("unsupported sample format {other:?}"))),
    }?;
    Ok((stream, rate))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: Arc<Mixer>,
) -> Result<cpal::Stream, CapabilityError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = usize::from(config.channels);
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                mixer.fill(&mut scratch, channels);
                for (out, &sample) in data.iter_mut().zip(&scratch) {
                    *out = T::from_sample(sample);
                }
            },
            |err| tracing::error!("audio output stream error: {err}"),
            None,
        )
        .map_err(|e| CapabilityError::unavailable(CAPABILITY, e.to_string()))
}

/// Decode `path` to interleaved stereo at `output_rate`.
fn decode_file(path: &Path, output_rate: u32) -> Result<Vec<f32>, CapabilityError> {
    let failed = |reason: String| CapabilityError::call_failed(CAPABILITY, format!("{}: {reason}", path.display()));

    let file = std::fs::File::open(path).map_err(|e| failed(e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| failed(e.to_string()))?;
    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| failed("no audio track".into()))?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| failed(e.to_string()))?;

    let mut interleaved = Vec::new();
    let mut channels = 0;
    let mut source_rate = 0;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(DecodeError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(failed(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // a corrupt frame is skipped
            Err(DecodeError::DecodeError(_)) => continue,
            Err(e) => return Err(failed(e.to_string())),
        };
        let spec = *decoded.spec();
        channels = spec.channels.count();
        source_rate = spec.rate;
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(buffer.samples());
    }

    if channels == 0 || interleaved.is_empty() {
        return Err(failed("no audio decoded".into()));
    }
    Ok(resample(&to_stereo(&interleaved, channels), source_rate, output_rate))
}

/// Mono is duplicated; beyond two channels only the front pair is kept.
fn to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        2 => samples.to_vec(),
        n => samples.chunks_exact(n).flat_map(|f| [f[0], f[1]]).collect(),
    }
}

/// Linear-interpolation rate conversion of interleaved stereo.
fn resample(stereo: &[f32], from: u32, to: u32) -> Vec<f32> {
    let frames = stereo.len() / 2;
    if from == to || from == 0 || to == 0 || frames == 0 {
        return stereo.to_vec();
    }
    let out_frames = (frames as u64 * u64::from(to) / u64::from(from)) as usize;
    let step = f64::from(from) / f64::from(to);
    let mut out = Vec::with_capacity(out_frames * 2);
    for i in 0..out_frames {
        let src = i as f64 * step;
        let i0 = (src.floor() as usize).min(frames - 1);
        let i1 = (i0 + 1).min(frames - 1);
        let t = (src - i0 as f64) as f32;
        for ch in 0..2 {
            let a = stereo[i0 * 2 + ch];
            let b = stereo[i1 * 2 + ch];
            out.push(a + (b - a) * t);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 16-bit PCM WAV with the given interleaved samples.
    fn write_wav(path: &Path, channels: u16, rate: u32, samples: &[i16]) {
        let data_len = (samples.len() * 2) as u32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.extend_from_slice(&(rate * u32::from(channels) * 2).to_le_bytes());
        bytes.extend_from_slice(&(channels * 2).to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        std::fs::write(path, bytes).unwrap();
    }

    fn voice(samples: Vec<f32>, looping: bool) -> Voice {
        let voice = Voice::new(samples.into(), looping, 1.0);
        voice.playing.store(true, Ordering::Release);
        voice
    }

    #[test]
    fn sound_keys_map_to_files() {
        assert_eq!(sound_file("rain"), "rain.mp3");
        assert_eq!(sound_file("custom.ogg"), "custom.ogg");
    }

    #[test]
    fn mono_is_duplicated_and_surround_keeps_front_pair() {
        assert_eq!(to_stereo(&[0.1, 0.2], 1), vec![0.1, 0.1, 0.2, 0.2]);
        assert_eq!(to_stereo(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3), vec![1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn resample_doubles_frames_with_interpolation() {
        let out = resample(&[0.0, 0.0, 1.0, 1.0], 1, 2);
        assert_eq!(out.len(), 8);
        assert_eq!(&out[..6], &[0.0, 0.0, 0.5, 0.5, 1.0, 1.0]);
        assert_eq!(resample(&[0.3, 0.3], 48_000, 48_000), vec![0.3, 0.3]);
    }

    #[test]
    fn looping_voice_wraps_and_one_shot_voice_ends() {
        let mut out = vec![0.0; 6];
        voice(vec![0.5, 0.5, 0.25, 0.25], true).mix_into(&mut out, 2);
        assert_eq!(out, vec![0.5, 0.5, 0.25, 0.25, 0.5, 0.5]);

        let once = voice(vec![0.5, 0.5], false);
        let mut out = vec![0.0; 4];
        once.mix_into(&mut out, 2);
        assert_eq!(out, vec![0.5, 0.5, 0.0, 0.0]);
        assert!(!once.playing.load(Ordering::Acquire));
    }

    #[test]
    fn volume_scales_and_paused_voice_is_silent() {
        let v = voice(vec![1.0, 1.0], true);
        v.set_volume(0.25);
        let mut out = vec![0.0; 1];
        v.mix_into(&mut out, 1);
        assert_eq!(out, vec![0.25]);

        v.playing.store(false, Ordering::Release);
        let mut out = vec![0.0; 2];
        v.mix_into(&mut out, 2);
        assert_eq!(out, vec![0.0, 0.0]);
    }

    #[test]
    fn mixer_drops_released_voices() {
        let mixer = Mixer::default();
        let a = Arc::new(voice(vec![0.25, 0.25], true));
        let b = Arc::new(voice(vec![0.5, 0.5], true));
        mixer.add(Arc::clone(&a));
        mixer.add(Arc::clone(&b));
        let mut out = vec![0.0; 2];
        mixer.fill(&mut out, 2);
        assert_eq!(out, vec![0.75, 0.75]);

        mixer.remove(&a);
        mixer.fill(&mut out, 2);
        assert_eq!(out, vec![0.5, 0.5]);
    }

    #[test]
    fn decodes_wav_to_stereo_at_output_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 1, 8_000, &[0, 16_384, 0, -16_384]);

        let samples = decode_file(&path, 16_000).unwrap();
        assert_eq!(samples.len(), 16);
        assert!((samples[2] - 0.25).abs() < 1e-3);
        assert!((samples[4] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn missing_file_is_a_call_failure() {
        let err = decode_file(Path::new("/nonexistent/birds.mp3"), 48_000).unwrap_err();
        assert!(matches!(err, CapabilityError::CallFailed { .. }));
    }
}
