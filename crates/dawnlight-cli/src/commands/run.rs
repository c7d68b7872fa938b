//! Foreground engine runner.
//!
//! Streams engine events to stdout as JSON lines and reads single-letter
//! commands from stdin: `s` snooze, `d` dismiss, `status`, `q` quit.

use std::sync::Arc;

use clap::Args;
use dawnlight_core::ambient::{
    AmbientEffector, BrightnessControl, SimulatedBacklight, SimulatedTorch, SunriseRamp, SysfsBacklight,
    SysfsLed, TorchControl, Unsupported, DEFAULT_BASELINE,
};
use dawnlight_core::audio::{AudioFader, NoAudio, SimulatedSoundDevice, SoundDevice};
use dawnlight_core::notify::TracingNotifier;
use dawnlight_core::{AlarmEngine, AlarmStore, Config};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Args)]
pub struct RunArgs {
    /// Use simulated screen, torch and speaker even when real devices exist
    #[arg(long)]
    simulate: bool,
    /// Ring this alarm right away, as if its notification was tapped
    #[arg(long)]
    trigger: Option<String>,
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_engine(args))
}

async fn run_engine(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store = Arc::new(AlarmStore::open()?);

    let engine = AlarmEngine::builder(store)
        .ramp(SunriseRamp::new(build_effector(&config, args.simulate)))
        .fader(AudioFader::new(build_sound_device(&config, args.simulate), config.fade_steps()))
        .notifier(Arc::new(TracingNotifier))
        .settings(config.engine_settings())
        .build();

    engine.subscribe(|event| {
        println!("{}", serde_json::to_string(event)?);
        Ok(())
    });
    engine.initialize();

    if let Some(id) = args.trigger {
        if !engine.trigger_by_id(&id)? {
            eprintln!("another alarm is active; '{id}' not triggered");
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => match line.trim() {
                    "" => {}
                    "s" | "snooze" => {
                        if let Err(e) = engine.snooze_default() {
                            eprintln!("{e}");
                        }
                    }
                    "d" | "dismiss" => {
                        if !engine.dismiss() {
                            eprintln!("nothing to dismiss");
                        }
                    }
                    "status" => println!("{}", serde_json::to_string(&engine.snapshot())?),
                    "q" | "quit" => break,
                    other => eprintln!("unknown command '{other}' (s = snooze, d = dismiss, status, q = quit)"),
                },
                // Detached from a terminal: keep running until interrupted.
                None => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    engine.stop_all();
    Ok(())
}

fn build_sound_device(config: &Config, simulate: bool) -> Arc<dyn SoundDevice> {
    if simulate {
        return Arc::new(SimulatedSoundDevice::new());
    }
    match open_speaker(config) {
        Some(device) => device,
        None => Arc::new(NoAudio),
    }
}

#[cfg(feature = "native-audio")]
fn open_speaker(config: &Config) -> Option<Arc<dyn SoundDevice>> {
    use dawnlight_core::audio::NativeSoundDevice;

    let dir = match config.sounds_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!("{e}; alarms will be silent");
            return None;
        }
    };
    match NativeSoundDevice::open_default(dir) {
        Ok(device) => Some(Arc::new(device)),
        Err(e) => {
            tracing::warn!("{e}; alarms will be silent");
            None
        }
    }
}

#[cfg(not(feature = "native-audio"))]
fn open_speaker(_config: &Config) -> Option<Arc<dyn SoundDevice>> {
    tracing::warn!("built without the native-audio feature; alarms will be silent");
    None
}

fn build_effector(config: &Config, simulate: bool) -> AmbientEffector {
    let policy = config.light_policy();
    if simulate {
        return AmbientEffector::new(
            Arc::new(SimulatedBacklight::new(DEFAULT_BASELINE)),
            Arc::new(SimulatedTorch::new()),
            policy,
        );
    }

    let brightness: Arc<dyn BrightnessControl> = match SysfsBacklight::open(config.devices.backlight.as_deref()) {
        Ok(backlight) => Arc::new(backlight),
        Err(e) => {
            tracing::warn!("{e}; using a simulated backlight");
            Arc::new(SimulatedBacklight::new(DEFAULT_BASELINE))
        }
    };
    let torch: Arc<dyn TorchControl> = match SysfsLed::open(config.devices.led.as_deref()) {
        Ok(led) => Arc::new(led),
        Err(e) => {
            tracing::warn!("{e}; torch disabled");
            Arc::new(Unsupported)
        }
    };
    AmbientEffector::new(brightness, torch, policy)
}
