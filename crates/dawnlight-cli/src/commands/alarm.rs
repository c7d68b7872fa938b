//! Alarm management commands for CLI.

use clap::Subcommand;
use dawnlight_core::alarm::{parse_time_of_day, AlarmPatch, AlarmRecord, AlarmSound};
use dawnlight_core::{AlarmStore, Config};

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

#[derive(Subcommand)]
pub enum AlarmAction {
    /// Add an alarm
    Add {
        /// Ring time as HH:MM
        time: String,
        /// Repeat weekdays, 0 = Sunday (e.g. --repeat 1,2,3,4,5)
        #[arg(long, value_delimiter = ',')]
        repeat: Vec<u8>,
        /// Sunrise length in minutes
        #[arg(long)]
        sunrise: Option<u32>,
        /// Alarm sound (see `dawnlight sounds`)
        #[arg(long)]
        sound: Option<AlarmSound>,
        /// Label shown when the alarm rings
        #[arg(long, default_value = "")]
        label: String,
    },
    /// Change an existing alarm
    Edit {
        /// Alarm ID
        id: String,
        /// New ring time as HH:MM
        #[arg(long)]
        time: Option<String>,
        /// New repeat weekdays
        #[arg(long, value_delimiter = ',', conflicts_with = "once")]
        repeat: Option<Vec<u8>>,
        /// Make the alarm one-shot
        #[arg(long)]
        once: bool,
        #[arg(long)]
        sunrise: Option<u32>,
        #[arg(long)]
        sound: Option<AlarmSound>,
        #[arg(long)]
        label: Option<String>,
    },
    /// List alarms
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an alarm
    Remove {
        /// Alarm ID
        id: String,
    },
    /// Enable or disable an alarm
    Toggle {
        /// Alarm ID
        id: String,
    },
}

pub fn run(action: AlarmAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = AlarmStore::open()?;

    match action {
        AlarmAction::Add {
            time,
            repeat,
            sunrise,
            sound,
            label,
        } => {
            let config = Config::load_or_default();
            let (hour, minute) = parse_time_of_day(&time)?;
            let draft = AlarmRecord::new("", hour, minute)
                .with_repeat(repeat)
                .with_sunrise(sunrise.unwrap_or(config.sunrise.default_duration_minutes))
                .with_sound(sound.unwrap_or(config.audio.default_sound))
                .with_label(label);
            let alarm = store.add(draft)?;
            println!("Alarm created: {}", alarm.id);
            println!("{}", describe(&alarm));
        }
        AlarmAction::Edit {
            id,
            time,
            repeat,
            once,
            sunrise,
            sound,
            label,
        } => {
            let repeat = if once { Some(Vec::new()) } else { repeat };
            let (hour, minute) = match time {
                Some(t) => {
                    let (h, m) = parse_time_of_day(&t)?;
                    (Some(h), Some(m))
                }
                None => (None, None),
            };
            let patch = AlarmPatch {
                hour,
                minute,
                repeat,
                sunrise_duration: sunrise,
                sound,
                label,
                ..AlarmPatch::default()
            };
            let alarm = store.update(&id, &patch)?;
            println!("{}", describe(&alarm));
        }
        AlarmAction::List { json } => {
            let alarms = store.load_all()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&alarms)?);
            } else if alarms.is_empty() {
                println!("No alarms.");
            } else {
                for alarm in &alarms {
                    println!("{}", describe(alarm));
                }
            }
        }
        AlarmAction::Remove { id } => {
            if !store.delete(&id)? {
                return Err(format!("alarm '{id}' not found").into());
            }
            println!("Alarm removed: {id}");
        }
        AlarmAction::Toggle { id } => {
            let alarm = store.toggle(&id)?;
            println!(
                "Alarm {} {}",
                alarm.id,
                if alarm.enabled { "enabled" } else { "disabled" }
            );
        }
    }
    Ok(())
}

fn repeat_label(repeat: &[u8]) -> String {
    match repeat.len() {
        0 => "once".to_string(),
        7 => "daily".to_string(),
        _ => {
            let mut days = repeat.to_vec();
            days.sort_unstable();
            days.iter()
                .filter_map(|&d| WEEKDAYS.get(usize::from(d)).copied())
                .collect::<Vec<_>>()
                .join(",")
        }
    }
}

fn describe(alarm: &AlarmRecord) -> String {
    let mut line = format!(
        "{}  {}  {:<3}  {:<27}  sunrise {}m  {}",
        alarm.id,
        alarm.time_label(),
        if alarm.enabled { "on" } else { "off" },
        repeat_label(&alarm.repeat),
        alarm.sunrise_duration,
        alarm.sound.display_name(),
    );
    if !alarm.label.is_empty() {
        line.push_str("  ");
        line.push_str(&alarm.label);
    }
    line
}
