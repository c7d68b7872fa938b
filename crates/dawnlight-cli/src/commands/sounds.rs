use dawnlight_core::AlarmSound;
use serde::Serialize;

#[derive(Serialize)]
struct SoundInfo {
    key: &'static str,
    name: &'static str,
    file: String,
}

pub fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let sounds: Vec<SoundInfo> = AlarmSound::ALL
        .iter()
        .map(|s| SoundInfo {
            key: s.key(),
            name: s.display_name(),
            file: s.file_name(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&sounds)?);
    } else {
        for sound in &sounds {
            println!("{:<8} {:<16} {}", sound.key, sound.name, sound.file);
        }
    }
    Ok(())
}
