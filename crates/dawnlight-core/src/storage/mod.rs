mod alarm_store;
mod config;

pub use alarm_store::AlarmStore;
pub use config::{AudioConfig, Config, DevicesConfig, EngineConfig, SunriseConfig};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Environment variable selecting the data directory flavor.
const ENV_VAR: &str = "DAWNLIGHT_ENV";

/// `<home>/.config/dawnlight`, or `dawnlight-dev` when `env` is `dev`.
fn data_dir_under(home: &Path, env: Option<&str>) -> PathBuf {
    let name = match env {
        Some("dev") => "dawnlight-dev",
        _ => "dawnlight",
    };
    home.join(".config").join(name)
}

/// Directory holding `config.toml` and `alarms.toml`, created on demand.
///
/// # Errors
/// No home directory, or the directory cannot be created.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or_else(|| ConfigError::DataDir("no home directory".into()))?;
    let env = std::env::var(ENV_VAR).ok();
    let dir = data_dir_under(&home, env.as_deref());
    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_env_gets_its_own_directory() {
        let home = Path::new("/home/sam");
        assert_eq!(data_dir_under(home, None), Path::new("/home/sam/.config/dawnlight"));
        assert_eq!(data_dir_under(home, Some("production")), Path::new("/home/sam/.config/dawnlight"));
        assert_eq!(data_dir_under(home, Some("dev")), Path::new("/home/sam/.config/dawnlight-dev"));
    }
}
