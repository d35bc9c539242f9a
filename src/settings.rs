use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "rover-tui";

// Blank addresses in hand-edited files count the same as missing ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeviceSettings {
    pub robot_addr: Option<String>,
    pub camera_addr: Option<String>,
}

impl DeviceSettings {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        has_value(&self.robot_addr) && has_value(&self.camera_addr)
    }
}

// Trims whitespace, drops a pasted scheme prefix and any trailing slash.
#[must_use]
pub fn normalize_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed);
    let cleaned = without_scheme.trim_end_matches('/').trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_owned())
    }
}

pub fn settings_path() -> Result<PathBuf> {
    scoped_path("devices.json", APP_DIR)
}

pub fn load_settings() -> Result<DeviceSettings> {
    load_from(&settings_path()?)
}

pub fn save_settings(settings: &DeviceSettings) -> Result<()> {
    save_to(&settings_path()?, settings)
}

fn load_from(path: &Path) -> Result<DeviceSettings> {
    if !path.exists() {
        return Ok(DeviceSettings::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading device settings at {}", path.display()))?;
    let parsed = serde_json::from_str::<DeviceSettings>(&raw)
        .with_context(|| format!("failed parsing device settings at {}", path.display()))?;
    Ok(parsed)
}

fn save_to(path: &Path, settings: &DeviceSettings) -> Result<()> {
    ensure_parent_dir(path)?;

    let payload =
        serde_json::to_string_pretty(settings).context("failed serializing device settings")?;
    fs::write(path, payload)
        .with_context(|| format!("failed writing device settings at {}", path.display()))?;
    Ok(())
}

fn has_value(addr: &Option<String>) -> bool {
    addr.as_deref().is_some_and(|a| !a.trim().is_empty())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating settings directory {}", parent.display()))?;
    }
    Ok(())
}

fn data_root() -> Result<PathBuf> {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .context("unable to determine user data directory")
}

fn scoped_path(file: &str, app_dir: &str) -> Result<PathBuf> {
    Ok(data_root()?.join(app_dir).join(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_scheme_and_trailing_slash() {
        assert_eq!(
            normalize_address(" http://192.168.4.1/ ").as_deref(),
            Some("192.168.4.1")
        );
        assert_eq!(normalize_address("https://rover.local").as_deref(), Some("rover.local"));
        assert_eq!(
            normalize_address("10.0.0.7:8080").as_deref(),
            Some("10.0.0.7:8080")
        );
    }

    #[test]
    fn normalize_rejects_blank_input() {
        assert_eq!(normalize_address(""), None);
        assert_eq!(normalize_address("   "), None);
        assert_eq!(normalize_address("http:///"), None);
    }

    #[test]
    fn blank_stored_addresses_do_not_count_as_configured() {
        let settings = DeviceSettings {
            robot_addr: Some("  ".to_owned()),
            camera_addr: Some("192.168.4.2".to_owned()),
        };
        assert!(!settings.is_complete());

        let settings = DeviceSettings {
            robot_addr: Some("192.168.4.1".to_owned()),
            camera_addr: Some("192.168.4.2".to_owned()),
        };
        assert!(settings.is_complete());
    }

    #[test]
    fn hand_edited_empty_file_loads_as_unconfigured() {
        let parsed = serde_json::from_str::<DeviceSettings>("{}").unwrap();
        assert_eq!(parsed, DeviceSettings::default());
        assert!(!parsed.is_complete());
    }

    #[test]
    fn settings_survive_a_save_load_cycle() {
        let path = std::env::temp_dir().join(format!(
            "rover-tui-settings-test-{}.json",
            std::process::id()
        ));
        let settings = DeviceSettings {
            robot_addr: Some("192.168.4.1".to_owned()),
            camera_addr: Some("192.168.4.2:8081".to_owned()),
        };

        save_to(&path, &settings).unwrap();
        let loaded = load_from(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded, settings);
    }

    #[test]
    fn missing_file_loads_as_defaults() {
        let path = std::env::temp_dir().join(format!(
            "rover-tui-no-such-settings-{}.json",
            std::process::id()
        ));
        assert_eq!(load_from(&path).unwrap(), DeviceSettings::default());
    }
}
