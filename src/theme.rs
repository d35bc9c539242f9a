use anyhow::{Context, Result, anyhow};
use ratatui::style::Color;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "rover-tui";

#[derive(Debug, Clone, Copy)]
pub struct ThemePalette {
    pub text: Color,
    pub muted: Color,
    pub border: Color,
    pub border_active: Color,
    pub accent: Color,
    pub ok: Color,
    pub warn: Color,
    pub danger: Color,
    // Highlight for directional controls while they are held.
    pub hold: Color,
}

impl Default for ThemePalette {
    fn default() -> Self {
        Self {
            text: Color::Rgb(232, 228, 216),
            muted: Color::Rgb(143, 139, 126),
            border: Color::Rgb(92, 90, 78),
            border_active: Color::Rgb(215, 168, 74),
            accent: Color::Rgb(224, 180, 76),
            ok: Color::Rgb(127, 191, 106),
            warn: Color::Rgb(217, 142, 58),
            danger: Color::Rgb(217, 83, 79),
            hold: Color::Rgb(106, 191, 176),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct ThemeFile {
    text: String,
    muted: String,
    border: String,
    border_active: String,
    accent: String,
    ok: String,
    warn: String,
    danger: String,
    hold: String,
}

impl Default for ThemeFile {
    fn default() -> Self {
        Self {
            text: "#E8E4D8".to_owned(),
            muted: "#8F8B7E".to_owned(),
            border: "#5C5A4E".to_owned(),
            border_active: "#D7A84A".to_owned(),
            accent: "#E0B44C".to_owned(),
            ok: "#7FBF6A".to_owned(),
            warn: "#D98E3A".to_owned(),
            danger: "#D9534F".to_owned(),
            hold: "#6ABFB0".to_owned(),
        }
    }
}

impl ThemePalette {
    fn from_file(file: &ThemeFile) -> Result<Self> {
        Ok(Self {
            text: parse_hex_color("text", &file.text)?,
            muted: parse_hex_color("muted", &file.muted)?,
            border: parse_hex_color("border", &file.border)?,
            border_active: parse_hex_color("border_active", &file.border_active)?,
            accent: parse_hex_color("accent", &file.accent)?,
            ok: parse_hex_color("ok", &file.ok)?,
            warn: parse_hex_color("warn", &file.warn)?,
            danger: parse_hex_color("danger", &file.danger)?,
            hold: parse_hex_color("hold", &file.hold)?,
        })
    }
}

pub fn theme_path() -> Result<PathBuf> {
    let root = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .context("unable to determine user data directory")?;
    Ok(root.join(APP_DIR).join("theme.json"))
}

// Writes the default file first if none exists so users have something to edit.
pub fn load_or_create_theme() -> Result<ThemePalette> {
    let path = theme_path()?;

    if !path.exists() {
        let default_file = ThemeFile::default();
        write_theme_file(&path, &default_file)?;
        return ThemePalette::from_file(&default_file);
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed reading theme config at {}", path.display()))?;
    let parsed = serde_json::from_str::<ThemeFile>(&raw)
        .with_context(|| format!("failed parsing theme config at {}", path.display()))?;
    ThemePalette::from_file(&parsed)
}

fn write_theme_file(path: &Path, theme: &ThemeFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating theme directory {}", parent.display()))?;
    }
    let payload = serde_json::to_string_pretty(theme).context("failed serializing theme config")?;
    fs::write(path, payload)
        .with_context(|| format!("failed writing theme config at {}", path.display()))?;
    Ok(())
}

fn parse_hex_color(key: &str, value: &str) -> Result<Color> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!(
            "theme field '{key}' must be a hex color like #RRGGBB, got '{value}'"
        ));
    }

    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16)
            .with_context(|| format!("theme field '{key}' has an invalid channel"))
    };
    Ok(Color::Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}
