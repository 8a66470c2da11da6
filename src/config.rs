//! Configuration for the previewer.
//!
//! Settings come from an optional TOML file (`--config`, else
//! `<config dir>/lcdpreview/config.toml`) and are overridden by command-line flags.

use crate::error::{PreviewError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default debounce window for hot reload.
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;
/// Default interval between watch scans.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;
/// Renderer used when nothing else is configured.
pub const DEFAULT_RENDERER: &str = "builtin:demo";
/// Environment variable that points at a font directory.
pub const FONT_DIR_ENV: &str = "LCDPREVIEW_FONTDIR";
/// Fonts the device menu code loads at construction.
pub const REQUIRED_FONTS: [&str; 2] = ["FreeSansBold.ttf", "FreeMonoBold.ttf"];

/// LCD panels the device ships with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DisplayProfile {
    /// 1.44" 128x128 panel
    #[default]
    #[serde(rename = "1in44", alias = "128")]
    Lcd1in44,
    /// 1.3" 240x240 panel
    #[serde(rename = "1in3", alias = "240")]
    Lcd1in3,
}

impl DisplayProfile {
    pub const ALL: [DisplayProfile; 2] = [DisplayProfile::Lcd1in44, DisplayProfile::Lcd1in3];

    pub fn dimensions(self) -> (u32, u32) {
        match self {
            DisplayProfile::Lcd1in44 => (128, 128),
            DisplayProfile::Lcd1in3 => (240, 240),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DisplayProfile::Lcd1in44 => "1in44",
            DisplayProfile::Lcd1in3 => "1in3",
        }
    }

    pub fn from_dimensions(width: u32, height: u32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|profile| profile.dimensions() == (width, height))
    }
}

impl std::fmt::Display for DisplayProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (w, h) = self.dimensions();
        write!(f, "{} ({}x{})", self.as_str(), w, h)
    }
}

impl FromStr for DisplayProfile {
    type Err = PreviewError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "128" | "1in44" => Ok(DisplayProfile::Lcd1in44),
            "240" | "1in3" => Ok(DisplayProfile::Lcd1in3),
            other => Err(PreviewError::config(format!(
                "unknown LCD profile '{other}' (expected 128, 240, 1in44 or 1in3)"
            ))),
        }
    }
}

/// Contents of the TOML configuration file; every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub root: Option<PathBuf>,
    pub display_profile: Option<DisplayProfile>,
    pub renderer: Option<String>,
    pub debounce_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub watch: Option<bool>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PreviewError::config(e.to_string()))
    }

    /// Read a config file. A missing default file is not an error; a missing explicit one is.
    pub fn load(path: &Path, explicit: bool) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text).map_err(|e| {
                PreviewError::config(format!("{}: {}", path.display(), e.message()))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound && !explicit => {
                Ok(Self::default())
            }
            Err(err) => Err(PreviewError::io(
                format!("cannot read {}", path.display()),
                &err,
            )),
        }
    }

    /// `<config dir>/lcdpreview/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("lcdpreview").join("config.toml"))
    }
}

/// Values given on the command line; they win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub root: Option<PathBuf>,
    pub display_profile: Option<DisplayProfile>,
    pub renderer: Option<String>,
    pub debounce_ms: Option<u64>,
    pub no_watch: bool,
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewConfig {
    /// Root of the renderer checkout; watched paths are relative to it
    pub root: PathBuf,
    pub display_profile: Option<DisplayProfile>,
    pub renderer: String,
    pub debounce: Duration,
    pub poll_interval: Duration,
    pub watch: bool,
    /// Font directory from the environment; `<root>/fonts` is checked first at each bind
    pub font_env: Option<PathBuf>,
}

impl PreviewConfig {
    /// Merge file settings and overrides, then validate the root.
    pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Self> {
        let root = overrides
            .root
            .or(file.root)
            .unwrap_or_else(|| PathBuf::from("."));
        if !root.is_dir() {
            return Err(PreviewError::PathNotFound { path: root });
        }

        let debounce_ms = overrides
            .debounce_ms
            .or(file.debounce_ms)
            .unwrap_or(DEFAULT_DEBOUNCE_MS);
        let poll_ms = file
            .poll_interval_ms
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
            .max(1);

        Ok(Self {
            display_profile: overrides.display_profile.or(file.display_profile),
            renderer: overrides
                .renderer
                .or(file.renderer)
                .unwrap_or_else(|| DEFAULT_RENDERER.to_string()),
            debounce: Duration::from_millis(debounce_ms),
            poll_interval: Duration::from_millis(poll_ms),
            watch: !overrides.no_watch && file.watch.unwrap_or(true),
            font_env: std::env::var_os(FONT_DIR_ENV).map(PathBuf::from),
            root,
        })
    }

    /// Directory handed to renderers that take a configuration path.
    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }
}

/// First of `<root>/fonts`, `<root>/Fonts`, `env_dir` that holds every required font.
pub fn discover_font_dir(root: &Path, env_dir: Option<PathBuf>) -> Option<PathBuf> {
    [Some(root.join("fonts")), Some(root.join("Fonts")), env_dir]
        .into_iter()
        .flatten()
        .find(|dir| REQUIRED_FONTS.iter().all(|font| dir.join(font).is_file()))
}
