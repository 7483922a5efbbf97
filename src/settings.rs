use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};

use crate::pdf::{BusyNavigation, DEFAULT_CACHE_SIZE, SessionOptions, Zoom};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
pub const APP_NAME: &str = "papermaster";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Zoom factor a paper opens at
    #[serde(default = "default_scale")]
    pub default_scale: f32,

    /// Zoom change per keypress
    #[serde(default = "default_zoom_step")]
    pub zoom_step: f32,

    /// Pixel density override; terminals report none, so unset means 1.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_pixel_ratio: Option<f32>,

    #[serde(default)]
    pub busy_navigation: BusyNavigation,

    #[serde(default = "default_cache_pages")]
    pub render_cache_pages: usize,

    /// Where papers and the catalog live; platform data dir when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_dir: Option<PathBuf>,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_scale() -> f32 {
    Zoom::DEFAULT_SCALE
}

fn default_zoom_step() -> f32 {
    Zoom::DEFAULT_STEP
}

fn default_cache_pages() -> usize {
    DEFAULT_CACHE_SIZE
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            default_scale: default_scale(),
            zoom_step: default_zoom_step(),
            device_pixel_ratio: None,
            busy_navigation: BusyNavigation::default(),
            render_cache_pages: default_cache_pages(),
            library_dir: None,
        }
    }
}

impl Settings {
    /// Options for a freshly opened document session
    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            scale: Zoom::clamp_factor(self.default_scale),
            device_pixel_ratio: self.device_pixel_ratio,
            busy_navigation: self.busy_navigation,
            cache_pages: self.render_cache_pages,
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

pub fn load_settings() {
    let Some(path) = config_path() else {
        warn!("Could not determine config directory, using default settings");
        return;
    };

    if path.exists() {
        load_settings_from_path(&path);
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        if let Ok(settings) = SETTINGS.read() {
            save_settings_to_file(&settings, &path);
        }
    }
}

pub fn load_settings_from_path(path: &Path) {
    match fs::read_to_string(path) {
        Ok(content) => match parse_settings(&content) {
            Ok(mut settings) => {
                debug!("Loaded settings from {path:?}");

                if settings.version < CURRENT_VERSION {
                    migrate_settings(&mut settings);
                    save_settings_to_file(&settings, path);
                }

                if let Ok(mut global) = SETTINGS.write() {
                    *global = settings;
                }
            }
            Err(e) => {
                error!("Failed to parse settings file {path:?}: {e}");
            }
        },
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
        }
    }
}

pub fn parse_settings(content: &str) -> Result<Settings, serde_yaml::Error> {
    serde_yaml::from_str(content)
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    // Future migrations go here:
    // if settings.version < 2 {
    //     migrate_v1_to_v2(settings);
    // }

    settings.version = CURRENT_VERSION;
}

fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let content = generate_settings_yaml(settings);

    match fs::write(path, content) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::new();

    content.push_str(&format!("version: {}\n", settings.version));
    content.push_str(&format!("default_scale: {}\n", settings.default_scale));
    content.push_str(&format!("zoom_step: {}\n", settings.zoom_step));
    match settings.device_pixel_ratio {
        Some(dpr) => content.push_str(&format!("device_pixel_ratio: {dpr}\n")),
        None => content.push_str("# device_pixel_ratio: 2.0\n"),
    }
    let busy = match settings.busy_navigation {
        BusyNavigation::Coalesce => "coalesce",
        BusyNavigation::Ignore => "ignore",
    };
    content.push_str(&format!("busy_navigation: {busy}\n"));
    content.push_str(&format!(
        "render_cache_pages: {}\n",
        settings.render_cache_pages
    ));
    match &settings.library_dir {
        Some(dir) => content.push_str(&format!("library_dir: \"{}\"\n", dir.display())),
        None => content.push_str("# library_dir: \"/path/to/papers\"\n"),
    }

    content
}

// Public API for accessing settings

#[must_use]
pub fn current() -> Settings {
    SETTINGS.read().map(|s| s.clone()).unwrap_or_default()
}

pub fn get_zoom_step() -> f32 {
    SETTINGS
        .read()
        .map(|s| s.zoom_step)
        .unwrap_or_else(|_| default_zoom_step())
}

pub fn get_library_dir() -> Option<PathBuf> {
    SETTINGS.read().ok().and_then(|s| s.library_dir.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn missing_keys_take_defaults() {
        let settings = parse_settings("version: 1\n").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.default_scale, 1.3);
        assert_eq!(settings.busy_navigation, BusyNavigation::Coalesce);
    }

    #[test]
    fn generated_yaml_round_trips() {
        let settings = Settings {
            default_scale: 2.0,
            device_pixel_ratio: Some(2.0),
            busy_navigation: BusyNavigation::Ignore,
            library_dir: Some(PathBuf::from("/tmp/papers")),
            ..Settings::default()
        };
        let parsed = parse_settings(&generate_settings_yaml(&settings)).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn session_options_clamp_scale() {
        let settings = Settings {
            default_scale: 12.0,
            ..Settings::default()
        };
        assert_eq!(settings.session_options().scale, Zoom::MAX_SCALE);
    }

    #[test]
    #[serial]
    fn old_versions_are_migrated_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "version: 0\nzoom_step: 0.25\n").unwrap();

        load_settings_from_path(&path);

        assert_eq!(get_zoom_step(), 0.25);
        assert_eq!(current().version, CURRENT_VERSION);
        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.starts_with(&format!("version: {CURRENT_VERSION}")));

        if let Ok(mut global) = SETTINGS.write() {
            *global = Settings::default();
        }
    }
}
