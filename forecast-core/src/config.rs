use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::model::Position;

pub const DEFAULT_CITY: &str = "Dayton";
pub const DEFAULT_WEATHER_URL: &str = "http://www.google.com/ig/api";
pub const DEFAULT_GEONAMES_URL: &str = "http://api.geonames.org";
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 900_000;

/// Remote service locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Weather XML service; queried as `<weather_url>?weather=<city>`.
    pub weather_url: String,
    /// Base of the geonames JSON services.
    pub geonames_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            weather_url: DEFAULT_WEATHER_URL.to_string(),
            geonames_url: DEFAULT_GEONAMES_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    pub timeout_ms: u64,
    /// Fixed coordinates to report when asked for the current position.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            latitude: None,
            longitude: None,
        }
    }
}

impl GeolocationConfig {
    pub fn fixed_position(&self) -> Option<Position> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Position { latitude, longitude }),
            _ => None,
        }
    }
}

/// Optional template overrides, one file per page region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatePaths {
    pub forecast_information: Option<PathBuf>,
    pub current_conditions: Option<PathBuf>,
    pub forecast_conditions: Option<PathBuf>,
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// default_city = "Dayton"
/// geonames_username = "demo"
/// badge = true
///
/// [endpoints]
/// weather_url = "http://www.google.com/ig/api"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// City used when nothing is stored and when a reply is unusable.
    pub default_city: String,
    /// Directory the icon files are served from.
    pub asset_dir: String,
    pub refresh_interval_ms: u64,
    /// How many fallback fetches an unusable reply may trigger.
    pub max_fallbacks: u32,
    pub autocomplete_min_length: usize,
    pub autocomplete_max_rows: u32,
    pub geonames_username: String,
    /// Mirror the temperature into the terminal title.
    pub badge: bool,
    /// Write the rendered page here instead of stdout.
    pub output: Option<PathBuf>,
    pub endpoints: Endpoints,
    pub geolocation: GeolocationConfig,
    pub templates: TemplatePaths,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_city: DEFAULT_CITY.to_string(),
            asset_dir: "img".to_string(),
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            max_fallbacks: 1,
            autocomplete_min_length: 2,
            autocomplete_max_rows: 12,
            geonames_username: "demo".to_string(),
            badge: false,
            output: None,
            endpoints: Endpoints::default(),
            geolocation: GeolocationConfig::default(),
            templates: TemplatePaths::default(),
        }
    }
}

impl Config {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Load config from the default location, or defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, use defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        cfg.validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(cfg)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    /// Save config, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_city.trim().is_empty() {
            return Err(anyhow!("default_city must not be empty"));
        }
        if self.refresh_interval_ms == 0 {
            return Err(anyhow!("refresh_interval_ms must be greater than zero"));
        }
        if self.geolocation.latitude.is_some() != self.geolocation.longitude.is_some() {
            return Err(anyhow!(
                "geolocation.latitude and geolocation.longitude must be set together"
            ));
        }
        Ok(())
    }

    pub fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "forecast", "forecast")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }
}
