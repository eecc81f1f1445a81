//! Core library for the `forecast` weather widget.
//!
//! This crate defines:
//! - Configuration and the stored city preference
//! - Extraction of weather replies into display-ready snapshots
//! - Clients for the weather and geonames services
//! - Template rendering into a three-region page
//! - The [`Widget`] that ties startup, search, geolocation and refresh together
//!
//! It is used by `forecast-cli`, but can also be reused by other hosts.

pub mod app;
pub mod build;
pub mod config;
pub mod error;
pub mod extract;
pub mod geolocation;
pub mod model;
pub mod prefs;
pub mod provider;
pub mod render;

pub use app::{AppState, RefreshOutcome, Widget, WidgetSettings};
pub use config::Config;
pub use error::{FetchError, InvalidWeatherData, PositionError};
pub use model::{Position, Suggestion, WeatherOutcome, WeatherSnapshot};
pub use prefs::{FilePreferenceStore, MemoryPreferenceStore, PreferenceStore};
pub use provider::{PlaceLookup, WeatherSource};
pub use render::{Page, Region, Renderer};
