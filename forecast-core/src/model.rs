use serde::{Deserialize, Serialize};

/// `forecast_information` block of a weather reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastInformation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast_date: Option<String>,
}

/// `current_conditions` block. `condition` is always present once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub condition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_f: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_c: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<String>,
    /// Local asset path, e.g. `img/sunny.gif`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_condition: Option<String>,
}

/// One `forecast_conditions` day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastCondition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Display-ready view-model built from one weather reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub forecast: ForecastInformation,
    pub current_conditions: CurrentConditions,
    pub forecast_conditions: Vec<ForecastCondition>,
}

/// Result of turning a weather reply into a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeatherOutcome {
    Ready(WeatherSnapshot),
    /// The reply had no usable current conditions (unknown city, etc.).
    Invalid,
}

impl WeatherOutcome {
    pub fn into_snapshot(self) -> Option<WeatherSnapshot> {
        match self {
            WeatherOutcome::Ready(snapshot) => Some(snapshot),
            WeatherOutcome::Invalid => None,
        }
    }
}

/// An autocomplete entry offered while typing a city name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// `name[, region], country`; this is what gets stored as the preference.
    pub label: String,
    pub value: String,
}

impl std::fmt::Display for Suggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}
