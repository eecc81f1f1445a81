//! Turns a weather XML reply into a [`WeatherSnapshot`].

use std::sync::LazyLock;

use regex::Regex;
use roxmltree::{Document, Node};

use crate::{
    error::{FetchError, IconFormatError, InvalidWeatherData},
    extract::{extract_fields, find_block, find_blocks},
    model::{CurrentConditions, ForecastCondition, ForecastInformation, WeatherOutcome, WeatherSnapshot},
};

const FORECAST_INFORMATION_FIELDS: &[&str] = &["city", "forecast_date"];
const CURRENT_CONDITION_FIELDS: &[&str] =
    &["condition", "temp_f", "temp_c", "humidity", "icon", "wind_condition"];
const FORECAST_CONDITION_FIELDS: &[&str] = &["day_of_week", "low", "high", "icon", "condition"];

static ICON_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([a-z_]+\.gif)$").expect("icon pattern is a valid regex")
});

/// Map a remote icon url to the bundled asset of the same name,
/// e.g. `http://x/y/cloudy_icon.gif` -> `img/cloudy_icon.gif`.
pub fn format_img_src(asset_dir: &str, img_url: &str) -> Result<String, IconFormatError> {
    let file = ICON_FILE
        .captures(img_url)
        .and_then(|c| c.get(1))
        .ok_or_else(|| IconFormatError { url: img_url.to_owned() })?;

    let dir = asset_dir.trim_end_matches('/');
    if dir.is_empty() {
        Ok(file.as_str().to_owned())
    } else {
        Ok(format!("{dir}/{}", file.as_str()))
    }
}

/// Builds view-models from reply nodes.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    asset_dir: String,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new("img")
    }
}

impl SnapshotBuilder {
    pub fn new(asset_dir: impl Into<String>) -> Self {
        Self { asset_dir: asset_dir.into() }
    }

    pub fn build_forecast_information(&self, node: Option<Node<'_, '_>>) -> ForecastInformation {
        tracing::debug!("building forecast information");
        let mut fields = extract_fields(node, FORECAST_INFORMATION_FIELDS);
        ForecastInformation {
            city: fields.take("city"),
            forecast_date: fields.take("forecast_date"),
        }
    }

    pub fn build_current_condition(
        &self,
        node: Option<Node<'_, '_>>,
    ) -> Result<CurrentConditions, InvalidWeatherData> {
        tracing::debug!("building current conditions");
        let mut fields = extract_fields(node, CURRENT_CONDITION_FIELDS);

        let Some(condition) = fields.take("condition") else {
            tracing::warn!("current conditions carry no condition; data is unusable");
            return Err(InvalidWeatherData);
        };

        Ok(CurrentConditions {
            condition,
            temp_f: fields.take("temp_f"),
            temp_c: fields.take("temp_c"),
            humidity: fields.take("humidity"),
            icon: self.icon(fields.take("icon")),
            wind_condition: fields.take("wind_condition"),
        })
    }

    pub fn build_forecast_condition(&self, node: Node<'_, '_>) -> ForecastCondition {
        let mut fields = extract_fields(Some(node), FORECAST_CONDITION_FIELDS);
        ForecastCondition {
            day_of_week: fields.take("day_of_week"),
            low: fields.take("low"),
            high: fields.take("high"),
            icon: self.icon(fields.take("icon")),
            condition: fields.take("condition"),
        }
    }

    pub fn build_forecast_conditions<'a, 'input: 'a>(
        &self,
        nodes: impl IntoIterator<Item = Node<'a, 'input>>,
    ) -> Vec<ForecastCondition> {
        nodes.into_iter().map(|n| self.build_forecast_condition(n)).collect()
    }

    /// Build a snapshot from a parsed reply.
    pub fn build_weather(&self, doc: &Document<'_>) -> WeatherOutcome {
        tracing::debug!("converting weather reply to snapshot");
        let root = doc.root_element();

        let forecast = self.build_forecast_information(find_block(root, "forecast_information"));
        let current_conditions = match self.build_current_condition(find_block(root, "current_conditions")) {
            Ok(current) => current,
            Err(InvalidWeatherData) => return WeatherOutcome::Invalid,
        };
        let forecast_conditions = self.build_forecast_conditions(find_blocks(root, "forecast_conditions"));

        WeatherOutcome::Ready(WeatherSnapshot {
            forecast,
            current_conditions,
            forecast_conditions,
        })
    }

    /// Parse raw XML and build a snapshot from it.
    pub fn build_weather_xml(&self, xml: &str) -> Result<WeatherOutcome, FetchError> {
        let doc = Document::parse(xml).map_err(|e| FetchError::Parse {
            service: "weather",
            message: e.to_string(),
        })?;
        Ok(self.build_weather(&doc))
    }

    /// A bad icon only loses the icon, never the whole snapshot.
    fn icon(&self, url: Option<String>) -> Option<String> {
        let url = url?;
        match format_img_src(&self.asset_dir, &url) {
            Ok(src) => Some(src),
            Err(err) => {
                tracing::warn!("{err}");
                None
            }
        }
    }
}
