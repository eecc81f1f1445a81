//! Page regions and template rendering.
//!
//! A [`Page`] has three named regions, each filled from its own template.
//! Rendering always clears all three first, then appends forecast
//! information, current conditions and the forecast list, in that order.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use std::{fmt, fs, io::Write, path::Path};

use crate::{
    config::TemplatePaths,
    error::RenderError,
    model::{CurrentConditions, WeatherSnapshot},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    ForecastInformation,
    CurrentConditions,
    ForecastConditions,
}

impl Region {
    pub const fn all() -> &'static [Region] {
        &[
            Region::ForecastInformation,
            Region::CurrentConditions,
            Region::ForecastConditions,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::ForecastInformation => "forecast_information",
            Region::CurrentConditions => "current_conditions",
            Region::ForecastConditions => "forecast_conditions",
        }
    }

    fn index(self) -> usize {
        match self {
            Region::ForecastInformation => 0,
            Region::CurrentConditions => 1,
            Region::ForecastConditions => 2,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The host document the widget draws into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    regions: [String; 3],
}

impl Page {
    pub fn region(&self, region: Region) -> &str {
        &self.regions[region.index()]
    }

    pub fn clear(&mut self, region: Region) {
        self.regions[region.index()].clear();
    }

    pub fn append(&mut self, region: Region, html: &str) {
        self.regions[region.index()].push_str(html);
    }

    pub fn is_empty(&self) -> bool {
        self.regions.iter().all(String::is_empty)
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for region in Region::all() {
            let content = self.region(*region);
            if content.is_empty() {
                continue;
            }
            if !first {
                writeln!(f)?;
            }
            f.write_str(content)?;
            first = false;
        }
        Ok(())
    }
}

pub const FORECAST_INFORMATION_TMPL: &str = "\
{% if city %}{{ city }}
{% endif %}{% if forecast_date %}Forecast for {{ forecast_date }}
{% endif %}";

pub const CURRENT_CONDITIONS_TMPL: &str = "\
Now: {{ condition }}{% if temp %}, {{ temp }}°{{ unit }}{% endif %}{% if unit == \"F\" and temp_c %} ({{ temp_c }}°C){% endif %}
{% if humidity %}{{ humidity }}
{% endif %}{% if wind_condition %}{{ wind_condition }}
{% endif %}{% if icon %}[{{ icon }}]
{% endif %}";

pub const FORECAST_CONDITIONS_TMPL: &str = "\
{% for c in conditions %}{{ c.day_of_week }}  {{ c.low }}-{{ c.high }}°F  {{ c.condition }}{% if c.icon %}  [{{ c.icon }}]{% endif %}
{% endfor %}";

/// Template source for each region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Templates {
    pub forecast_information: String,
    pub current_conditions: String,
    pub forecast_conditions: String,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            forecast_information: FORECAST_INFORMATION_TMPL.to_string(),
            current_conditions: CURRENT_CONDITIONS_TMPL.to_string(),
            forecast_conditions: FORECAST_CONDITIONS_TMPL.to_string(),
        }
    }
}

impl Templates {
    /// Built-in templates, with any configured file overriding its region.
    pub fn load(paths: &TemplatePaths) -> Result<Self> {
        let mut templates = Self::default();

        if let Some(path) = &paths.forecast_information {
            templates.forecast_information = read_template(path)?;
        }
        if let Some(path) = &paths.current_conditions {
            templates.current_conditions = read_template(path)?;
        }
        if let Some(path) = &paths.forecast_conditions {
            templates.forecast_conditions = read_template(path)?;
        }

        Ok(templates)
    }

    fn source(&self, region: Region) -> &str {
        match region {
            Region::ForecastInformation => &self.forecast_information,
            Region::CurrentConditions => &self.current_conditions,
            Region::ForecastConditions => &self.forecast_conditions,
        }
    }
}

fn read_template(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("Failed to read template: {}", path.display()))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Temperature to show with its unit letter: Fahrenheit if present, else
/// Celsius.
pub fn select_temperature_with_unit(current: &CurrentConditions) -> Option<(&str, &'static str)> {
    non_empty(&current.temp_f)
        .map(|t| (t, "F"))
        .or_else(|| non_empty(&current.temp_c).map(|t| (t, "C")))
}

pub fn select_temperature(current: &CurrentConditions) -> Option<&str> {
    select_temperature_with_unit(current).map(|(temp, _)| temp)
}

/// Current conditions plus the selected temperature, as seen by templates.
#[derive(Debug, Serialize)]
struct CurrentView<'a> {
    #[serde(flatten)]
    current: &'a CurrentConditions,
    #[serde(skip_serializing_if = "Option::is_none")]
    temp: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: Option<&'static str>,
}

impl<'a> CurrentView<'a> {
    fn new(current: &'a CurrentConditions) -> Self {
        let selected = select_temperature_with_unit(current);
        Self {
            current,
            temp: selected.map(|(temp, _)| temp),
            unit: selected.map(|(_, unit)| unit),
        }
    }
}

/// Short text shown on the host's icon.
pub trait Badge: Send + Sync + fmt::Debug {
    fn set_text(&self, text: &str);
}

/// Puts the badge text in the terminal window title.
#[derive(Debug, Default)]
pub struct TerminalTitleBadge;

impl Badge for TerminalTitleBadge {
    fn set_text(&self, text: &str) {
        let mut stderr = std::io::stderr().lock();
        if let Err(err) = write!(stderr, "\x1b]0;{text}\x07").and_then(|()| stderr.flush()) {
            tracing::debug!("could not set terminal title: {err}");
        }
    }
}

#[derive(Debug)]
pub struct Renderer {
    env: Environment<'static>,
    templates: Templates,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(Templates::default())
    }
}

impl Renderer {
    pub fn new(templates: Templates) -> Self {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        Self { env, templates }
    }

    fn render<S: Serialize>(&self, region: Region, ctx: S) -> Result<String, RenderError> {
        self.env
            .render_str(self.templates.source(region), ctx)
            .map_err(|source| RenderError {
                region: region.as_str(),
                source,
            })
    }

    /// Replace the page's contents with `snapshot`.
    pub fn populate_weather_conditions(
        &self,
        page: &mut Page,
        snapshot: &WeatherSnapshot,
        badge: Option<&dyn Badge>,
    ) -> Result<(), RenderError> {
        tracing::debug!("removing old data");
        for region in Region::all() {
            page.clear(*region);
        }

        tracing::debug!("populating weather conditions");
        if let (Some(badge), Some(temp)) = (badge, select_temperature(&snapshot.current_conditions)) {
            badge.set_text(temp);
        }

        let output = self.render(Region::ForecastInformation, &snapshot.forecast)?;
        page.append(Region::ForecastInformation, &output);

        let output = self.render(
            Region::CurrentConditions,
            CurrentView::new(&snapshot.current_conditions),
        )?;
        page.append(Region::CurrentConditions, &output);

        let output = self.render(
            Region::ForecastConditions,
            context! { conditions => &snapshot.forecast_conditions },
        )?;
        page.append(Region::ForecastConditions, &output);

        tracing::debug!("finished populating weather conditions");
        Ok(())
    }
}
