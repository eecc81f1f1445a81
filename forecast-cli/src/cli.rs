use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use chrono::Local;
use forecast_core::{
    AppState, Config, FilePreferenceStore, MemoryPreferenceStore, Page, Position, PreferenceStore,
    RefreshOutcome, Widget, geolocation::StaticPosition, prefs::CITY_KEY,
};
use inquire::{Confirm, Select, Text};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio_util::sync::CancellationToken;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "forecast", version, about = "Weather widget for the terminal")]
pub struct Cli {
    /// Use this config file instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Keep the city preference in memory only.
    #[arg(long, global = true)]
    pub no_persist: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show weather for the stored city (or the default city).
    Show {
        /// Show this city instead; the preference is left alone.
        #[arg(long)]
        city: Option<String>,

        /// Print the weather data as JSON instead of the rendered page.
        #[arg(long)]
        json: bool,
    },

    /// List place suggestions for a partial city name.
    Search { term: String },

    /// Pick a city interactively, remember it and show its weather.
    Select {
        /// Starting text; prompted for when absent.
        term: Option<String>,
    },

    /// Show weather for the current position.
    Locate {
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },

    /// Show weather and keep refreshing it until interrupted.
    Watch,

    /// Edit the configuration interactively.
    Configure,

    /// Print the stored city.
    Prefs,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config_path = match &self.config {
            Some(path) => path.clone(),
            None => Config::config_file_path()?,
        };
        let config = Config::load_from(&config_path)?;

        match self.command {
            Command::Configure => configure(config, &config_path),
            Command::Prefs => {
                let store = FilePreferenceStore::open_default()?;
                match store.get(CITY_KEY)? {
                    Some(city) => println!("{city}"),
                    None => println!("(no city stored; default is {})", config.default_city),
                }
                println!("stored in {}", store.path().display());
                Ok(())
            }
            Command::Show { city, json } => {
                let widget = build_widget(&config, self.no_persist, None)?;
                let outcome = match city {
                    Some(city) => widget.show_weather(&city).await,
                    None => widget.start().await,
                };
                if json {
                    return print_snapshot(&widget.state(), outcome);
                }
                finish(&widget, &config, outcome)
            }
            Command::Search { term } => {
                let widget = build_widget(&config, self.no_persist, None)?;
                let suggestions = widget.suggest(&term).await;
                if suggestions.is_empty() {
                    println!("No places match '{term}'.");
                }
                for suggestion in suggestions {
                    println!("{suggestion}");
                }
                Ok(())
            }
            Command::Select { term } => {
                let widget = build_widget(&config, self.no_persist, None)?;
                select(&widget, &config, term).await
            }
            Command::Locate { lat, lon } => {
                let position = lat.zip(lon).map(|(latitude, longitude)| Position { latitude, longitude });
                let widget = build_widget(&config, self.no_persist, position)?;
                let outcome = widget.use_current_location().await;
                finish(&widget, &config, outcome)
            }
            Command::Watch => {
                let widget = build_widget(&config, self.no_persist, None)?;
                watch(&widget, &config).await
            }
        }
    }
}

fn build_widget(config: &Config, no_persist: bool, position: Option<Position>) -> Result<Widget> {
    let prefs: Arc<dyn PreferenceStore> = if no_persist {
        Arc::new(MemoryPreferenceStore::default())
    } else {
        Arc::new(FilePreferenceStore::open_default()?)
    };

    let position = position.or_else(|| config.geolocation.fixed_position());

    Widget::from_config(config, prefs, Arc::new(StaticPosition(position)))
}

fn emit(page: &Page, config: &Config) -> Result<()> {
    match &config.output {
        Some(path) => fs::write(path, page.to_string())
            .with_context(|| format!("Failed to write page to {}", path.display())),
        None => {
            print!("{page}");
            Ok(())
        }
    }
}

fn finish(widget: &Widget, config: &Config, outcome: RefreshOutcome) -> Result<()> {
    match outcome {
        RefreshOutcome::Rendered { .. } => emit(widget.state().page(), config),
        RefreshOutcome::Invalid { city } => bail!("No usable weather data for '{city}'."),
        RefreshOutcome::Superseded | RefreshOutcome::Failed => {
            bail!("Weather could not be updated; see the log above for details.")
        }
    }
}

fn print_snapshot(state: &AppState, outcome: RefreshOutcome) -> Result<()> {
    match state.snapshot() {
        Some(snapshot) if matches!(outcome, RefreshOutcome::Rendered { .. }) => {
            println!("{}", serde_json::to_string_pretty(snapshot)?);
            Ok(())
        }
        _ => bail!("No weather data to print ({outcome:?})."),
    }
}

async fn select(widget: &Widget, config: &Config, term: Option<String>) -> Result<()> {
    let min_len = widget.settings().autocomplete_min_length;

    let mut term = term;
    let suggestions = loop {
        let current = match term.take() {
            Some(t) => t,
            None => Text::new("City:")
                .with_help_message(&format!("type at least {min_len} characters"))
                .prompt()?,
        };

        let suggestions = widget.suggest(&current).await;
        if !suggestions.is_empty() {
            break suggestions;
        }
        println!("No places match '{current}'.");
    };

    // The first match is highlighted so Enter takes it straight away.
    let choice = Select::new("Pick a city:", suggestions)
        .with_starting_cursor(0)
        .prompt()?;

    let outcome = widget.select(&choice).await;
    finish(widget, config, outcome)
}

async fn watch(widget: &Widget, config: &Config) -> Result<()> {
    let outcome = widget.start().await;
    if let Err(err) = finish(widget, config, outcome) {
        tracing::warn!("{err}");
    }

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    widget
        .run_periodic(shutdown, |outcome, state| {
            if matches!(outcome, RefreshOutcome::Rendered { .. }) {
                if let (None, Some(at)) = (&config.output, state.updated_at()) {
                    println!("\n--- updated {} ---", at.with_timezone(&Local).format("%H:%M"));
                }
                if let Err(err) = emit(state.page(), config) {
                    tracing::error!("{err:#}");
                }
            }
        })
        .await;

    Ok(())
}

fn configure(mut config: Config, path: &Path) -> Result<()> {
    config.default_city = Text::new("Default city:")
        .with_default(&config.default_city)
        .prompt()?;

    config.geonames_username = Text::new("geonames.org username:")
        .with_default(&config.geonames_username)
        .prompt()?;

    config.endpoints.weather_url = Text::new("Weather service url:")
        .with_default(&config.endpoints.weather_url)
        .prompt()?;

    config.badge = Confirm::new("Show the temperature in the terminal title?")
        .with_default(config.badge)
        .prompt()?;

    config.validate()?;
    config.save_to(path)?;

    println!("Configuration saved to {}", path.display());
    Ok(())
}
