//! Wires preferences, geolocation and search to the fetch → build → render
//! pipeline.

use chrono::{DateTime, Utc};
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;

use crate::{
    Config,
    error::FetchError,
    geolocation::{Geolocator, PositionOptions, PositionSource},
    model::{Suggestion, WeatherOutcome, WeatherSnapshot},
    prefs::{CITY_KEY, PreferenceStore},
    provider::{PlaceLookup, WeatherSource, sources_from_config},
    render::{Badge, Page, Renderer, Templates, TerminalTitleBadge},
};

/// Knobs the pipeline needs from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetSettings {
    pub default_city: String,
    pub max_fallbacks: u32,
    pub autocomplete_min_length: usize,
    pub refresh_interval: Duration,
}

impl Default for WidgetSettings {
    fn default() -> Self {
        (&Config::default()).into()
    }
}

impl From<&Config> for WidgetSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            default_city: cfg.default_city.clone(),
            max_fallbacks: cfg.max_fallbacks,
            autocomplete_min_length: cfg.autocomplete_min_length,
            refresh_interval: cfg.refresh_interval(),
        }
    }
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The page now shows weather for `city`.
    Rendered { city: String },
    /// Every attempt, fallbacks included, came back unusable.
    Invalid { city: String },
    /// A newer run started before this one finished.
    Superseded,
    /// Transport, lookup or render failure; already logged.
    Failed,
}

/// Everything the widget knows between runs.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    generation: u64,
    inflight: Option<CancellationToken>,
    city: Option<String>,
    snapshot: Option<WeatherSnapshot>,
    page: Page,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub enum StateUpdate {
    /// A run is starting; any run still in flight is cancelled.
    FetchStarted { token: CancellationToken },
    Rendered {
        generation: u64,
        city: String,
        snapshot: WeatherSnapshot,
        page: Page,
    },
}

impl AppState {
    /// The only place state changes. Returns `false` for a render that lost
    /// the race against a newer run.
    pub fn apply(&mut self, update: StateUpdate) -> bool {
        match update {
            StateUpdate::FetchStarted { token } => {
                if let Some(previous) = self.inflight.replace(token) {
                    previous.cancel();
                }
                self.generation += 1;
                true
            }
            StateUpdate::Rendered {
                generation,
                city,
                snapshot,
                page,
            } => {
                if generation != self.generation {
                    return false;
                }
                self.inflight = None;
                self.city = Some(city);
                self.snapshot = Some(snapshot);
                self.page = page;
                self.updated_at = Some(Utc::now());
                true
            }
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn city(&self) -> Option<&str> {
        self.city.as_deref()
    }

    pub fn snapshot(&self) -> Option<&WeatherSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

/// The weather widget.
#[derive(Debug)]
pub struct Widget {
    weather: Arc<dyn WeatherSource>,
    places: Arc<dyn PlaceLookup>,
    prefs: Arc<dyn PreferenceStore>,
    geolocator: Geolocator,
    renderer: Renderer,
    badge: Option<Arc<dyn Badge>>,
    settings: WidgetSettings,
    state: Mutex<AppState>,
    search: Mutex<Option<CancellationToken>>,
}

impl Widget {
    pub fn new(
        weather: Arc<dyn WeatherSource>,
        places: Arc<dyn PlaceLookup>,
        prefs: Arc<dyn PreferenceStore>,
        geolocator: Geolocator,
        renderer: Renderer,
        settings: WidgetSettings,
    ) -> Self {
        Self {
            weather,
            places,
            prefs,
            geolocator,
            renderer,
            badge: None,
            settings,
            state: Mutex::new(AppState::default()),
            search: Mutex::new(None),
        }
    }

    pub fn with_badge(mut self, badge: Arc<dyn Badge>) -> Self {
        self.badge = Some(badge);
        self
    }

    /// Real services, templates and badge as described by `config`.
    pub fn from_config(
        config: &Config,
        prefs: Arc<dyn PreferenceStore>,
        position: Arc<dyn PositionSource>,
    ) -> anyhow::Result<Self> {
        let (weather, places) = sources_from_config(config)?;
        let templates = Templates::load(&config.templates)?;

        let widget = Self::new(
            Arc::new(weather),
            Arc::new(places),
            prefs,
            Geolocator::new(position, PositionOptions::from(&config.geolocation)),
            Renderer::new(templates),
            WidgetSettings::from(config),
        );

        if config.badge {
            Ok(widget.with_badge(Arc::new(TerminalTitleBadge)))
        } else {
            Ok(widget)
        }
    }

    pub fn settings(&self) -> &WidgetSettings {
        &self.settings
    }

    /// Copy of the current state.
    pub fn state(&self) -> AppState {
        self.lock_state().clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, AppState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The stored city, if any. A failing store counts as no preference.
    pub fn stored_city(&self) -> Option<String> {
        match self.prefs.get(CITY_KEY) {
            Ok(city) => city.filter(|c| !c.trim().is_empty()),
            Err(err) => {
                tracing::error!("failed when retrieving city preferences: {err:#}");
                None
            }
        }
    }

    fn remember_city(&self, city: &str) {
        if let Err(err) = self.prefs.set(CITY_KEY, city) {
            tracing::error!("failed to store city preference: {err:#}");
        }
    }

    /// Startup: weather for the stored city, or the default city.
    pub async fn start(&self) -> RefreshOutcome {
        let city = match self.stored_city() {
            Some(city) => city,
            None => {
                tracing::info!(city = %self.settings.default_city, "no stored city, using default");
                self.settings.default_city.clone()
            }
        };
        self.show_weather(&city).await
    }

    /// Re-read the preference and fetch again.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.start().await
    }

    /// Fetch, build and render weather for `city`. An unusable reply falls
    /// back to the default city, at most `max_fallbacks` times.
    pub async fn show_weather(&self, city: &str) -> RefreshOutcome {
        let token = CancellationToken::new();
        let generation = {
            let mut state = self.lock_state();
            state.apply(StateUpdate::FetchStarted { token: token.clone() });
            state.generation()
        };

        let mut location = city.to_string();
        let mut fallbacks = 0;

        loop {
            let snapshot = match self.weather.get_weather_info(&location, &token).await {
                Ok(WeatherOutcome::Ready(snapshot)) => snapshot,
                Ok(WeatherOutcome::Invalid) => {
                    tracing::warn!(%location, "invalid data found under city name");
                    if fallbacks >= self.settings.max_fallbacks {
                        return RefreshOutcome::Invalid { city: location };
                    }
                    fallbacks += 1;
                    location = self.settings.default_city.clone();
                    continue;
                }
                Err(FetchError::Cancelled) => {
                    tracing::debug!(%location, "weather request superseded");
                    return RefreshOutcome::Superseded;
                }
                Err(err) => {
                    tracing::error!(%location, "getting weather failed: {err}");
                    return RefreshOutcome::Failed;
                }
            };

            return self.render(generation, location, snapshot);
        }
    }

    fn render(&self, generation: u64, city: String, snapshot: WeatherSnapshot) -> RefreshOutcome {
        let mut state = self.lock_state();
        if state.generation() != generation {
            tracing::debug!(%city, "dropping stale weather reply");
            return RefreshOutcome::Superseded;
        }

        let mut page = Page::default();
        if let Err(err) =
            self.renderer
                .populate_weather_conditions(&mut page, &snapshot, self.badge.as_deref())
        {
            tracing::error!("{err}");
            return RefreshOutcome::Failed;
        }

        state.apply(StateUpdate::Rendered {
            generation,
            city: city.clone(),
            snapshot,
            page,
        });
        tracing::info!(%city, "weather updated");
        RefreshOutcome::Rendered { city }
    }

    /// Autocomplete suggestions for a partially typed city. Short terms
    /// return nothing without contacting the service; a newer search
    /// cancels an older one still in flight.
    pub async fn suggest(&self, term: &str) -> Vec<Suggestion> {
        let term = term.trim();
        if term.chars().count() < self.settings.autocomplete_min_length {
            return Vec::new();
        }

        let token = CancellationToken::new();
        if let Some(previous) = self
            .search
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(token.clone())
        {
            previous.cancel();
        }

        match self.places.search_places(term, &token).await {
            Ok(suggestions) => suggestions,
            Err(FetchError::Cancelled) => Vec::new(),
            Err(err) => {
                tracing::error!(term, "place search failed: {err}");
                Vec::new()
            }
        }
    }

    /// User picked a suggestion: remember it and show its weather.
    pub async fn select(&self, suggestion: &Suggestion) -> RefreshOutcome {
        tracing::info!(city = %suggestion.label, "city selected");
        self.remember_city(&suggestion.label);
        self.show_weather(&suggestion.label).await
    }

    /// Resolve the current position to a place, remember it and show its
    /// weather.
    pub async fn use_current_location(&self) -> RefreshOutcome {
        let position = match self.geolocator.current_position().await {
            Ok(position) => position,
            Err(err) => {
                tracing::error!("failed when retrieving current location: {err}");
                return RefreshOutcome::Failed;
            }
        };

        let token = CancellationToken::new();
        let name = match self.places.get_location_info(position, &token).await {
            Ok(name) => name,
            Err(err) => {
                tracing::error!("getting location info failed: {err}");
                return RefreshOutcome::Failed;
            }
        };

        self.remember_city(&name);
        self.show_weather(&name).await
    }

    /// Refresh every `refresh_interval` until `shutdown` fires. The first
    /// refresh happens one interval from now; `on_refresh` sees every
    /// outcome together with the state as it stands afterwards.
    pub async fn run_periodic<F>(&self, shutdown: CancellationToken, mut on_refresh: F)
    where
        F: FnMut(&RefreshOutcome, &AppState),
    {
        let period = self.settings.refresh_interval;
        let mut ticker = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("periodic refresh stopped");
                    return;
                }
                _ = ticker.tick() => {
                    tracing::debug!("periodic refresh");
                    let outcome = self.refresh().await;
                    let state = self.state();
                    on_refresh(&outcome, &state);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::PositionError,
        geolocation::StaticPosition,
        model::{CurrentConditions, ForecastInformation, Position},
        prefs::MemoryPreferenceStore,
        render::Region,
    };
    use async_trait::async_trait;

    #[derive(Debug, Default)]
    struct FakeWeather {
        calls: Mutex<Vec<String>>,
        invalid: Vec<&'static str>,
        failing: Vec<&'static str>,
        /// Cities whose request hangs until cancelled.
        slow: Vec<&'static str>,
    }

    impl FakeWeather {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn snapshot_for(city: &str) -> WeatherSnapshot {
        WeatherSnapshot {
            forecast: ForecastInformation {
                city: Some(city.to_string()),
                forecast_date: Some("2012-02-11".into()),
            },
            current_conditions: CurrentConditions {
                condition: "Clear".into(),
                temp_f: Some("50".into()),
                temp_c: None,
                humidity: None,
                icon: None,
                wind_condition: None,
            },
            forecast_conditions: Vec::new(),
        }
    }

    #[async_trait]
    impl WeatherSource for FakeWeather {
        async fn get_weather_info(
            &self,
            location: &str,
            cancel: &CancellationToken,
        ) -> Result<WeatherOutcome, FetchError> {
            self.calls.lock().unwrap().push(location.to_string());

            if self.slow.contains(&location) {
                cancel.cancelled().await;
                return Err(FetchError::Cancelled);
            }
            if self.failing.contains(&location) {
                return Err(FetchError::NoResults { service: "weather" });
            }
            if self.invalid.contains(&location) {
                return Ok(WeatherOutcome::Invalid);
            }
            Ok(WeatherOutcome::Ready(snapshot_for(location)))
        }
    }

    #[derive(Debug, Default)]
    struct FakePlaces {
        searches: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PlaceLookup for FakePlaces {
        async fn get_location_info(
            &self,
            position: Position,
            _cancel: &CancellationToken,
        ) -> Result<String, FetchError> {
            if position.latitude > 90.0 {
                return Err(FetchError::NoResults { service: "geonames" });
            }
            Ok("Dayton, OH, United States".to_string())
        }

        async fn search_places(
            &self,
            term: &str,
            _cancel: &CancellationToken,
        ) -> Result<Vec<Suggestion>, FetchError> {
            self.searches.lock().unwrap().push(term.to_string());
            Ok(vec![Suggestion {
                label: format!("{term}ville, Ohio, United States"),
                value: format!("{term}ville"),
            }])
        }
    }

    struct Harness {
        widget: Arc<Widget>,
        weather: Arc<FakeWeather>,
        places: Arc<FakePlaces>,
        prefs: Arc<MemoryPreferenceStore>,
    }

    fn harness(weather: FakeWeather, prefs: MemoryPreferenceStore, position: Option<Position>) -> Harness {
        let weather = Arc::new(weather);
        let places = Arc::new(FakePlaces::default());
        let prefs = Arc::new(prefs);
        let widget = Widget::new(
            weather.clone(),
            places.clone(),
            prefs.clone(),
            Geolocator::new(Arc::new(StaticPosition(position)), PositionOptions::default()),
            Renderer::default(),
            WidgetSettings::default(),
        );
        Harness {
            widget: Arc::new(widget),
            weather,
            places,
            prefs,
        }
    }

    #[tokio::test]
    async fn stored_preference_is_fetched() {
        let h = harness(FakeWeather::default(), MemoryPreferenceStore::with_city("Seattle"), None);

        let outcome = h.widget.start().await;

        assert_eq!(outcome, RefreshOutcome::Rendered { city: "Seattle".into() });
        assert_eq!(h.weather.calls(), vec!["Seattle"]);
        assert!(h.widget.state().page().region(Region::ForecastInformation).contains("Seattle"));
    }

    #[tokio::test]
    async fn rendered_state_keeps_snapshot_and_time() {
        let h = harness(FakeWeather::default(), MemoryPreferenceStore::with_city("Seattle"), None);
        assert!(h.widget.state().snapshot().is_none());
        assert!(h.widget.state().updated_at().is_none());

        let before = Utc::now();
        h.widget.start().await;

        let state = h.widget.state();
        assert_eq!(state.snapshot(), Some(&snapshot_for("Seattle")));
        assert!(state.updated_at().is_some_and(|at| at >= before));
    }

    #[tokio::test]
    async fn no_preference_fetches_default_city() {
        let h = harness(FakeWeather::default(), MemoryPreferenceStore::default(), None);

        h.widget.start().await;

        assert_eq!(h.weather.calls(), vec!["Dayton"]);
        assert_eq!(h.widget.state().city(), Some("Dayton"));
    }

    #[tokio::test]
    async fn blank_preference_counts_as_none() {
        let h = harness(FakeWeather::default(), MemoryPreferenceStore::with_city("  "), None);
        h.widget.start().await;
        assert_eq!(h.weather.calls(), vec!["Dayton"]);
    }

    #[tokio::test]
    async fn invalid_reply_triggers_exactly_one_fallback() {
        let weather = FakeWeather {
            invalid: vec!["Atlantis"],
            ..FakeWeather::default()
        };
        let h = harness(weather, MemoryPreferenceStore::with_city("Atlantis"), None);

        let outcome = h.widget.start().await;

        assert_eq!(outcome, RefreshOutcome::Rendered { city: "Dayton".into() });
        assert_eq!(h.weather.calls(), vec!["Atlantis", "Dayton"]);
    }

    #[tokio::test]
    async fn invalid_fallback_stops_after_bound() {
        let weather = FakeWeather {
            invalid: vec!["Atlantis", "Dayton"],
            ..FakeWeather::default()
        };
        let h = harness(weather, MemoryPreferenceStore::with_city("Atlantis"), None);

        let outcome = h.widget.start().await;

        assert_eq!(outcome, RefreshOutcome::Invalid { city: "Dayton".into() });
        assert_eq!(h.weather.calls(), vec!["Atlantis", "Dayton"]);
        assert!(h.widget.state().page().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_leaves_page_untouched() {
        let weather = FakeWeather {
            failing: vec!["Paris"],
            ..FakeWeather::default()
        };
        let h = harness(weather, MemoryPreferenceStore::default(), None);

        h.widget.show_weather("Dayton").await;
        let before = h.widget.state().page().clone();

        let outcome = h.widget.show_weather("Paris").await;

        assert_eq!(outcome, RefreshOutcome::Failed);
        assert_eq!(h.weather.calls(), vec!["Dayton", "Paris"]);
        assert_eq!(h.widget.state().page(), &before);
        assert_eq!(h.widget.state().city(), Some("Dayton"));
    }

    #[tokio::test]
    async fn newer_request_supersedes_inflight_one() {
        let weather = FakeWeather {
            slow: vec!["Slowtown"],
            ..FakeWeather::default()
        };
        let h = harness(weather, MemoryPreferenceStore::default(), None);

        let widget = h.widget.clone();
        let slow = tokio::spawn(async move { widget.show_weather("Slowtown").await });

        while h.weather.calls().is_empty() {
            tokio::task::yield_now().await;
        }

        let fast = h.widget.show_weather("Fasttown").await;

        assert_eq!(slow.await.unwrap(), RefreshOutcome::Superseded);
        assert_eq!(fast, RefreshOutcome::Rendered { city: "Fasttown".into() });
        assert_eq!(h.widget.state().city(), Some("Fasttown"));
    }

    #[test]
    fn stale_render_is_rejected_by_state() {
        let mut state = AppState::default();
        state.apply(StateUpdate::FetchStarted { token: CancellationToken::new() });
        let stale = state.generation();
        let first = CancellationToken::new();
        state.apply(StateUpdate::FetchStarted { token: first.clone() });
        state.apply(StateUpdate::FetchStarted { token: CancellationToken::new() });

        assert!(first.is_cancelled());
        let applied = state.apply(StateUpdate::Rendered {
            generation: stale,
            city: "Old".into(),
            snapshot: snapshot_for("Old"),
            page: Page::default(),
        });
        assert!(!applied);
        assert_eq!(state.city(), None);
    }

    #[tokio::test]
    async fn short_search_terms_do_not_hit_the_service() {
        let h = harness(FakeWeather::default(), MemoryPreferenceStore::default(), None);

        assert!(h.widget.suggest("S").await.is_empty());
        assert!(h.widget.suggest(" S ").await.is_empty());
        assert!(h.places.searches.lock().unwrap().is_empty());

        let suggestions = h.widget.suggest("Sp").await;
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].label, "Spville, Ohio, United States");
    }

    #[tokio::test]
    async fn selecting_a_suggestion_persists_label_and_fetches_it() {
        let h = harness(FakeWeather::default(), MemoryPreferenceStore::default(), None);
        let choice = Suggestion {
            label: "Springfield, Ohio, United States".into(),
            value: "Springfield".into(),
        };

        let outcome = h.widget.select(&choice).await;

        assert_eq!(
            outcome,
            RefreshOutcome::Rendered { city: "Springfield, Ohio, United States".into() }
        );
        assert_eq!(
            h.prefs.get(CITY_KEY).unwrap().as_deref(),
            Some("Springfield, Ohio, United States")
        );
        assert_eq!(h.weather.calls(), vec!["Springfield, Ohio, United States"]);
    }

    #[tokio::test]
    async fn current_location_is_resolved_persisted_and_fetched() {
        let position = Position { latitude: 39.76, longitude: -84.19 };
        let h = harness(FakeWeather::default(), MemoryPreferenceStore::default(), Some(position));

        let outcome = h.widget.use_current_location().await;

        assert_eq!(outcome, RefreshOutcome::Rendered { city: "Dayton, OH, United States".into() });
        assert_eq!(h.prefs.get(CITY_KEY).unwrap().as_deref(), Some("Dayton, OH, United States"));
    }

    #[tokio::test]
    async fn missing_position_fails_without_fetching() {
        let h = harness(FakeWeather::default(), MemoryPreferenceStore::default(), None);

        assert_eq!(h.widget.use_current_location().await, RefreshOutcome::Failed);
        assert!(h.weather.calls().is_empty());
        assert_eq!(h.prefs.get(CITY_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn failed_lookup_keeps_preference() {
        let position = Position { latitude: 91.0, longitude: 0.0 };
        let h = harness(FakeWeather::default(), MemoryPreferenceStore::with_city("Seattle"), Some(position));

        assert_eq!(h.widget.use_current_location().await, RefreshOutcome::Failed);
        assert_eq!(h.prefs.get(CITY_KEY).unwrap().as_deref(), Some("Seattle"));
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_refresh_rereads_preference() {
        let h = harness(FakeWeather::default(), MemoryPreferenceStore::with_city("Seattle"), None);
        let shutdown = CancellationToken::new();
        let started = Instant::now();
        let mut seen = Vec::new();

        let prefs = h.prefs.clone();
        let stop = shutdown.clone();
        h.widget
            .run_periodic(shutdown.clone(), |outcome, state| {
                seen.push((
                    outcome.clone(),
                    state.page().region(Region::ForecastInformation).to_string(),
                ));
                if seen.len() == 1 {
                    prefs.set(CITY_KEY, "Tacoma").unwrap();
                } else {
                    stop.cancel();
                }
            })
            .await;

        assert_eq!(h.weather.calls(), vec!["Seattle", "Tacoma"]);
        assert_eq!(seen[1].0, RefreshOutcome::Rendered { city: "Tacoma".into() });
        assert!(seen[1].1.contains("Tacoma"));
        assert!(started.elapsed() >= Duration::from_millis(2 * 900_000));
    }

    #[tokio::test]
    async fn position_error_type_is_reported() {
        let geo = Geolocator::new(Arc::new(StaticPosition(None)), PositionOptions::default());
        assert_eq!(geo.current_position().await.unwrap_err(), PositionError::Unavailable);
    }
}
