use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use std::fmt::Debug;
use tokio_util::sync::CancellationToken;

use crate::{
    Config,
    build::SnapshotBuilder,
    error::{FetchError, truncate_body},
    model::{Position, Suggestion, WeatherOutcome},
    provider::{geonames::GeonamesClient, ig::IgWeatherClient},
};

pub mod geonames;
pub mod ig;

pub const USER_AGENT: &str = concat!("forecast/", env!("CARGO_PKG_VERSION"));

/// Weather by city name.
#[async_trait]
pub trait WeatherSource: Send + Sync + Debug {
    async fn get_weather_info(
        &self,
        location: &str,
        cancel: &CancellationToken,
    ) -> Result<WeatherOutcome, FetchError>;
}

/// Place names from coordinates or from a typed prefix.
#[async_trait]
pub trait PlaceLookup: Send + Sync + Debug {
    /// Nearest populated place, formatted as `name, region, country`.
    async fn get_location_info(
        &self,
        position: Position,
        cancel: &CancellationToken,
    ) -> Result<String, FetchError>;

    async fn search_places(
        &self,
        term: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Suggestion>, FetchError>;
}

/// Shared client. Requests carry no timeout of their own; a run ends
/// when the transport gives up or when it is superseded.
pub fn http_client() -> Result<Client, FetchError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|source| FetchError::Transport { service: "http", source })
}

/// Construct both remote services from config.
pub fn sources_from_config(config: &Config) -> Result<(IgWeatherClient, GeonamesClient), FetchError> {
    let http = http_client()?;

    let weather = IgWeatherClient::new(
        http.clone(),
        config.endpoints.weather_url.clone(),
        SnapshotBuilder::new(config.asset_dir.clone()),
    );
    let places = GeonamesClient::new(
        http,
        config.endpoints.geonames_url.clone(),
        config.geonames_username.clone(),
        config.autocomplete_max_rows,
    );

    Ok((weather, places))
}

/// Send `request` and return the body of a successful reply. Gives up early
/// with [`FetchError::Cancelled`] once `cancel` fires.
pub(crate) async fn fetch_body(
    service: &'static str,
    request: RequestBuilder,
    cancel: &CancellationToken,
) -> Result<String, FetchError> {
    let exchange = async {
        let res = request
            .send()
            .await
            .map_err(|source| FetchError::Transport { service, source })?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|source| FetchError::Transport { service, source })?;

        if !status.is_success() {
            return Err(FetchError::Status {
                service,
                status,
                body: truncate_body(&body),
            });
        }

        Ok(body)
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        result = exchange => result,
    }
}
