use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::{
    build::SnapshotBuilder,
    error::FetchError,
    model::WeatherOutcome,
};

use super::{WeatherSource, fetch_body};

/// Client for the `ig/api?weather=` XML service.
#[derive(Debug, Clone)]
pub struct IgWeatherClient {
    http: Client,
    url: String,
    builder: SnapshotBuilder,
}

impl IgWeatherClient {
    pub fn new(http: Client, url: String, builder: SnapshotBuilder) -> Self {
        Self { http, url, builder }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl WeatherSource for IgWeatherClient {
    async fn get_weather_info(
        &self,
        location: &str,
        cancel: &CancellationToken,
    ) -> Result<WeatherOutcome, FetchError> {
        tracing::info!(location, "getting weather");

        let request = self.http.get(&self.url).query(&[("weather", location)]);
        let body = fetch_body("weather", request, cancel).await?;

        tracing::debug!(location, bytes = body.len(), "weather reply received");
        self.builder.build_weather_xml(&body)
    }
}
