use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::{
    error::FetchError,
    model::{Position, Suggestion},
};

use super::{PlaceLookup, fetch_body};

const SERVICE: &str = "geonames";

/// Client for the geonames.org JSON services.
#[derive(Debug, Clone)]
pub struct GeonamesClient {
    http: Client,
    base_url: String,
    username: String,
    max_rows: u32,
}

impl GeonamesClient {
    pub fn new(http: Client, base_url: String, username: String, max_rows: u32) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            max_rows,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn parse<T: for<'de> Deserialize<'de>>(body: &str) -> Result<GnResponse<T>, FetchError> {
        let parsed: GnResponse<T> = serde_json::from_str(body).map_err(|e| FetchError::Parse {
            service: SERVICE,
            message: e.to_string(),
        })?;

        // Errors (bad username, quota) come back as 200 with a status object.
        if let Some(status) = &parsed.status {
            return Err(FetchError::Rejected {
                service: SERVICE,
                message: status.message.clone(),
            });
        }

        Ok(parsed)
    }
}

#[derive(Debug, Deserialize)]
struct GnStatus {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GnResponse<T> {
    #[serde(default = "Vec::new")]
    geonames: Vec<T>,
    status: Option<GnStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GnNearbyPlace {
    toponym_name: Option<String>,
    admin_code1: Option<String>,
    country_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GnSearchPlace {
    name: String,
    admin_name1: Option<String>,
    country_name: Option<String>,
}

impl GnNearbyPlace {
    fn display_name(&self) -> String {
        [&self.toponym_name, &self.admin_code1, &self.country_name]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl From<GnSearchPlace> for Suggestion {
    fn from(place: GnSearchPlace) -> Self {
        let mut label = place.name.clone();
        if let Some(admin) = place.admin_name1.as_deref().filter(|a| !a.is_empty()) {
            label.push_str(", ");
            label.push_str(admin);
        }
        if let Some(country) = place.country_name.as_deref().filter(|c| !c.is_empty()) {
            label.push_str(", ");
            label.push_str(country);
        }

        Suggestion { label, value: place.name }
    }
}

#[async_trait]
impl PlaceLookup for GeonamesClient {
    async fn get_location_info(
        &self,
        position: Position,
        cancel: &CancellationToken,
    ) -> Result<String, FetchError> {
        tracing::info!(
            latitude = position.latitude,
            longitude = position.longitude,
            "getting toponym"
        );

        let request = self
            .http
            .get(format!("{}/findNearbyPlaceNameJSON", self.base_url))
            .query(&[
                ("lat", position.latitude.to_string()),
                ("lng", position.longitude.to_string()),
                ("username", self.username.clone()),
                ("style", "full".to_string()),
            ]);

        let body = fetch_body(SERVICE, request, cancel).await?;
        let parsed = Self::parse::<GnNearbyPlace>(&body)?;

        let name = parsed
            .geonames
            .first()
            .map(GnNearbyPlace::display_name)
            .filter(|name| !name.is_empty())
            .ok_or(FetchError::NoResults { service: SERVICE })?;

        tracing::info!(%name, "resolved location");
        Ok(name)
    }

    async fn search_places(
        &self,
        term: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Suggestion>, FetchError> {
        tracing::debug!(term, "searching places");

        let max_rows = self.max_rows.to_string();
        let request = self
            .http
            .get(format!("{}/searchJSON", self.base_url))
            .query(&[
                ("username", self.username.as_str()),
                ("style", "full"),
                ("featureClass", "P"),
                ("maxRows", max_rows.as_str()),
                ("name_startsWith", term),
            ]);

        let body = fetch_body(SERVICE, request, cancel).await?;
        let parsed = Self::parse::<GnSearchPlace>(&body)?;

        Ok(parsed.geonames.into_iter().map(Suggestion::from).collect())
    }
}
