use thiserror::Error;

/// Failure of a remote fetch. These are logged by the caller and never
/// surfaced to the page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {service} failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} request failed with status {status}: {body}")]
    Status {
        service: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("failed to parse {service} response: {message}")]
    Parse { service: &'static str, message: String },

    #[error("{service} rejected the request: {message}")]
    Rejected { service: &'static str, message: String },

    #[error("{service} returned no results")]
    NoResults { service: &'static str },

    #[error("request was superseded by a newer one")]
    Cancelled,
}

/// Current conditions came back without a `condition` value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("weather data has no current condition")]
pub struct InvalidWeatherData;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("icon url '{url}' does not end in a <name>.gif file")]
pub struct IconFormatError {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("no position source is configured")]
    Unavailable,
    #[error("position request timed out after {0} ms")]
    Timeout(u64),
}

#[derive(Debug, Error)]
#[error("failed to render {region}: {source}")]
pub struct RenderError {
    pub region: &'static str,
    #[source]
    pub source: minijinja::Error,
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_body_keeps_short_bodies() {
        assert_eq!(truncate_body("not found"), "not found");
    }

    #[test]
    fn truncate_body_cuts_on_char_boundary() {
        let body = "é".repeat(150);
        let out = truncate_body(&body);
        assert!(out.ends_with("..."));
        assert!(out.len() <= 203);
    }
}
