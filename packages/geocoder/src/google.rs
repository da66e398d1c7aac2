//! Google Geocoding API reverse-lookup client.
//!
//! The remote tier of the location chain. The API always answers HTTP 200
//! and reports failures through its `status` field (`ZERO_RESULTS`,
//! `OVER_QUERY_LIMIT`, `REQUEST_DENIED`, ...), so anything other than `OK`
//! is surfaced as [`GeocodeError::Status`].
//!
//! See <https://developers.google.com/maps/documentation/geocoding/requests-reverse-geocoding>

use async_trait::async_trait;
use fireline_incident_models::Coordinates;

use crate::{GeocodeError, ReverseGeocoder};

/// Reverse geocoder backed by the Google Geocoding API.
#[derive(Debug, Clone)]
pub struct GoogleGeocoder {
    id: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleGeocoder {
    /// Creates a client for `base_url` (e.g.
    /// `"https://maps.googleapis.com/maps/api/geocode/json"`).
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl ReverseGeocoder for GoogleGeocoder {
    fn id(&self) -> &str {
        &self.id
    }

    async fn reverse(&self, point: Coordinates) -> Result<Option<String>, GeocodeError> {
        let latlng = format!("{},{}", point.latitude, point.longitude);
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("latlng", latlng.as_str()), ("key", self.api_key.as_str())])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(GeocodeError::Status {
                status: resp.status().to_string(),
            });
        }

        let body: serde_json::Value = resp.json().await?;
        parse_response(&body)
    }
}

/// Parses a Geocoding API JSON response.
fn parse_response(body: &serde_json::Value) -> Result<Option<String>, GeocodeError> {
    let status = body["status"].as_str().ok_or_else(|| GeocodeError::Parse {
        message: "Geocoding response missing 'status'".to_string(),
    })?;

    match status {
        "OK" => {}
        "ZERO_RESULTS" => return Ok(None),
        other => {
            return Err(GeocodeError::Status {
                status: other.to_string(),
            });
        }
    }

    Ok(body["results"]
        .as_array()
        .and_then(|results| results.first())
        .and_then(|first| first["formatted_address"].as_str())
        .filter(|s| !s.trim().is_empty())
        .map(String::from))
}
