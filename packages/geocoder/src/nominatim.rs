//! Nominatim / OpenStreetMap reverse geocoder client.
//!
//! Used as the local tier of the location chain, normally pointed at a
//! self-hosted instance. The public instance allows at most 1 request per
//! second and requires an identifying `User-Agent`.
//!
//! See <https://nominatim.org/release-docs/develop/api/Reverse/>

use async_trait::async_trait;
use fireline_incident_models::Coordinates;

use crate::{GeocodeError, ReverseGeocoder};

/// Reverse geocoder backed by a Nominatim `/reverse` endpoint.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    id: String,
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl NominatimGeocoder {
    /// Creates a client for `base_url` (e.g.
    /// `"https://nominatim.openstreetmap.org/reverse"`).
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        client: reqwest::Client,
        base_url: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            client,
            base_url: base_url.into(),
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    fn id(&self) -> &str {
        &self.id
    }

    async fn reverse(&self, point: Coordinates) -> Result<Option<String>, GeocodeError> {
        let lat = point.latitude.to_string();
        let lon = point.longitude.to_string();
        let resp = self
            .client
            .get(&self.base_url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("format", "jsonv2"),
                ("zoom", "18"),
            ])
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

/// Parses a Nominatim reverse JSON response.
fn parse_response(body: &serde_json::Value) -> Result<Option<String>, GeocodeError> {
    if !body.is_object() {
        return Err(GeocodeError::Parse {
            message: "Nominatim response is not an object".to_string(),
        });
    }

    // "Unable to geocode" comes back as {"error": "..."} with HTTP 200.
    if body.get("error").is_some() {
        return Ok(None);
    }

    Ok(body["display_name"]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(String::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nominatim_result() {
        let body = serde_json::json!({
            "lat": "5.6037",
            "lon": "-0.1870",
            "display_name": "Kwame Nkrumah Avenue, Adabraka, Accra, Ghana"
        });
        assert_eq!(
            parse_response(&body).unwrap().as_deref(),
            Some("Kwame Nkrumah Avenue, Adabraka, Accra, Ghana")
        );
    }

    #[test]
    fn unable_to_geocode_is_none() {
        let body = serde_json::json!({ "error": "Unable to geocode" });
        assert!(parse_response(&body).unwrap().is_none());
    }

    #[test]
    fn array_is_parse_error() {
        let body = serde_json::json!([]);
        assert!(parse_response(&body).is_err());
    }
}
