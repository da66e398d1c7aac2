#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Location resolver for incident display.
//!
//! Incidents store either a previously resolved address or a raw
//! `"lat,lng"` pair. [`resolver::LocationResolver`] turns that value into a
//! display string through a fallback chain:
//!
//! 1. **Stored address**: letters-only values are returned as-is.
//! 2. **Remote geocoder** (priority 1, ~1.5s budget): Google Geocoding API
//!    reverse lookup.
//! 3. **Local geocoder** (priority 2): a self-hosted Nominatim reverse
//!    lookup standing in for the device-local geocoder.
//! 4. **Coordinates**: the pair rounded to 4 decimal places.
//!
//! Tiers 2 and 3 are loaded from the [`service_registry`] and executed in
//! priority order, each under its own timeout. Every failure degrades to a
//! less informative result; resolution never returns an error.

pub mod google;
pub mod location;
pub mod nominatim;
pub mod resolver;
pub mod service_registry;

use async_trait::async_trait;
use fireline_incident_models::Coordinates;
use thiserror::Error;

pub use resolver::{GeocoderTier, LocationResolver, LocationSource, ResolvedLocation};

/// Errors from reverse-geocoding providers.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// The provider answered but reported a non-OK status.
    #[error("Geocoder returned status {status}")]
    Status {
        /// Provider status string or HTTP status code.
        status: String,
    },

    /// The provider did not answer within its time budget.
    #[error("Geocoder timed out after {millis}ms")]
    Timeout {
        /// Time budget that was exceeded.
        millis: u64,
    },
}

/// A provider that can turn a coordinate pair into a formatted address.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Identifier used in logs and in [`LocationSource::Geocoded`].
    fn id(&self) -> &str;

    /// Looks up the address for `point`.
    ///
    /// Returns `Ok(None)` when the provider answered but had no match.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the request fails or the response cannot
    /// be understood.
    async fn reverse(&self, point: Coordinates) -> Result<Option<String>, GeocodeError>;
}
