//! The location fallback chain.

use std::sync::Arc;
use std::time::Duration;

use fireline_incident_models::Coordinates;
use serde::Serialize;

use crate::google::GoogleGeocoder;
use crate::location::{StoredLocation, classify, format_coordinates};
use crate::nominatim::NominatimGeocoder;
use crate::service_registry::{ProviderConfig, location_chain};
use crate::{GeocodeError, ReverseGeocoder};

/// One provider in the chain together with its time budget.
#[derive(Clone)]
pub struct GeocoderTier {
    /// The provider.
    pub geocoder: Arc<dyn ReverseGeocoder>,
    /// Maximum time to wait for an answer.
    pub timeout: Duration,
}

impl std::fmt::Debug for GeocoderTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeocoderTier")
            .field("geocoder", &self.geocoder.id())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Where a display string came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LocationSource {
    /// The stored value was already an address.
    Stored,
    /// A provider in the chain produced the address.
    Geocoded {
        /// Id of the provider that answered.
        provider: String,
    },
    /// Every provider failed; the display is the rounded pair.
    Coordinates,
    /// The stored value could not be interpreted and is shown unmodified.
    Raw,
}

/// Result of resolving a stored location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLocation {
    /// What to show the user.
    pub display: String,
    /// Which step of the chain produced it.
    pub source: LocationSource,
}

/// Turns stored location values into display strings.
#[derive(Debug, Clone, Default)]
pub struct LocationResolver {
    tiers: Vec<GeocoderTier>,
}

impl LocationResolver {
    /// Creates a resolver that tries `tiers` in order.
    #[must_use]
    pub const fn new(tiers: Vec<GeocoderTier>) -> Self {
        Self { tiers }
    }

    /// Builds the chain from the enabled services in the registry.
    ///
    /// Services that cannot be configured (e.g. a Google tier without an
    /// API key in the environment) are skipped with a warning.
    #[must_use]
    pub fn from_registry(client: &reqwest::Client) -> Self {
        let tiers = location_chain()
            .into_iter()
            .filter_map(|svc| {
                let timeout = svc.timeout();
                let geocoder: Arc<dyn ReverseGeocoder> = match svc.provider {
                    ProviderConfig::Google {
                        base_url,
                        api_key_env,
                    } => match std::env::var(&api_key_env) {
                        Ok(key) if !key.is_empty() => Arc::new(GoogleGeocoder::new(
                            svc.id.clone(),
                            client.clone(),
                            base_url,
                            key,
                        )),
                        _ => {
                            log::warn!(
                                "Skipping geocoder '{}': {api_key_env} is not set",
                                svc.id
                            );
                            return None;
                        }
                    },
                    ProviderConfig::Nominatim {
                        base_url,
                        user_agent,
                    } => Arc::new(NominatimGeocoder::new(
                        svc.id.clone(),
                        client.clone(),
                        base_url,
                        user_agent,
                    )),
                };
                log::info!(
                    "Geocoder tier '{}' ({}ms budget)",
                    svc.id,
                    timeout.as_millis()
                );
                Some(GeocoderTier { geocoder, timeout })
            })
            .collect();

        Self::new(tiers)
    }

    /// Number of provider tiers in the chain.
    #[must_use]
    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// Resolves a stored location value. Never fails.
    ///
    /// Letters-only values are returned as stored. Values that are not a
    /// valid in-range `"lat,lng"` pair are returned unmodified without
    /// contacting any provider.
    pub async fn resolve(&self, stored: &str) -> ResolvedLocation {
        match classify(stored) {
            StoredLocation::Address(address) => ResolvedLocation {
                display: address,
                source: LocationSource::Stored,
            },
            StoredLocation::Coordinates(point) => self.resolve_point(point).await,
            StoredLocation::OutOfRange | StoredLocation::Unrecognized => {
                log::debug!("Location '{stored}' is not a valid coordinate pair");
                ResolvedLocation {
                    display: stored.to_string(),
                    source: LocationSource::Raw,
                }
            }
        }
    }

    /// Runs the provider chain for a coordinate pair, falling back to the
    /// rounded pair when every tier fails.
    pub async fn resolve_point(&self, point: Coordinates) -> ResolvedLocation {
        for tier in &self.tiers {
            match lookup(tier, point).await {
                Ok(Some(address)) => {
                    return ResolvedLocation {
                        display: address,
                        source: LocationSource::Geocoded {
                            provider: tier.geocoder.id().to_string(),
                        },
                    };
                }
                Ok(None) => {
                    log::debug!(
                        "Geocoder '{}' had no match for {point:?}",
                        tier.geocoder.id()
                    );
                }
                Err(e) => {
                    log::warn!("Geocoder '{}' failed: {e}", tier.geocoder.id());
                }
            }
        }

        ResolvedLocation {
            display: format_coordinates(point),
            source: LocationSource::Coordinates,
        }
    }
}

async fn lookup(tier: &GeocoderTier, point: Coordinates) -> Result<Option<String>, GeocodeError> {
    tokio::time::timeout(tier.timeout, tier.geocoder.reverse(point))
        .await
        .map_err(|_| GeocodeError::Timeout {
            millis: u64::try_from(tier.timeout.as_millis()).unwrap_or(u64::MAX),
        })?
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    enum Behavior {
        Answer(&'static str),
        NoMatch,
        Fail,
        Hang,
    }

    struct StubGeocoder {
        id: &'static str,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl StubGeocoder {
        fn tier(id: &'static str, behavior: Behavior) -> (Arc<Self>, GeocoderTier) {
            let stub = Arc::new(Self {
                id,
                behavior,
                calls: AtomicUsize::new(0),
            });
            let tier = GeocoderTier {
                geocoder: stub.clone(),
                timeout: Duration::from_millis(50),
            };
            (stub, tier)
        }
    }

    #[async_trait]
    impl ReverseGeocoder for StubGeocoder {
        fn id(&self) -> &str {
            self.id
        }

        async fn reverse(&self, _point: Coordinates) -> Result<Option<String>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Answer(address) => Ok(Some(address.to_string())),
                Behavior::NoMatch => Ok(None),
                Behavior::Fail => Err(GeocodeError::Status {
                    status: "OVER_QUERY_LIMIT".to_string(),
                }),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(Some("too late".to_string()))
                }
            }
        }
    }

    #[tokio::test]
    async fn stored_address_returned_as_is() {
        let (remote, tier) = StubGeocoder::tier("remote", Behavior::Answer("ignored"));
        let resolver = LocationResolver::new(vec![tier]);

        let resolved = resolver.resolve("Ring Road Central, Accra").await;
        assert_eq!(resolved.display, "Ring Road Central, Accra");
        assert_eq!(resolved.source, LocationSource::Stored);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn remote_tier_answers_first() {
        let (_, remote) = StubGeocoder::tier("remote", Behavior::Answer("Osu, Accra"));
        let (local_stub, local) = StubGeocoder::tier("local", Behavior::Answer("local"));
        let resolver = LocationResolver::new(vec![remote, local]);

        let resolved = resolver.resolve("5.56,-0.18").await;
        assert_eq!(resolved.display, "Osu, Accra");
        assert_eq!(
            resolved.source,
            LocationSource::Geocoded {
                provider: "remote".to_string()
            }
        );
        assert_eq!(local_stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn timeout_falls_back_to_local_tier() {
        let (_, remote) = StubGeocoder::tier("remote", Behavior::Hang);
        let (_, local) = StubGeocoder::tier("local", Behavior::Answer("Adabraka"));
        let resolver = LocationResolver::new(vec![remote, local]);

        let resolved = resolver.resolve("5.56,-0.2").await;
        assert_eq!(resolved.display, "Adabraka");
        assert_eq!(
            resolved.source,
            LocationSource::Geocoded {
                provider: "local".to_string()
            }
        );
    }

    #[tokio::test]
    async fn total_failure_renders_rounded_pair() {
        let (_, remote) = StubGeocoder::tier("remote", Behavior::Fail);
        let (_, local) = StubGeocoder::tier("local", Behavior::NoMatch);
        let resolver = LocationResolver::new(vec![remote, local]);

        let resolved = resolver.resolve("5.603712,-0.186964").await;
        assert_eq!(resolved.display, "5.6037, -0.1870");
        assert_eq!(resolved.source, LocationSource::Coordinates);
    }

    #[tokio::test]
    async fn no_tiers_renders_rounded_pair() {
        let resolved = LocationResolver::default().resolve("5.6,-0.18").await;
        assert_eq!(resolved.display, "5.6000, -0.1800");
    }

    #[tokio::test]
    async fn out_of_range_returned_unmodified_without_lookup() {
        let (remote_stub, remote) = StubGeocoder::tier("remote", Behavior::Answer("nope"));
        let resolver = LocationResolver::new(vec![remote]);

        for raw in ["91.5,-0.18", "5.6,181", "-90.01,0"] {
            let resolved = resolver.resolve(raw).await;
            assert_eq!(resolved.display, raw);
            assert_eq!(resolved.source, LocationSource::Raw);
        }
        assert_eq!(remote_stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn garbage_returned_unmodified() {
        let resolved = LocationResolver::default().resolve("near the market 3").await;
        assert_eq!(resolved.display, "near the market 3");
        assert_eq!(resolved.source, LocationSource::Raw);
    }
}
