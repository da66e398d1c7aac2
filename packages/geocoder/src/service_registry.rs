//! Reverse-geocoding tiers embedded from `services/*.toml`.
//!
//! The location chain runs the enabled tiers in ascending `priority`: the
//! remote API with a short budget first, then the self-hosted fallback.

use std::time::Duration;

use serde::Deserialize;

/// One tier of the location chain as described in TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingService {
    /// Tier id, used in logs and as the reported provider.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Disabled tiers are parsed but never run.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Lower runs first.
    pub priority: u32,
    /// Lookup budget in milliseconds.
    pub timeout_ms: u64,
    /// Endpoint settings.
    pub provider: ProviderConfig,
}

/// Endpoint settings, selected by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Google Geocoding API.
    Google {
        /// Geocode endpoint.
        base_url: String,
        /// Env var holding the API key.
        #[serde(default = "google_key_env")]
        api_key_env: String,
    },
    /// Nominatim reverse endpoint.
    Nominatim {
        /// Reverse endpoint (e.g. `http://localhost:8088/reverse`).
        base_url: String,
        /// Sent as `User-Agent`; public Nominatim instances require one.
        user_agent: String,
    },
}

const fn enabled_by_default() -> bool {
    true
}

fn google_key_env() -> String {
    "GEOCODING_API_KEY".to_string()
}

impl GeocodingService {
    /// Lookup budget.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn endpoint(&self) -> &str {
        match &self.provider {
            ProviderConfig::Google { base_url, .. } | ProviderConfig::Nominatim { base_url, .. } => {
                base_url
            }
        }
    }
}

const EMBEDDED: &[(&str, &str)] = &[
    ("google.toml", include_str!("../services/google.toml")),
    (
        "nominatim_local.toml",
        include_str!("../services/nominatim_local.toml"),
    ),
];

fn parse_all(files: &[(&str, &str)]) -> Vec<GeocodingService> {
    files
        .iter()
        .filter_map(|(file, body)| match toml::de::from_str::<GeocodingService>(body) {
            Ok(svc) if svc.endpoint().is_empty() => {
                log::warn!("Ignoring geocoding service in {file}: empty base_url");
                None
            }
            Ok(svc) => Some(svc),
            Err(e) => {
                log::error!("Ignoring malformed geocoding service {file}: {e}");
                None
            }
        })
        .collect()
}

/// Every embedded service, including disabled ones.
#[must_use]
pub fn all_services() -> Vec<GeocodingService> {
    parse_all(EMBEDDED)
}

/// The enabled services in chain order.
#[must_use]
pub fn location_chain() -> Vec<GeocodingService> {
    let mut chain: Vec<GeocodingService> =
        all_services().into_iter().filter(|svc| svc.enabled).collect();
    chain.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_services_parse() {
        let ids: Vec<String> = all_services().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, ["google", "nominatim_local"]);
    }

    #[test]
    fn chain_runs_remote_tier_first_with_short_budget() {
        let chain = location_chain();
        assert!(matches!(chain[0].provider, ProviderConfig::Google { .. }));
        assert_eq!(chain[0].timeout(), Duration::from_millis(1500));
        assert!(matches!(chain[1].provider, ProviderConfig::Nominatim { .. }));
        assert_eq!(chain[1].timeout(), Duration::from_millis(3000));
    }

    #[test]
    fn google_key_env_defaults() {
        let svc: GeocodingService = toml::de::from_str(
            r#"
            id = "g"
            name = "G"
            priority = 1
            timeout_ms = 100

            [provider]
            type = "google"
            base_url = "https://example.test/geocode"
            "#,
        )
        .unwrap();
        assert!(svc.enabled);
        let ProviderConfig::Google { api_key_env, .. } = svc.provider else {
            panic!("expected google provider");
        };
        assert_eq!(api_key_env, "GEOCODING_API_KEY");
    }

    #[test]
    fn malformed_and_empty_entries_are_skipped() {
        let parsed = parse_all(&[
            ("broken.toml", "id = "),
            (
                "empty.toml",
                r#"
                id = "e"
                name = "E"
                priority = 1
                timeout_ms = 100
                [provider]
                type = "nominatim"
                base_url = ""
                user_agent = "x"
                "#,
            ),
        ]);
        assert!(parsed.is_empty());
    }
}
