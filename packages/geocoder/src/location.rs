//! Classification of stored incident locations.
//!
//! Reporters' clients store one of:
//! - A resolved address: `"Ring Road Central, Accra"`
//! - A raw coordinate pair: `"5.6037,-0.1870"`
//! - Garbage or out-of-range pairs from buggy clients: `"91.2,-0.18"`
//!
//! This module decides which of these a value is, without any I/O.

use fireline_incident_models::Coordinates;
use regex::Regex;
use std::sync::LazyLock;

/// Letters, whitespace, and common address punctuation only, with at least
/// one letter.
static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\p{L}\s,.'\-]*\p{L}[\p{L}\s,.'\-]*$").expect("valid regex")
});

/// A `"lat,lng"` pair of decimal numbers.
static COORDINATE_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([+-]?\d+(?:\.\d+)?)\s*,\s*([+-]?\d+(?:\.\d+)?)\s*$").expect("valid regex")
});

/// What a stored location value turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredLocation {
    /// Already a human-readable address.
    Address(String),
    /// A coordinate pair inside the valid latitude/longitude ranges.
    Coordinates(Coordinates),
    /// A coordinate pair outside `[-90, 90] x [-180, 180]`.
    OutOfRange,
    /// Neither an address nor a coordinate pair.
    Unrecognized,
}

/// Classifies a stored location value.
#[must_use]
pub fn classify(value: &str) -> StoredLocation {
    let trimmed = value.trim();

    if ADDRESS_RE.is_match(trimmed) {
        return StoredLocation::Address(trimmed.to_string());
    }

    let Some(caps) = COORDINATE_PAIR_RE.captures(trimmed) else {
        return StoredLocation::Unrecognized;
    };

    let lat = caps[1].parse::<f64>();
    let lng = caps[2].parse::<f64>();
    match (lat, lng) {
        (Ok(lat), Ok(lng)) => {
            let point = Coordinates::new(lat, lng);
            if point.is_valid() {
                StoredLocation::Coordinates(point)
            } else {
                StoredLocation::OutOfRange
            }
        }
        _ => StoredLocation::Unrecognized,
    }
}

/// Renders a coordinate pair rounded to 4 decimal places.
#[must_use]
pub fn format_coordinates(point: Coordinates) -> String {
    format!("{:.4}, {:.4}", point.latitude, point.longitude)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_only_is_address() {
        assert_eq!(
            classify("Ring Road Central, Accra"),
            StoredLocation::Address("Ring Road Central, Accra".to_string())
        );
        assert_eq!(
            classify("  Osu  "),
            StoredLocation::Address("Osu".to_string())
        );
    }

    #[test]
    fn accented_letters_are_address() {
        assert!(matches!(
            classify("Rue de l'Église, Lomé"),
            StoredLocation::Address(_)
        ));
    }

    #[test]
    fn parses_coordinate_pair() {
        assert_eq!(
            classify("5.6037,-0.1870"),
            StoredLocation::Coordinates(Coordinates::new(5.6037, -0.1870))
        );
        assert_eq!(
            classify(" 5.6 , -0.18 "),
            StoredLocation::Coordinates(Coordinates::new(5.6, -0.18))
        );
    }

    #[test]
    fn out_of_range_pair() {
        assert_eq!(classify("91.0,-0.18"), StoredLocation::OutOfRange);
        assert_eq!(classify("5.6,-180.01"), StoredLocation::OutOfRange);
    }

    #[test]
    fn boundary_values_are_valid() {
        assert_eq!(
            classify("-90,180"),
            StoredLocation::Coordinates(Coordinates::new(-90.0, 180.0))
        );
    }

    #[test]
    fn digits_and_letters_are_unrecognized() {
        assert_eq!(classify("12 Main St"), StoredLocation::Unrecognized);
        assert_eq!(classify(""), StoredLocation::Unrecognized);
        assert_eq!(classify(",,,"), StoredLocation::Unrecognized);
        assert_eq!(classify("5.6;-0.18"), StoredLocation::Unrecognized);
    }

    #[test]
    fn formats_four_decimals() {
        assert_eq!(
            format_coordinates(Coordinates::new(5.603_712, -0.186_964)),
            "5.6037, -0.1870"
        );
    }
}
