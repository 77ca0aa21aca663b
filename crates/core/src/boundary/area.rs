//! Service areas and postal-code ranges.

use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// Four digits, optionally followed by two letters ("6221", "6221 AB").
static POSTAL_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{4})\s*([A-Za-z]{2})?\s*$").expect("Invalid postal code regex"));

/// A parsed postal code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostalCode {
    pub digits: u16,
    pub letters: Option<String>,
}

impl PostalCode {
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = POSTAL_CODE_RE.captures(raw)?;
        let digits = caps.get(1)?.as_str().parse().ok()?;
        let letters = caps.get(2).map(|m| m.as_str().to_uppercase());
        Some(Self { digits, letters })
    }

    /// Canonical form: digits then uppercase letters, no space.
    pub fn canonical(&self) -> String {
        format!("{:04}{}", self.digits, self.letters.as_deref().unwrap_or(""))
    }
}

/// An inclusive range of numeric postal codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PostalRange {
    pub start: u16,
    pub end: u16,
    /// Codes inside the range that are not served, either "6199" or "6199AB".
    #[serde(default)]
    pub excluded_codes: Vec<String>,
}

impl PostalRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end, excluded_codes: Vec::new() }
    }

    pub fn contains(&self, code: &PostalCode) -> bool {
        if !(self.start..=self.end).contains(&code.digits) {
            return false;
        }

        let canonical = code.canonical();
        let digits_only = format!("{:04}", code.digits);
        !self.excluded_codes.iter().any(|excluded| {
            let excluded = excluded.split_whitespace().collect::<String>().to_uppercase();
            excluded == canonical || excluded == digits_only
        })
    }
}

/// A region the business serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ServiceArea {
    pub id: String,
    pub name: String,
    /// Text that appears in the provider's formatted address for places in
    /// this area (a province or municipality name).
    pub region_marker: String,
    pub centroid: GeoPoint,
    #[serde(default)]
    pub postal_ranges: Vec<PostalRange>,
}

impl ServiceArea {
    pub fn covers_postal_code(&self, code: &PostalCode) -> bool {
        self.postal_ranges.iter().any(|r| r.contains(code))
    }

    pub fn matches_formatted_address(&self, formatted: &str) -> bool {
        let marker = self.region_marker.trim().to_lowercase();
        !marker.is_empty() && formatted.to_lowercase().contains(&marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_postal_codes() {
        assert_eq!(PostalCode::parse("6221AB").unwrap().canonical(), "6221AB");
        assert_eq!(PostalCode::parse(" 6221 ab ").unwrap().canonical(), "6221AB");
        assert_eq!(PostalCode::parse("6221").unwrap().letters, None);
        assert!(PostalCode::parse("62A1").is_none());
        assert!(PostalCode::parse("").is_none());
        assert!(PostalCode::parse("62211AB").is_none());
    }

    #[test]
    fn test_range_with_exclusions() {
        let range = PostalRange {
            start: 5800,
            end: 6999,
            excluded_codes: vec!["6199".into(), "6221 ZZ".into()],
        };
        assert!(range.contains(&PostalCode::parse("6221AB").unwrap()));
        assert!(range.contains(&PostalCode::parse("5800").unwrap()));
        assert!(!range.contains(&PostalCode::parse("6199AA").unwrap()));
        assert!(!range.contains(&PostalCode::parse("6221ZZ").unwrap()));
        assert!(!range.contains(&PostalCode::parse("7000").unwrap()));
    }

    #[test]
    fn test_region_marker_match() {
        let area = ServiceArea {
            id: "south".into(),
            name: "South".into(),
            region_marker: "Limburg".into(),
            centroid: GeoPoint { lat: 50.85, lng: 5.69 },
            postal_ranges: vec![PostalRange::new(5800, 6999)],
        };
        assert!(area.matches_formatted_address("Markt 12, 6221 AB Maastricht, LIMBURG, Netherlands"));
        assert!(!area.matches_formatted_address("Dam 1, 1012 JS Amsterdam, Netherlands"));
    }
}
