//! Postal addresses and their normalized cache identity.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::cache::compute_cache_key;

/// A postal address as entered by a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Address {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

impl Address {
    pub fn new(
        street: impl Into<String>, postal_code: impl Into<String>, city: impl Into<String>, country: impl Into<String>,
    ) -> Self {
        Self { street: street.into(), postal_code: postal_code.into(), city: city.into(), country: country.into() }
    }

    /// An address known only by its postal code.
    pub fn from_postal_code(postal_code: impl Into<String>) -> Self {
        Self { postal_code: postal_code.into(), ..Default::default() }
    }

    /// Lowercased, whitespace-collapsed form; the postal code loses all whitespace.
    pub fn normalized(&self) -> Address {
        Address {
            street: collapse_whitespace(&self.street),
            postal_code: self
                .postal_code
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_lowercase(),
            city: collapse_whitespace(&self.city),
            country: collapse_whitespace(&self.country),
        }
    }

    /// True when no field carries anything usable.
    pub fn is_blank(&self) -> bool {
        [&self.street, &self.postal_code, &self.city, &self.country]
            .iter()
            .all(|f| f.trim().is_empty())
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.is_blank() {
            return Err(Error::InvalidInput("address has no street, postal code, city or country".into()));
        }
        Ok(())
    }

    /// Hashed key of the normalized form within `namespace`.
    pub fn cache_key(&self, namespace: &str) -> String {
        let n = self.normalized();
        compute_cache_key(namespace, &[&n.street, &n.postal_code, &n.city, &n.country])
    }

    /// Free-form query string for the provider.
    pub fn to_query(&self) -> String {
        [&self.street, &self.postal_code, &self.city, &self.country]
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_is_stable() {
        let a = Address::new("  Markt  12 ", "6221 ab", "MAASTRICHT", "NL");
        let b = Address::new("markt 12", "6221AB", "Maastricht ", " nl");
        assert_eq!(a.normalized(), b.normalized());
        assert_eq!(a.cache_key("geo"), b.cache_key("geo"));
        assert_eq!(a.normalized().normalized(), a.normalized());
    }

    #[test]
    fn test_different_addresses_differ() {
        let a = Address::new("Markt 12", "6221AB", "Maastricht", "NL");
        let b = Address::new("Markt 14", "6221AB", "Maastricht", "NL");
        assert_ne!(a.cache_key("geo"), b.cache_key("geo"));
    }

    #[test]
    fn test_blank_address_rejected() {
        assert!(Address::new(" ", "", "\t", "").validate().is_err());
        assert!(Address::from_postal_code("6221").validate().is_ok());
    }

    #[test]
    fn test_query_skips_empty_fields() {
        let a = Address::new("Markt 12", "", "Maastricht", "NL");
        assert_eq!(a.to_query(), "Markt 12, Maastricht, NL");
    }
}
