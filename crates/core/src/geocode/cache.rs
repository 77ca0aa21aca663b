//! Geocoding cache service and its warming routine.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use schemars::JsonSchema;
use serde::Serialize;

use super::{Address, GEO_NAMESPACE, GeocodeResult, PLACE_NAMESPACE};
use crate::Error;
use crate::batch::{WarmGuard, run_batched};
use crate::cache::{TwoTierCache, plain_key};
use crate::config::WarmingSettings;
use crate::frequency::FrequencyTracker;
use crate::provider::MapsProvider;
use crate::store::BookingStore;

/// Outcome of one geocoding warm run.
#[derive(Debug, Clone, Default, Serialize, JsonSchema)]
pub struct WarmReport {
    /// Distinct addresses gathered from all sources.
    pub candidates: usize,
    pub already_cached: usize,
    pub fetched: usize,
    pub failed: usize,
    /// True when another run was already in progress and this one did nothing.
    pub skipped: bool,
}

/// Cache of address → geocode result, backed by the provider.
pub struct GeocodingCache {
    cache: Arc<TwoTierCache>,
    provider: Arc<dyn MapsProvider>,
    store: Arc<dyn BookingStore>,
    frequent: FrequencyTracker<Address>,
    settings: WarmingSettings,
    warming: AtomicBool,
}

impl GeocodingCache {
    pub fn new(
        cache: Arc<TwoTierCache>, provider: Arc<dyn MapsProvider>, store: Arc<dyn BookingStore>,
        settings: WarmingSettings,
    ) -> Self {
        Self {
            cache,
            provider,
            store,
            frequent: FrequencyTracker::new(settings.frequent_address_cap),
            settings,
            warming: AtomicBool::new(false),
        }
    }

    /// Cached result for an address.
    pub async fn get(&self, address: &Address) -> Result<Option<GeocodeResult>, Error> {
        address.validate()?;
        let key = address.cache_key(GEO_NAMESPACE);
        let hit = self.cache.get_json::<GeocodeResult>(&key).await;
        tracing::debug!(key = %key, hit = hit.is_some(), "geocode cache lookup");
        Ok(hit)
    }

    /// Store a result under the address key and its permanent place-id key.
    pub async fn set(&self, address: &Address, result: &GeocodeResult) -> Result<(), Error> {
        address.validate()?;
        let key = address.cache_key(GEO_NAMESPACE);
        self.cache.set_json(&key, result, None).await?;
        if !result.place_id.is_empty() {
            self.cache
                .set_json(&plain_key(PLACE_NAMESPACE, &result.place_id), result, None)
                .await?;
        }
        self.frequent.record(&key, address.clone()).await;
        Ok(())
    }

    pub async fn get_by_place_id(&self, place_id: &str) -> Option<GeocodeResult> {
        self.cache.get_json(&plain_key(PLACE_NAMESPACE, place_id)).await
    }

    /// Cached results aligned with `addresses`; blank addresses are misses.
    pub async fn batch_get(&self, addresses: &[Address]) -> Vec<Option<GeocodeResult>> {
        let keys: Vec<String> = addresses.iter().map(|a| a.cache_key(GEO_NAMESPACE)).collect();
        let raw = self.cache.mget(&keys).await;

        addresses
            .iter()
            .zip(raw)
            .map(|(address, value)| {
                if address.is_blank() {
                    return None;
                }
                value.and_then(|v| serde_json::from_str(&v).ok())
            })
            .collect()
    }

    /// Store several results in one round trip per tier.
    pub async fn batch_set(&self, entries: &[(Address, GeocodeResult)]) -> Result<(), Error> {
        let mut rows = Vec::with_capacity(entries.len() * 2);
        for (address, result) in entries {
            address.validate()?;
            let key = address.cache_key(GEO_NAMESPACE);
            let payload = serde_json::to_string(result)?;
            if !result.place_id.is_empty() {
                rows.push((plain_key(PLACE_NAMESPACE, &result.place_id), payload.clone(), None));
            }
            rows.push((key, payload, None));
        }
        self.cache.mset(rows).await;

        for (address, _) in entries {
            self.frequent.record(&address.cache_key(GEO_NAMESPACE), address.clone()).await;
        }
        Ok(())
    }

    /// Drop the address-keyed entry. The place-id entry is immutable and stays.
    pub async fn invalidate(&self, address: &Address) -> bool {
        self.cache.delete(&address.cache_key(GEO_NAMESPACE)).await
    }

    /// Cached result, or geocode through the provider and cache it.
    pub async fn resolve(&self, address: &Address) -> Result<GeocodeResult, Error> {
        if let Some(hit) = self.get(address).await? {
            self.frequent.record(&address.cache_key(GEO_NAMESPACE), address.clone()).await;
            return Ok(hit);
        }

        let result = self.provider.geocode(&address.to_query()).await?;
        self.set(address, &result).await?;
        Ok(result)
    }

    pub fn is_warming(&self) -> bool {
        self.warming.load(Ordering::Acquire)
    }

    pub async fn frequent_count(&self) -> usize {
        self.frequent.len().await
    }

    /// Pre-populate the cache from upcoming bookings and usage history.
    ///
    /// A call made while another warm run is in progress returns immediately
    /// with `skipped` set.
    pub async fn warm(&self) -> WarmReport {
        let Some(_guard) = WarmGuard::try_acquire(&self.warming) else {
            tracing::debug!("geocoding warm already running, skipping");
            return WarmReport { skipped: true, ..Default::default() };
        };

        let candidates = self.gather_candidates().await;
        let cached = self.batch_get(&candidates).await;
        let missing: Vec<Address> = candidates
            .iter()
            .zip(&cached)
            .filter(|(_, hit)| hit.is_none())
            .map(|(a, _)| a.clone())
            .collect();

        let mut report = WarmReport {
            candidates: candidates.len(),
            already_cached: candidates.len() - missing.len(),
            ..Default::default()
        };

        let results = run_batched(missing, self.settings.batch_size, self.settings.batch_delay(), |address| async move {
            let outcome = self.provider.geocode(&address.to_query()).await;
            (address, outcome)
        })
        .await;

        for (address, outcome) in results {
            match outcome {
                Ok(result) => match self.set(&address, &result).await {
                    Ok(()) => report.fetched += 1,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to cache warmed geocode");
                        report.failed += 1;
                    }
                },
                Err(e) => {
                    tracing::debug!(query = %address.to_query(), error = %e, "warm geocode failed");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            candidates = report.candidates,
            already_cached = report.already_cached,
            fetched = report.fetched,
            failed = report.failed,
            "geocoding cache warmed"
        );
        report
    }

    /// Distinct, non-blank addresses from every warming source.
    async fn gather_candidates(&self) -> Vec<Address> {
        let today = Utc::now().date_naive();
        let mut out = Vec::new();

        match self.store.upcoming_appointments(today, self.settings.lookahead_days).await {
            Ok(appointments) => out.extend(appointments.into_iter().map(|a| a.address)),
            Err(e) => tracing::warn!(error = %e, "could not read upcoming appointments for warming"),
        }

        out.extend(self.frequent.top(self.settings.frequent_address_cap).await);

        match self.store.ungeocoded_addresses(self.settings.ungeocoded_limit).await {
            Ok(addresses) => out.extend(addresses),
            Err(e) => tracing::warn!(error = %e, "could not read ungeocoded addresses for warming"),
        }

        match self.store.popular_postal_prefixes(self.settings.postal_prefix_limit).await {
            Ok(prefixes) => out.extend(prefixes.into_iter().map(Address::from_postal_code)),
            Err(e) => tracing::warn!(error = %e, "could not read popular postal prefixes for warming"),
        }

        let mut seen = HashSet::new();
        out.retain(|a| !a.is_blank() && seen.insert(a.cache_key(GEO_NAMESPACE)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use crate::geocode::Accuracy;
    use crate::provider::ProviderError;
    use crate::store::{Appointment, MemoryStore};
    use crate::testing::{FakeProvider, memory_cache, sample_area, test_settings};

    fn result(place_id: &str) -> GeocodeResult {
        GeocodeResult {
            location: GeoPoint::new(50.8489, 5.6888).unwrap(),
            place_id: place_id.into(),
            formatted_address: "Markt 12, 6221 AB Maastricht, Netherlands".into(),
            accuracy: Accuracy::Rooftop,
        }
    }

    fn service(provider: Arc<FakeProvider>, store: Arc<MemoryStore>) -> GeocodingCache {
        GeocodingCache::new(memory_cache(), provider, store, test_settings())
    }

    #[tokio::test]
    async fn test_normalized_addresses_share_entry() {
        let geo = service(Arc::new(FakeProvider::new()), Arc::new(MemoryStore::default()));
        let a = Address::new("Markt 12", "6221 AB", "Maastricht", "NL");
        let b = Address::new("  markt 12", "6221ab", "MAASTRICHT", "nl");

        geo.set(&a, &result("p1")).await.unwrap();
        assert_eq!(geo.get(&b).await.unwrap(), Some(result("p1")));
    }

    #[tokio::test]
    async fn test_place_id_lookup_survives_invalidate() {
        let geo = service(Arc::new(FakeProvider::new()), Arc::new(MemoryStore::default()));
        let a = Address::new("Markt 12", "6221AB", "Maastricht", "NL");
        geo.set(&a, &result("p1")).await.unwrap();

        assert!(geo.invalidate(&a).await);
        assert_eq!(geo.get(&a).await.unwrap(), None);
        assert_eq!(geo.get_by_place_id("p1").await, Some(result("p1")));
    }

    #[tokio::test]
    async fn test_blank_address_is_input_error() {
        let geo = service(Arc::new(FakeProvider::new()), Arc::new(MemoryStore::default()));
        let err = geo.get(&Address::default()).await.unwrap_err();
        assert!(err.is_input_error());
    }

    #[tokio::test]
    async fn test_batch_set_and_get() {
        let geo = service(Arc::new(FakeProvider::new()), Arc::new(MemoryStore::default()));
        let a = Address::new("Markt 12", "6221AB", "Maastricht", "NL");
        let b = Address::new("Vrijthof 1", "6211LD", "Maastricht", "NL");
        let c = Address::new("Elsewhere 5", "1000AA", "Amsterdam", "NL");

        geo.batch_set(&[(a.clone(), result("pa")), (b.clone(), result("pb"))]).await.unwrap();
        let got = geo.batch_get(&[a, c, b]).await;
        assert_eq!(got, vec![Some(result("pa")), None, Some(result("pb"))]);
        assert_eq!(geo.frequent_count().await, 2);
    }

    #[tokio::test]
    async fn test_resolve_reads_through_once() {
        let provider = Arc::new(FakeProvider::new().with_geocode("markt 12", result("p1")));
        let geo = service(provider.clone(), Arc::new(MemoryStore::default()));
        let a = Address::new("Markt 12", "6221AB", "Maastricht", "NL");

        assert_eq!(geo.resolve(&a).await.unwrap(), result("p1"));
        assert_eq!(geo.resolve(&a).await.unwrap(), result("p1"));
        assert_eq!(provider.geocode_calls(), 1);
    }

    #[tokio::test]
    async fn test_resolve_surfaces_provider_error() {
        let provider = Arc::new(FakeProvider::new().failing_geocode(ProviderError::QuotaExceeded));
        let geo = service(provider, Arc::new(MemoryStore::default()));
        let err = geo.resolve(&Address::from_postal_code("6221AB")).await.unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::QuotaExceeded)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_warm_fetches_only_uncached_candidates() {
        let store = Arc::new(MemoryStore::new(vec![sample_area()]));
        let today = Utc::now().date_naive();
        let cached = Address::new("Markt 12", "6221AB", "Maastricht", "NL");
        let fresh = Address::new("Vrijthof 1", "6211LD", "Maastricht", "NL");
        for (id, address) in [("a1", &cached), ("a2", &fresh), ("a3", &fresh)] {
            store
                .add_appointment(Appointment {
                    id: id.into(),
                    date: today,
                    address: address.clone(),
                    location: None,
                    service_area_id: None,
                    duration_minutes: 60,
                })
                .await;
        }

        let provider = Arc::new(FakeProvider::new().with_geocode("6211", result("pv")).with_geocode("62", result("pp")));
        let geo = service(provider.clone(), store);
        geo.set(&cached, &result("pm")).await.unwrap();

        let report = geo.warm().await;
        assert!(!report.skipped);
        // cached + fresh + postal prefix "6221" + "6211"
        assert_eq!(report.candidates, 4);
        assert_eq!(report.already_cached, 1);
        assert_eq!(report.fetched, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(geo.get(&fresh).await.unwrap(), Some(result("pv")));
    }

    #[tokio::test]
    async fn test_concurrent_warm_runs_once() {
        let store = Arc::new(MemoryStore::default());
        store
            .add_appointment(Appointment {
                id: "a1".into(),
                date: Utc::now().date_naive(),
                address: Address::new("Markt 12", "6221AB", "Maastricht", "NL"),
                location: None,
                service_area_id: None,
                duration_minutes: 30,
            })
            .await;
        let provider = Arc::new(FakeProvider::new().with_geocode("markt", result("p1")).with_delay_ms(50));
        let geo = service(provider, store);

        let (first, second) = tokio::join!(geo.warm(), geo.warm());
        assert_ne!(first.skipped, second.skipped);
        assert!(!geo.is_warming());
    }
}
