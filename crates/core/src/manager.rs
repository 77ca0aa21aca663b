//! Owns the caching services and schedules background warming.
//!
//! Everything is constructed once in [`CacheManager::build`] and handed
//! around explicitly; there is no process-global state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use schemars::JsonSchema;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::Error;
use crate::boundary::{BoundaryValidator, ValidationResult};
use crate::cache::{CacheStats, TwoTierCache};
use crate::config::{AppConfig, WarmingSettings};
use crate::geo::{GeoPoint, TravelMode};
use crate::geocode::{Address, GeocodingCache, WarmReport};
use crate::provider::MapsProvider;
use crate::route::{
    DistanceMatrix, OptimizedRoute, RouteCache, RouteCluster, RouteOptimizer, RouteWarmReport, TimeWindow,
    calculate_time_windows,
};
use crate::store::{Appointment, BookingStore};

/// Summary of one full warm run.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct WarmSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub geocoding: WarmReport,
    pub routes: RouteWarmReport,
}

/// Aggregated health of the caching subsystem.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct HealthReport {
    pub cache: CacheStats,
    pub geocoding_warming: bool,
    pub route_warming: bool,
    pub frequent_addresses: usize,
    pub frequent_routes: usize,
    pub last_warm: Option<WarmSummary>,
}

/// Scheduling context for one service area on one day.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct AreaSlots {
    pub area_id: String,
    pub area_name: String,
    pub appointments: Vec<Appointment>,
    /// Centroid to each located appointment.
    pub matrix: Option<DistanceMatrix>,
    pub cluster: Option<RouteCluster>,
    /// Planned arrival/departure per clustered stop, starting at the day's first slot.
    pub time_windows: Vec<TimeWindow>,
}

/// Everything a slot picker needs for one date.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SlotsContext {
    pub date: NaiveDate,
    pub areas: Vec<AreaSlots>,
}

/// Time until the next warm run: the periodic interval or the next peak
/// time, whichever comes first.
pub fn next_run_delay(now: NaiveDateTime, interval: Duration, peak_times: &[NaiveTime]) -> Duration {
    let next_peak = peak_times
        .iter()
        .filter_map(|t| {
            let today = now.date().and_time(*t);
            let at = if today > now { today } else { today + chrono::Duration::days(1) };
            (at - now).to_std().ok()
        })
        .min();

    match next_peak {
        Some(peak) if peak < interval => peak,
        _ => interval,
    }
}

/// The caching subsystem as one unit.
pub struct CacheManager {
    cache: Arc<TwoTierCache>,
    geocoding: Arc<GeocodingCache>,
    routes: Arc<RouteCache>,
    optimizer: Arc<RouteOptimizer>,
    boundary: Arc<BoundaryValidator>,
    store: Arc<dyn BookingStore>,
    warming: WarmingSettings,
    peak_times: Vec<NaiveTime>,
    day_start: NaiveTime,
    buffer_minutes: u32,
    last_warm: Mutex<Option<WarmSummary>>,
}

impl CacheManager {
    /// Register namespace policies and wire every service together.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the configured peak times do not parse.
    pub async fn build(
        config: &AppConfig, cache: Arc<TwoTierCache>, provider: Arc<dyn MapsProvider>, store: Arc<dyn BookingStore>,
    ) -> Result<Self, Error> {
        for (namespace, policy) in config.cache.namespace_policies() {
            cache.register_namespace(namespace, policy).await;
        }

        let peak_times = config
            .warming
            .parsed_peak_times()
            .map_err(|e| Error::InvalidInput(e.to_string()))?;

        let geocoding = Arc::new(GeocodingCache::new(
            cache.clone(),
            provider.clone(),
            store.clone(),
            config.warming.clone(),
        ));
        let routes = Arc::new(RouteCache::new(cache.clone(), provider.clone(), store.clone(), config.warming.clone()));
        let optimizer = Arc::new(RouteOptimizer::new(
            routes.clone(),
            provider,
            config.optimizer.service_minutes_per_stop,
        ));
        let boundary = Arc::new(
            BoundaryValidator::new(cache.clone(), geocoding.clone(), store.clone())
                .with_batching(config.warming.batch_size, config.warming.batch_delay()),
        );

        Ok(Self {
            cache,
            geocoding,
            routes,
            optimizer,
            boundary,
            store,
            warming: config.warming.clone(),
            peak_times,
            day_start: NaiveTime::from_hms_opt(config.optimizer.day_start_hour, 0, 0).unwrap_or(NaiveTime::MIN),
            buffer_minutes: config.optimizer.buffer_minutes,
            last_warm: Mutex::new(None),
        })
    }

    pub fn cache(&self) -> &Arc<TwoTierCache> {
        &self.cache
    }

    pub fn geocoding(&self) -> &Arc<GeocodingCache> {
        &self.geocoding
    }

    pub fn routes(&self) -> &Arc<RouteCache> {
        &self.routes
    }

    /// Warm geocoding first so route warming sees fresh coordinates.
    pub async fn warm_all(&self) -> WarmSummary {
        let started_at = Utc::now();
        let geocoding = self.geocoding.warm().await;
        let routes = self.routes.warm(&self.optimizer).await;
        let summary = WarmSummary { started_at, finished_at: Utc::now(), geocoding, routes };

        let elapsed_ms = (summary.finished_at - summary.started_at).num_milliseconds();
        tracing::info!(elapsed_ms, "cache warm run finished");

        *self.last_warm.lock().await = Some(summary.clone());
        summary
    }

    /// Warm forever on the periodic and peak-time schedule.
    pub async fn run(self: Arc<Self>) {
        loop {
            let delay = next_run_delay(chrono::Local::now().naive_local(), self.warming.interval(), &self.peak_times);
            tracing::debug!(delay_secs = delay.as_secs(), "next cache warm scheduled");
            tokio::time::sleep(delay).await;
            self.warm_all().await;
        }
    }

    /// Start the scheduler on the runtime. Does nothing when warming is disabled.
    pub fn spawn(self: Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.warming.enabled {
            tracing::info!("cache warming disabled");
            return None;
        }
        Some(tokio::spawn(self.run()))
    }

    pub async fn health(&self) -> HealthReport {
        HealthReport {
            cache: self.cache.stats().await,
            geocoding_warming: self.geocoding.is_warming(),
            route_warming: self.routes.is_warming(),
            frequent_addresses: self.geocoding.frequent_count().await,
            frequent_routes: self.routes.frequent_count().await,
            last_warm: self.last_warm.lock().await.clone(),
        }
    }

    /// Appointments, centroid distances and the optimized day route per area.
    pub async fn slots_context(&self, date: NaiveDate) -> Result<SlotsContext, Error> {
        let areas = self.store.service_areas().await?;
        let appointments = self.store.appointments_on(date).await?;
        let mut out = Vec::with_capacity(areas.len());

        for area in &areas {
            let in_area: Vec<Appointment> = appointments
                .iter()
                .filter(|a| a.service_area_id.as_deref() == Some(area.id.as_str()))
                .cloned()
                .collect();

            let destinations: Vec<GeoPoint> = in_area.iter().filter_map(|a| a.location).collect();
            let matrix = if destinations.is_empty() {
                None
            } else {
                Some(
                    self.routes
                        .compute_distance_matrix(&[area.centroid], &destinations, TravelMode::Driving)
                        .await?,
                )
            };

            let cluster = self.routes.cluster_for(area, date, &in_area, &self.optimizer).await?;
            let time_windows = match &cluster {
                Some(cluster) => {
                    let durations: Vec<u32> = cluster
                        .route
                        .waypoint_order
                        .iter()
                        .map(|&i| {
                            cluster
                                .appointment_ids
                                .get(i)
                                .and_then(|id| in_area.iter().find(|a| &a.id == id))
                                .map(|a| a.duration_minutes)
                                .unwrap_or(0)
                        })
                        .collect();
                    let start = date.and_time(self.day_start).and_utc();
                    calculate_time_windows(&cluster.route.timed_stops(&durations), start, self.buffer_minutes)
                }
                None => Vec::new(),
            };

            out.push(AreaSlots {
                area_id: area.id.clone(),
                area_name: area.name.clone(),
                appointments: in_area,
                matrix,
                cluster,
                time_windows,
            });
        }

        Ok(SlotsContext { date, areas: out })
    }

    pub async fn validate_address(&self, address: &Address) -> Result<ValidationResult, Error> {
        self.boundary.validate_address(address).await
    }

    pub async fn validate_batch(&self, addresses: &[Address]) -> Result<Vec<Result<ValidationResult, Error>>, Error> {
        self.boundary.validate_batch(addresses).await
    }

    pub async fn optimize_route(
        &self, origin: GeoPoint, waypoints: &[GeoPoint], destination: GeoPoint, mode: TravelMode,
    ) -> Result<OptimizedRoute, Error> {
        self.optimizer.optimize_route(origin, waypoints, destination, mode).await
    }

    /// Drop every cached entry whose key starts with `prefix`.
    pub async fn invalidate(&self, prefix: &str) -> u64 {
        self.cache.delete_pattern(prefix).await
    }

    pub async fn purge_expired(&self) -> u64 {
        self.cache.purge_expired().await
    }
}
