//! Route, optimized-route, distance-matrix and cluster caching.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Days, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::Serialize;

use super::optimizer::RouteOptimizer;
use super::{
    DistanceMatrix, MAX_WAYPOINTS, MatrixElement, OptimizedRoute, RouteCluster, RouteRequest, RouteResult, RouteSource,
};
use crate::Error;
use crate::batch::{WarmGuard, run_batched};
use crate::boundary::ServiceArea;
use crate::cache::TwoTierCache;
use crate::config::WarmingSettings;
use crate::frequency::FrequencyTracker;
use crate::geo::{GeoPoint, TravelMode, haversine_meters};
use crate::provider::MapsProvider;
use crate::store::{Appointment, BookingStore};

/// Outcome of one route warm run.
#[derive(Debug, Clone, Default, Serialize, JsonSchema)]
pub struct RouteWarmReport {
    pub routes: usize,
    pub matrices: usize,
    pub clusters: usize,
    pub failed: usize,
    pub skipped: bool,
}

/// Cached routing data, read through to the provider.
pub struct RouteCache {
    cache: Arc<TwoTierCache>,
    provider: Arc<dyn MapsProvider>,
    store: Arc<dyn BookingStore>,
    frequent: FrequencyTracker<RouteRequest>,
    settings: WarmingSettings,
    warming: AtomicBool,
}

impl RouteCache {
    pub fn new(
        cache: Arc<TwoTierCache>, provider: Arc<dyn MapsProvider>, store: Arc<dyn BookingStore>,
        settings: WarmingSettings,
    ) -> Self {
        Self {
            cache,
            provider,
            store,
            frequent: FrequencyTracker::new(settings.frequent_route_cap),
            settings,
            warming: AtomicBool::new(false),
        }
    }

    pub async fn get_route(&self, request: &RouteRequest) -> Option<RouteResult> {
        let key = request.cache_key();
        let hit = self.cache.get_json(&key).await;
        tracing::debug!(key = %key, hit = hit.is_some(), "route cache lookup");
        hit
    }

    /// Cache a route. Traffic-aware requests expire after an hour, static
    /// ones after a week (namespace policy).
    pub async fn set_route(&self, request: &RouteRequest, result: &RouteResult) -> Result<(), Error> {
        self.cache.set_json(&request.cache_key(), result, None).await?;

        let static_request = RouteRequest { departure_time: None, ..request.clone() };
        self.frequent.record(&static_request.cache_key(), static_request).await;
        Ok(())
    }

    pub async fn get_optimized_route(
        &self, origin: &GeoPoint, waypoints: &[GeoPoint], destination: &GeoPoint, mode: TravelMode,
    ) -> Option<OptimizedRoute> {
        self.cache
            .get_json(&OptimizedRoute::cache_key(origin, waypoints, destination, mode))
            .await
    }

    /// Cache a provider-optimized route. Heuristic routes are skipped so the
    /// provider is asked again next time.
    pub async fn set_optimized_route(
        &self, origin: &GeoPoint, waypoints: &[GeoPoint], destination: &GeoPoint, mode: TravelMode,
        route: &OptimizedRoute,
    ) -> Result<(), Error> {
        if route.source == RouteSource::Fallback {
            tracing::debug!("not caching fallback route");
            return Ok(());
        }
        self.cache
            .set_json(&OptimizedRoute::cache_key(origin, waypoints, destination, mode), route, None)
            .await
    }

    pub async fn get_distance_matrix(
        &self, origins: &[GeoPoint], destinations: &[GeoPoint], mode: TravelMode,
    ) -> Option<DistanceMatrix> {
        self.cache
            .get_json(&DistanceMatrix::cache_key(origins, destinations, mode))
            .await
    }

    pub async fn set_distance_matrix(&self, matrix: &DistanceMatrix) -> Result<(), Error> {
        let key = DistanceMatrix::cache_key(&matrix.origins, &matrix.destinations, matrix.mode);
        self.cache.set_json(&key, matrix, None).await
    }

    pub async fn get_route_cluster(&self, area_id: &str, date: NaiveDate) -> Option<RouteCluster> {
        self.cache.get_json(&RouteCluster::cache_key(area_id, date)).await
    }

    /// Drop the cached plan for an area and day; returns whether one existed.
    pub async fn invalidate_route_cluster(&self, area_id: &str, date: NaiveDate) -> bool {
        self.cache.delete(&RouteCluster::cache_key(area_id, date)).await
    }

    pub async fn set_route_cluster(&self, cluster: &RouteCluster) -> Result<(), Error> {
        if cluster.route.source == RouteSource::Fallback {
            tracing::debug!(area = %cluster.area_id, "not caching cluster with fallback route");
            return Ok(());
        }
        self.cache
            .set_json(&RouteCluster::cache_key(&cluster.area_id, cluster.date), cluster, None)
            .await
    }

    /// Cached route, or ask the provider and cache the answer.
    pub async fn compute_route(&self, request: &RouteRequest) -> Result<RouteResult, Error> {
        request.validate()?;
        if let Some(hit) = self.get_route(request).await {
            return Ok(hit);
        }

        let result = self.provider.compute_route(request).await?;
        self.set_route(request, &result).await?;
        Ok(result)
    }

    /// Cached matrix, or build one from per-cell route calls.
    ///
    /// Cells the provider cannot answer are filled with a straight-line
    /// estimate and flagged; a matrix holding estimates is not cached.
    pub async fn compute_distance_matrix(
        &self, origins: &[GeoPoint], destinations: &[GeoPoint], mode: TravelMode,
    ) -> Result<DistanceMatrix, Error> {
        origins.iter().chain(destinations).try_for_each(GeoPoint::validate)?;

        if let Some(hit) = self.get_distance_matrix(origins, destinations, mode).await {
            return Ok(hit);
        }

        let cells: Vec<(usize, usize)> = (0..origins.len())
            .flat_map(|i| (0..destinations.len()).map(move |j| (i, j)))
            .collect();

        let answers = run_batched(cells, self.settings.batch_size, self.settings.batch_delay(), |(i, j)| async move {
            let request = RouteRequest::new(origins[i], destinations[j], mode);
            ((i, j), self.compute_route(&request).await)
        })
        .await;

        let mut rows = vec![vec![None; destinations.len()]; origins.len()];
        for ((i, j), answer) in answers {
            let element = match answer {
                Ok(route) => MatrixElement {
                    distance_meters: route.total_distance_meters(),
                    duration_secs: route.total_duration_secs(),
                    estimated: false,
                },
                Err(e) => {
                    tracing::debug!(error = %e, origin = i, destination = j, "matrix cell estimated");
                    let distance = haversine_meters(&origins[i], &destinations[j]);
                    MatrixElement {
                        distance_meters: distance,
                        duration_secs: mode.estimate_duration(distance).as_secs(),
                        estimated: true,
                    }
                }
            };
            rows[i][j] = Some(element);
        }

        let matrix = DistanceMatrix { origins: origins.to_vec(), destinations: destinations.to_vec(), mode, rows };
        if matrix.has_estimates() {
            tracing::warn!(
                origins = origins.len(),
                destinations = destinations.len(),
                "distance matrix contains estimates, not caching"
            );
        } else {
            self.set_distance_matrix(&matrix).await?;
        }
        Ok(matrix)
    }

    /// Cached cluster for an area and day, or optimize the day's located stops.
    ///
    /// `None` when the area has no located appointments that day. A cached
    /// plan is only reused while it covers exactly the current stops.
    pub async fn cluster_for(
        &self, area: &ServiceArea, date: NaiveDate, appointments: &[Appointment], optimizer: &RouteOptimizer,
    ) -> Result<Option<RouteCluster>, Error> {
        let mut located: Vec<(&str, GeoPoint)> = appointments
            .iter()
            .filter(|a| a.date == date && a.service_area_id.as_deref() == Some(area.id.as_str()))
            .filter_map(|a| a.location.map(|loc| (a.id.as_str(), loc)))
            .collect();
        if located.is_empty() {
            return Ok(None);
        }

        let dropped_appointment_ids: Vec<String> = located
            .iter()
            .skip(MAX_WAYPOINTS)
            .map(|(id, _)| id.to_string())
            .collect();
        if !dropped_appointment_ids.is_empty() {
            tracing::warn!(
                area = %area.id,
                %date,
                stops = located.len(),
                dropped = ?dropped_appointment_ids,
                "day exceeds the waypoint limit, later appointments left off the route"
            );
            located.truncate(MAX_WAYPOINTS);
        }

        let appointment_ids: Vec<String> = located.iter().map(|(id, _)| id.to_string()).collect();
        let stops: Vec<GeoPoint> = located.iter().map(|(_, p)| *p).collect();

        if let Some(hit) = self.get_route_cluster(&area.id, date).await {
            if hit.appointment_ids == appointment_ids && hit.stops == stops {
                return Ok(Some(hit));
            }
            tracing::debug!(area = %area.id, %date, "cached cluster no longer matches the day's stops");
        }

        let route = optimizer
            .optimize_route(area.centroid, &stops, area.centroid, TravelMode::Driving)
            .await?;

        let cluster = RouteCluster { area_id: area.id.clone(), date, appointment_ids, stops, route, dropped_appointment_ids };
        self.set_route_cluster(&cluster).await?;
        Ok(Some(cluster))
    }

    pub fn is_warming(&self) -> bool {
        self.warming.load(Ordering::Acquire)
    }

    pub async fn frequent_count(&self) -> usize {
        self.frequent.len().await
    }

    /// Pre-compute frequent routes, per-area matrices and near-term clusters.
    pub async fn warm(&self, optimizer: &RouteOptimizer) -> RouteWarmReport {
        let Some(_guard) = WarmGuard::try_acquire(&self.warming) else {
            tracing::debug!("route warm already running, skipping");
            return RouteWarmReport { skipped: true, ..Default::default() };
        };

        let mut report = RouteWarmReport::default();
        self.warm_frequent_routes(&mut report).await;

        let today = Utc::now().date_naive();
        let areas = match self.store.service_areas().await {
            Ok(areas) => areas,
            Err(e) => {
                tracing::warn!(error = %e, "could not read service areas for route warming");
                return report;
            }
        };
        let upcoming = match self.store.upcoming_appointments(today, self.settings.lookahead_days).await {
            Ok(upcoming) => upcoming,
            Err(e) => {
                tracing::warn!(error = %e, "could not read upcoming appointments for route warming");
                return report;
            }
        };

        for area in &areas {
            let mut seen = HashSet::new();
            let destinations: Vec<GeoPoint> = upcoming
                .iter()
                .filter(|a| a.service_area_id.as_deref() == Some(area.id.as_str()))
                .filter_map(|a| a.location)
                .filter(|p| seen.insert(p.key_string()))
                .take(MAX_WAYPOINTS)
                .collect();
            if destinations.is_empty() {
                continue;
            }
            match self.compute_distance_matrix(&[area.centroid], &destinations, TravelMode::Driving).await {
                Ok(_) => report.matrices += 1,
                Err(e) => {
                    tracing::warn!(area = %area.id, error = %e, "matrix warm failed");
                    report.failed += 1;
                }
            }
        }

        for offset in 0..self.settings.cluster_days {
            let Some(date) = today.checked_add_days(Days::new(u64::from(offset))) else {
                break;
            };
            for area in &areas {
                match self.cluster_for(area, date, &upcoming, optimizer).await {
                    Ok(Some(_)) => report.clusters += 1,
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(area = %area.id, %date, error = %e, "cluster warm failed");
                        report.failed += 1;
                    }
                }
            }
        }

        tracing::info!(
            routes = report.routes,
            matrices = report.matrices,
            clusters = report.clusters,
            failed = report.failed,
            "route cache warmed"
        );
        report
    }

    async fn warm_frequent_routes(&self, report: &mut RouteWarmReport) {
        let mut missing = Vec::new();
        for request in self.frequent.top(self.settings.frequent_route_cap).await {
            if self.get_route(&request).await.is_none() {
                missing.push(request);
            }
        }

        let results = run_batched(missing, self.settings.batch_size, self.settings.batch_delay(), |request| async move {
            self.compute_route(&request).await
        })
        .await;

        for result in results {
            match result {
                Ok(_) => report.routes += 1,
                Err(_) => report.failed += 1,
            }
        }
    }
}
