//! Boundary to the booking data store.
//!
//! The caching subsystem only reads bookings: to decide what to warm and to
//! know the service areas. [`MemoryStore`] is the in-process implementation
//! the server seeds from configuration.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Error;
use crate::boundary::ServiceArea;
use crate::geo::GeoPoint;
use crate::geocode::Address;

/// A booked visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Appointment {
    pub id: String,
    pub date: NaiveDate,
    pub address: Address,
    /// Known coordinates; `None` until the address has been geocoded.
    pub location: Option<GeoPoint>,
    pub service_area_id: Option<String>,
    pub duration_minutes: u32,
}

/// Read access to booking data.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Appointments dated in `[from, from + days)`.
    async fn upcoming_appointments(&self, from: NaiveDate, days: u32) -> Result<Vec<Appointment>, Error>;

    async fn appointments_on(&self, date: NaiveDate) -> Result<Vec<Appointment>, Error>;

    /// Distinct addresses of appointments that have no coordinates yet.
    async fn ungeocoded_addresses(&self, limit: usize) -> Result<Vec<Address>, Error>;

    /// Most booked four-digit postal prefixes, most popular first.
    async fn popular_postal_prefixes(&self, limit: usize) -> Result<Vec<String>, Error>;

    async fn service_areas(&self) -> Result<Vec<ServiceArea>, Error>;
}

/// In-process booking store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    appointments: RwLock<Vec<Appointment>>,
    areas: RwLock<Vec<ServiceArea>>,
}

impl MemoryStore {
    pub fn new(areas: Vec<ServiceArea>) -> Self {
        Self { appointments: RwLock::new(Vec::new()), areas: RwLock::new(areas) }
    }

    /// Add or replace (by id) an appointment.
    pub async fn add_appointment(&self, appointment: Appointment) {
        let mut appointments = self.appointments.write().await;
        appointments.retain(|a| a.id != appointment.id);
        appointments.push(appointment);
    }
}

fn postal_prefix(postal_code: &str) -> Option<String> {
    let prefix: String = postal_code.chars().filter(|c| !c.is_whitespace()).take(4).collect();
    (prefix.len() == 4 && prefix.chars().all(|c| c.is_ascii_digit())).then_some(prefix)
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn upcoming_appointments(&self, from: NaiveDate, days: u32) -> Result<Vec<Appointment>, Error> {
        let until = from
            .checked_add_days(Days::new(u64::from(days)))
            .ok_or_else(|| Error::InvalidInput(format!("date range overflows: {from} + {days} days")))?;
        let mut found: Vec<Appointment> = self
            .appointments
            .read()
            .await
            .iter()
            .filter(|a| a.date >= from && a.date < until)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn appointments_on(&self, date: NaiveDate) -> Result<Vec<Appointment>, Error> {
        self.upcoming_appointments(date, 1).await
    }

    async fn ungeocoded_addresses(&self, limit: usize) -> Result<Vec<Address>, Error> {
        let appointments = self.appointments.read().await;
        let mut seen = HashSet::new();
        Ok(appointments
            .iter()
            .filter(|a| a.location.is_none())
            .filter(|a| seen.insert(a.address.normalized()))
            .map(|a| a.address.clone())
            .take(limit)
            .collect())
    }

    async fn popular_postal_prefixes(&self, limit: usize) -> Result<Vec<String>, Error> {
        let appointments = self.appointments.read().await;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for prefix in appointments.iter().filter_map(|a| postal_prefix(&a.address.postal_code)) {
            *counts.entry(prefix).or_default() += 1;
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(ranked.into_iter().take(limit).map(|(prefix, _)| prefix).collect())
    }

    async fn service_areas(&self) -> Result<Vec<ServiceArea>, Error> {
        Ok(self.areas.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appointment(id: &str, date: NaiveDate, postal: &str, located: bool) -> Appointment {
        Appointment {
            id: id.into(),
            date,
            address: Address::new(format!("Street {id}"), postal, "Maastricht", "NL"),
            location: located.then(|| GeoPoint::new(50.85, 5.69).unwrap()),
            service_area_id: Some("limburg-south".into()),
            duration_minutes: 60,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    #[tokio::test]
    async fn test_upcoming_window_is_half_open() {
        let store = MemoryStore::default();
        store.add_appointment(appointment("a", day(19), "6221AB", true)).await;
        store.add_appointment(appointment("b", day(21), "6221AB", true)).await;
        store.add_appointment(appointment("c", day(18), "6221AB", true)).await;

        let found = store.upcoming_appointments(day(19), 2).await.unwrap();
        assert_eq!(found.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(store.appointments_on(day(21)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_replaces_by_id() {
        let store = MemoryStore::default();
        store.add_appointment(appointment("a", day(19), "6221AB", false)).await;
        store.add_appointment(appointment("a", day(20), "6221AB", false)).await;
        assert_eq!(store.upcoming_appointments(day(1), 30).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ungeocoded_and_prefixes() {
        let store = MemoryStore::default();
        store.add_appointment(appointment("a", day(19), "6221AB", false)).await;
        store.add_appointment(appointment("b", day(19), "6211 LD", true)).await;
        store.add_appointment(appointment("c", day(20), "6211LE", false)).await;
        store.add_appointment(appointment("d", day(20), "B-1000", false)).await;

        assert_eq!(store.ungeocoded_addresses(10).await.unwrap().len(), 3);
        assert_eq!(store.ungeocoded_addresses(1).await.unwrap().len(), 1);
        assert_eq!(store.popular_postal_prefixes(10).await.unwrap(), vec!["6211", "6221"]);
    }
}
