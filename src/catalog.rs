use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::BookingError;

/// A bookable service as seen by the scheduler. Only `duration_minutes`
/// takes part in scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    pub duration_minutes: i64,
    pub price_cents: u64,
}

impl Service {
    pub fn new(id: Ulid, duration_minutes: i64, price_cents: u64) -> Self {
        Self {
            id,
            duration_minutes,
            price_cents,
        }
    }
}

/// Read-only view of the product/service catalog.
#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    /// `Ok(None)` when the service does not exist. Backend failures should
    /// surface as `BookingError::StoreUnavailable`.
    async fn get_service(&self, id: Ulid) -> Result<Option<Service>, BookingError>;
}

/// Catalog held in memory, for embedding hosts and tests.
#[derive(Default)]
pub struct InMemoryCatalog {
    services: DashMap<Ulid, Service>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a service. Existing bookings keep the duration they
    /// were created with.
    pub fn upsert(&self, service: Service) {
        self.services.insert(service.id, service);
    }

    pub fn remove(&self, id: &Ulid) -> Option<Service> {
        self.services.remove(id).map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[async_trait]
impl ServiceCatalog for InMemoryCatalog {
    async fn get_service(&self, id: Ulid) -> Result<Option<Service>, BookingError> {
        Ok(self.services.get(&id).map(|e| e.value().clone()))
    }
}
