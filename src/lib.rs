//! Booking scheduling core: occupied-interval arithmetic, per-service
//! conflict detection and an authorization-gated booking lifecycle, backed
//! by a write-ahead log.

pub mod catalog;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod interval;
pub mod limits;
pub mod model;
pub mod observability;
pub mod wal;

pub use catalog::{InMemoryCatalog, Service, ServiceCatalog};
pub use config::Config;
pub use engine::{BookingError, Engine};
pub use model::{Booking, BookingQuery, BookingStatus, Caller, Page, Role};
