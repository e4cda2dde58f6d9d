use ulid::Ulid;

use crate::model::BookingStatus;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error("service not found: {0}")]
    ServiceNotFound(Ulid),

    #[error("slot unavailable: conflicts with booking {conflicting}")]
    SlotUnavailable { conflicting: Ulid },

    #[error("booking not found: {0}")]
    NotFound(Ulid),

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
}

impl BookingError {
    /// Expected outcomes of a well-formed request ("slot taken", "already
    /// cancelled"), as opposed to faults.
    pub fn is_business_outcome(&self) -> bool {
        matches!(
            self,
            BookingError::SlotUnavailable { .. } | BookingError::InvalidTransition { .. }
        )
    }

    /// Transient store failures. Only reads are idempotent; a retried create
    /// or transition may have already been applied.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::StoreUnavailable(_))
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::InvalidInterval(_) => "invalid_interval",
            BookingError::ServiceNotFound(_) => "service_not_found",
            BookingError::SlotUnavailable { .. } => "slot_unavailable",
            BookingError::NotFound(_) => "not_found",
            BookingError::Forbidden(_) => "forbidden",
            BookingError::InvalidTransition { .. } => "invalid_transition",
            BookingError::StoreUnavailable(_) => "store_unavailable",
            BookingError::LimitExceeded(_) => "limit_exceeded",
        }
    }
}
