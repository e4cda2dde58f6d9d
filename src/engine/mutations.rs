use std::time::Instant;

use chrono::NaiveDate;
use tokio::sync::oneshot;
use tracing::{debug, info};
use ulid::Ulid;

use crate::interval::occupied_span_str;
use crate::limits::MAX_BOOKINGS_PER_SERVICE;
use crate::model::*;
use crate::observability::{
    record_operation, BOOKINGS_CREATED_TOTAL, BOOKING_CONFLICTS_TOTAL, TRANSITIONS_TOTAL,
};

use super::conflict::{check_no_conflict, now_ms, validate_span};
use super::lifecycle::{self, Transition};
use super::{BookingError, Engine, WalCommand};

impl Engine {
    /// Book `service_id` at `date`/`time` for `caller`.
    ///
    /// The conflict check and the insert happen under the service's ledger
    /// write lock, so concurrent requests for the same service serialize and
    /// at most one of any overlapping pair succeeds.
    ///
    /// Besides conflicts, creation is refused with:
    /// - `InvalidInterval` for an unparsable time, a non-positive service
    ///   duration, or one longer than
    ///   [`crate::limits::MAX_DURATION_MINUTES`] (one week);
    /// - `LimitExceeded` for a span outside 2000-01-01 .. 2200-01-01 UTC, or
    ///   when the service already has [`MAX_BOOKINGS_PER_SERVICE`] bookings
    ///   holding a slot. Cancelled bookings do not count.
    pub async fn create_booking(
        &self,
        caller: &Caller,
        service_id: Ulid,
        date: NaiveDate,
        time: &str,
    ) -> Result<Booking, BookingError> {
        let started = Instant::now();
        let result = self.create_booking_inner(caller, service_id, date, time).await;
        record_operation("create_booking", started, &result);
        result
    }

    async fn create_booking_inner(
        &self,
        caller: &Caller,
        service_id: Ulid,
        date: NaiveDate,
        time: &str,
    ) -> Result<Booking, BookingError> {
        let service = self
            .catalog
            .get_service(service_id)
            .await?
            .ok_or(BookingError::ServiceNotFound(service_id))?;
        let (time, span) = occupied_span_str(date, time, service.duration_minutes)?;
        validate_span(&span)?;

        let gate = self.enter_mutation().await?;
        let guard = self.lock_write(self.ledger_or_create(service_id)).await?;

        if let Err(e) = check_no_conflict(&guard, &span) {
            metrics::counter!(BOOKING_CONFLICTS_TOTAL).increment(1);
            debug!(%service_id, %date, %time, "slot unavailable: {e}");
            return Err(e);
        }
        if guard.occupied_count() >= MAX_BOOKINGS_PER_SERVICE {
            return Err(BookingError::LimitExceeded("too many bookings on service"));
        }

        let booking = Booking::new(
            service_id,
            caller.id,
            date,
            time,
            service.duration_minutes,
            span,
            now_ms(),
        );
        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        self.persist_and_apply(gate, guard, event).await?;

        metrics::counter!(BOOKINGS_CREATED_TOTAL).increment(1);
        info!(booking_id = %booking.id, %service_id, user_id = %caller.id, %date, %time, "booking created");
        Ok(booking)
    }

    /// Move a booking to `target`, subject to the lifecycle rules. A request
    /// for the current state returns the booking untouched.
    pub async fn transition_booking(
        &self,
        caller: &Caller,
        booking_id: Ulid,
        target: BookingStatus,
    ) -> Result<Booking, BookingError> {
        let started = Instant::now();
        let result = self.transition_booking_inner(caller, booking_id, target).await;
        record_operation("transition_booking", started, &result);
        result
    }

    async fn transition_booking_inner(
        &self,
        caller: &Caller,
        booking_id: Ulid,
        target: BookingStatus,
    ) -> Result<Booking, BookingError> {
        let gate = self.enter_mutation().await?;
        let guard = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .get(&booking_id)
            .ok_or(BookingError::NotFound(booking_id))?;

        let to = match lifecycle::authorize(booking, caller, target)? {
            Transition::Unchanged => {
                debug!(%booking_id, status = %target, "transition is a no-op");
                return Ok(booking.clone());
            }
            Transition::Changed(to) => to,
        };
        let from = booking.status;
        let service_id = booking.service_id;

        let event = Event::BookingStatusChanged {
            id: booking_id,
            service_id,
            status: to,
            at: now_ms(),
        };
        let guard = self.persist_and_apply(gate, guard, event).await?;

        metrics::counter!(TRANSITIONS_TOTAL, "to" => to.as_str()).increment(1);
        info!(%booking_id, %from, %to, actor = %caller.id, role = ?caller.role, "booking transitioned");
        guard
            .get(&booking_id)
            .cloned()
            .ok_or(BookingError::NotFound(booking_id))
    }

    pub async fn cancel_booking(
        &self,
        caller: &Caller,
        booking_id: Ulid,
    ) -> Result<Booking, BookingError> {
        self.transition_booking(caller, booking_id, BookingStatus::Cancelled)
            .await
    }

    /// Rewrite the WAL as one `BookingCreated` per booking, carrying its
    /// current status.
    pub async fn compact_wal(&self) -> Result<(), BookingError> {
        let _gate = self.compaction_gate.write().await;

        let mut events = Vec::with_capacity(self.booking_count());
        let ledgers: Vec<_> = self.ledgers.iter().map(|e| e.value().clone()).collect();
        for ledger in ledgers {
            let guard = ledger.read().await;
            events.extend(guard.bookings.iter().map(|b| Event::BookingCreated {
                booking: b.clone(),
            }));
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| BookingError::StoreUnavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::StoreUnavailable("WAL writer dropped response".into()))?
            .map_err(|e| BookingError::StoreUnavailable(format!("WAL compaction failed: {e}")))?;

        info!(bookings = count, "compacted booking log");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
