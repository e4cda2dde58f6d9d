use std::cmp::Reverse;
use std::time::Instant;

use futures::future::try_join_all;
use ulid::Ulid;

use crate::limits::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::model::*;
use crate::observability::record_operation;

use super::{BookingError, Engine};

impl Engine {
    /// Snapshot every booking passing `keep`, reading each service ledger
    /// under its read lock.
    async fn collect_bookings(
        &self,
        keep: impl Fn(&Booking) -> bool,
    ) -> Result<Vec<Booking>, BookingError> {
        let ledgers: Vec<_> = self.ledgers.iter().map(|e| e.value().clone()).collect();
        let guards = try_join_all(ledgers.into_iter().map(|l| self.lock_read(l))).await?;
        Ok(guards
            .iter()
            .flat_map(|g| g.bookings.iter())
            .filter(|&b| keep(b))
            .cloned()
            .collect())
    }

    /// List bookings visible to `caller`, newest slot first.
    ///
    /// Users only ever see their own bookings; staff and admins see all.
    /// `status` and `date` narrow the result for every role.
    pub async fn list_bookings(
        &self,
        caller: &Caller,
        query: &BookingQuery,
    ) -> Result<Page<Booking>, BookingError> {
        let started = Instant::now();
        let result = self.list_bookings_inner(caller, query).await;
        record_operation("list_bookings", started, &result);
        result
    }

    async fn list_bookings_inner(
        &self,
        caller: &Caller,
        query: &BookingQuery,
    ) -> Result<Page<Booking>, BookingError> {
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let page = query.page.unwrap_or(1).max(1);

        let mut bookings = self
            .collect_bookings(|b| {
                (caller.role.is_privileged() || b.is_owned_by(caller)) && query.matches(b)
            })
            .await?;
        // date desc, time desc; id breaks ties between services
        bookings.sort_by_key(|b| Reverse((b.date, b.time, b.id)));

        let total = bookings.len();
        let items = bookings
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();
        Ok(Page {
            items,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        })
    }

    /// Fetch one booking. Users may only see their own.
    pub async fn get_booking(&self, caller: &Caller, booking_id: Ulid) -> Result<Booking, BookingError> {
        let service_id = self
            .booking_to_service
            .get(&booking_id)
            .map(|e| *e.value())
            .ok_or(BookingError::NotFound(booking_id))?;
        let ledger = self
            .ledger(&service_id)
            .ok_or(BookingError::NotFound(booking_id))?;
        let guard = self.lock_read(ledger).await?;
        let booking = guard
            .get(&booking_id)
            .ok_or(BookingError::NotFound(booking_id))?;

        if !caller.role.is_privileged() && !booking.is_owned_by(caller) {
            return Err(BookingError::Forbidden("not authorized to view this booking"));
        }
        Ok(booking.clone())
    }

    /// The caller's own bookings regardless of role, most recently created
    /// first.
    pub async fn list_own_bookings(&self, caller: &Caller) -> Result<Vec<Booking>, BookingError> {
        let mut bookings = self.collect_bookings(|b| b.is_owned_by(caller)).await?;
        bookings.sort_by_key(|b| Reverse((b.created_at, b.id)));
        Ok(bookings)
    }

    /// Bookings on one service that still hold their slot, ordered by start.
    pub async fn occupied_slots(&self, service_id: Ulid) -> Result<Vec<Booking>, BookingError> {
        let Some(ledger) = self.ledger(&service_id) else {
            return Ok(Vec::new());
        };
        let guard = self.lock_read(ledger).await?;
        Ok(guard.occupying().cloned().collect())
    }
}
