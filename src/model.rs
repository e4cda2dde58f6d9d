use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only instant type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Touching spans (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Staff,
    Admin,
}

impl Role {
    /// Staff and admins act on any booking; users only on their own.
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::Staff | Role::Admin)
    }
}

/// Pre-authenticated identity of whoever invokes an engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub id: Ulid,
    pub role: Role,
}

impl Caller {
    pub fn new(id: Ulid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn user(id: Ulid) -> Self {
        Self::new(id, Role::User)
    }

    pub fn staff(id: Ulid) -> Self {
        Self::new(id, Role::Staff)
    }

    pub fn admin(id: Ulid) -> Self {
        Self::new(id, Role::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    /// Whether a booking in this state still blocks its slot. Completed
    /// bookings lie in the past but are still checked.
    pub fn occupies_slot(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown booking status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for BookingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "COMPLETED" => Ok(BookingStatus::Completed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// A reservation of one service's time axis.
///
/// `span` and `duration_minutes` are captured from the catalog at creation
/// and never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub service_id: Ulid,
    pub user_id: Ulid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: i64,
    pub span: Span,
    pub status: BookingStatus,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Booking {
    /// Every booking starts out pending.
    pub fn new(
        service_id: Ulid,
        user_id: Ulid,
        date: NaiveDate,
        time: NaiveTime,
        duration_minutes: i64,
        span: Span,
        now: Ms,
    ) -> Self {
        Self {
            id: Ulid::new(),
            service_id,
            user_id,
            date,
            time,
            duration_minutes,
            span,
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, caller: &Caller) -> bool {
        self.user_id == caller.id
    }
}

/// All bookings of a single service, sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct ServiceLedger {
    pub service_id: Ulid,
    pub bookings: Vec<Booking>,
    /// Bookings whose status still occupies a slot.
    occupied: usize,
}

impl ServiceLedger {
    pub fn new(service_id: Ulid) -> Self {
        Self {
            service_id,
            bookings: Vec::new(),
            occupied: 0,
        }
    }

    /// Insert booking maintaining sort order by span.start.
    pub fn insert(&mut self, booking: Booking) {
        if booking.status.occupies_slot() {
            self.occupied += 1;
        }
        let pos = self
            .bookings
            .partition_point(|b| b.span.start <= booking.span.start);
        self.bookings.insert(pos, booking);
    }

    pub fn get(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == *id)
    }

    /// Update a booking's status in place. Returns false if `id` is unknown.
    pub fn set_status(&mut self, id: &Ulid, status: BookingStatus, at: Ms) -> bool {
        let Some(booking) = self.bookings.iter_mut().find(|b| b.id == *id) else {
            return false;
        };
        match (booking.status.occupies_slot(), status.occupies_slot()) {
            (true, false) => self.occupied -= 1,
            (false, true) => self.occupied += 1,
            _ => {}
        }
        booking.status = status;
        booking.updated_at = at;
        true
    }

    /// Bookings whose span overlaps the query window, in any status.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }

    /// Bookings that still hold their slot.
    pub fn occupying(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.iter().filter(|b| b.status.occupies_slot())
    }

    /// Number of bookings that still hold their slot.
    pub fn occupied_count(&self) -> usize {
        self.occupied
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }
}

/// The WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingCreated {
        booking: Booking,
    },
    BookingStatusChanged {
        id: Ulid,
        service_id: Ulid,
        status: BookingStatus,
        at: Ms,
    },
}

impl Event {
    pub fn service_id(&self) -> Ulid {
        match self {
            Event::BookingCreated { booking } => booking.service_id,
            Event::BookingStatusChanged { service_id, .. } => *service_id,
        }
    }
}

// ── Query types ──────────────────────────────────────────────────

/// Exact-match filters for listing, combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingQuery {
    pub status: Option<BookingStatus>,
    pub date: Option<NaiveDate>,
    /// 1-based page number; `None` means the first page.
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl BookingQuery {
    pub fn with_status(mut self, status: BookingStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn paged(mut self, page: usize, limit: usize) -> Self {
        self.page = Some(page);
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        self.status.is_none_or(|s| booking.status == s)
            && self.date.is_none_or(|d| booking.date == d)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}
