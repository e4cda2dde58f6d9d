//! Booking status state machine.
//!
//! ```text
//! PENDING ──► CONFIRMED ──► COMPLETED
//!    │            │
//!    └────► CANCELLED ◄─────┘
//! ```
//!
//! Only staff and admins move bookings forward. An owner may cancel their
//! own booking while it is still pending.

use crate::model::{Booking, BookingStatus, Caller};

use super::BookingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Status moves to the contained state.
    Changed(BookingStatus),
    /// Requested state equals the current one; nothing to persist.
    Unchanged,
}

/// Who may walk an edge of the table, if the edge exists at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permit {
    StaffOnly,
    OwnerOrStaff,
}

fn edge(from: BookingStatus, to: BookingStatus) -> Option<Permit> {
    use crate::model::BookingStatus::*;
    match (from, to) {
        (Pending, Confirmed) => Some(Permit::StaffOnly),
        (Pending, Cancelled) => Some(Permit::OwnerOrStaff),
        (Confirmed, Cancelled) => Some(Permit::StaffOnly),
        (Confirmed, Completed) => Some(Permit::StaffOnly),
        _ => None,
    }
}

/// Decide whether `caller` may move `booking` to `target`.
///
/// A user who does not own the booking is refused before the table is
/// consulted, so they learn nothing about its state.
pub fn authorize(
    booking: &Booking,
    caller: &Caller,
    target: BookingStatus,
) -> Result<Transition, BookingError> {
    let is_owner = booking.is_owned_by(caller);
    if !caller.role.is_privileged() && !is_owner {
        return Err(BookingError::Forbidden("not the owner of this booking"));
    }

    let from = booking.status;
    if from.is_terminal() {
        return Err(BookingError::InvalidTransition { from, to: target });
    }
    if from == target {
        return Ok(Transition::Unchanged);
    }

    match edge(from, target) {
        None => Err(BookingError::InvalidTransition { from, to: target }),
        Some(_) if caller.role.is_privileged() => Ok(Transition::Changed(target)),
        Some(Permit::OwnerOrStaff) => Ok(Transition::Changed(target)),
        Some(Permit::StaffOnly) => Err(BookingError::Forbidden(
            "only staff or admins may perform this transition",
        )),
    }
}
