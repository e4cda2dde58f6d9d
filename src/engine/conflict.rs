use crate::model::*;

use super::BookingError;

pub(crate) fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn validate_span(span: &Span) -> Result<(), BookingError> {
    use crate::limits::*;
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(BookingError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

/// Reject `span` if it overlaps any booking on the ledger that still holds
/// its slot. Cancelled bookings never block; back-to-back spans never
/// conflict.
pub(crate) fn check_no_conflict(ledger: &ServiceLedger, span: &Span) -> Result<(), BookingError> {
    match find_conflict(ledger, span) {
        Some(existing) => Err(BookingError::SlotUnavailable {
            conflicting: existing.id,
        }),
        None => Ok(()),
    }
}

pub(crate) fn find_conflict<'a>(ledger: &'a ServiceLedger, span: &Span) -> Option<&'a Booking> {
    ledger
        .overlapping(span)
        .find(|existing| existing.status.occupies_slot() && existing.span.overlaps(span))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};
    use ulid::Ulid;

    use super::*;

    const M: Ms = 60_000;
    const BASE: Ms = 1_750_000_000_000;

    fn booking(start_min: Ms, end_min: Ms, status: BookingStatus) -> Booking {
        let mut b = Booking::new(
            Ulid::new(),
            Ulid::new(),
            NaiveDate::from_ymd_opt(2025, 6, 16).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            end_min - start_min,
            Span::new(BASE + start_min * M, BASE + end_min * M),
            0,
        );
        b.status = status;
        b
    }

    fn ledger(bookings: Vec<Booking>) -> ServiceLedger {
        let mut l = ServiceLedger::new(Ulid::new());
        for b in bookings {
            l.insert(b);
        }
        l
    }

    fn span(start_min: Ms, end_min: Ms) -> Span {
        Span::new(BASE + start_min * M, BASE + end_min * M)
    }

    #[test]
    fn empty_ledger_always_available() {
        assert!(check_no_conflict(&ledger(vec![]), &span(0, 30)).is_ok());
    }

    #[test]
    fn back_to_back_allowed() {
        let l = ledger(vec![booking(0, 30, BookingStatus::Pending)]);
        assert!(check_no_conflict(&l, &span(30, 60)).is_ok());
        assert!(check_no_conflict(&l, &span(-30, 0)).is_ok());
    }

    #[test]
    fn one_minute_overlap_conflicts() {
        let existing = booking(0, 30, BookingStatus::Confirmed);
        let id = existing.id;
        let l = ledger(vec![existing]);
        match check_no_conflict(&l, &span(29, 59)) {
            Err(BookingError::SlotUnavailable { conflicting }) => assert_eq!(conflicting, id),
            other => panic!("expected SlotUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn containment_either_way_conflicts() {
        let l = ledger(vec![booking(10, 20, BookingStatus::Pending)]);
        assert!(check_no_conflict(&l, &span(0, 60)).is_err());

        let l = ledger(vec![booking(0, 60, BookingStatus::Pending)]);
        assert!(check_no_conflict(&l, &span(10, 20)).is_err());
    }

    #[test]
    fn cancelled_never_blocks() {
        let l = ledger(vec![booking(0, 30, BookingStatus::Cancelled)]);
        assert!(check_no_conflict(&l, &span(0, 30)).is_ok());
    }

    #[test]
    fn completed_still_blocks() {
        let l = ledger(vec![booking(0, 30, BookingStatus::Completed)]);
        assert!(check_no_conflict(&l, &span(15, 45)).is_err());
    }

    #[test]
    fn long_earlier_booking_found_past_short_ones() {
        // A long booking starting early must be caught even when later,
        // shorter bookings sit between it and the candidate.
        let l = ledger(vec![
            booking(0, 240, BookingStatus::Pending),
            booking(240, 250, BookingStatus::Cancelled),
            booking(250, 260, BookingStatus::Cancelled),
        ]);
        assert!(find_conflict(&l, &span(100, 110)).is_some());
    }

    #[test]
    fn span_range_validated() {
        assert!(validate_span(&span(0, 30)).is_ok());
        assert!(matches!(
            validate_span(&Span::new(0, 1000)),
            Err(BookingError::LimitExceeded(_))
        ));
    }
}
