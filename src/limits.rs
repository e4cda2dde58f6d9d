//! Hard caps enforced by the engine.

use crate::model::Ms;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

/// One week.
pub const MAX_DURATION_MINUTES: i64 = 7 * 24 * 60;

pub const MAX_BOOKINGS_PER_SERVICE: usize = 100_000;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;
