//! Timestamp display in the system time zone.
//!
//! Every timestamp the engine stores is UTC. Anything shown to a person goes
//! through these wrappers so plan listings, step details and the execution
//! log all read in the same local format.

use std::fmt;

use jiff::{tz::TimeZone, Timestamp};

/// Formats a borrowed `Timestamp` in the system time zone.
///
/// The wrapper only borrows, so models can render their timestamps inside a
/// `write!` without cloning them first.
///
/// # Format
///
/// `YYYY-MM-DD HH:MM:SS TZ`, with a 24-hour clock and the zone abbreviation
/// (`UTC`, `CET`, `JST`). Components are zero-padded so columns line up in
/// tables.
pub struct LocalDateTime<'a>(pub &'a Timestamp);

impl fmt::Display for LocalDateTime<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.0
                .to_zoned(TimeZone::system())
                .strftime("%Y-%m-%d %H:%M:%S %Z")
        )
    }
}

/// Formats an optional timestamp, rendering `-` when absent.
///
/// Used for `started_at` and `completed_at`, which stay empty until a step
/// reaches the matching state.
pub struct MaybeDateTime<'a>(pub Option<&'a Timestamp>);

impl fmt::Display for MaybeDateTime<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ts) => write!(f, "{}", LocalDateTime(ts)),
            None => write!(f, "-"),
        }
    }
}
