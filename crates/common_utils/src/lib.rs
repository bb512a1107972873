//! Utilities shared across the billkit workspace.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::expect_used,
    clippy::panic,
    clippy::unwrap_used
)]

pub mod crypto;
pub mod custom_serde;
pub mod errors;
pub mod ext_traits;
pub mod request;
pub mod types;

/// Date-time utilities.
pub mod date_time {
    use time::{OffsetDateTime, PrimitiveDateTime};

    /// Create a new [`PrimitiveDateTime`] with the current date and time in UTC.
    pub fn now() -> PrimitiveDateTime {
        let utc_date_time = OffsetDateTime::now_utc();
        PrimitiveDateTime::new(utc_date_time.date(), utc_date_time.time())
    }

    /// Convert from [`OffsetDateTime`] to [`PrimitiveDateTime`], dropping the offset.
    pub fn convert_to_pdt(offset_time: OffsetDateTime) -> PrimitiveDateTime {
        PrimitiveDateTime::new(offset_time.date(), offset_time.time())
    }
}

/// Structured logging macros, re-exported so call sites read
/// `logger::info!(...)` across the workspace.
pub mod logger {
    pub use tracing::{debug, error, info, warn};
}
