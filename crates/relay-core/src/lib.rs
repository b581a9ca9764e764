//! Foundational low-level utilities shared across relay crates.
//!
//! Provides the injectable clock used by expiry and lifecycle timestamps, record id
//! generation, and text truncation helpers for chat and error surfaces.

pub mod ids;
pub mod text;
pub mod time_utils;

pub use ids::new_record_id;
pub use text::{
    collapse_whitespace, truncate_chars, truncate_for_error, truncate_for_slack,
    truncate_with_ellipsis,
};
pub use time_utils::{
    current_unix_timestamp, current_unix_timestamp_ms, is_expired_unix_ms, Clock, ManualClock,
    SystemClock,
};
