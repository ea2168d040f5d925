//! Shared type aliases for the engine module.

/// Milliseconds since the Unix epoch, UTC.
pub type UnixMillis = i64;

/// Monotonic identifier assigned by the store when a commission is persisted.
pub type CommissionId = u64;

/// Distance from a distribution source in the sponsor hierarchy. Level 1 is the
/// affiliate closest to the source.
pub type Level = u8;
