//! Shared constants for end-to-end tests

/// Newest `order_at` of the seeded window
pub const SEED_NEWEST_AT: i64 = 1_000_000;

/// Gap between consecutive seeded notifications
pub const SEED_STEP: i64 = 1_000;

/// Size of the seeded window, one full page
pub const SEED_COUNT: usize = 20;

/// Analytics category used by the default settings
pub const CATEGORY: &str = "notification_inbox";
