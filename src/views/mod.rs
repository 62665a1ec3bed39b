//! Read-only analytic views computed from the complaints relation

pub mod anomaly;
pub mod hotspot;

pub use anomaly::{DEFAULT_WINDOW_DAYS, DailyCount, daily_counts};
pub use hotspot::{HotspotCell, MAX_PRECISION, check_precision, hotspots};
