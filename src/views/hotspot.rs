//! Complaint counts per map point and category
//!
//! Grouping is on exact coordinate equality by default, so two points that
//! differ only in float precision stay separate. Passing a precision snaps
//! coordinates to that many decimals before grouping.

use crate::error::{LensError, Result};
use crate::records::ComplaintRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One row of the hotspot view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotspotCell {
    pub latitude: f64,
    pub longitude: f64,
    pub category: String,
    pub count: u64,
}

impl HotspotCell {
    /// Point geometry as WKT, longitude first
    pub fn to_wkt(&self) -> String {
        format!("POINT({} {})", self.longitude, self.latitude)
    }
}

/// Largest rounding precision; beyond this `f64` has no decimals left to round
pub const MAX_PRECISION: u32 = 15;

/// Reject precisions the rounding cannot represent
pub fn check_precision(precision: Option<u32>) -> Result<()> {
    match precision {
        Some(decimals) if decimals > MAX_PRECISION => Err(LensError::Validation(format!(
            "Hotspot precision {} exceeds the maximum of {}",
            decimals, MAX_PRECISION
        ))),
        _ => Ok(()),
    }
}

fn snap(value: f64, precision: Option<u32>) -> f64 {
    let snapped = match precision {
        Some(decimals) => {
            let factor = 10f64.powi(decimals.min(MAX_PRECISION) as i32);
            (value * factor).round() / factor
        }
        None => value,
    };
    // -0.0 and 0.0 are one coordinate
    if snapped == 0.0 { 0.0 } else { snapped }
}

/// Build the view; records without both coordinates are skipped.
///
/// Precisions above [`MAX_PRECISION`] are treated as `MAX_PRECISION`.
pub fn hotspots(records: &[ComplaintRecord], precision: Option<u32>) -> Vec<HotspotCell> {
    let mut groups: HashMap<(&str, u64, u64), (f64, f64, u64)> = HashMap::new();

    for record in records {
        let Some((lat, lon)) = record.coordinates() else {
            continue;
        };
        if !lat.is_finite() || !lon.is_finite() {
            continue;
        }

        let (lat, lon) = (snap(lat, precision), snap(lon, precision));
        groups
            .entry((record.category.as_str(), lat.to_bits(), lon.to_bits()))
            .or_insert((lat, lon, 0))
            .2 += 1;
    }

    let mut cells: Vec<HotspotCell> = groups
        .into_iter()
        .map(|((category, _, _), (latitude, longitude, count))| HotspotCell {
            latitude,
            longitude,
            category: category.to_string(),
            count,
        })
        .collect();

    cells.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.category.cmp(&b.category))
            .then_with(|| a.latitude.total_cmp(&b.latitude))
            .then_with(|| a.longitude.total_cmp(&b.longitude))
    });

    log::debug!("Hotspot view has {} cells", cells.len());
    cells
}
