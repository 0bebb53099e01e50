//! Coordinate Engine: deterministic fact placement on the forensic board.
//!
//! Pure functions only. The (excluded) visualization layer calls these on
//! read; nothing here touches persisted state.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Pixels per elapsed week on the time axis.
pub const X_SCALE: f64 = 1200.0;
/// Pixels between category lanes.
pub const LANE_HEIGHT: f64 = 1500.0;
/// Vertical gap between stacked facts in one lane.
pub const FACT_OFFSET: f64 = 300.0;

/// Fixed epoch anchor: all x positions are weeks elapsed since this date.
const ANCHOR: (i32, u32, u32) = (1945, 1, 1);

/// Tolerant date parse shared by the fact validator and the board layout.
///
/// Models emit partially known dates as `1977-03-XX`; unknown components
/// degrade to the first of the month/year rather than rejecting the date.
pub fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    let clean = raw.trim().replace("-XX", "-01");
    if clean.is_empty() {
        return None;
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(&clean, fmt) {
            return Some(date);
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&clean, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(&clean)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Maps a fact's date/category/stack-index to board coordinates.
#[derive(Debug, Clone)]
pub struct CoordinateEngine {
    anchor: NaiveDate,
}

impl Default for CoordinateEngine {
    fn default() -> Self {
        // The tuple is a valid calendar date; construction cannot fail.
        let (y, m, d) = ANCHOR;
        Self {
            anchor: NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default(),
        }
    }
}

impl CoordinateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic position for one fact. Equal dates always yield equal
    /// x regardless of category; distinct categories always yield distinct
    /// y. An unparseable date falls back to the origin — callers tell a
    /// real origin fact from the fallback via the fact's own `date_valid`
    /// flag, not from this function.
    pub fn position(&self, date_str: &str, category_index: usize, stack_index: usize) -> (f64, f64) {
        let Some(date) = parse_flexible_date(date_str) else {
            return (0.0, 0.0);
        };

        let days = (date - self.anchor).num_days() as f64;
        let x = (days / 7.0) * X_SCALE;
        let y = (category_index as f64) * LANE_HEIGHT + (stack_index as f64) * FACT_OFFSET;
        (x, y)
    }
}

/// Stable category -> lane assignment in order of first appearance.
#[derive(Debug, Default)]
pub struct CategoryLanes {
    order: Vec<String>,
    index: HashMap<String, usize>,
}

impl CategoryLanes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lane index for a category, assigning the next lane on first sight.
    pub fn lane_for(&mut self, category: &str) -> usize {
        if let Some(&lane) = self.index.get(category) {
            return lane;
        }
        let lane = self.order.len();
        self.order.push(category.to_string());
        self.index.insert(category.to_string(), lane);
        lane
    }

    pub fn categories(&self) -> &[String] {
        &self.order
    }
}
