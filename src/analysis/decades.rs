/// Decade breakdowns of drought months and drought events.
///
/// Decade windows start at `start_year` and step by ten years
/// (`start_year`, `start_year + 10`, ...) while the window start is within
/// the range. Each window covers ten calendar years, so the last one may
/// extend past `end_year`.

use crate::model::{DroughtEvent, YearMonth, YearRange};

/// Length of one window, in years.
pub const DECADE_YEARS: i32 = 10;

/// Start years of every decade window in `years`.
pub fn decades(years: YearRange) -> Vec<i32> {
    if years.is_empty() {
        return Vec::new();
    }
    (years.start_year..=years.end_year)
        .step_by(DECADE_YEARS as usize)
        .collect()
}

/// Events per decade window. An event counts in every window it overlaps,
/// so an event spanning a decade boundary is counted twice.
pub fn event_frequency_by_decade(events: &[DroughtEvent], years: YearRange) -> Vec<(i32, usize)> {
    decades(years)
        .into_iter()
        .map(|decade| {
            let decade_end = decade + DECADE_YEARS - 1;
            let count = events
                .iter()
                .filter(|e| e.end.year >= decade && e.start.year <= decade_end)
                .count();
            (decade, count)
        })
        .collect()
}

/// Drought months per decade window.
pub fn month_count_by_decade(months: &[YearMonth], years: YearRange) -> Vec<(i32, usize)> {
    decades(years)
        .into_iter()
        .map(|decade| {
            let decade_end = decade + DECADE_YEARS - 1;
            let count = months
                .iter()
                .filter(|m| m.year >= decade && m.year <= decade_end)
                .count();
            (decade, count)
        })
        .collect()
}
