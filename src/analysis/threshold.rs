/// Threshold filtering: observations in, drought months out.
///
/// A month is a drought month when its index value is strictly below the
/// threshold. The output keeps the chronological order of the input and never
/// repeats a month, so its length is the distinct drought-month count.

use crate::model::{Observation, Threshold, YearMonth, YearRange};

/// Selects the months whose value is strictly below `threshold`.
///
/// The caller has already restricted `observations` to one region of one
/// series and to the requested year window; this step applies no range bound.
pub fn select(observations: &[Observation], threshold: Threshold) -> Vec<YearMonth> {
    let mut months: Vec<YearMonth> = Vec::new();

    for obs in observations {
        if !threshold.is_drought(obs.value) {
            continue;
        }
        let ym = obs.year_month();
        // Rows arrive ordered by (year, month); one value per month means a
        // duplicate can only sit next to its twin.
        if months.last() != Some(&ym) {
            months.push(ym);
        }
    }

    months
}

/// Same as `select`, but also applies the inclusive year window. Used by the
/// single-region queries, which bound the range in the same step.
pub fn select_in_range(observations: &[Observation], threshold: Threshold, years: YearRange) -> Vec<YearMonth> {
    let mut months: Vec<YearMonth> = Vec::new();

    for obs in observations.iter().filter(|o| years.contains(o.year)) {
        if threshold.is_drought(obs.value) {
            let ym = obs.year_month();
            if months.last() != Some(&ym) {
                months.push(ym);
            }
        }
    }

    months
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
