/// Drought Event Detection
///
/// Turns a chronologically ordered list of drought months into drought
/// events. An event is a maximal run of consecutive calendar months
/// (adjacent on the month-index timeline) containing at least two months.
/// A single isolated drought month is a drought month, not an event.
///
/// # Algorithm
///
/// 1. Walk the months in order, keeping an open run that starts at the
///    first month.
/// 2. Extend the run while each month's index is exactly one greater than
///    the previous month's.
/// 3. On a gap (and once more when the input is exhausted) close the run,
///    emitting an event only if it spans two or more months.
///
/// Linear in the number of months. Input that is not sorted ascending is
/// sorted and deduplicated first rather than grouped incorrectly.

use crate::model::{DroughtEvent, YearMonth, YearRange};

/// Minimum run length that constitutes an event.
pub const MIN_EVENT_MONTHS: usize = 2;

/// Detects drought events in `flagged_months`.
pub fn detect(flagged_months: &[YearMonth]) -> Vec<DroughtEvent> {
    if is_strictly_ascending(flagged_months) {
        detect_sorted(flagged_months)
    } else {
        tracing::debug!(
            months = flagged_months.len(),
            "flagged months not strictly ascending, re-sorting before detection"
        );
        let mut sorted = flagged_months.to_vec();
        sorted.sort();
        sorted.dedup();
        detect_sorted(&sorted)
    }
}

/// Number of events `detect` would return, without building them.
pub fn count_events(flagged_months: &[YearMonth]) -> usize {
    detect(flagged_months).len()
}

/// Distinct drought months within `years`. Independent of run length.
pub fn distinct_month_count(flagged_months: &[YearMonth], years: YearRange) -> usize {
    let mut in_range: Vec<&YearMonth> = flagged_months.iter().filter(|m| years.contains(m.year)).collect();
    in_range.sort();
    in_range.dedup();
    in_range.len()
}

fn is_strictly_ascending(months: &[YearMonth]) -> bool {
    months.windows(2).all(|w| w[0] < w[1])
}

fn detect_sorted(months: &[YearMonth]) -> Vec<DroughtEvent> {
    let mut events = Vec::new();

    let Some(first) = months.first() else {
        return events;
    };

    let mut run_start = *first;
    let mut run_end = *first;
    let mut run_len = 1usize;

    for current in &months[1..] {
        if run_end.is_followed_by(current) {
            run_end = *current;
            run_len += 1;
        } else {
            close_run(&mut events, run_start, run_end, run_len);
            run_start = *current;
            run_end = *current;
            run_len = 1;
        }
    }
    close_run(&mut events, run_start, run_end, run_len);

    events
}

fn close_run(events: &mut Vec<DroughtEvent>, start: YearMonth, end: YearMonth, len: usize) {
    if len >= MIN_EVENT_MONTHS {
        events.push(DroughtEvent { start, end });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).unwrap()
    }

    #[test]
    fn test_detect_two_events_with_gap() {
        let months = vec![ym(2000, 1), ym(2000, 2), ym(2000, 4), ym(2000, 5), ym(2000, 6)];
        let events = detect(&months);
        assert_eq!(
            events,
            vec![
                DroughtEvent { start: ym(2000, 1), end: ym(2000, 2) },
                DroughtEvent { start: ym(2000, 4), end: ym(2000, 6) },
            ]
        );
        assert_eq!(distinct_month_count(&months, YearRange::new(2000, 2000)), 5);
    }

    #[test]
    fn test_trailing_lone_month_adds_no_event() {
        let months = vec![ym(2000, 1), ym(2000, 2), ym(2000, 4), ym(2000, 5), ym(2000, 6), ym(2000, 8)];
        assert_eq!(detect(&months).len(), 2);
        assert!(detect(&[ym(2000, 8)]).is_empty());
    }

    #[test]
    fn test_single_run_of_two_is_one_event() {
        let events = detect(&[ym(2010, 2), ym(2010, 3)]);
        assert_eq!(events, vec![DroughtEvent { start: ym(2010, 2), end: ym(2010, 3) }]);
    }

    #[test]
    fn test_run_crosses_year_boundary() {
        let events = detect(&[ym(1999, 11), ym(1999, 12), ym(2000, 1)]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].month_count(), 3);
    }

    #[test]
    fn test_same_month_different_year_is_not_adjacent() {
        assert!(detect(&[ym(2000, 5), ym(2001, 5)]).is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(detect(&[]).is_empty());
        assert_eq!(distinct_month_count(&[], YearRange::new(1900, 2100)), 0);
    }

    #[test]
    fn test_unsorted_input_is_resorted() {
        let months = vec![ym(2000, 5), ym(2000, 4), ym(2000, 6), ym(2000, 4)];
        assert_eq!(detect(&months), vec![DroughtEvent { start: ym(2000, 4), end: ym(2000, 6) }]);
    }

    #[test]
    fn test_events_never_shorter_than_two_and_lengths_match_indices() {
        // Irregular pattern: runs of 1, 3, 1, 2, 5, 1 separated by gaps.
        let mut months = Vec::new();
        let mut index = 2000 * 12;
        for run in [1, 3, 1, 2, 5, 1] {
            for _ in 0..run {
                months.push(YearMonth::from_month_index(index));
                index += 1;
            }
            index += 2;
        }

        let events = detect(&months);
        assert_eq!(events.len(), 3);
        let covered: i64 = events.iter().map(|e| e.month_count()).sum();
        assert_eq!(covered, 3 + 2 + 5);
        for event in &events {
            assert!(event.month_count() >= MIN_EVENT_MONTHS as i64);
            assert_eq!(event.month_count(), event.end.month_index() - event.start.month_index() + 1);
        }
    }

    #[test]
    fn test_month_count_is_additive_over_disjoint_sequences() {
        let first = vec![ym(1990, 1), ym(1990, 2), ym(1990, 7)];
        let second = vec![ym(1995, 3), ym(1995, 4)];
        let range = YearRange::new(1980, 2000);
        let combined: Vec<YearMonth> = first.iter().chain(second.iter()).copied().collect();
        assert_eq!(
            distinct_month_count(&combined, range),
            distinct_month_count(&first, range) + distinct_month_count(&second, range)
        );
    }

    #[test]
    fn test_distinct_month_count_respects_range() {
        let months = vec![ym(1999, 12), ym(2000, 1), ym(2000, 2), ym(2001, 1)];
        assert_eq!(distinct_month_count(&months, YearRange::new(2000, 2000)), 2);
    }

    #[test]
    fn test_count_events_matches_detect() {
        let months = vec![ym(2000, 1), ym(2000, 2), ym(2000, 9), ym(2000, 10), ym(2000, 11)];
        assert_eq!(count_events(&months), 2);
    }
}
