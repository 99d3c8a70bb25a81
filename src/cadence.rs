use crate::schema::{CadenceConfig, CadenceType, DEFAULT_CUSTOM_DAYS};
use crate::utils::{add_days, add_months, days_between};
use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Upper bound on cycle steps taken away from the cadence start date before
/// resolution gives up and returns a single-day window.
pub const MAX_CYCLE_STEPS: i64 = 730;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleWindow {
    pub start: NaiveDate,
    /// Exclusive.
    pub end: NaiveDate,
    pub cycle_length_days: f64,
    pub elapsed_days: f64,
    pub elapsed_ratio: f64,
    /// Set when no containing cycle was found within [`MAX_CYCLE_STEPS`] and
    /// the window degraded to `[reference, reference + 1 day)`.
    pub is_fallback: bool,
}

impl CycleWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    fn between(start: NaiveDate, end: NaiveDate, reference: NaiveDate) -> Self {
        let cycle_length_days = days_between(start, end).max(1) as f64;
        let elapsed_days = days_between(start, reference).max(0) as f64;
        let elapsed_ratio = (elapsed_days / cycle_length_days).clamp(0.0, 1.0);

        Self {
            start,
            end,
            cycle_length_days,
            elapsed_days,
            elapsed_ratio,
            is_fallback: false,
        }
    }

    fn single_day(reference: NaiveDate) -> Self {
        Self {
            start: reference,
            end: add_days(reference, 1).unwrap_or(reference),
            cycle_length_days: 1.0,
            elapsed_days: 0.0,
            elapsed_ratio: 0.0,
            is_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleStep {
    Days(i64),
    CalendarMonth,
}

/// Nominal cycle length in days, or `None` for monthly cadences whose length
/// follows the calendar.
pub fn nominal_cycle_days(cadence: &CadenceConfig) -> Option<i64> {
    match cycle_step(cadence) {
        CycleStep::Days(days) => Some(days),
        CycleStep::CalendarMonth => None,
    }
}

fn cycle_step(cadence: &CadenceConfig) -> CycleStep {
    match cadence.cadence_type {
        CadenceType::Weekly => CycleStep::Days(7),
        CadenceType::Biweekly => CycleStep::Days(14),
        CadenceType::SemiMonthly => CycleStep::Days(15),
        CadenceType::Quarterly => CycleStep::Days(91),
        CadenceType::Yearly => CycleStep::Days(365),
        CadenceType::Monthly => CycleStep::CalendarMonth,
        CadenceType::Custom | CadenceType::PerPaycheck => {
            let days = cadence.custom_days.unwrap_or_else(|| {
                warn!(
                    "{:?} cadence has no customDays; defaulting to {} days",
                    cadence.cadence_type, DEFAULT_CUSTOM_DAYS
                );
                DEFAULT_CUSTOM_DAYS
            });
            CycleStep::Days(i64::from(days.max(1)))
        }
    }
}

/// Start of the cycle `index` steps away from the anchor. Monthly cycles are
/// always measured from the anchor so a clamped short month does not shift
/// later cycles.
fn cycle_start(anchor: NaiveDate, step: CycleStep, index: i64) -> Option<NaiveDate> {
    match step {
        CycleStep::Days(days) => add_days(anchor, days.checked_mul(index)?),
        CycleStep::CalendarMonth => add_months(anchor, i32::try_from(index).ok()?),
    }
}

/// Finds the cadence cycle `[start, end)` containing `reference`.
///
/// Walks from the cadence start date one cycle at a time, backwards while the
/// candidate starts after the reference and forwards while the reference is on
/// or after the candidate end. If no containing cycle is found within
/// [`MAX_CYCLE_STEPS`] steps the result is a single-day window flagged with
/// `is_fallback`; callers should surface that as a warning.
pub fn resolve_cycle_window(cadence: &CadenceConfig, reference: NaiveDate) -> CycleWindow {
    let step = cycle_step(cadence);
    let anchor = cadence.start_date;
    let mut index: i64 = 0;

    for _ in 0..=MAX_CYCLE_STEPS {
        let (start, end) = match (
            cycle_start(anchor, step, index),
            cycle_start(anchor, step, index + 1),
        ) {
            (Some(start), Some(end)) => (start, end),
            _ => break,
        };

        if reference < start {
            index -= 1;
        } else if reference >= end {
            index += 1;
        } else {
            debug!(
                "Resolved {:?} cycle {} for {}: [{}, {})",
                cadence.cadence_type, index, reference, start, end
            );
            return CycleWindow::between(start, end, reference);
        }
    }

    warn!(
        "Could not resolve {:?} cycle from {} for {} within {} steps; using single-day window",
        cadence.cadence_type, anchor, reference, MAX_CYCLE_STEPS
    );
    CycleWindow::single_day(reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_monthly_clamps_to_short_month() {
        let cadence = CadenceConfig::new(CadenceType::Monthly, date(2025, 1, 31));
        let window = resolve_cycle_window(&cadence, date(2025, 2, 15));

        assert_eq!(window.start, date(2025, 1, 31));
        assert_eq!(window.end, date(2025, 2, 28));
        assert_eq!(window.cycle_length_days, 28.0);
        assert!(!window.is_fallback);
    }

    #[test]
    fn test_monthly_does_not_drift_after_clamping() {
        let cadence = CadenceConfig::new(CadenceType::Monthly, date(2025, 1, 31));
        let window = resolve_cycle_window(&cadence, date(2025, 3, 10));

        assert_eq!(window.start, date(2025, 2, 28));
        assert_eq!(window.end, date(2025, 3, 31));

        let april = resolve_cycle_window(&cadence, date(2025, 4, 5));
        assert_eq!(april.start, date(2025, 3, 31));
        assert_eq!(april.end, date(2025, 4, 30));
    }

    #[test]
    fn test_monthly_steps_backwards() {
        let cadence = CadenceConfig::new(CadenceType::Monthly, date(2025, 3, 31));
        let window = resolve_cycle_window(&cadence, date(2025, 2, 15));

        assert_eq!(window.start, date(2025, 1, 31));
        assert_eq!(window.end, date(2025, 2, 28));
    }

    #[test]
    fn test_weekly_elapsed_ratio() {
        let cadence = CadenceConfig::new(CadenceType::Weekly, date(2025, 1, 6));
        let window = resolve_cycle_window(&cadence, date(2025, 1, 8));

        assert_eq!(window.start, date(2025, 1, 6));
        assert_eq!(window.end, date(2025, 1, 13));
        assert_eq!(window.elapsed_days, 2.0);
        assert!((window.elapsed_ratio - 2.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_end_is_exclusive() {
        let cadence = CadenceConfig::new(CadenceType::Weekly, date(2025, 1, 6));
        let window = resolve_cycle_window(&cadence, date(2025, 1, 13));

        assert_eq!(window.start, date(2025, 1, 13));
        assert_eq!(window.elapsed_ratio, 0.0);
    }

    #[test]
    fn test_reference_before_start_walks_back() {
        let cadence = CadenceConfig::new(CadenceType::Biweekly, date(2025, 3, 3));
        let window = resolve_cycle_window(&cadence, date(2025, 2, 1));

        assert_eq!(window.start, date(2025, 1, 20));
        assert_eq!(window.end, date(2025, 2, 3));
    }

    #[test]
    fn test_custom_days_default_and_floor() {
        let start = date(2025, 1, 1);

        let defaulted = CadenceConfig::new(CadenceType::PerPaycheck, start);
        assert_eq!(nominal_cycle_days(&defaulted), Some(14));
        let window = resolve_cycle_window(&defaulted, date(2025, 1, 20));
        assert_eq!(window.start, date(2025, 1, 15));

        let zero = CadenceConfig::custom(0, start);
        assert_eq!(nominal_cycle_days(&zero), Some(1));
        let window = resolve_cycle_window(&zero, date(2025, 1, 5));
        assert_eq!(window.start, date(2025, 1, 5));
        assert_eq!(window.end, date(2025, 1, 6));
        assert!(!window.is_fallback);

        let ten = CadenceConfig::custom(10, start);
        let window = resolve_cycle_window(&ten, date(2025, 1, 25));
        assert_eq!(window.start, date(2025, 1, 21));
        assert_eq!(window.cycle_length_days, 10.0);
    }

    #[test]
    fn test_nominal_lengths() {
        let start = date(2025, 1, 1);
        let cases = [
            (CadenceType::Weekly, Some(7)),
            (CadenceType::Biweekly, Some(14)),
            (CadenceType::SemiMonthly, Some(15)),
            (CadenceType::Quarterly, Some(91)),
            (CadenceType::Yearly, Some(365)),
            (CadenceType::Monthly, None),
        ];
        for (cadence_type, expected) in cases {
            let cadence = CadenceConfig::new(cadence_type, start);
            assert_eq!(nominal_cycle_days(&cadence), expected, "{:?}", cadence_type);
        }
    }

    #[test]
    fn test_containment_and_ratio_bounds() {
        let types = [
            CadenceType::Weekly,
            CadenceType::Biweekly,
            CadenceType::SemiMonthly,
            CadenceType::Monthly,
            CadenceType::Quarterly,
            CadenceType::Yearly,
            CadenceType::Custom,
            CadenceType::PerPaycheck,
        ];
        let anchors = [date(2024, 2, 29), date(2025, 1, 31), date(2025, 6, 15)];

        for cadence_type in types {
            for anchor in anchors {
                let cadence = CadenceConfig::new(cadence_type, anchor);
                let mut reference = date(2024, 1, 1);
                while reference < date(2026, 1, 1) {
                    let window = resolve_cycle_window(&cadence, reference);
                    assert!(!window.is_fallback);
                    assert!(
                        window.contains(reference),
                        "{:?} from {} does not contain {}: [{}, {})",
                        cadence_type,
                        anchor,
                        reference,
                        window.start,
                        window.end
                    );
                    assert!((0.0..=1.0).contains(&window.elapsed_ratio));
                    assert!(window.cycle_length_days >= 1.0);
                    reference = add_days(reference, 5).unwrap();
                }
            }
        }
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let cadence = CadenceConfig::new(CadenceType::Monthly, date(2024, 8, 31));
        let first = resolve_cycle_window(&cadence, date(2025, 2, 10));
        let second = resolve_cycle_window(&cadence, date(2025, 2, 10));
        assert_eq!(first, second);
    }

    #[test]
    fn test_runaway_search_falls_back_to_single_day() {
        let cadence = CadenceConfig::new(CadenceType::Weekly, date(2000, 1, 3));
        let reference = date(2025, 1, 8);
        let window = resolve_cycle_window(&cadence, reference);

        assert!(window.is_fallback);
        assert_eq!(window.start, reference);
        assert_eq!(window.end, date(2025, 1, 9));
        assert_eq!(window.cycle_length_days, 1.0);
        assert_eq!(window.elapsed_ratio, 0.0);
    }
}
