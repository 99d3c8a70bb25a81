use crate::cadence::{resolve_cycle_window, CycleWindow};
use crate::schema::Budget;
use crate::utils::category_label;
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Tolerance applied to every guardrail comparison to absorb floating noise.
pub const GUARDRAIL_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardrailStatus {
    Green,
    Yellow,
    Red,
}

impl GuardrailStatus {
    pub fn label(&self) -> &'static str {
        match self {
            GuardrailStatus::Green => "On Track",
            GuardrailStatus::Yellow => "Monitor",
            GuardrailStatus::Red => "Over Budget",
        }
    }
}

/// Classifies spend against the expected-to-date and full-cycle amounts.
pub fn guardrail_status(actual: f64, expected: f64, budgeted: f64) -> GuardrailStatus {
    if budgeted <= 0.0 {
        return if actual > GUARDRAIL_EPSILON {
            GuardrailStatus::Red
        } else {
            GuardrailStatus::Green
        };
    }

    if actual <= expected + GUARDRAIL_EPSILON {
        GuardrailStatus::Green
    } else if actual <= budgeted + GUARDRAIL_EPSILON {
        GuardrailStatus::Yellow
    } else {
        GuardrailStatus::Red
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailResult {
    pub status: GuardrailStatus,
    pub actual: f64,
    pub expected: f64,
    pub budgeted: f64,
    pub elapsed_ratio: f64,
}

impl GuardrailResult {
    pub fn evaluate(actual: f64, budgeted: f64, elapsed_ratio: f64) -> Self {
        let expected = budgeted * elapsed_ratio;
        Self {
            status: guardrail_status(actual, expected, budgeted),
            actual,
            expected,
            budgeted,
            elapsed_ratio,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacingReport {
    pub window: CycleWindow,
    /// Evaluated on the summed actual and budgeted amounts of all allocations.
    pub overall: GuardrailResult,
    /// Keyed by the allocation's category label.
    pub categories: BTreeMap<String, GuardrailResult>,
    /// In-cycle expense whose category has no allocation.
    pub unallocated_spend: f64,
}

impl PacingReport {
    /// Worst status across categories, the roll-up alternative to `overall`.
    pub fn worst_category_status(&self) -> GuardrailStatus {
        self.categories
            .values()
            .map(|result| result.status)
            .max()
            .unwrap_or(GuardrailStatus::Green)
    }
}

struct AllocationSlot {
    key: String,
    label: String,
    budgeted: f64,
}

/// Computes category and aggregate guardrails for the budget's cycle
/// containing `reference`.
///
/// Expenses without a usable date are counted in the current cycle so that
/// undated spend is never hidden from pacing.
pub fn compute_pacing(budget: &Budget, reference: NaiveDate) -> PacingReport {
    let window = resolve_cycle_window(&budget.cadence, reference);

    let mut spend_by_category: HashMap<String, f64> = HashMap::new();
    for transaction in budget.transactions.iter().filter(|t| t.is_expense()) {
        let in_cycle = transaction
            .date
            .map_or(true, |date| window.contains(date));
        if in_cycle {
            *spend_by_category
                .entry(transaction.category_key())
                .or_insert(0.0) += transaction.amount;
        }
    }

    let mut slots: Vec<AllocationSlot> = Vec::new();
    for allocation in &budget.category_budgets {
        let key = allocation.category_key();
        match slots.iter_mut().find(|slot| slot.key == key) {
            Some(slot) => slot.budgeted += allocation.budgeted_amount,
            None => slots.push(AllocationSlot {
                key,
                label: category_label(&allocation.category),
                budgeted: allocation.budgeted_amount,
            }),
        }
    }

    let mut categories = BTreeMap::new();
    let mut total_actual = 0.0;
    let mut total_budgeted = 0.0;

    for slot in &slots {
        let actual = spend_by_category.get(&slot.key).copied().unwrap_or(0.0);
        total_actual += actual;
        total_budgeted += slot.budgeted;
        categories.insert(
            slot.label.clone(),
            GuardrailResult::evaluate(actual, slot.budgeted, window.elapsed_ratio),
        );
    }

    let unallocated_spend = spend_by_category
        .iter()
        .filter(|(key, _)| !slots.iter().any(|slot| &slot.key == *key))
        .map(|(_, amount)| amount)
        .sum();

    let overall = GuardrailResult::evaluate(total_actual, total_budgeted, window.elapsed_ratio);

    debug!(
        "Pacing for budget '{}' in [{}, {}): {:.2} of {:.2} spent, status {:?}",
        budget.name, window.start, window.end, total_actual, total_budgeted, overall.status
    );

    PacingReport {
        window,
        overall,
        categories,
        unallocated_spend,
    }
}
