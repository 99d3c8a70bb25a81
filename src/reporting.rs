use crate::schema::{Budget, Transaction};
use crate::utils::{
    add_days, add_months, category_label, days_between, first_day_of_month, last_day_of_month,
    safe_ratio,
};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Length of the trailing window used for the `custom` period.
pub const CUSTOM_PERIOD_DAYS: i64 = 14;

const WEEK_PERIOD_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReportPeriod {
    #[schemars(description = "Trailing 7 days including the reference date")]
    Week,

    #[schemars(description = "Calendar month containing the reference date")]
    Month,

    #[schemars(description = "Trailing 14 days including the reference date")]
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodRange {
    pub period: ReportPeriod,
    pub start: NaiveDateTime,
    /// Inclusive; the last millisecond of the final day.
    pub end: NaiveDateTime,
    pub days: u32,
    pub label: String,
}

impl PeriodRange {
    fn new(period: ReportPeriod, first: NaiveDate, last: NaiveDate, label: String) -> Self {
        Self {
            period,
            start: start_of_day(first),
            end: end_of_day(last),
            days: (days_between(first, last) + 1).max(1) as u32,
            label,
        }
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end.date()
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start_date() <= date && date <= self.end_date()
    }

    /// Every calendar day in the range, in order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start_date()
            .iter_days()
            .take_while(move |date| *date <= self.end_date())
    }
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    start_of_day(date) + Duration::milliseconds(86_399_999)
}

fn span_label(first: NaiveDate, last: NaiveDate) -> String {
    format!("{} - {}", first.format("%b %-d"), last.format("%b %-d, %Y"))
}

fn month_range(date: NaiveDate) -> PeriodRange {
    let first = first_day_of_month(date);
    PeriodRange::new(
        ReportPeriod::Month,
        first,
        last_day_of_month(date),
        first.format("%B %Y").to_string(),
    )
}

fn trailing_range(
    period: ReportPeriod,
    last: NaiveDate,
    days: i64,
    label: Option<String>,
) -> PeriodRange {
    let first = add_days(last, -(days - 1)).unwrap_or(last);
    let label = label.unwrap_or_else(|| span_label(first, last));
    PeriodRange::new(period, first, last, label)
}

pub fn get_period_range(period: ReportPeriod, reference: NaiveDate) -> PeriodRange {
    match period {
        ReportPeriod::Week => trailing_range(period, reference, WEEK_PERIOD_DAYS, None),
        ReportPeriod::Month => month_range(reference),
        ReportPeriod::Custom => trailing_range(
            period,
            reference,
            CUSTOM_PERIOD_DAYS,
            Some(format!("Last {} days", CUSTOM_PERIOD_DAYS)),
        ),
    }
}

/// The prior calendar month for monthly ranges, otherwise the window of equal
/// length ending the day before `range` starts.
pub fn get_previous_range(range: &PeriodRange) -> PeriodRange {
    match range.period {
        ReportPeriod::Month => {
            let previous = add_months(range.start_date(), -1).unwrap_or(range.start_date());
            month_range(previous)
        }
        ReportPeriod::Week | ReportPeriod::Custom => {
            let last = add_days(range.start_date(), -1).unwrap_or(range.start_date());
            trailing_range(range.period, last, i64::from(range.days), None)
        }
    }
}

/// Transactions dated inside `range`. Undated transactions have no day to be
/// bucketed into and are left out.
pub fn transactions_in_range<'a, I>(transactions: I, range: &PeriodRange) -> Vec<&'a Transaction>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    transactions
        .into_iter()
        .filter(|t| t.date.is_some_and(|date| range.contains_date(date)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdownEntry {
    pub key: String,
    pub label: String,
    pub amount: f64,
    pub percent: f64,
}

/// Sums amounts per category, labelled with the first spelling seen, largest
/// first.
pub fn build_category_breakdown<'a, I>(transactions: I) -> Vec<CategoryBreakdownEntry>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut order: Vec<String> = Vec::new();
    let mut totals: HashMap<String, (String, f64)> = HashMap::new();

    for transaction in transactions {
        let key = transaction.category_key();
        let label = category_label(&transaction.category);
        match totals.get_mut(&key) {
            Some((_, amount)) => *amount += transaction.amount,
            None => {
                order.push(key.clone());
                totals.insert(key, (label, transaction.amount));
            }
        }
    }

    let total: f64 = totals.values().map(|(_, amount)| amount).sum();

    let mut entries: Vec<CategoryBreakdownEntry> = order
        .into_iter()
        .filter_map(|key| {
            totals.remove(&key).map(|(label, amount)| CategoryBreakdownEntry {
                percent: if total > 0.0 { safe_ratio(amount, total) * 100.0 } else { 0.0 },
                key,
                label,
                amount,
            })
        })
        .collect();

    entries.sort_by(|a, b| b.amount.total_cmp(&a.amount));
    entries
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub label: String,
    pub income: f64,
    pub expense: f64,
}

fn series_label(period: ReportPeriod, date: NaiveDate) -> String {
    match period {
        ReportPeriod::Week => date.format("%a").to_string(),
        ReportPeriod::Month => date.format("%-d").to_string(),
        ReportPeriod::Custom => date.format("%b %-d").to_string(),
    }
}

/// One point per day of `range`, inclusive of both ends.
pub fn build_income_expense_series<'a, I>(transactions: I, range: &PeriodRange) -> Vec<SeriesPoint>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut by_day: HashMap<NaiveDate, (f64, f64)> = HashMap::new();
    for transaction in transactions_in_range(transactions, range) {
        if let Some(date) = transaction.date {
            let (income, expense) = by_day.entry(date).or_insert((0.0, 0.0));
            if transaction.is_income() {
                *income += transaction.amount;
            } else {
                *expense += transaction.amount;
            }
        }
    }

    range
        .dates()
        .map(|date| {
            let (income, expense) = by_day.get(&date).copied().unwrap_or((0.0, 0.0));
            SeriesPoint {
                date,
                label: series_label(range.period, date),
                income,
                expense,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendComparison {
    pub category: String,
    pub amount: f64,
    pub previous_amount: f64,
    pub change: f64,
    pub percent_change: f64,
}

fn percent_change(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        (current - previous) / previous * 100.0
    } else if current > 0.0 {
        100.0
    } else {
        0.0
    }
}

/// Per-category expense change between `range` and `previous`. A category
/// with no previous spend reports a 100% increase.
pub fn calculate_trend_comparisons(
    transactions: &[Transaction],
    range: &PeriodRange,
    previous: &PeriodRange,
) -> Vec<TrendComparison> {
    let expenses = || transactions.iter().filter(|t| t.is_expense());
    let current = build_category_breakdown(transactions_in_range(expenses(), range));
    let prior = build_category_breakdown(transactions_in_range(expenses(), previous));

    let mut merged: BTreeMap<String, (String, f64, f64)> = BTreeMap::new();
    for entry in current {
        merged.insert(entry.key, (entry.label, entry.amount, 0.0));
    }
    for entry in prior {
        merged
            .entry(entry.key)
            .or_insert((entry.label, 0.0, 0.0))
            .2 = entry.amount;
    }

    let mut trends: Vec<TrendComparison> = merged
        .into_values()
        .map(|(category, amount, previous_amount)| TrendComparison {
            category,
            amount,
            previous_amount,
            change: amount - previous_amount,
            percent_change: percent_change(amount, previous_amount),
        })
        .filter(|trend| trend.percent_change.is_finite())
        .collect();

    trends.sort_by(|a, b| b.percent_change.abs().total_cmp(&a.percent_change.abs()));
    trends
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashBurnSummary {
    pub total_budgeted: f64,
    pub spent: f64,
    pub remaining: f64,
    pub avg_daily_spend: f64,
    /// `None` when nothing has been spent yet.
    pub projected_days_left: Option<f64>,
    pub progress: f64,
}

/// Burn rate of the month's expenses against every budget's allocations.
/// The daily average is taken over the days of `month_range` elapsed by
/// `reference` (at least one).
pub fn build_cash_burn_summary(
    budgets: &[Budget],
    transactions: &[Transaction],
    month_range: &PeriodRange,
    reference: NaiveDate,
) -> CashBurnSummary {
    let total_budgeted: f64 = budgets.iter().map(Budget::total_budgeted).sum();
    let expenses = transactions.iter().filter(|t| t.is_expense());
    let spent: f64 = transactions_in_range(expenses, month_range)
        .iter()
        .map(|t| t.amount)
        .sum();

    let remaining = (total_budgeted - spent).max(0.0);
    let elapsed_days = (days_between(month_range.start_date(), reference) + 1)
        .clamp(1, i64::from(month_range.days.max(1)));
    let avg_daily_spend = safe_ratio(spent, elapsed_days as f64);
    let projected_days_left = if avg_daily_spend > 0.0 {
        Some(remaining / avg_daily_spend)
    } else {
        None
    };
    let progress = if total_budgeted > 0.0 {
        safe_ratio(spent, total_budgeted).min(1.0)
    } else {
        0.0
    };

    CashBurnSummary {
        total_budgeted,
        spent,
        remaining,
        avg_daily_spend,
        projected_days_left,
        progress,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub range: PeriodRange,
    pub previous_range: PeriodRange,
    pub total_income: f64,
    pub total_expenses: f64,
    pub balance: f64,
    pub transaction_count: usize,
    pub category_breakdown: Vec<CategoryBreakdownEntry>,
    pub series: Vec<SeriesPoint>,
    pub trends: Vec<TrendComparison>,
    pub cash_burn: CashBurnSummary,
}

/// Full report for `period` around `reference`, recomputed from every
/// budget's transactions.
pub fn summarize_report(
    budgets: &[Budget],
    period: ReportPeriod,
    reference: NaiveDate,
) -> ReportSummary {
    let transactions: Vec<Transaction> = budgets
        .iter()
        .flat_map(|budget| budget.transactions.iter().cloned())
        .collect();

    let range = get_period_range(period, reference);
    let previous_range = get_previous_range(&range);
    let in_range = transactions_in_range(&transactions, &range);

    let total_income: f64 = in_range.iter().filter(|t| t.is_income()).map(|t| t.amount).sum();
    let total_expenses: f64 = in_range.iter().filter(|t| t.is_expense()).map(|t| t.amount).sum();

    let category_breakdown =
        build_category_breakdown(in_range.iter().copied().filter(|t| t.is_expense()));
    let series = build_income_expense_series(&transactions, &range);
    let trends = calculate_trend_comparisons(&transactions, &range, &previous_range);

    let month = get_period_range(ReportPeriod::Month, reference);
    let cash_burn = build_cash_burn_summary(budgets, &transactions, &month, reference);

    debug!(
        "Report '{}' over {} budgets: {} transactions, income {:.2}, expenses {:.2}",
        range.label,
        budgets.len(),
        in_range.len(),
        total_income,
        total_expenses
    );

    ReportSummary {
        transaction_count: in_range.len(),
        range,
        previous_range,
        total_income,
        total_expenses,
        balance: total_income - total_expenses,
        category_breakdown,
        series,
        trends,
        cash_burn,
    }
}
