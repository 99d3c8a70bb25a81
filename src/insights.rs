//! Deterministic financial health scoring and recommendations.
//!
//! Everything here is a pure function of [`InsightMetrics`]; caching and
//! dismissal live in [`crate::cache`].

use crate::error::Result;
use crate::reporting::{
    build_category_breakdown, get_period_range, get_previous_range, PeriodRange, ReportPeriod,
};
use crate::schema::Transaction;
use crate::utils::{normalize_category, round2, safe_ratio, slugify};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Aggregate snapshot of a budget's transactions that all insights derive from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightMetrics {
    pub total_income: f64,
    pub total_expenses: f64,
    pub balance: f64,
    /// Percentage of income kept, `0` when there is no income.
    pub savings_rate: f64,
    pub expenses_by_category: BTreeMap<String, f64>,
    pub top_expense_category: Option<String>,
    pub last_7_days: f64,
    pub previous_7_days: f64,
    pub transaction_count: usize,
    pub avg_transaction_amount: f64,
}

impl InsightMetrics {
    /// Computes metrics over every transaction. The 7-day windows are the
    /// trailing week ending on `reference` and the week before it.
    pub fn from_transactions(transactions: &[Transaction], reference: NaiveDate) -> Self {
        let total_income: f64 = transactions
            .iter()
            .filter(|t| t.is_income())
            .map(|t| t.amount)
            .sum();
        let total_expenses: f64 = transactions
            .iter()
            .filter(|t| t.is_expense())
            .map(|t| t.amount)
            .sum();
        let balance = total_income - total_expenses;

        let breakdown = build_category_breakdown(transactions.iter().filter(|t| t.is_expense()));
        let top_expense_category = breakdown
            .first()
            .filter(|entry| entry.amount > 0.0)
            .map(|entry| entry.label.clone());
        let expenses_by_category = breakdown
            .into_iter()
            .map(|entry| (entry.label, entry.amount))
            .collect();

        let week = get_period_range(ReportPeriod::Week, reference);
        let previous_week = get_previous_range(&week);
        let expense_total_in = |range: &PeriodRange| -> f64 {
            transactions
                .iter()
                .filter(|t| t.is_expense())
                .filter(|t| t.date.is_some_and(|date| range.contains_date(date)))
                .map(|t| t.amount)
                .sum()
        };

        Self {
            total_income,
            total_expenses,
            balance,
            savings_rate: safe_ratio(balance, total_income) * 100.0,
            expenses_by_category,
            top_expense_category,
            last_7_days: expense_total_in(&week),
            previous_7_days: expense_total_in(&previous_week),
            transaction_count: transactions.len(),
            avg_transaction_amount: safe_ratio(
                total_income + total_expenses,
                transactions.len() as f64,
            ),
        }
    }

    /// Amount of the top category, looked up case-insensitively.
    pub fn top_category_amount(&self) -> f64 {
        let Some(top) = &self.top_expense_category else {
            return 0.0;
        };
        let key = normalize_category(top);
        self.expenses_by_category
            .iter()
            .filter(|(category, _)| normalize_category(category) == key)
            .map(|(_, amount)| amount)
            .sum()
    }

    /// Share of total expenses, in percent, taken by the top category.
    pub fn top_category_share(&self) -> f64 {
        safe_ratio(self.top_category_amount(), self.total_expenses) * 100.0
    }

    fn category_share(&self, amount: f64) -> f64 {
        safe_ratio(amount, self.total_expenses) * 100.0
    }

    /// Stable cache signature: categories sorted by normalized name and every
    /// monetary or rate field rounded to two decimals.
    pub fn signature(&self) -> Result<String> {
        let mut categories: BTreeMap<String, f64> = BTreeMap::new();
        for (category, amount) in &self.expenses_by_category {
            *categories.entry(normalize_category(category)).or_insert(0.0) += amount;
        }

        let canonical = CanonicalMetrics {
            total_income: canonical_amount(self.total_income),
            total_expenses: canonical_amount(self.total_expenses),
            balance: canonical_amount(self.balance),
            savings_rate: canonical_amount(self.savings_rate),
            expenses_by_category: categories
                .into_iter()
                .map(|(category, amount)| (category, canonical_amount(amount)))
                .collect(),
            top_expense_category: self
                .top_expense_category
                .as_deref()
                .map(normalize_category),
            last_7_days: canonical_amount(self.last_7_days),
            previous_7_days: canonical_amount(self.previous_7_days),
            transaction_count: self.transaction_count,
            avg_transaction_amount: canonical_amount(self.avg_transaction_amount),
        };

        Ok(serde_json::to_string(&canonical)?)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalMetrics {
    total_income: f64,
    total_expenses: f64,
    balance: f64,
    savings_rate: f64,
    expenses_by_category: BTreeMap<String, f64>,
    top_expense_category: Option<String>,
    last_7_days: f64,
    previous_7_days: f64,
    transaction_count: usize,
    avg_transaction_amount: f64,
}

fn canonical_amount(value: f64) -> f64 {
    let rounded = round2(value);
    // -0.0 and 0.0 must serialize identically
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HealthBand {
    Excellent,
    Good,
    NeedsAttention,
    Critical,
}

impl HealthBand {
    pub fn from_score(score: u8) -> Self {
        match score {
            8..=u8::MAX => HealthBand::Excellent,
            6..=7 => HealthBand::Good,
            4..=5 => HealthBand::NeedsAttention,
            _ => HealthBand::Critical,
        }
    }

    /// Fallback copy for hosts that do not supply their own wording.
    pub fn default_summary(&self) -> &'static str {
        match self {
            HealthBand::Excellent => {
                "Excellent financial health! You're saving well and keeping spending under control."
            }
            HealthBand::Good => {
                "Good financial health. A few adjustments could strengthen your position."
            }
            HealthBand::NeedsAttention => {
                "Your finances need attention. Focus on the improvements below to get back \
                on track."
            }
            HealthBand::Critical => {
                "Your finances are under strain. Prioritize cutting expenses and rebuilding \
                savings."
            }
        }
    }
}

/// Health score from 1 to 10, starting at 5.
pub fn health_score(metrics: &InsightMetrics) -> u8 {
    let mut score: i32 = 5;

    if metrics.savings_rate > 20.0 {
        score += 2;
    } else if metrics.savings_rate > 10.0 {
        score += 1;
    } else if metrics.savings_rate < 0.0 {
        score -= 2;
    }

    if metrics.balance > 0.0 {
        score += 1;
    } else {
        score -= 1;
    }

    if metrics.transaction_count > 10 {
        score += 1;
    }

    if metrics.top_category_share() > 50.0 {
        score -= 1;
    }

    score.clamp(1, 10) as u8
}

/// A recommendation that can be dismissed; `id` is the slug of its title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightItem {
    pub id: String,
    pub title: String,
    pub detail: String,
}

impl InsightItem {
    pub fn new(title: impl Into<String>, detail: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: slugify(&title),
            title,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSuggestions {
    /// Achievable within two months.
    pub short_term: Vec<String>,
    /// Six months or more.
    pub long_term: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightPayload {
    pub health_score: u8,
    pub health_band: HealthBand,
    pub summary: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<InsightItem>,
    pub spending_trend: TrendDirection,
    pub spending_analysis: Vec<String>,
    pub savings_tips: Vec<InsightItem>,
    pub budget_suggestions: Vec<String>,
    pub goals: GoalSuggestions,
}

impl InsightPayload {
    /// Identifiers of every dismissable item.
    pub fn item_ids(&self) -> Vec<&str> {
        self.improvements
            .iter()
            .chain(self.savings_tips.iter())
            .map(|item| item.id.as_str())
            .collect()
    }

    pub fn without_dismissed(&self, dismissed: &HashSet<String>) -> Self {
        let keep = |item: &&InsightItem| !dismissed.contains(&item.id);
        Self {
            improvements: self.improvements.iter().filter(keep).cloned().collect(),
            savings_tips: self.savings_tips.iter().filter(keep).cloned().collect(),
            ..self.clone()
        }
    }
}

fn money(value: f64) -> String {
    if value < 0.0 {
        format!("-${:.2}", value.abs())
    } else {
        format!("${:.2}", value)
    }
}

fn strengths(metrics: &InsightMetrics) -> Vec<String> {
    let mut strengths = Vec::new();

    if metrics.savings_rate > 15.0 {
        strengths.push(format!(
            "Strong savings rate of {:.1}% of your income",
            metrics.savings_rate
        ));
    }
    if metrics.transaction_count > 15 {
        strengths.push(format!(
            "Consistent tracking with {} transactions recorded",
            metrics.transaction_count
        ));
    }
    if metrics.balance > 0.0 {
        strengths.push(format!(
            "Positive balance of {} after expenses",
            money(metrics.balance)
        ));
    }
    let categories = metrics
        .expenses_by_category
        .values()
        .filter(|amount| **amount > 0.0)
        .count();
    if categories >= 4 {
        strengths.push(format!(
            "Spending is spread across {} categories rather than concentrated in one",
            categories
        ));
    }

    if strengths.is_empty() {
        strengths.push(
            "You've started tracking your finances, which is the first step to improving them"
                .to_string(),
        );
    }
    strengths
}

fn improvements(metrics: &InsightMetrics) -> Vec<InsightItem> {
    let mut items = Vec::new();

    if metrics.savings_rate < 10.0 {
        items.push(InsightItem::new(
            "Increase your savings rate",
            format!(
                "You are saving {:.1}% of your income. Aim for at least 10% by trimming \
                discretionary spending.",
                metrics.savings_rate
            ),
        ));
    }
    if metrics.balance < 0.0 {
        items.push(InsightItem::new(
            "Bring your balance back above zero",
            format!(
                "Expenses exceed income by {}. Pause non-essential purchases until income \
                catches up.",
                money(metrics.balance.abs())
            ),
        ));
    }
    if let Some(top) = &metrics.top_expense_category {
        let share = metrics.top_category_share();
        if share > 40.0 {
            items.push(InsightItem::new(
                format!("Reduce reliance on {}", top),
                format!(
                    "{} accounts for {:.1}% of your expenses. Look for ways to bring it down.",
                    top, share
                ),
            ));
        }
    }
    if metrics.transaction_count < 10 {
        items.push(InsightItem::new(
            "Track your transactions more consistently",
            format!(
                "Only {} transactions are recorded. Logging every purchase makes these \
                insights more accurate.",
                metrics.transaction_count
            ),
        ));
    }

    items
}

fn spending_trend(metrics: &InsightMetrics) -> TrendDirection {
    if metrics.last_7_days > metrics.previous_7_days {
        TrendDirection::Increasing
    } else {
        TrendDirection::Decreasing
    }
}

fn spending_analysis(metrics: &InsightMetrics, trend: TrendDirection) -> Vec<String> {
    let direction = match trend {
        TrendDirection::Increasing => "increasing",
        TrendDirection::Decreasing => "decreasing",
    };

    let top = match &metrics.top_expense_category {
        Some(category) => format!(
            "Top spending category: {} at {:.1}% of expenses",
            category,
            metrics.top_category_share()
        ),
        None => "Top spending category: none recorded yet".to_string(),
    };

    vec![
        format!(
            "Spending is {}: {} in the last 7 days vs {} in the previous 7 days",
            direction,
            money(metrics.last_7_days),
            money(metrics.previous_7_days)
        ),
        top,
        format!(
            "Average transaction amount: {}",
            money(metrics.avg_transaction_amount)
        ),
        format!("Total transactions recorded: {}", metrics.transaction_count),
    ]
}

struct CategoryTip {
    keywords: &'static [&'static str],
    threshold: f64,
    title: &'static str,
    detail: &'static str,
}

const CATEGORY_TIPS: &[CategoryTip] = &[
    CategoryTip {
        keywords: &["grocer", "grocery", "groceries", "supermarket"],
        threshold: 15.0,
        title: "Plan meals around a weekly grocery list",
        detail: "Groceries are a large share of spending. Planning meals and buying in bulk \
        typically cuts the bill by 10-20%.",
    },
    CategoryTip {
        keywords: &[
            "dining",
            "restaurant",
            "restaurants",
            "takeout",
            "take out",
            "eating out",
        ],
        threshold: 10.0,
        title: "Cook at home more often",
        detail: "Eating out adds up quickly. Replacing two meals out per week with home \
        cooking frees up cash for savings.",
    },
    CategoryTip {
        keywords: &["entertainment", "streaming", "fun"],
        threshold: 10.0,
        title: "Review entertainment spending",
        detail: "Look for free alternatives and rotate streaming services instead of paying \
        for all of them at once.",
    },
    CategoryTip {
        keywords: &["shopping", "clothing", "clothes"],
        threshold: 15.0,
        title: "Use a 48-hour rule for non-essential purchases",
        detail: "Waiting two days before buying non-essentials filters out most impulse purchases.",
    },
    CategoryTip {
        keywords: &["transport", "transportation", "fuel", "gas", "uber", "taxi"],
        threshold: 15.0,
        title: "Look for cheaper ways to get around",
        detail: "Car-pooling, public transit or combining trips can noticeably lower \
        transport costs.",
    },
    CategoryTip {
        keywords: &["subscription", "subscriptions"],
        threshold: 5.0,
        title: "Audit your recurring subscriptions",
        detail: "Cancel subscriptions you have not used in the last month.",
    },
];

/// Whether any keyword appears as a whole word (or run of words) in the
/// normalized category, so "fun" matches "Fun money" but not "Refunds".
fn category_matches(category: &str, keywords: &[&str]) -> bool {
    let key = normalize_category(category);
    let words: Vec<&str> = key
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();

    keywords.iter().any(|keyword| {
        let needle: Vec<&str> = keyword.split_whitespace().collect();
        !needle.is_empty() && words.windows(needle.len()).any(|window| window == needle.as_slice())
    })
}

fn savings_tips(metrics: &InsightMetrics) -> Vec<InsightItem> {
    let mut tips: Vec<InsightItem> = CATEGORY_TIPS
        .iter()
        .filter(|tip| {
            let matched: f64 = metrics
                .expenses_by_category
                .iter()
                .filter(|(category, _)| category_matches(category, tip.keywords))
                .map(|(_, amount)| amount)
                .sum();
            metrics.category_share(matched) > tip.threshold
        })
        .map(|tip| InsightItem::new(tip.title, tip.detail))
        .collect();

    tips.push(InsightItem::new(
        "Automate a transfer to savings on payday",
        "Moving a fixed amount to savings as soon as income arrives makes saving the default.",
    ));
    tips
}

fn budget_suggestions(metrics: &InsightMetrics) -> Vec<String> {
    let base = if metrics.total_income > 0.0 {
        metrics.total_income
    } else {
        metrics.total_expenses
    };

    let mut suggestions = vec![format!(
        "Try the 50/30/20 rule: {} for needs, {} for wants and {} for savings",
        money(base * 0.5),
        money(base * 0.3),
        money(base * 0.2)
    )];

    for (category, amount) in &metrics.expenses_by_category {
        let share = metrics.category_share(*amount);
        if share > 30.0 {
            suggestions.push(format!(
                "{} takes {:.1}% of your spending; consider capping it at {} per period",
                category,
                share,
                money(metrics.total_expenses * 0.25)
            ));
        }
    }

    suggestions
}

fn goals(metrics: &InsightMetrics) -> GoalSuggestions {
    let mut short_term = Vec::new();
    let mut long_term = Vec::new();

    if metrics.balance < 0.0 {
        short_term.push("Get back to a positive balance within the next month".to_string());
    }
    if metrics.savings_rate < 10.0 {
        short_term.push("Reach a 10% savings rate within two months".to_string());
    } else if metrics.savings_rate < 20.0 {
        short_term.push("Raise your savings rate to 20% over the next two months".to_string());
    } else {
        short_term.push("Keep your savings rate above 20% for the next two months".to_string());
    }
    if metrics.transaction_count < 10 {
        short_term.push("Log every transaction for the next 30 days".to_string());
    }

    if metrics.total_expenses > 0.0 {
        long_term.push(format!(
            "Build an emergency fund of {} (three months of expenses)",
            money(metrics.total_expenses * 3.0)
        ));
    } else {
        long_term.push(
            "Build an emergency fund covering three to six months of expenses".to_string(),
        );
    }
    if metrics.savings_rate > 20.0 && metrics.balance > 0.0 {
        long_term.push("Invest surplus savings for long-term growth".to_string());
    } else {
        long_term.push(
            "Grow your savings rate steadily toward 20% over the next six months".to_string(),
        );
    }

    GoalSuggestions {
        short_term,
        long_term,
    }
}

/// Builds the full insight payload from `metrics`. Pure and deterministic.
pub fn build_insights(metrics: &InsightMetrics) -> InsightPayload {
    let score = health_score(metrics);
    let band = HealthBand::from_score(score);
    let trend = spending_trend(metrics);

    InsightPayload {
        health_score: score,
        health_band: band,
        summary: band.default_summary().to_string(),
        strengths: strengths(metrics),
        improvements: improvements(metrics),
        spending_trend: trend,
        spending_analysis: spending_analysis(metrics, trend),
        savings_tips: savings_tips(metrics),
        budget_suggestions: budget_suggestions(metrics),
        goals: goals(metrics),
    }
}
