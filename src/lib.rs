//! # Budget Pulse
//!
//! A library for tracking budgets against recurring pay cycles: cadence-aware
//! pacing, period reports and deterministic financial health insights.
//!
//! ## Core Concepts
//!
//! - **Cadence**: How often a budget resets (weekly, monthly, per paycheck, ...),
//!   anchored at a start date and repeating in both directions
//! - **Cycle Window**: The `[start, end)` cycle containing a reference date and how far
//!   through it that date is
//! - **Guardrails**: Green / Yellow / Red pacing of actual spend against the expected
//!   amount to date and the full allocation
//! - **Reports**: Week, month or 14-day summaries with category breakdowns, daily series,
//!   period-over-period trends and a cash burn projection
//! - **Insights**: A 1-10 health score with strengths, improvements, tips and goals,
//!   cached per user and month
//!
//! ## Example
//!
//! ```rust,ignore
//! use budget_pulse::*;
//! use chrono::NaiveDate;
//!
//! let mut budget = Budget::new(
//!     "Household",
//!     CadenceConfig::new(CadenceType::Weekly, NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()),
//! );
//! budget.category_budgets.push(CategoryAllocation::new("Groceries", 140.0));
//! budget.transactions.push(Transaction::expense(
//!     "Groceries",
//!     50.0,
//!     NaiveDate::from_ymd_opt(2025, 1, 7),
//! ));
//!
//! let reference = NaiveDate::from_ymd_opt(2025, 1, 8).unwrap();
//! let analysis = BudgetAnalyzer::analyze(&[budget], ReportPeriod::Week, reference);
//! assert_eq!(analysis.pacing[0].report.categories["Groceries"].status, GuardrailStatus::Yellow);
//! ```

pub mod cache;
pub mod cadence;
pub mod error;
pub mod insights;
pub mod pacing;
pub mod reporting;
pub mod schema;
pub mod utils;

pub use cache::{
    dismissal_key, insight_key, InsightCache, InsightCacheConfig, InsightRecord, InsightResponse,
    InsightService, InsightStore, MemoryInsightStore,
};
pub use cadence::{nominal_cycle_days, resolve_cycle_window, CycleWindow, MAX_CYCLE_STEPS};
pub use error::{BudgetError, Result};
pub use insights::*;
pub use pacing::*;
pub use reporting::*;
pub use schema::*;
pub use utils::*;

use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetPacing {
    pub budget_id: String,
    pub budget_name: String,
    pub report: PacingReport,
}

/// Everything the dashboard needs for one reference date.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetAnalysis {
    pub reference_date: NaiveDate,
    pub pacing: Vec<BudgetPacing>,
    pub report: ReportSummary,
    pub metrics: InsightMetrics,
    pub insights: InsightPayload,
}

pub struct BudgetAnalyzer;

impl BudgetAnalyzer {
    /// Parses a JSON array of budgets, coercing malformed amounts and dates.
    pub fn parse_budgets(json: &str) -> Result<Vec<Budget>> {
        let budgets: Vec<Budget> = serde_json::from_str(json)?;
        debug!("Parsed {} budgets from JSON", budgets.len());
        Ok(budgets)
    }

    /// Parses a caller-supplied reference date. Unlike transaction dates,
    /// an unparseable reference is an error.
    pub fn parse_reference_date(raw: &str) -> Result<NaiveDate> {
        parse_flexible_date(raw)
            .ok_or_else(|| BudgetError::DateError(format!("unrecognized reference date '{}'", raw)))
    }

    /// Strict cadence check across budgets. Analysis itself never requires it.
    pub fn validate(budgets: &[Budget]) -> Result<()> {
        for budget in budgets {
            budget.cadence.validate().map_err(|e| match e {
                BudgetError::InvalidCadence(msg) => {
                    BudgetError::InvalidCadence(format!("budget '{}': {}", budget.name, msg))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    pub fn pacing(budgets: &[Budget], reference: NaiveDate) -> Vec<BudgetPacing> {
        budgets
            .iter()
            .map(|budget| {
                let report = compute_pacing(budget, reference);
                if report.window.is_fallback {
                    warn!(
                        "Budget '{}' pacing uses a single-day fallback window for {}",
                        budget.name, reference
                    );
                }
                BudgetPacing {
                    budget_id: budget.id.clone(),
                    budget_name: budget.name.clone(),
                    report,
                }
            })
            .collect()
    }

    /// Insight metrics over the transactions of every budget.
    pub fn metrics(budgets: &[Budget], reference: NaiveDate) -> InsightMetrics {
        let transactions: Vec<Transaction> = budgets
            .iter()
            .flat_map(|budget| budget.transactions.iter().cloned())
            .collect();
        InsightMetrics::from_transactions(&transactions, reference)
    }

    pub fn analyze(
        budgets: &[Budget],
        period: ReportPeriod,
        reference: NaiveDate,
    ) -> BudgetAnalysis {
        info!(
            "Analyzing {} budgets for {:?} period around {}",
            budgets.len(),
            period,
            reference
        );

        let pacing = Self::pacing(budgets, reference);
        let report = summarize_report(budgets, period, reference);
        let metrics = Self::metrics(budgets, reference);
        let insights = build_insights(&metrics);

        debug!(
            "Analysis complete: health score {} ({:?}), {} trend entries",
            insights.health_score,
            insights.health_band,
            report.trends.len()
        );

        BudgetAnalysis {
            reference_date: reference,
            pacing,
            report,
            metrics,
            insights,
        }
    }

    pub fn analyze_json(
        json: &str,
        period: ReportPeriod,
        reference: NaiveDate,
    ) -> Result<BudgetAnalysis> {
        let budgets = Self::parse_budgets(json)?;
        Ok(Self::analyze(&budgets, period, reference))
    }

    /// [`Self::analyze`] for the local calendar date.
    pub fn analyze_today(budgets: &[Budget], period: ReportPeriod) -> BudgetAnalysis {
        Self::analyze(budgets, period, today())
    }
}
