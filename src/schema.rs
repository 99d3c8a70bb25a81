use crate::error::{BudgetError, Result};
use crate::utils::{deserialize_lenient_amount, deserialize_lenient_date, normalize_category};
use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CUSTOM_DAYS: u32 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    #[schemars(description = "Money coming into the budget (salary, refunds, transfers in)")]
    Income,

    #[schemars(description = "Money leaving the budget; the only type counted against allocations")]
    Expense,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, deserialize_with = "deserialize_lenient_amount")]
    #[schemars(
        with = "f64",
        description = "Non-negative amount. Non-numeric values are coerced to 0."
    )]
    pub amount: f64,

    #[serde(default)]
    #[schemars(description = "Free-form category; compared case- and whitespace-insensitively")]
    pub category: String,

    #[serde(rename = "type")]
    pub transaction_type: TransactionType,

    #[serde(default, deserialize_with = "deserialize_lenient_date")]
    #[schemars(
        with = "Option<NaiveDate>",
        description = "Calendar date or timestamp. Unparseable values leave the transaction \
        undated."
    )]
    pub date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Opaque reference to a stored receipt blob")]
    pub receipt: Option<String>,
}

impl Transaction {
    pub fn expense(category: impl Into<String>, amount: f64, date: Option<NaiveDate>) -> Self {
        Self::new(TransactionType::Expense, category, amount, date)
    }

    pub fn income(category: impl Into<String>, amount: f64, date: Option<NaiveDate>) -> Self {
        Self::new(TransactionType::Income, category, amount, date)
    }

    fn new(
        transaction_type: TransactionType,
        category: impl Into<String>,
        amount: f64,
        date: Option<NaiveDate>,
    ) -> Self {
        let category = category.into();
        Self {
            id: String::new(),
            name: category.clone(),
            amount,
            category,
            transaction_type,
            date,
            receipt: None,
        }
    }

    pub fn is_expense(&self) -> bool {
        self.transaction_type == TransactionType::Expense
    }

    pub fn is_income(&self) -> bool {
        self.transaction_type == TransactionType::Income
    }

    pub fn category_key(&self) -> String {
        normalize_category(&self.category)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAllocation {
    #[serde(default)]
    pub id: String,

    pub category: String,

    #[serde(default, deserialize_with = "deserialize_lenient_amount")]
    #[schemars(
        with = "f64",
        description = "Planned spend ceiling for the current cycle. Non-numeric values are \
        coerced to 0."
    )]
    pub budgeted_amount: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl CategoryAllocation {
    pub fn new(category: impl Into<String>, budgeted_amount: f64) -> Self {
        Self {
            id: String::new(),
            category: category.into(),
            budgeted_amount,
            last_updated: None,
        }
    }

    pub fn category_key(&self) -> String {
        normalize_category(&self.category)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum CadenceType {
    #[schemars(description = "7-day cycles")]
    Weekly,

    #[serde(alias = "fortnightly")]
    #[schemars(description = "14-day cycles")]
    Biweekly,

    #[schemars(description = "15-day cycles")]
    SemiMonthly,

    #[schemars(
        description = "Calendar months from the start date; days past the end of a shorter \
        month clamp to its last day"
    )]
    Monthly,

    #[schemars(description = "91-day cycles")]
    Quarterly,

    #[schemars(description = "365-day cycles")]
    Yearly,

    #[schemars(description = "Cycles of `customDays` days (default 14)")]
    Custom,

    #[schemars(description = "Cycles of `customDays` days between paychecks (default 14)")]
    PerPaycheck,
}

impl CadenceType {
    pub fn uses_custom_days(&self) -> bool {
        matches!(self, CadenceType::Custom | CadenceType::PerPaycheck)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CadenceConfig {
    #[serde(rename = "type")]
    pub cadence_type: CadenceType,

    #[schemars(
        description = "Any date on which a cycle starts; cycles repeat forwards and \
        backwards from it"
    )]
    pub start_date: NaiveDate,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Cycle length in days for custom and per-paycheck cadences")]
    pub custom_days: Option<u32>,
}

impl CadenceConfig {
    pub fn new(cadence_type: CadenceType, start_date: NaiveDate) -> Self {
        Self {
            cadence_type,
            start_date,
            custom_days: None,
        }
    }

    pub fn custom(custom_days: u32, start_date: NaiveDate) -> Self {
        Self {
            cadence_type: CadenceType::Custom,
            start_date,
            custom_days: Some(custom_days),
        }
    }

    /// Strict check for callers that prefer rejecting an incomplete custom
    /// cadence over the resolver's 14-day default.
    pub fn validate(&self) -> Result<()> {
        if !self.cadence_type.uses_custom_days() {
            return Ok(());
        }
        match self.custom_days {
            None => Err(BudgetError::InvalidCadence(format!(
                "{:?} cadence requires customDays",
                self.cadence_type
            ))),
            Some(0) => Err(BudgetError::InvalidCadence(
                "customDays must be at least 1".to_string(),
            )),
            Some(_) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    #[serde(default)]
    pub id: String,

    pub name: String,

    #[serde(default)]
    #[schemars(description = "All transactions owned by this budget; order is irrelevant")]
    pub transactions: Vec<Transaction>,

    #[serde(default)]
    #[schemars(description = "Per-category spending ceilings for the current cycle")]
    pub category_budgets: Vec<CategoryAllocation>,

    pub cadence: CadenceConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Budget {
    pub fn new(name: impl Into<String>, cadence: CadenceConfig) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            transactions: Vec::new(),
            category_budgets: Vec::new(),
            cadence,
            created_at: None,
        }
    }

    pub fn total_budgeted(&self) -> f64 {
        self.category_budgets
            .iter()
            .map(|allocation| allocation.budgeted_amount)
            .sum()
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(Budget)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
