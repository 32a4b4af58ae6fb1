//! Core data models for the transaction pipeline

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

//
// ================= Category =================
//

/// Closed set of transaction categories.
///
/// The first thirteen variants are the budget-relevant set, in display order.
/// `Income`, `Refund` and `Interest` are only ever assigned by rule and are
/// excluded from budget comparisons.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Groceries,
    Restaurants,
    Shopping,
    Transportation,
    #[serde(rename = "Bills & Utilities")]
    BillsUtilities,
    Entertainment,
    #[serde(rename = "Health & Wellness")]
    HealthWellness,
    Housing,
    Taxes,
    #[serde(rename = "Gifts & Donations")]
    GiftsDonations,
    Travel,
    #[serde(rename = "Personal Care")]
    PersonalCare,
    #[serde(rename = "Savings & Transfers")]
    SavingsTransfers,
    Income,
    Refund,
    Interest,
}

/// Budget categories in the order they are presented to the model
pub const BUDGET_CATEGORIES: &[Category] = &[
    Category::Groceries,
    Category::Restaurants,
    Category::Shopping,
    Category::Transportation,
    Category::BillsUtilities,
    Category::Entertainment,
    Category::HealthWellness,
    Category::Housing,
    Category::Taxes,
    Category::GiftsDonations,
    Category::Travel,
    Category::PersonalCare,
    Category::SavingsTransfers,
];

/// Category assigned when the model cannot produce a usable label
pub const FALLBACK_CATEGORY: Category = Category::Shopping;

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Category::Groceries => "Groceries",
            Category::Restaurants => "Restaurants",
            Category::Shopping => "Shopping",
            Category::Transportation => "Transportation",
            Category::BillsUtilities => "Bills & Utilities",
            Category::Entertainment => "Entertainment",
            Category::HealthWellness => "Health & Wellness",
            Category::Housing => "Housing",
            Category::Taxes => "Taxes",
            Category::GiftsDonations => "Gifts & Donations",
            Category::Travel => "Travel",
            Category::PersonalCare => "Personal Care",
            Category::SavingsTransfers => "Savings & Transfers",
            Category::Income => "Income",
            Category::Refund => "Refund",
            Category::Interest => "Interest",
        }
    }

    /// True for categories that take part in budget comparisons
    pub fn is_budget_category(&self) -> bool {
        !matches!(self, Category::Income | Category::Refund | Category::Interest)
    }

    /// Strict lookup of a budget label (trimmed, case-insensitive).
    ///
    /// Rule pseudo-categories are rejected: the model may only pick from the
    /// budget set.
    pub fn from_budget_label(label: &str) -> Option<Category> {
        let wanted = label.trim();
        BUDGET_CATEGORIES
            .iter()
            .copied()
            .find(|c| c.label().eq_ignore_ascii_case(wanted))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

//
// ================= Transactions =================
//

/// Transaction as delivered by the aggregator.
///
/// Sign convention is the aggregator's: positive amounts leave the account,
/// negative amounts enter it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub date: NaiveDate,
    pub name: String,
    pub amount: f64,
}

impl RawTransaction {
    pub fn new(date: NaiveDate, name: impl Into<String>, amount: f64) -> Self {
        Self {
            date,
            name: name.into(),
            amount,
        }
    }
}

/// Which list a processed transaction belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Incoming,
    Outgoing,
}

/// Pipeline output. `name` is masked and `amount` is never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedTransaction {
    pub date: String,
    pub name: String,
    pub amount: f64,
    pub category: Category,
}

/// Single-slot snapshot of the last fully processed fetch
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub incoming: Vec<ProcessedTransaction>,
    pub outgoing: Vec<ProcessedTransaction>,
}

impl CacheSnapshot {
    pub fn len(&self) -> usize {
        self.incoming.len() + self.outgoing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incoming.is_empty() && self.outgoing.is_empty()
    }

    pub fn total_income(&self) -> f64 {
        self.incoming.iter().map(|t| t.amount).sum()
    }

    pub fn total_spending(&self) -> f64 {
        self.outgoing.iter().map(|t| t.amount).sum()
    }

    /// Outgoing totals per category, in category order
    pub fn spending_by_category(&self) -> BTreeMap<Category, f64> {
        let mut totals = BTreeMap::new();
        for t in &self.outgoing {
            *totals.entry(t.category).or_insert(0.0) += t.amount;
        }
        totals
    }
}

//
// ================= Budget =================
//

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Budget {
    #[serde(default, alias = "overall_budget")]
    pub overall_limit: Option<f64>,
    #[serde(default)]
    pub category_budgets: BTreeMap<String, Option<f64>>,
}
