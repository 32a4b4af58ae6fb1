//! Spending insights
//!
//! Derived from a processed snapshot and the stored budget, never persisted.

use crate::models::{Budget, CacheSnapshot, Category};
use serde::Serialize;
use std::fmt;

/// Share of a limit above which a budget alert is raised
pub const ALERT_THRESHOLD_PERCENT: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    BudgetAlert,
    SpendingPattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    pub priority: Priority,
}

impl fmt::Display for Insight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}: {}", self.priority, self.title, self.description)
    }
}

/// Budget alerts first (highest usage first), then the top spending category.
///
/// A limit of zero never alerts.
pub fn generate_insights(budget: &Budget, snapshot: &CacheSnapshot) -> Vec<Insight> {
    let spending = snapshot.spending_by_category();
    let mut alerts = Vec::new();

    if let Some(limit) = budget.overall_limit {
        if let Some(alert) = budget_alert("Overall", snapshot.total_spending(), limit) {
            alerts.push(alert);
        }
    }

    for (label, limit) in &budget.category_budgets {
        let (Some(limit), Some(category)) = (limit, Category::from_budget_label(label)) else {
            continue;
        };
        let spent = spending.get(&category).copied().unwrap_or(0.0);
        if let Some(alert) = budget_alert(category.label(), spent, *limit) {
            alerts.push(alert);
        }
    }

    alerts.sort_by(|a, b| b.1.total_cmp(&a.1));
    let mut insights: Vec<Insight> = alerts.into_iter().map(|(insight, _)| insight).collect();

    let top = spending
        .iter()
        .filter(|(category, _)| category.is_budget_category())
        .max_by(|a, b| a.1.total_cmp(b.1));
    if let Some((category, amount)) = top {
        insights.push(Insight {
            kind: InsightKind::SpendingPattern,
            title: "Top Spending Category".to_string(),
            description: format!(
                "Your highest spending this period is {} with ${:.2}",
                category, amount
            ),
            priority: Priority::Low,
        });
    }

    insights
}

fn budget_alert(name: &str, spent: f64, limit: f64) -> Option<(Insight, f64)> {
    if limit <= 0.0 {
        return None;
    }

    let used = spent * 100.0 / limit;
    if used <= ALERT_THRESHOLD_PERCENT {
        return None;
    }

    let insight = Insight {
        kind: InsightKind::BudgetAlert,
        title: format!("Budget Alert: {}", name),
        description: format!("You've used {:.1}% of your {} budget", used, name),
        priority: if used > 100.0 { Priority::High } else { Priority::Medium },
    };
    Some((insight, used))
}
