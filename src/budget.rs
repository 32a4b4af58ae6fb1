//! Budget store
//!
//! Holds the user's overall limit and per-category limits. Values are
//! validated at this boundary: finite, non-negative, at most two decimal
//! places, and keyed by budget category labels only.

use crate::error::{FieldError, LedgerError};
use crate::models::{Budget, Category};
use crate::store::{get_json, put_json, KeyValueStore};
use crate::Result;
use std::sync::Arc;
use tracing::info;

pub const BUDGET_KEY: &str = "budget";

pub struct BudgetStore {
    store: Arc<dyn KeyValueStore>,
}

impl BudgetStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Current budget; an unset budget has no limits
    pub async fn get(&self) -> Result<Budget> {
        Ok(get_json::<Budget>(self.store.as_ref(), BUDGET_KEY)
            .await?
            .unwrap_or_default())
    }

    pub async fn set(&self, budget: Budget) -> Result<()> {
        let errors = validate_budget(&budget);
        if !errors.is_empty() {
            return Err(LedgerError::BudgetValidation(errors));
        }

        put_json(self.store.as_ref(), BUDGET_KEY, &budget).await?;
        info!(
            categories = budget.category_budgets.len(),
            has_overall = budget.overall_limit.is_some(),
            "Budget saved"
        );
        Ok(())
    }
}

/// Collect every field-level problem in a budget
pub fn validate_budget(budget: &Budget) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if let Some(limit) = budget.overall_limit {
        if let Some(message) = check_amount(limit) {
            errors.push(FieldError::new("overall_limit", message));
        }
    }

    for (label, limit) in &budget.category_budgets {
        let field = format!("category_budgets.{}", label);

        match Category::from_budget_label(label) {
            Some(category) if category.label() == label.as_str() => {}
            Some(category) => errors.push(FieldError::new(
                field.clone(),
                format!("use the canonical label '{}'", category.label()),
            )),
            None => errors.push(FieldError::new(field.clone(), "unknown budget category")),
        }

        if let Some(message) = limit.and_then(check_amount) {
            errors.push(FieldError::new(field, message));
        }
    }

    errors
}

fn check_amount(value: f64) -> Option<&'static str> {
    if !value.is_finite() {
        Some("must be a finite number")
    } else if value < 0.0 {
        Some("must be non-negative")
    } else if ((value * 100.0).round() - value * 100.0).abs() > 1e-6 {
        Some("at most 2 decimal places")
    } else {
        None
    }
}
