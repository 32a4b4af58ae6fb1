//! Batch LLM categorizer
//!
//! Resolves every undecided transaction name in a single model round trip.
//! Availability wins over accuracy: any failure degrades to the fallback
//! category and the caller never sees an error.

use crate::error::LedgerError;
use crate::llm::{CompletionRequest, LanguageModel, TokenUsage};
use crate::models::{Category, BUDGET_CATEGORIES, FALLBACK_CATEGORY};
use crate::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// One entry of the model's JSON array
#[derive(Debug, Deserialize)]
struct CategorizedItem {
    id: i64,
    category: String,
}

/// Categories for one batch plus the tokens spent on them
#[derive(Debug, Clone, Default)]
pub struct Categorized {
    pub categories: HashMap<String, Category>,
    pub usage: TokenUsage,
}

pub struct BatchCategorizer {
    model: Arc<dyn LanguageModel>,
}

impl BatchCategorizer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Map every distinct name to a budget category.
    ///
    /// Duplicate names collapse to one entry (last write wins). Empty input
    /// makes no model call. Tokens are reported whenever the model answered,
    /// even if the answer was unusable.
    pub async fn categorize(&self, names: &[String]) -> Categorized {
        if names.is_empty() {
            return Categorized::default();
        }

        info!(count = names.len(), "Batch categorizing transactions");

        let request = CompletionRequest::new(build_prompt(names));
        let (mut categories, usage) = match self.model.complete(&request).await {
            Ok(completion) => match parse_response(&completion.text, names) {
                Ok(map) => (map, completion.usage),
                Err(e) => {
                    warn!(error = %e, count = names.len(), "Unusable categorization, using fallback");
                    (HashMap::new(), completion.usage)
                }
            },
            Err(e) => {
                warn!(error = %e, count = names.len(), "Batch categorization failed, using fallback");
                (HashMap::new(), TokenUsage::default())
            }
        };

        let mut filled = 0usize;
        for name in names {
            categories.entry(name.clone()).or_insert_with(|| {
                filled += 1;
                FALLBACK_CATEGORY
            });
        }

        if filled > 0 {
            info!(filled, fallback = %FALLBACK_CATEGORY, "Filled unresolved names with fallback");
        }

        Categorized { categories, usage }
    }
}

fn build_prompt(names: &[String]) -> String {
    let transaction_list = names
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{}. {}", i + 1, name))
        .collect::<Vec<_>>()
        .join("\n");

    let categories = BUDGET_CATEGORIES
        .iter()
        .map(|c| c.label())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are an expert financial assistant. Analyze the following list of bank transactions.
For each transaction, classify it into exactly one of these categories: {categories}.
Do not use any other category.

Return your response as a valid JSON array where each object contains the 'id' of the transaction from the list and its 'category'.
For example: [
  {{"id": 1, "category": "Shopping"}},
  {{"id": 2, "category": "Restaurants"}}
]

Here is the list of transactions:
{transaction_list}"#
    )
}

/// Parse the model output into `name -> category`.
///
/// Takes the text between the first `[` and the last `]`, so commentary around
/// the array is tolerated. Entries with an unknown label or an id outside
/// `1..=N` are dropped and logged; the caller fills them with the fallback.
fn parse_response(response: &str, names: &[String]) -> Result<HashMap<String, Category>> {
    let start = response.find('[');
    let end = response.rfind(']');

    let json_str = match (start, end) {
        (Some(s), Some(e)) if s < e => &response[s..=e],
        _ => {
            return Err(LedgerError::Classification(
                "no JSON array in model response".to_string(),
            ))
        }
    };

    let items: Vec<CategorizedItem> = serde_json::from_str(json_str)
        .map_err(|e| LedgerError::Classification(format!("invalid JSON array: {}", e)))?;

    let mut category_map = HashMap::with_capacity(names.len());

    for item in items {
        let name = match usize::try_from(item.id)
            .ok()
            .and_then(|id| id.checked_sub(1))
            .and_then(|index| names.get(index))
        {
            Some(name) => name,
            None => {
                warn!(id = item.id, "{}", LedgerError::Classification("id out of range".into()));
                continue;
            }
        };

        match Category::from_budget_label(&item.category) {
            Some(category) => {
                category_map.insert(name.clone(), category);
            }
            None => {
                warn!(
                    id = item.id,
                    label = %item.category,
                    "{}",
                    LedgerError::Classification("label outside category set".into())
                );
            }
        }
    }

    Ok(category_map)
}
