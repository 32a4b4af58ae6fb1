//! Rule-based pre-classifier
//!
//! Resolves the obvious transactions (income, credits, savings moves) without
//! the language model. Precedence is fixed, first match wins:
//! 1. income keyword  → Income, incoming
//! 2. negative amount → Interest or Refund, incoming
//! 3. savings keyword → Savings & Transfers, outgoing
//! 4. anything else   → undecided, outgoing, classified in batch later

use crate::models::{Bucket, Category, RawTransaction};

/// Static keyword lists — matched as lowercase substrings
const INCOME_KEYWORDS: &[&str] = &[
    "payroll",
    "direct deposit",
    "direct dep",
    "dir dep",
    "salary",
    "paycheck",
];

const INTEREST_KEYWORDS: &[&str] = &["interest", "int earned", "dividend"];

const SAVINGS_KEYWORDS: &[&str] = &[
    "savings",
    "transfer",
    "cd deposit",
    "certificate of deposit",
    "brokerage",
    "investment",
    "401k",
];

/// Outcome of the rule pass for one transaction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleOutcome {
    /// Category fixed by rule; `amount` is already normalized
    Decided {
        bucket: Bucket,
        category: Category,
        amount: f64,
    },
    /// No rule matched; the model decides. Always outgoing.
    Undecided,
}

impl RuleOutcome {
    pub fn bucket(&self) -> Bucket {
        match self {
            RuleOutcome::Decided { bucket, .. } => *bucket,
            RuleOutcome::Undecided => Bucket::Outgoing,
        }
    }
}

/// Rule-based pre-classifier
pub struct PreClassifier;

impl PreClassifier {
    pub fn classify(tx: &RawTransaction) -> RuleOutcome {
        let name = tx.name.to_lowercase();

        if contains_any(&name, INCOME_KEYWORDS) {
            return RuleOutcome::Decided {
                bucket: Bucket::Incoming,
                category: Category::Income,
                amount: tx.amount.abs(),
            };
        }

        if tx.amount < 0.0 {
            let category = if contains_any(&name, INTEREST_KEYWORDS) {
                Category::Interest
            } else {
                Category::Refund
            };
            return RuleOutcome::Decided {
                bucket: Bucket::Incoming,
                category,
                amount: tx.amount.abs(),
            };
        }

        if contains_any(&name, SAVINGS_KEYWORDS) {
            return RuleOutcome::Decided {
                bucket: Bucket::Outgoing,
                category: Category::SavingsTransfers,
                amount: tx.amount,
            };
        }

        RuleOutcome::Undecided
    }
}

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| haystack.contains(kw))
}
