//! Personal Finance Ledger Agent
//!
//! Pulls recent bank transactions, sorts them into incoming and outgoing
//! buckets, assigns a spending category to each, masks the merchant name and
//! caches the result. A conversational agent answers questions over that data
//! through a single financial-context tool.
//!
//! PIPELINE:
//! FETCH → RULES → BATCH LLM → MASK → CACHE
//!
//! AGENT:
//! QUERY → MEMORY → REASON/TOOL LOOP → SELF-CRITIQUE → PERSIST → COST

pub mod agent;
pub mod budget;
pub mod cache;
pub mod categorizer;
pub mod config;
pub mod error;
pub mod export;
pub mod insights;
pub mod llm;
pub mod masking;
pub mod memory;
pub mod models;
pub mod pipeline;
pub mod rules;
pub mod session;
pub mod source;
pub mod store;
pub mod tools;

pub use error::{LedgerError, Result};

// Re-export common types
pub use models::*;
pub use agent::{AgentReply, CostInfo, FinanceAgent};
pub use pipeline::TransactionPipeline;
pub use session::Session;
