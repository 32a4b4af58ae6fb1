//! Error types for the ledger pipeline and agent

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for pipeline and agent operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// A single rejected field in a budget update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum LedgerError {

    // =============================
    // Pipeline Errors
    // =============================

    #[error("No access token: link a bank account first")]
    NoAccessToken,

    #[error("Transaction fetch error: {0}")]
    TransactionFetch(String),

    #[error("Classification failure: {0}")]
    Classification(String),

    // =============================
    // Agent Errors
    // =============================

    #[error("Agent parsing error: {0}")]
    AgentParsing(String),

    #[error("Agent execution error: {0}")]
    AgentExecution(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("LLM error: {0}")]
    Llm(String),

    // =============================
    // Boundary Errors
    // =============================

    #[error("Invalid budget: {}", join_field_errors(.0))]
    BudgetValidation(Vec<FieldError>),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Export error: {0}")]
    Export(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl LedgerError {
    /// Short machine-readable kind, used in tool observations and logs
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::NoAccessToken => "NO_ACCESS_TOKEN",
            LedgerError::TransactionFetch(_) => "TRANSACTION_FETCH_ERROR",
            LedgerError::Classification(_) => "CLASSIFICATION_FAILURE",
            LedgerError::AgentParsing(_) => "AGENT_PARSING_ERROR",
            LedgerError::AgentExecution(_) => "AGENT_EXECUTION_ERROR",
            LedgerError::ToolNotFound(_) => "TOOL_NOT_FOUND",
            LedgerError::Llm(_) => "LLM_ERROR",
            LedgerError::BudgetValidation(_) => "BUDGET_VALIDATION_ERROR",
            LedgerError::Storage(_) | LedgerError::DatabaseError(_) | LedgerError::IoError(_) => {
                "STORAGE_ERROR"
            }
            LedgerError::Config(_) => "CONFIG_ERROR",
            LedgerError::Export(_) => "EXPORT_ERROR",
            LedgerError::SerializationError(_) => "SERIALIZATION_ERROR",
            LedgerError::HttpError(_) => "HTTP_ERROR",
        }
    }
}
