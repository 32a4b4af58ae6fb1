//! Tool trait and registry
//!
//! The agent reaches financial data only through tools. Each tool is a small
//! capability object: whatever it needs is handed to its constructor.

use crate::budget::BudgetStore;
use crate::llm::TokenUsage;
use crate::models::{Budget, CacheSnapshot, ProcessedTransaction};
use crate::pipeline::TransactionPipeline;
use crate::session::Session;
use crate::Result;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{info, warn};

/// What a tool hands back to the reasoning loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    /// Model tokens the tool spent on its own calls
    pub usage: TokenUsage,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: TokenUsage::default(),
        }
    }
}

/// Trait for a single agent tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn execute(&self, input: &str) -> Result<ToolOutput>;
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// `name: description` lines for the agent prompt
    pub fn describe(&self) -> String {
        self.list()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| format!("{}: {}", tool.name(), tool.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//
// ================= Financial context =================
//

/// Recent transactions plus budget, rendered as text for the reasoning loop
pub struct FinancialContextTool {
    session: Arc<Session>,
    pipeline: Arc<TransactionPipeline>,
    budgets: Arc<BudgetStore>,
}

impl FinancialContextTool {
    pub const NAME: &'static str = "get_financial_context";

    pub fn new(
        session: Arc<Session>,
        pipeline: Arc<TransactionPipeline>,
        budgets: Arc<BudgetStore>,
    ) -> Self {
        Self {
            session,
            pipeline,
            budgets,
        }
    }
}

#[async_trait::async_trait]
impl Tool for FinancialContextTool {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Returns the user's budget, a spending summary, and their incoming and outgoing \
         transactions from the last 30 days. Takes no input."
    }

    async fn execute(&self, _input: &str) -> Result<ToolOutput> {
        let ingestion = match self.pipeline.load(&self.session).await {
            Ok(ingestion) => ingestion,
            Err(e) => {
                warn!(error = %e, "Financial context unavailable");
                return Ok(ToolOutput::text(format!(
                    "error: could not retrieve transaction data ({})",
                    e.kind()
                )));
            }
        };
        let snapshot = &ingestion.snapshot;

        let budget = match self.budgets.get().await {
            Ok(budget) => Some(budget),
            Err(e) => {
                warn!(error = %e, "Budget unavailable");
                None
            }
        };

        info!(
            incoming = snapshot.incoming.len(),
            outgoing = snapshot.outgoing.len(),
            "Rendering financial context"
        );

        Ok(ToolOutput {
            text: render_financial_context(budget.as_ref(), snapshot),
            usage: ingestion.usage,
        })
    }
}

const NAME_PREFIX_LEN: usize = 12;

/// Render budget, summary and both transaction tables.
///
/// The layout is what the reasoning prompt refers to; keep section titles
/// stable.
pub fn render_financial_context(budget: Option<&Budget>, snapshot: &CacheSnapshot) -> String {
    let mut out = String::new();

    // ── Budget ──
    out.push_str("## Budget\n");
    match budget {
        None => out.push_str("Budget: unavailable\n"),
        Some(budget) => {
            let _ = writeln!(out, "Overall limit: {}", money_or_unset(budget.overall_limit));
            let limits: Vec<(&String, f64)> = budget
                .category_budgets
                .iter()
                .filter_map(|(k, v)| v.map(|v| (k, v)))
                .collect();
            if limits.is_empty() {
                out.push_str("Category limits: none set\n");
            } else {
                out.push_str("Category limits:\n");
                for (label, limit) in limits {
                    let _ = writeln!(out, "- {}: {}", label, money(limit));
                }
            }
        }
    }

    // ── Summary ──
    let total_income = snapshot.total_income();
    let total_spending = snapshot.total_spending();

    out.push_str("\n## Summary\n");
    let _ = writeln!(out, "Total income: {}", money(total_income));
    let _ = writeln!(out, "Total spending: {}", money(total_spending));
    let _ = writeln!(out, "Net cash flow: {}", money(total_income - total_spending));

    let by_category = snapshot.spending_by_category();
    if by_category.is_empty() {
        out.push_str("Spending by category: none\n");
    } else {
        out.push_str("Spending by category:\n");
        for (category, spent) in &by_category {
            let limit = budget
                .and_then(|b| b.category_budgets.get(category.label()))
                .copied()
                .flatten();
            match limit {
                Some(limit) => {
                    let _ = writeln!(
                        out,
                        "- {}: {} of {} budget ({})",
                        category,
                        money(*spent),
                        money(limit),
                        percent(*spent, limit)
                    );
                }
                None => {
                    let _ = writeln!(out, "- {}: {} (no budget)", category, money(*spent));
                }
            }
        }
    }

    if let Some(limit) = budget.and_then(|b| b.overall_limit) {
        let _ = writeln!(
            out,
            "Overall: {} of {} ({})",
            money(total_spending),
            money(limit),
            percent(total_spending, limit)
        );
    }

    // ── Tables ──
    render_table(&mut out, "Incoming", &snapshot.incoming);
    render_table(&mut out, "Outgoing", &snapshot.outgoing);

    out
}

fn render_table(out: &mut String, title: &str, rows: &[ProcessedTransaction]) {
    let _ = writeln!(out, "\n## {} ({})", title, rows.len());
    if rows.is_empty() {
        out.push_str("(no transactions)\n");
        return;
    }

    out.push_str("| date | name | amount | category |\n");
    out.push_str("|------|------|--------|----------|\n");
    for row in rows {
        let name: String = row.name.chars().take(NAME_PREFIX_LEN).collect();
        let _ = writeln!(
            out,
            "| {} | {} | {:.2} | {} |",
            row.date, name, row.amount, row.category
        );
    }
}

fn money(value: f64) -> String {
    format!("${:.2}", value)
}

fn money_or_unset(value: Option<f64>) -> String {
    value.map(money).unwrap_or_else(|| "not set".to_string())
}

fn percent(part: f64, whole: f64) -> String {
    if whole > 0.0 {
        format!("{:.1}%", part / whole * 100.0)
    } else {
        "no allowance".to_string()
    }
}
