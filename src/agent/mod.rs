//! Finance agent
//!
//! QUERY → LOAD MEMORY → REASON (tools) → SELF-CRITIQUE → PERSIST → COST

pub mod react;

use crate::llm::{CompletionRequest, LanguageModel, Pricing, TokenUsage};
use crate::memory::{ConversationMemory, MemoryEntry, MemoryStore};
use crate::tools::ToolRegistry;
use crate::Result;
use react::{ReactLoop, MAX_ITERATIONS};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const APOLOGY: &str = "Sorry, I encountered an error. Please try again.";

/// Token and dollar cost of one query, summed over every model call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostInfo {
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_cost: String,
}

impl CostInfo {
    pub fn from_usage(usage: &TokenUsage, pricing: &Pricing) -> Self {
        Self {
            total_tokens: usage.total(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_cost: format!("${:.5}", pricing.cost(usage)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    pub answer: String,
    pub cost: Option<CostInfo>,
}

pub struct FinanceAgent {
    model: Arc<dyn LanguageModel>,
    tools: ToolRegistry,
    memory: MemoryStore,
    pricing: Pricing,
    max_iterations: usize,
}

impl FinanceAgent {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        tools: ToolRegistry,
        memory: MemoryStore,
        pricing: Pricing,
    ) -> Self {
        Self {
            model,
            tools,
            memory,
            pricing,
            max_iterations: MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Answer a question. Never fails: errors become the apology with no cost.
    pub async fn ask(&self, query: &str) -> AgentReply {
        let query_id = Uuid::new_v4();
        let started = Instant::now();
        info!(query_id = %query_id, "Agent query received");

        match self.answer(query).await {
            Ok(reply) => {
                info!(
                    query_id = %query_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    total_tokens = reply.cost.as_ref().map(|c| c.total_tokens).unwrap_or(0),
                    "Agent query answered"
                );
                reply
            }
            Err(e) => {
                error!(query_id = %query_id, kind = e.kind(), error = %e, "Agent query failed");
                AgentReply {
                    answer: APOLOGY.to_string(),
                    cost: None,
                }
            }
        }
    }

    async fn answer(&self, query: &str) -> Result<AgentReply> {
        let mut memory = match self.memory.load().await {
            Ok(memory) => memory,
            Err(e) => {
                warn!(error = %e, "Agent memory unreadable, starting without history");
                ConversationMemory::new(self.memory.capacity())
            }
        };

        let outcome = ReactLoop::new(self.model.as_ref(), &self.tools, self.max_iterations)
            .run(query, &memory.format_history())
            .await?;
        let mut usage = outcome.usage;

        let critique = self
            .model
            .complete(&CompletionRequest::new(critique_prompt(query, &outcome.answer)))
            .await?;
        usage += critique.usage;

        let revised = critique.text.trim();
        let answer = if revised.is_empty() {
            warn!("Empty critique, keeping the initial answer");
            outcome.answer
        } else {
            revised.to_string()
        };

        memory.push(MemoryEntry::new(query, answer.clone()));
        if let Err(e) = self.memory.save(&memory).await {
            warn!(error = %e, "Could not persist agent memory");
        }

        Ok(AgentReply {
            answer,
            cost: Some(CostInfo::from_usage(&usage, &self.pricing)),
        })
    }
}

fn critique_prompt(query: &str, initial_answer: &str) -> String {
    format!(
        "Original query: {}\n\
Initial answer: {}\n\n\
Critique this answer. Is it helpful? Is it accurate? Is it actionable?\n\
Rewrite the answer to be more helpful, empathetic, and clear. \
Reply with the rewritten answer only.",
        query, initial_answer
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::BudgetStore;
    use crate::llm::ScriptedModel;
    use crate::memory::MEMORY_KEY;
    use crate::models::RawTransaction;
    use crate::pipeline::TransactionPipeline;
    use crate::session::Session;
    use crate::source::StaticSource;
    use crate::store::{InMemoryStore, KeyValueStore};
    use crate::tools::FinancialContextTool;
    use chrono::Local;

    fn agent(model: Arc<ScriptedModel>, store: Arc<dyn KeyValueStore>, pricing: Pricing) -> FinanceAgent {
        let payroll = RawTransaction::new(Local::now().date_naive(), "ACME PAYROLL", -2000.0);
        agent_over(vec![payroll], model, store, pricing)
    }

    fn agent_over(
        transactions: Vec<RawTransaction>,
        model: Arc<ScriptedModel>,
        store: Arc<dyn KeyValueStore>,
        pricing: Pricing,
    ) -> FinanceAgent {
        let source = Arc::new(StaticSource::new(transactions));
        let pipeline = Arc::new(TransactionPipeline::new(source, model.clone()));

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(FinancialContextTool::new(
            Arc::new(Session::with_access_token(store.clone(), "tok")),
            pipeline,
            Arc::new(BudgetStore::new(store.clone())),
        )));

        FinanceAgent::new(model, tools, MemoryStore::new(store), pricing)
    }

    #[tokio::test]
    async fn test_answer_is_critiqued_and_persisted() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let model = Arc::new(ScriptedModel::new([
            "I need the data.\nAction: get_financial_context\nAction Input: none",
            "Final Answer: You earned $2000.",
            "Great news: you earned $2,000.00 this month!",
        ]));
        let agent = agent(model.clone(), store.clone(), Pricing::default());

        let reply = agent.ask("How much did I earn?").await;
        assert_eq!(reply.answer, "Great news: you earned $2,000.00 this month!");
        assert_eq!(model.call_count(), 3);
        assert!(model.prompts()[1].contains("Total income: $2000.00"));
        assert!(model.prompts()[2].contains("Initial answer: You earned $2000."));

        let memory = MemoryStore::new(store).load().await.unwrap();
        assert_eq!(
            memory.to_vec(),
            vec![MemoryEntry::new(
                "How much did I earn?",
                "Great news: you earned $2,000.00 this month!"
            )]
        );
    }

    #[tokio::test]
    async fn test_cost_covers_loop_and_critique() {
        let responses = ["Final Answer: ok", "Everything looks fine."];
        let model = Arc::new(ScriptedModel::new(responses));
        let pricing = Pricing {
            prompt_per_1k: 0.5,
            completion_per_1k: 1.5,
        };
        let agent = agent(model.clone(), Arc::new(InMemoryStore::new()), pricing);

        let cost = agent.ask("Status?").await.cost.unwrap();

        let mut expected = TokenUsage::default();
        for (prompt, response) in model.prompts().iter().zip(responses) {
            expected += TokenUsage::estimate(prompt, response);
        }
        assert_eq!(cost.prompt_tokens, expected.prompt_tokens);
        assert_eq!(cost.completion_tokens, expected.completion_tokens);
        assert_eq!(cost.total_tokens, expected.total());
        assert_eq!(cost.total_cost, format!("${:.5}", pricing.cost(&expected)));
    }

    #[tokio::test]
    async fn test_memory_keeps_last_five() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
        for i in 0..7 {
            model.push_response(&format!("Final Answer: a{}", i));
            model.push_response(&format!("c{}", i));
        }
        let agent = agent(model.clone(), store.clone(), Pricing::default());

        for i in 0..7 {
            assert_eq!(agent.ask(&format!("q{}", i)).await.answer, format!("c{}", i));
        }

        let memory = MemoryStore::new(store).load().await.unwrap();
        let queries: Vec<String> = memory.entries().map(|e| e.query.clone()).collect();
        assert_eq!(queries, vec!["q2", "q3", "q4", "q5", "q6"]);

        // Last loop prompt saw the five exchanges before it.
        let last_loop_prompt = &model.prompts()[12];
        assert!(last_loop_prompt.contains("Q: q1\nA: c1"));
        assert!(last_loop_prompt.contains("Q: q5\nA: c5"));
        assert!(!last_loop_prompt.contains("Q: q0\n"));
    }

    #[tokio::test]
    async fn test_failure_returns_apology_without_cost() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
        model.push_error("upstream 503");
        let agent = agent(model, store.clone(), Pricing::default());

        let reply = agent.ask("Anything?").await;
        assert_eq!(reply.answer, APOLOGY);
        assert!(reply.cost.is_none());
        assert!(store.get(MEMORY_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_iteration_cap_returns_apology() {
        let model = Arc::new(ScriptedModel::new(["hmm", "hmm"]));
        let agent = agent(model.clone(), Arc::new(InMemoryStore::new()), Pricing::default())
            .with_max_iterations(2);

        let reply = agent.ask("?").await;
        assert_eq!(reply, AgentReply { answer: APOLOGY.to_string(), cost: None });
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unreadable_memory_is_not_fatal() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        store
            .put(MEMORY_KEY, &serde_json::json!({"not": "a list"}))
            .await
            .unwrap();
        let model = Arc::new(ScriptedModel::new(["Final Answer: fine", "All fine."]));
        let agent = agent(model, store.clone(), Pricing::default());

        assert_eq!(agent.ask("How am I doing?").await.answer, "All fine.");
        assert_eq!(MemoryStore::new(store).load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cost_includes_classification_call_made_by_tool() {
        let responses = [
            "I need the data.\nAction: get_financial_context\nAction Input: none",
            r#"[{"id": 1, "category": "Restaurants"}]"#,
            "Final Answer: You spent $4.50 on coffee.",
            "You spent $4.50 on coffee this month.",
        ];
        let model = Arc::new(ScriptedModel::new(responses));
        let coffee = RawTransaction::new(Local::now().date_naive(), "Coffee Shop", 4.50);
        let agent = agent_over(
            vec![coffee],
            model.clone(),
            Arc::new(InMemoryStore::new()),
            Pricing::default(),
        );

        let reply = agent.ask("What did I spend?").await;
        assert_eq!(reply.answer, "You spent $4.50 on coffee this month.");
        assert_eq!(model.call_count(), 4);

        let mut expected = TokenUsage::default();
        for (prompt, response) in model.prompts().iter().zip(responses) {
            expected += TokenUsage::estimate(prompt, response);
        }
        let cost = reply.cost.unwrap();
        assert_eq!(cost.prompt_tokens, expected.prompt_tokens);
        assert_eq!(cost.completion_tokens, expected.completion_tokens);
        assert_eq!(cost.total_tokens, expected.total());
    }
}
