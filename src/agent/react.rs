//! Reasoning loop
//!
//! Text protocol: the model alternates `Thought:` / `Action:` / `Action Input:`
//! lines, the loop runs the named tool and appends an `Observation:`, until the
//! model emits a `Final Answer:`.

use crate::error::LedgerError;
use crate::llm::{CompletionRequest, LanguageModel, TokenUsage};
use crate::tools::ToolRegistry;
use crate::Result;
use tracing::{debug, info, warn};

pub const MAX_ITERATIONS: usize = 8;

const OBSERVATION_MARKER: &str = "Observation:";
const FINAL_ANSWER_MARKER: &str = "Final Answer:";
const OBSERVATION_STOP: &str = "\nObservation:";

const SYSTEM_PROMPT: &str = "\
You are a friendly and helpful personal finance assistant.
Your goal is to help the user understand their spending and budget.
- Use the get_financial_context tool to see the user's budget, spending summary and recent transactions.
- Do not make up transaction data. If you don't have the data, use the tool.
- When asked about spending, analyze the spending by category.
- When asked about budget, compare spending with the budget limits.
- Provide clear, concise, and actionable advice in Markdown.";

/// One parsed model turn
#[derive(Debug, Clone, PartialEq)]
pub enum AgentStep {
    Action { tool: String, input: String },
    Finish(String),
}

/// Drop anything the model wrote after inventing its own observation
pub fn truncate_at_observation(text: &str) -> &str {
    match text.find(OBSERVATION_MARKER) {
        Some(pos) => &text[..pos],
        None => text,
    }
}

/// Parse a model turn. Whichever of `Action:` or `Final Answer:` comes first wins.
///
/// `Final Answer:` may sit mid-line (`Thought: done. Final Answer: ...`);
/// `Action:` must open its line.
pub fn parse_step(text: &str) -> Result<AgentStep> {
    let text = truncate_at_observation(text);
    let lines: Vec<&str> = text.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        let line = line.trim_start();

        if let Some(pos) = line.find(FINAL_ANSWER_MARKER) {
            let mut answer = line[pos + FINAL_ANSWER_MARKER.len()..].trim().to_string();
            for rest in &lines[i + 1..] {
                answer.push('\n');
                answer.push_str(rest);
            }
            let answer = answer.trim().to_string();
            if answer.is_empty() {
                return Err(LedgerError::AgentParsing("empty Final Answer".to_string()));
            }
            return Ok(AgentStep::Finish(answer));
        }

        if line.starts_with("Action Input:") {
            return Err(LedgerError::AgentParsing(
                "Action Input without a preceding Action".to_string(),
            ));
        }

        if let Some(tool) = line.strip_prefix("Action:") {
            let tool = clean(tool);
            if tool.is_empty() {
                return Err(LedgerError::AgentParsing("Action names no tool".to_string()));
            }
            let input = lines[i + 1..]
                .iter()
                .find_map(|l| l.trim_start().strip_prefix("Action Input:"))
                .map(clean)
                .unwrap_or_default();
            return Ok(AgentStep::Action { tool, input });
        }
    }

    Err(LedgerError::AgentParsing(
        "expected an Action or a Final Answer".to_string(),
    ))
}

fn clean(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string()
}

fn build_prompt(tools: &ToolRegistry, history: &str, query: &str, scratchpad: &str) -> String {
    let history = if history.is_empty() { "(none)" } else { history };

    format!(
        "You have access to the following tools:\n\n{tools}\n\n\
Use the following format:\n\n\
Question: the input question you must answer\n\
Thought: you should always think about what to do\n\
Action: the action to take, should be one of [{names}]\n\
Action Input: the input to the action\n\
Observation: the result of the action\n\
... (this Thought/Action/Action Input/Observation can repeat N times)\n\
Thought: I now know the final answer\n\
Final Answer: the final answer to the original input question\n\n\
Here is the conversation history:\n{history}\n\n\
Question: {query}\n\
Thought:{scratchpad}",
        tools = tools.describe(),
        names = tools.list().join(", "),
        history = history,
        query = query,
        scratchpad = scratchpad,
    )
}

/// Result of a completed loop
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub answer: String,
    pub usage: TokenUsage,
    pub iterations: usize,
}

pub struct ReactLoop<'a> {
    model: &'a dyn LanguageModel,
    tools: &'a ToolRegistry,
    max_iterations: usize,
}

impl<'a> ReactLoop<'a> {
    pub fn new(model: &'a dyn LanguageModel, tools: &'a ToolRegistry, max_iterations: usize) -> Self {
        Self {
            model,
            tools,
            max_iterations,
        }
    }

    pub async fn run(&self, query: &str, history: &str) -> Result<LoopOutcome> {
        let mut scratchpad = String::new();
        let mut usage = TokenUsage::default();

        for iteration in 1..=self.max_iterations {
            let request = CompletionRequest::new(build_prompt(self.tools, history, query, &scratchpad))
                .with_system(SYSTEM_PROMPT)
                .with_stop(OBSERVATION_STOP);

            let completion = self.model.complete(&request).await?;
            usage += completion.usage;

            let turn = truncate_at_observation(&completion.text).trim_end();

            let observation = match parse_step(turn) {
                Ok(AgentStep::Finish(answer)) => {
                    info!(iterations = iteration, "Reasoning loop finished");
                    return Ok(LoopOutcome {
                        answer,
                        usage,
                        iterations: iteration,
                    });
                }
                Ok(AgentStep::Action { tool, input }) => match self.tools.get(&tool) {
                    Some(handle) => {
                        debug!(tool = %tool, iteration, "Running tool");
                        match handle.execute(&input).await {
                            Ok(output) => {
                                usage += output.usage;
                                output.text
                            }
                            Err(e) => {
                                warn!(tool = %tool, error = %e, "Tool failed");
                                format!("error: {} failed ({})", tool, e.kind())
                            }
                        }
                    }
                    None => {
                        warn!(iteration, "{}", LedgerError::ToolNotFound(tool.clone()));
                        format!(
                            "{} is not a valid tool, try one of [{}].",
                            tool,
                            self.tools.list().join(", ")
                        )
                    }
                },
                Err(e) => {
                    warn!(iteration, error = %e, "Could not parse model output");
                    format!(
                        "Invalid format: {}. Reply with `Action:` and `Action Input:` lines, \
                         or with a `Final Answer:` line.",
                        e
                    )
                }
            };

            scratchpad.push(' ');
            scratchpad.push_str(turn.trim_start());
            scratchpad.push_str("\nObservation: ");
            scratchpad.push_str(&observation);
            scratchpad.push_str("\nThought:");
        }

        Err(LedgerError::AgentExecution(format!(
            "no final answer after {} iterations",
            self.max_iterations
        )))
    }
}
