use super::bootstrap::AgentSlot;
use super::handle::AgentHandle;
use crate::error::InvocationError;
use crate::llm::ChatMessage;
use crate::observability::AgentMetrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

pub const INITIALIZING_MESSAGE: &str =
    "Agent is still initializing. Please wait a moment and try again.";

/// Result of serving one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No agent has been published yet
    Initializing,
    Reply(String),
    /// Request failed; the text is the user-facing `Error: ...` line
    Failed(String),
}

impl Outcome {
    pub fn text(&self) -> &str {
        match self {
            Outcome::Initializing => INITIALIZING_MESSAGE,
            Outcome::Reply(text) | Outcome::Failed(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Outcome::Initializing => INITIALIZING_MESSAGE.to_string(),
            Outcome::Reply(text) | Outcome::Failed(text) => text,
        }
    }

    /// Metrics label
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Initializing => "initializing",
            Outcome::Reply(_) => "reply",
            Outcome::Failed(_) => "error",
        }
    }
}

/// Serves requests against whichever agent is currently published
#[derive(Clone)]
pub struct RequestExecutor {
    slot: Arc<AgentSlot>,
    metrics: Option<AgentMetrics>,
}

impl RequestExecutor {
    pub fn new(slot: Arc<AgentSlot>) -> Self {
        Self {
            slot,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: AgentMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn current(&self) -> Option<Arc<AgentHandle>> {
        self.slot.load()
    }

    /// Answer one user message. Never fails: errors become
    /// [`Outcome::Failed`].
    pub async fn execute(&self, message: impl Into<String>) -> Outcome {
        let started = Instant::now();
        let outcome = match self.slot.load() {
            None => Outcome::Initializing,
            Some(handle) => run_isolated(handle, message.into()).await,
        };

        if let Some(metrics) = &self.metrics {
            metrics.observe_request(outcome.label(), started.elapsed().as_secs_f64());
        }
        outcome
    }
}

/// Runs the agent on its own task; a panic there becomes `Aborted`
async fn run_isolated(handle: Arc<AgentHandle>, message: String) -> Outcome {
    let generation = handle.generation();
    let task = tokio::spawn(async move { handle.invoke(vec![ChatMessage::user(message)]).await });

    let result = match task.await {
        Ok(result) => result,
        Err(e) => Err(InvocationError::Aborted(e.to_string())),
    };

    match result {
        Ok(reply) => Outcome::Reply(reply),
        Err(e) => {
            warn!(generation = generation, error = %e, "Request failed");
            Outcome::Failed(format!("Error: {}", e))
        }
    }
}
