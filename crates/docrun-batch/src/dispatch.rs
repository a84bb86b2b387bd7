//! Run-execution seam for the orchestrator.

use std::sync::Arc;

use async_trait::async_trait;

use docrun_client::{AgentInput, ClientError, NullSink, RunClient, RunOutcome};
use docrun_core::AgentType;

/// Executes one run for one batch item.
///
/// The orchestrator drives every item through this trait, so the
/// run-execution step can be substituted (tests, alternative transports)
/// without touching the batch item contract.
#[async_trait]
pub trait RunDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        agent: &AgentType,
        input: AgentInput,
    ) -> Result<RunOutcome, ClientError>;
}

#[async_trait]
impl RunDispatcher for RunClient {
    async fn dispatch(
        &self,
        agent: &AgentType,
        input: AgentInput,
    ) -> Result<RunOutcome, ClientError> {
        self.execute(agent, input, Arc::new(NullSink)).await
    }
}
