//! Tool handlers and dispatch
//!
//! Every operation the model can request is one handler. Arguments come from
//! a probabilistic model, so handlers presence-check every field and resolve
//! entity references through a fuzzy fallback chain instead of failing on the
//! first miss. Handlers report failure as a marked result string the model
//! can read and react to; only infrastructure faults propagate as errors.

mod context;
mod message;
mod profile;
mod resolve;
mod schedule;
mod sets;
mod target;
mod workout;

pub use context::{LastRefs, ToolHandlerContext, UiArtifact};
pub use message::SendMessageHandler;
pub use profile::UpdateProfileHandler;
pub use resolve::{resolve_reference, ResolutionCandidate};
pub use schedule::ShowScheduleHandler;
pub use sets::LogSetHandler;
pub use target::AdjustTargetHandler;
pub use workout::{CancelWorkoutHandler, CompleteWorkoutHandler, CreateWorkoutHandler};

use crate::llm::{ToolCall, ToolDefinition, ToolOutput};
use crate::store::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Marker prefix for failure results. The model reads these and
/// self-corrects conversationally; nothing is thrown across the dispatch
/// boundary.
pub const FAILURE_MARKER: &str = "ERROR:";

/// Build a marked failure result.
pub fn failure(message: impl AsRef<str>) -> String {
    format!("{FAILURE_MARKER} {}", message.as_ref())
}

/// One unit of domain logic, invocable in two shapes.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Tool name the model invokes.
    fn name(&self) -> &'static str;

    /// Tool description advertised to the model.
    fn description(&self) -> String;

    /// JSON schema of the tool's arguments.
    fn parameters(&self) -> Value;

    /// Batched shape: run the logic and return the result string. Used when
    /// several calls in one model turn must all execute before any result is
    /// sent back.
    async fn execute_only(
        &self,
        args: Value,
        ctx: &mut ToolHandlerContext,
    ) -> Result<String, StoreError>;

    /// Continuation shape: same logic; the result is pushed back into the
    /// active turn and UI artifacts may be queued on the context.
    async fn handle(
        &self,
        args: Value,
        ctx: &mut ToolHandlerContext,
    ) -> Result<String, StoreError> {
        self.execute_only(args, ctx).await
    }
}

/// Stateless name-to-handler table.
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn ToolHandler>>,
}

impl HandlerRegistry {
    /// The standard coaching tool set.
    pub fn standard() -> Self {
        let handlers: Vec<Arc<dyn ToolHandler>> = vec![
            Arc::new(UpdateProfileHandler),
            Arc::new(ShowScheduleHandler),
            Arc::new(CreateWorkoutHandler),
            Arc::new(LogSetHandler),
            Arc::new(CompleteWorkoutHandler),
            Arc::new(CancelWorkoutHandler),
            Arc::new(AdjustTargetHandler),
            Arc::new(SendMessageHandler),
        ];
        Self { handlers }
    }

    /// Tool schemas for the model request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.handlers
            .iter()
            .map(|h| ToolDefinition {
                name: h.name().to_string(),
                description: h.description(),
                parameters: h.parameters(),
            })
            .collect()
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.handlers.iter().find(|h| h.name() == name)
    }

    /// Dispatch one sealed call through the continuation shape. An unknown
    /// tool degrades to a marked result, never a crash.
    pub async fn dispatch(
        &self,
        call: &ToolCall,
        ctx: &mut ToolHandlerContext,
    ) -> Result<ToolOutput, StoreError> {
        let output = match self.find(&call.name) {
            Some(handler) => handler.handle(call.parsed_arguments(), ctx).await?,
            None => {
                tracing::warn!(tool = %call.name, call_id = %call.id, "Unknown tool requested");
                failure(format!("unknown tool '{}'", call.name))
            }
        };
        Ok(ToolOutput::new(call.id.clone(), output))
    }

    /// Batched variant: every call of the batch goes through this, and the
    /// orchestrator submits all outputs together.
    pub async fn execute_only_dispatch(
        &self,
        call: &ToolCall,
        ctx: &mut ToolHandlerContext,
    ) -> Result<ToolOutput, StoreError> {
        let output = match self.find(&call.name) {
            Some(handler) => handler.execute_only(call.parsed_arguments(), ctx).await?,
            None => {
                tracing::warn!(tool = %call.name, call_id = %call.id, "Unknown tool requested");
                failure(format!("unknown tool '{}'", call.name))
            }
        };
        Ok(ToolOutput::new(call.id.clone(), output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::context::testing::test_context;

    #[tokio::test]
    async fn unknown_tool_returns_marked_result() {
        let registry = HandlerRegistry::standard();
        let mut ctx = test_context();
        let call = ToolCall {
            id: "c1".to_string(),
            name: "teleport".to_string(),
            arguments: "{}".to_string(),
        };
        let output = registry.dispatch(&call, &mut ctx).await.unwrap();
        assert!(output.output.starts_with(FAILURE_MARKER));
        assert!(output.output.contains("teleport"));
    }

    #[test]
    fn definitions_cover_every_handler() {
        let registry = HandlerRegistry::standard();
        let names: Vec<String> = registry
            .definitions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        for expected in [
            "update_profile",
            "show_schedule",
            "create_workout",
            "log_set",
            "complete_workout",
            "cancel_workout",
            "adjust_target",
            "send_message",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }
}
