//! Outgoing message handler (draft flow)
//!
//! Sending a message to another user is not committed on first invocation.
//! The handler builds a draft, surfaces it as a UI artifact, and tells the
//! model a draft was created. The real mutation runs only when the confirm
//! endpoint fires.

use super::context::{ToolHandlerContext, UiArtifact};
use super::{failure, ToolHandler};
use crate::domain::{to_doc, EntityKind, EntityRef, OutgoingMessage};
use crate::draft::DraftMutation;
use crate::store::{Delta, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

const MAX_BODY_LEN: usize = 2000;

pub struct SendMessageHandler;

#[derive(Debug, Deserialize)]
struct SendMessageArgs {
    recipient: String,
    body: String,
}

#[async_trait]
impl ToolHandler for SendMessageHandler {
    fn name(&self) -> &'static str {
        "send_message"
    }

    fn description(&self) -> String {
        "Draft a message to another user (for example a training partner or coach). The message is NOT sent until the user explicitly confirms the draft.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "required": ["recipient", "body"],
            "properties": {
                "recipient": { "type": "string", "description": "Recipient user id or name" },
                "body": { "type": "string", "description": "Message text" }
            }
        })
    }

    async fn execute_only(
        &self,
        args: Value,
        ctx: &mut ToolHandlerContext,
    ) -> Result<String, StoreError> {
        let args: SendMessageArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => return Ok(failure(format!("invalid arguments: {e}"))),
        };
        let recipient = args.recipient.trim();
        let body = args.body.trim();
        if recipient.is_empty() {
            return Ok(failure("recipient must not be empty"));
        }
        if body.is_empty() {
            return Ok(failure("message body must not be empty"));
        }
        if body.len() > MAX_BODY_LEN {
            return Ok(failure(format!(
                "message body exceeds {MAX_BODY_LEN} characters"
            )));
        }

        let message = OutgoingMessage {
            id: uuid::Uuid::new_v4().to_string(),
            sender_id: ctx.user_id.clone(),
            recipient_id: recipient.to_string(),
            body: body.to_string(),
            sent_at: Utc::now(),
        };
        let mut delta = Delta::new(EntityRef::new(EntityKind::Message, message.id.clone()));
        if let Value::Object(fields) = to_doc(&message) {
            delta.set = fields.into_iter().collect();
        }

        let description = format!("Message to {recipient}: \"{}\"", preview(body));
        let draft = ctx.drafts.insert(DraftMutation::new(
            ctx.user_id.clone(),
            description.clone(),
            delta,
        ));

        ctx.push_artifact(UiArtifact::DraftCard {
            draft_id: draft.id.clone(),
            description,
        });

        Ok(format!(
            "Created a draft message to {recipient}. It is awaiting the user's confirmation and has NOT been sent."
        ))
    }
}

fn preview(body: &str) -> String {
    const PREVIEW_LEN: usize = 80;
    if body.chars().count() <= PREVIEW_LEN {
        body.to_string()
    } else {
        let truncated: String = body.chars().take(PREVIEW_LEN).collect();
        format!("{truncated}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::DraftState;
    use crate::tools::context::testing::test_context;
    use crate::tools::FAILURE_MARKER;

    #[tokio::test]
    async fn creates_pending_draft_without_mutating() {
        let mut ctx = test_context();
        let result = SendMessageHandler
            .execute_only(
                json!({ "recipient": "coach", "body": "Session went well" }),
                &mut ctx,
            )
            .await
            .unwrap();

        assert!(result.contains("NOT been sent"));
        // No mutation yet: nothing pending in the overlay.
        assert_eq!(ctx.sync.overlay().pending_len(), 0);

        let artifacts = ctx.take_artifacts();
        let [UiArtifact::DraftCard { draft_id, .. }] = artifacts.as_slice() else {
            panic!("expected one draft card, got {artifacts:?}");
        };
        let draft = ctx.drafts.get(draft_id).unwrap();
        assert_eq!(draft.state(), DraftState::Pending);
    }

    #[tokio::test]
    async fn confirming_the_draft_persists_the_message() {
        let mut ctx = test_context();
        SendMessageHandler
            .execute_only(json!({ "recipient": "coach", "body": "hi" }), &mut ctx)
            .await
            .unwrap();
        let artifacts = ctx.take_artifacts();
        let [UiArtifact::DraftCard { draft_id, .. }] = artifacts.as_slice() else {
            panic!("expected draft card");
        };

        let draft = ctx.drafts.get(draft_id).unwrap();
        assert!(draft.confirm(&ctx.sync).unwrap());
        assert_eq!(ctx.sync.overlay().pending_len(), 1);

        // A second confirm (duplicate UI event) persists nothing further.
        assert!(!draft.confirm(&ctx.sync).unwrap());
        assert_eq!(ctx.sync.overlay().pending_len(), 1);
    }

    #[tokio::test]
    async fn rejects_empty_body() {
        let mut ctx = test_context();
        let result = SendMessageHandler
            .execute_only(json!({ "recipient": "coach", "body": "  " }), &mut ctx)
            .await
            .unwrap();
        assert!(result.starts_with(FAILURE_MARKER));
    }
}
