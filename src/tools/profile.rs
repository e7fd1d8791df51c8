//! Profile update handler

use super::context::ToolHandlerContext;
use super::{failure, ToolHandler};
use crate::domain::{from_doc, EntityKind, EntityRef, UserProfile};
use crate::store::{Delta, StoreError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct UpdateProfileHandler;

#[derive(Debug, Deserialize)]
struct UpdateProfileArgs {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    bodyweight_kg: Option<f64>,
    #[serde(default)]
    goal: Option<String>,
    /// Preferred training days, 1 = Monday .. 7 = Sunday.
    #[serde(default)]
    training_days: Option<Vec<u8>>,
}

#[async_trait]
impl ToolHandler for UpdateProfileHandler {
    fn name(&self) -> &'static str {
        "update_profile"
    }

    fn description(&self) -> String {
        "Update the user's profile: display name, bodyweight, training goal, or preferred training days.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "display_name": { "type": "string" },
                "bodyweight_kg": { "type": "number", "description": "Current bodyweight in kilograms" },
                "goal": { "type": "string", "description": "Training goal in the user's words" },
                "training_days": {
                    "type": "array",
                    "items": { "type": "integer", "minimum": 1, "maximum": 7 },
                    "description": "Preferred training days, 1 = Monday .. 7 = Sunday"
                }
            }
        })
    }

    async fn execute_only(
        &self,
        args: Value,
        ctx: &mut ToolHandlerContext,
    ) -> Result<String, StoreError> {
        let args: UpdateProfileArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => return Ok(failure(format!("invalid arguments: {e}"))),
        };

        let entity = EntityRef::new(EntityKind::Profile, ctx.user_id.clone());
        let mut delta = Delta::new(entity);
        let mut changed = Vec::new();

        if let Some(name) = args.display_name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Ok(failure("display_name must not be empty"));
            }
            changed.push(format!("name '{name}'"));
            delta = delta.with_field("display_name", json!(name));
        }
        if let Some(bodyweight) = args.bodyweight_kg {
            if !(25.0..=400.0).contains(&bodyweight) {
                return Ok(failure(format!(
                    "{bodyweight} kg is not a plausible bodyweight"
                )));
            }
            changed.push(format!("bodyweight {bodyweight} kg"));
            delta = delta.with_field("bodyweight_kg", json!(bodyweight));
        }
        if let Some(goal) = args.goal {
            changed.push(format!("goal '{goal}'"));
            delta = delta.with_field("goal", json!(goal));
        }
        if let Some(days) = args.training_days {
            if days.is_empty() || days.iter().any(|d| !(1..=7).contains(d)) {
                return Ok(failure("training_days must be values between 1 and 7"));
            }
            changed.push(format!("{} training days per week", days.len()));
            delta = delta.with_field("training_days", json!(days));
        }

        if changed.is_empty() {
            return Ok(failure(
                "nothing to update, provide at least one profile field",
            ));
        }

        let entity = EntityRef::new(EntityKind::Profile, ctx.user_id.clone());
        ctx.sync.apply(&ctx.user_id, delta)?;

        // Address the user by name when the profile carries one.
        let owner = ctx
            .sync
            .overlay()
            .effective_view(&entity)
            .and_then(|view| from_doc::<UserProfile>(&view).ok())
            .map_or_else(|| "profile".to_string(), |p| format!("{}'s profile", p.display_name));
        Ok(format!("Updated {owner}: {}.", changed.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::context::testing::test_context;
    use crate::tools::FAILURE_MARKER;

    #[tokio::test]
    async fn updates_only_mentioned_fields() {
        let mut ctx = test_context();
        ctx.sync.overlay().set_base(
            EntityRef::new(EntityKind::Profile, "u1"),
            json!({ "id": "u1", "display_name": "Bobby", "goal": "strength" }),
        );

        let result = UpdateProfileHandler
            .execute_only(json!({ "bodyweight_kg": 82.5 }), &mut ctx)
            .await
            .unwrap();
        assert!(result.contains("bodyweight 82.5 kg"));

        let view = ctx
            .sync
            .overlay()
            .effective_view(&EntityRef::new(EntityKind::Profile, "u1"))
            .unwrap();
        assert_eq!(view["display_name"], json!("Bobby"));
        assert_eq!(view["bodyweight_kg"], json!(82.5));
    }

    #[tokio::test]
    async fn rejects_empty_update() {
        let mut ctx = test_context();
        let result = UpdateProfileHandler
            .execute_only(json!({}), &mut ctx)
            .await
            .unwrap();
        assert!(result.starts_with(FAILURE_MARKER));
    }

    #[tokio::test]
    async fn rejects_implausible_bodyweight() {
        let mut ctx = test_context();
        let result = UpdateProfileHandler
            .execute_only(json!({ "bodyweight_kg": 4000 }), &mut ctx)
            .await
            .unwrap();
        assert!(result.starts_with(FAILURE_MARKER));
    }

    #[tokio::test]
    async fn rejects_out_of_range_training_days() {
        let mut ctx = test_context();
        let result = UpdateProfileHandler
            .execute_only(json!({ "training_days": [1, 9] }), &mut ctx)
            .await
            .unwrap();
        assert!(result.starts_with(FAILURE_MARKER));
    }
}
