//! Set logging handler

use super::context::ToolHandlerContext;
use super::workout::{find_instance, find_workout, humanize_slug, Lookup};
use super::{failure, ToolHandler};
use crate::domain::{
    from_doc, to_doc, CompletionState, EntityKind, EntityRef, SetEntry,
};
use crate::store::{Delta, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct LogSetHandler;

#[derive(Debug, Deserialize)]
struct LogSetArgs {
    exercise: String,
    reps: u32,
    #[serde(default)]
    weight_kg: Option<f64>,
    #[serde(default)]
    workout: Option<String>,
}

#[async_trait]
impl ToolHandler for LogSetHandler {
    fn name(&self) -> &'static str {
        "log_set"
    }

    fn description(&self) -> String {
        "Record a performed set for an exercise in a workout. Defaults to the workout most recently discussed.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "required": ["exercise", "reps"],
            "properties": {
                "exercise": { "type": "string", "description": "Exercise name or shorthand, e.g. 'squat'" },
                "reps": { "type": "integer", "minimum": 1 },
                "weight_kg": { "type": "number", "description": "Weight in kilograms, omit for bodyweight" },
                "workout": { "type": "string", "description": "Workout id or title; omit for the most recent one" }
            }
        })
    }

    async fn execute_only(
        &self,
        args: Value,
        ctx: &mut ToolHandlerContext,
    ) -> Result<String, StoreError> {
        let args: LogSetArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => return Ok(failure(format!("invalid arguments: {e}"))),
        };
        if args.reps == 0 || args.reps > 200 {
            return Ok(failure("reps must be between 1 and 200"));
        }
        if let Some(weight) = args.weight_kg {
            if !(0.0..=600.0).contains(&weight) {
                return Ok(failure(format!("{weight} kg is not a plausible set weight")));
            }
        }

        let workout = match find_workout(ctx, args.workout.as_deref()).await? {
            Lookup::Found(workout) => workout,
            Lookup::Miss(message) => return Ok(message),
        };
        if workout.status.is_terminal() {
            return Ok(failure(format!(
                "workout '{}' is {}, sets can no longer be logged",
                workout.title, workout.status
            )));
        }
        let instance = match find_instance(ctx, &workout.id, &args.exercise) {
            Lookup::Found(instance) => instance,
            Lookup::Miss(message) => return Ok(message),
        };

        let logged = ctx
            .sync
            .overlay()
            .views_of_kind(EntityKind::SetEntry)
            .into_iter()
            .filter_map(|(_, view)| from_doc::<SetEntry>(&view).ok())
            .filter(|s| s.exercise_instance_id == instance.id)
            .count();
        let position = u32::try_from(logged).unwrap_or(u32::MAX).saturating_add(1);

        let entry = SetEntry {
            id: uuid::Uuid::new_v4().to_string(),
            exercise_instance_id: instance.id.clone(),
            position,
            reps: args.reps,
            weight_kg: args.weight_kg,
            logged_at: Some(Utc::now()),
        };
        let mut delta = Delta::new(EntityRef::new(EntityKind::SetEntry, entry.id.clone()));
        if let Value::Object(fields) = to_doc(&entry) {
            delta.set = fields.into_iter().collect();
        }
        ctx.sync.apply(&ctx.user_id, delta)?;

        // First logged set moves a planned workout into progress.
        if workout.status == CompletionState::Planned {
            let start = Delta::new(EntityRef::new(EntityKind::Workout, workout.id.clone()))
                .with_completion(CompletionState::InProgress);
            ctx.sync.apply(&ctx.user_id, start)?;
        }

        ctx.last_refs.workout_id = Some(workout.id);
        ctx.last_refs.exercise_instance_id = Some(instance.id);

        let weight = args
            .weight_kg
            .map_or_else(|| "bodyweight".to_string(), |w| format!("{w} kg"));
        Ok(format!(
            "Logged set {position} of {}: {} reps at {weight}.",
            humanize_slug(&instance.exercise_slug),
            args.reps
        ))
    }
}
