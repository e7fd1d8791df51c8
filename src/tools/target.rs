//! Target adjustment handler

use super::context::ToolHandlerContext;
use super::workout::{find_instance, find_workout, humanize_slug, Lookup};
use super::{failure, ToolHandler};
use crate::domain::{from_doc, EntityKind, EntityRef, ExerciseInstance};
use crate::store::{Delta, StoreError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct AdjustTargetHandler;

#[derive(Debug, Deserialize)]
struct AdjustTargetArgs {
    /// Exercise reference; omit to adjust the exercise most recently
    /// discussed ("now bump its weight").
    #[serde(default)]
    exercise: Option<String>,
    #[serde(default)]
    workout: Option<String>,
    #[serde(default)]
    sets: Option<u32>,
    #[serde(default)]
    reps: Option<u32>,
    #[serde(default)]
    weight_kg: Option<f64>,
    #[serde(default)]
    rpe: Option<f64>,
}

#[async_trait]
impl ToolHandler for AdjustTargetHandler {
    fn name(&self) -> &'static str {
        "adjust_target"
    }

    fn description(&self) -> String {
        "Adjust the target prescription (sets, reps, weight, RPE) of an exercise in a workout.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "exercise": { "type": "string", "description": "Exercise name; omit for the one most recently discussed" },
                "workout": { "type": "string", "description": "Workout id or title; omit for the most recent one" },
                "sets": { "type": "integer", "minimum": 1 },
                "reps": { "type": "integer", "minimum": 1 },
                "weight_kg": { "type": "number" },
                "rpe": { "type": "number", "minimum": 1, "maximum": 10 }
            }
        })
    }

    async fn execute_only(
        &self,
        args: Value,
        ctx: &mut ToolHandlerContext,
    ) -> Result<String, StoreError> {
        let args: AdjustTargetArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => return Ok(failure(format!("invalid arguments: {e}"))),
        };
        if args.sets.is_none()
            && args.reps.is_none()
            && args.weight_kg.is_none()
            && args.rpe.is_none()
        {
            return Ok(failure(
                "nothing to adjust, provide at least one of sets, reps, weight_kg, rpe",
            ));
        }
        if let Some(rpe) = args.rpe {
            if !(1.0..=10.0).contains(&rpe) {
                return Ok(failure("rpe must be between 1 and 10"));
            }
        }

        let instance = match args.exercise.as_deref() {
            Some(exercise) => {
                let workout = match find_workout(ctx, args.workout.as_deref()).await? {
                    Lookup::Found(workout) => workout,
                    Lookup::Miss(message) => return Ok(message),
                };
                match find_instance(ctx, &workout.id, exercise) {
                    Lookup::Found(instance) => instance,
                    Lookup::Miss(message) => return Ok(message),
                }
            }
            // Pronoun-style follow-up: fall back to the exercise most
            // recently created or modified in this conversation.
            None => {
                let Some(id) = ctx.last_refs.exercise_instance_id.clone() else {
                    return Ok(failure(
                        "no exercise specified and none was discussed recently",
                    ));
                };
                let view = ctx
                    .sync
                    .overlay()
                    .effective_view(&EntityRef::new(EntityKind::ExerciseInstance, id));
                match view.and_then(|v| from_doc::<ExerciseInstance>(&v).ok()) {
                    Some(instance) => instance,
                    None => {
                        return Ok(failure(
                            "the last referenced exercise no longer exists",
                        ))
                    }
                }
            }
        };

        // The target is one nested document field; merge the changed
        // subfields into the current value and override it whole so the
        // delta stays a top-level field patch.
        let mut target = instance.target;
        if let Some(sets) = args.sets {
            target.sets = sets;
        }
        if let Some(reps) = args.reps {
            target.reps = reps;
        }
        if let Some(weight) = args.weight_kg {
            target.weight_kg = Some(weight);
        }
        if let Some(rpe) = args.rpe {
            target.rpe = Some(rpe);
        }

        let delta = Delta::new(EntityRef::new(
            EntityKind::ExerciseInstance,
            instance.id.clone(),
        ))
        .with_field("target", serde_json::to_value(&target).unwrap_or(Value::Null));
        ctx.sync.apply(&ctx.user_id, delta)?;

        ctx.last_refs.workout_id = Some(instance.workout_id.clone());
        ctx.last_refs.exercise_instance_id = Some(instance.id);

        let weight = target
            .weight_kg
            .map_or_else(|| "bodyweight".to_string(), |w| format!("{w} kg"));
        Ok(format!(
            "Updated {} target to {}x{} at {weight}.",
            humanize_slug(&instance.exercise_slug),
            target.sets,
            target.reps
        ))
    }
}
