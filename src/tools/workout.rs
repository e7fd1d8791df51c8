//! Workout lifecycle handlers and shared workout lookup

use super::context::{ToolHandlerContext, UiArtifact};
use super::resolve::{resolve_reference, ResolutionCandidate, EXERCISE_ALIASES};
use super::{failure, ToolHandler};
use crate::domain::{
    from_doc, to_doc, CompletionState, EntityKind, EntityRef, ExerciseInstance, TrainingPlan,
    Workout,
};
use crate::store::{Delta, StoreError};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

/// Outcome of an entity lookup: found, or a marked failure the model can
/// react to.
pub(super) enum Lookup<T> {
    Found(T),
    Miss(String),
}

/// Resolve a workout reference for the acting user. Falls back to the last
/// created/modified workout when no reference is given; hydrates from the
/// remote store when an unknown exact id is referenced.
pub(super) async fn find_workout(
    ctx: &ToolHandlerContext,
    reference: Option<&str>,
) -> Result<Lookup<Workout>, StoreError> {
    let overlay = ctx.sync.overlay().clone();

    let lookup_by_id = |id: &str| -> Option<Workout> {
        let view = overlay.effective_view(&EntityRef::new(EntityKind::Workout, id))?;
        let workout: Workout = from_doc(&view).ok()?;
        (workout.user_id == ctx.user_id).then_some(workout)
    };

    let Some(reference) = reference else {
        return Ok(match &ctx.last_refs.workout_id {
            Some(id) => match lookup_by_id(id) {
                Some(workout) => Lookup::Found(workout),
                None => Lookup::Miss(failure("the last referenced workout no longer exists")),
            },
            None => Lookup::Miss(failure(
                "no workout specified and none was created or modified recently",
            )),
        });
    };

    let candidates: Vec<ResolutionCandidate> = overlay
        .views_of_kind(EntityKind::Workout)
        .into_iter()
        .filter_map(|(entity, view)| {
            let workout: Workout = from_doc(&view).ok()?;
            (workout.user_id == ctx.user_id)
                .then(|| ResolutionCandidate::new(entity.id, workout.title))
        })
        .collect();

    if let Some(id) = resolve_reference(reference, &candidates, &[]) {
        if let Some(workout) = lookup_by_id(&id) {
            return Ok(Lookup::Found(workout));
        }
    }

    // An id the overlay has never seen may still exist remotely.
    let entity = EntityRef::new(EntityKind::Workout, reference);
    ctx.sync.ensure_loaded(&ctx.user_id, &entity).await?;
    if let Some(workout) = lookup_by_id(reference) {
        return Ok(Lookup::Found(workout));
    }

    Ok(Lookup::Miss(failure(format!(
        "could not find a workout matching '{reference}'"
    ))))
}

/// Resolve an exercise reference within a workout to its instance.
pub(super) fn find_instance(
    ctx: &ToolHandlerContext,
    workout_id: &str,
    exercise: &str,
) -> Lookup<ExerciseInstance> {
    let instances: Vec<ExerciseInstance> = ctx
        .sync
        .overlay()
        .views_of_kind(EntityKind::ExerciseInstance)
        .into_iter()
        .filter_map(|(_, view)| from_doc::<ExerciseInstance>(&view).ok())
        .filter(|i| i.workout_id == workout_id)
        .collect();

    let candidates: Vec<ResolutionCandidate> = instances
        .iter()
        .map(|i| ResolutionCandidate::new(i.exercise_slug.clone(), humanize_slug(&i.exercise_slug)))
        .collect();

    let Some(slug) = resolve_reference(exercise, &candidates, EXERCISE_ALIASES) else {
        return Lookup::Miss(failure(format!(
            "this workout has no exercise matching '{exercise}'"
        )));
    };
    match instances.into_iter().find(|i| i.exercise_slug == slug) {
        Some(instance) => Lookup::Found(instance),
        None => Lookup::Miss(failure(format!(
            "this workout has no exercise matching '{exercise}'"
        ))),
    }
}

/// `barbell_back_squat` -> `barbell back squat`
pub(super) fn humanize_slug(slug: &str) -> String {
    slug.replace('_', " ")
}

// ============================================================
// create_workout
// ============================================================

pub struct CreateWorkoutHandler;

#[derive(Debug, Deserialize)]
struct CreateWorkoutArgs {
    title: String,
    /// ISO date, e.g. 2026-03-02.
    date: String,
    #[serde(default)]
    notes: Option<String>,
    /// Optional plan the workout belongs to, by id or name.
    #[serde(default)]
    plan: Option<String>,
}

/// Resolve a plan reference for the acting user.
fn find_plan(ctx: &ToolHandlerContext, reference: &str) -> Lookup<TrainingPlan> {
    let candidates: Vec<(TrainingPlan, ResolutionCandidate)> = ctx
        .sync
        .overlay()
        .views_of_kind(EntityKind::Plan)
        .into_iter()
        .filter_map(|(entity, view)| {
            let plan: TrainingPlan = from_doc(&view).ok()?;
            (plan.user_id == ctx.user_id).then(|| {
                let candidate = ResolutionCandidate::new(entity.id, plan.name.clone());
                (plan, candidate)
            })
        })
        .collect();

    let refs: Vec<ResolutionCandidate> = candidates.iter().map(|(_, c)| c.clone()).collect();
    let Some(id) = resolve_reference(reference, &refs, &[]) else {
        return Lookup::Miss(failure(format!(
            "could not find a plan matching '{reference}'"
        )));
    };
    match candidates.into_iter().find(|(plan, _)| plan.id == id) {
        Some((plan, _)) => Lookup::Found(plan),
        None => Lookup::Miss(failure(format!(
            "could not find a plan matching '{reference}'"
        ))),
    }
}

#[async_trait]
impl ToolHandler for CreateWorkoutHandler {
    fn name(&self) -> &'static str {
        "create_workout"
    }

    fn description(&self) -> String {
        "Create a new workout on the user's schedule. Use when the user asks to add, plan, or schedule a training session.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "required": ["title", "date"],
            "properties": {
                "title": { "type": "string", "description": "Workout title, e.g. 'Lower A'" },
                "date": { "type": "string", "description": "Scheduled date, YYYY-MM-DD" },
                "notes": { "type": "string", "description": "Optional coaching notes" },
                "plan": { "type": "string", "description": "Plan the workout belongs to, by id or name" }
            }
        })
    }

    async fn execute_only(
        &self,
        args: Value,
        ctx: &mut ToolHandlerContext,
    ) -> Result<String, StoreError> {
        let args: CreateWorkoutArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => return Ok(failure(format!("invalid arguments: {e}"))),
        };
        if args.title.trim().is_empty() {
            return Ok(failure("title must not be empty"));
        }
        let Ok(date) = NaiveDate::parse_from_str(&args.date, "%Y-%m-%d") else {
            return Ok(failure(format!(
                "'{}' is not a valid date, expected YYYY-MM-DD",
                args.date
            )));
        };

        let plan_id = match args.plan.as_deref() {
            Some(reference) => match find_plan(ctx, reference) {
                Lookup::Found(plan) => Some(plan.id),
                Lookup::Miss(message) => return Ok(message),
            },
            None => None,
        };

        let workout = Workout {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: ctx.user_id.clone(),
            plan_id,
            title: args.title.trim().to_string(),
            scheduled_for: date,
            status: CompletionState::Planned,
            notes: args.notes,
        };
        let entity = EntityRef::new(EntityKind::Workout, workout.id.clone());
        let mut delta = Delta::new(entity.clone());
        if let Value::Object(fields) = to_doc(&workout) {
            delta.set = fields.into_iter().collect();
        }
        ctx.sync.apply(&ctx.user_id, delta)?;

        ctx.last_refs.workout_id = Some(workout.id.clone());
        if let Some(view) = ctx.sync.overlay().effective_view(&entity) {
            ctx.push_artifact(UiArtifact::WorkoutCard { workout: view });
        }

        Ok(format!(
            "Created workout '{}' on {} (id {}).",
            workout.title, workout.scheduled_for, workout.id
        ))
    }
}

// ============================================================
// complete_workout
// ============================================================

pub struct CompleteWorkoutHandler;

#[derive(Debug, Deserialize)]
struct WorkoutRefArgs {
    #[serde(default)]
    workout: Option<String>,
}

#[async_trait]
impl ToolHandler for CompleteWorkoutHandler {
    fn name(&self) -> &'static str {
        "complete_workout"
    }

    fn description(&self) -> String {
        "Mark a workout as completed. Defaults to the workout most recently discussed when none is named.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workout": { "type": "string", "description": "Workout id or title; omit for the most recent one" }
            }
        })
    }

    async fn execute_only(
        &self,
        args: Value,
        ctx: &mut ToolHandlerContext,
    ) -> Result<String, StoreError> {
        let args: WorkoutRefArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => return Ok(failure(format!("invalid arguments: {e}"))),
        };
        let workout = match find_workout(ctx, args.workout.as_deref()).await? {
            Lookup::Found(workout) => workout,
            Lookup::Miss(message) => return Ok(message),
        };

        if workout.status.is_terminal() {
            return Ok(failure(format!(
                "workout '{}' is already {}",
                workout.title, workout.status
            )));
        }

        let delta = Delta::new(EntityRef::new(EntityKind::Workout, workout.id.clone()))
            .with_completion(CompletionState::Completed);
        ctx.sync.apply(&ctx.user_id, delta)?;
        ctx.last_refs.workout_id = Some(workout.id.clone());

        Ok(format!("Marked workout '{}' as completed.", workout.title))
    }
}

// ============================================================
// cancel_workout
// ============================================================

pub struct CancelWorkoutHandler;

#[async_trait]
impl ToolHandler for CancelWorkoutHandler {
    fn name(&self) -> &'static str {
        "cancel_workout"
    }

    fn description(&self) -> String {
        "Cancel a scheduled workout. A completed workout cannot be cancelled.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workout": { "type": "string", "description": "Workout id or title; omit for the most recent one" }
            }
        })
    }

    async fn execute_only(
        &self,
        args: Value,
        ctx: &mut ToolHandlerContext,
    ) -> Result<String, StoreError> {
        let args: WorkoutRefArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => return Ok(failure(format!("invalid arguments: {e}"))),
        };
        let workout = match find_workout(ctx, args.workout.as_deref()).await? {
            Lookup::Found(workout) => workout,
            Lookup::Miss(message) => return Ok(message),
        };

        match workout.status {
            CompletionState::Completed => {
                return Ok(failure(format!(
                    "workout '{}' is already completed and cannot be cancelled",
                    workout.title
                )));
            }
            CompletionState::Cancelled => {
                return Ok(failure(format!(
                    "workout '{}' is already cancelled",
                    workout.title
                )));
            }
            _ => {}
        }

        let delta = Delta::new(EntityRef::new(EntityKind::Workout, workout.id.clone()))
            .with_completion(CompletionState::Cancelled);
        ctx.sync.apply(&ctx.user_id, delta)?;
        ctx.last_refs.workout_id = Some(workout.id.clone());

        Ok(format!("Cancelled workout '{}'.", workout.title))
    }
}
