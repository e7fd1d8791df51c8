//! Fitness domain entities
//!
//! Entities are persisted as whole JSON documents in the overlay store; the
//! typed structs here are the handler-facing view. Conversions go through
//! serde so the overlay's fold semantics stay schema-agnostic.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kinds of entity documents the overlay store manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Profile,
    Plan,
    Workout,
    ExerciseInstance,
    SetEntry,
    Message,
}

impl EntityKind {
    /// Path segment used for user-scoped remote document paths.
    pub fn path_segment(self) -> &'static str {
        match self {
            EntityKind::Profile => "profile",
            EntityKind::Plan => "plans",
            EntityKind::Workout => "workouts",
            EntityKind::ExerciseInstance => "exercise_instances",
            EntityKind::SetEntry => "sets",
            EntityKind::Message => "messages",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Reference to one entity document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// User-scoped remote document path, e.g. `users/u1/workouts/w42`.
    pub fn document_path(&self, user_id: &str) -> String {
        format!("users/{user_id}/{}/{}", self.kind.path_segment(), self.id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Lifecycle state of a schedulable entity (workout, plan).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionState {
    Planned,
    InProgress,
    Completed,
    Cancelled,
    Skipped,
}

impl CompletionState {
    /// Terminal states cannot transition further.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CompletionState::Completed | CompletionState::Cancelled | CompletionState::Skipped
        )
    }
}

impl fmt::Display for CompletionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompletionState::Planned => "planned",
            CompletionState::InProgress => "in_progress",
            CompletionState::Completed => "completed",
            CompletionState::Cancelled => "cancelled",
            CompletionState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// User profile document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bodyweight_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    /// Preferred training days, 1 = Monday .. 7 = Sunday.
    #[serde(default)]
    pub training_days: Vec<u8>,
}

/// Training plan document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingPlan {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub starts_on: NaiveDate,
    pub weeks: u32,
    pub status: CompletionState,
}

/// A scheduled workout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workout {
    pub id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    pub title: String,
    pub scheduled_for: NaiveDate,
    pub status: CompletionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Target prescription for one exercise slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetTarget {
    pub sets: u32,
    pub reps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpe: Option<f64>,
}

/// One exercise slot inside a workout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseInstance {
    pub id: String,
    pub workout_id: String,
    /// Canonical exercise identifier, e.g. `barbell_back_squat`.
    pub exercise_slug: String,
    pub position: u32,
    pub target: SetTarget,
}

/// A performed set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetEntry {
    pub id: String,
    pub exercise_instance_id: String,
    pub position: u32,
    pub reps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logged_at: Option<DateTime<Utc>>,
}

/// A message sent to another user (committed form of a draft).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// Serialize an entity into its document form.
pub fn to_doc<T: Serialize>(entity: &T) -> Value {
    serde_json::to_value(entity).unwrap_or(Value::Null)
}

/// Deserialize a document into a typed entity.
pub fn from_doc<T: DeserializeOwned>(doc: &Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(doc.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_path_is_user_scoped() {
        let entity = EntityRef::new(EntityKind::Workout, "w1");
        assert_eq!(entity.document_path("u9"), "users/u9/workouts/w1");
    }

    #[test]
    fn terminal_states() {
        assert!(CompletionState::Completed.is_terminal());
        assert!(CompletionState::Cancelled.is_terminal());
        assert!(!CompletionState::Planned.is_terminal());
        assert!(!CompletionState::InProgress.is_terminal());
    }

    #[test]
    fn workout_doc_round_trip() {
        let workout = Workout {
            id: "w1".to_string(),
            user_id: "u1".to_string(),
            plan_id: None,
            title: "Lower A".to_string(),
            scheduled_for: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            status: CompletionState::Planned,
            notes: None,
        };
        let doc = to_doc(&workout);
        let back: Workout = from_doc(&doc).unwrap();
        assert_eq!(back.id, "w1");
        assert_eq!(back.status, CompletionState::Planned);
    }
}
