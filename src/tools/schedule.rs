//! Schedule display handler

use super::context::{ToolHandlerContext, UiArtifact};
use super::{failure, ToolHandler};
use crate::domain::{from_doc, EntityKind, Workout};
use crate::store::StoreError;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_WINDOW_DAYS: i64 = 7;
const MAX_WINDOW_DAYS: i64 = 31;

pub struct ShowScheduleHandler;

#[derive(Debug, Deserialize)]
struct ShowScheduleArgs {
    /// First day of the window, YYYY-MM-DD. Defaults to today.
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    days: Option<i64>,
}

#[async_trait]
impl ToolHandler for ShowScheduleHandler {
    fn name(&self) -> &'static str {
        "show_schedule"
    }

    fn description(&self) -> String {
        "Show the user's upcoming workouts. Optionally pass a start date and window length in days.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "from": { "type": "string", "description": "Window start, YYYY-MM-DD; defaults to today" },
                "days": { "type": "integer", "minimum": 1, "maximum": MAX_WINDOW_DAYS }
            }
        })
    }

    async fn execute_only(
        &self,
        args: Value,
        ctx: &mut ToolHandlerContext,
    ) -> Result<String, StoreError> {
        let args: ShowScheduleArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => return Ok(failure(format!("invalid arguments: {e}"))),
        };

        let from = match args.from {
            Some(raw) => match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
                Ok(date) => date,
                Err(_) => {
                    return Ok(failure(format!(
                        "'{raw}' is not a valid date, expected YYYY-MM-DD"
                    )))
                }
            },
            None => Utc::now().date_naive(),
        };
        let days = args.days.unwrap_or(DEFAULT_WINDOW_DAYS);
        if !(1..=MAX_WINDOW_DAYS).contains(&days) {
            return Ok(failure(format!("days must be between 1 and {MAX_WINDOW_DAYS}")));
        }
        let until = from + Duration::days(days);

        let mut workouts: Vec<Workout> = ctx
            .sync
            .overlay()
            .views_of_kind(EntityKind::Workout)
            .into_iter()
            .filter_map(|(_, view)| from_doc::<Workout>(&view).ok())
            .filter(|w| w.user_id == ctx.user_id)
            .filter(|w| w.scheduled_for >= from && w.scheduled_for < until)
            .collect();
        workouts.sort_by(|a, b| (a.scheduled_for, &a.title).cmp(&(b.scheduled_for, &b.title)));

        ctx.push_artifact(UiArtifact::SuggestionChips {
            chips: vec![
                "Log a set".to_string(),
                "Add a workout".to_string(),
                "Adjust a target".to_string(),
            ],
        });

        if workouts.is_empty() {
            return Ok(format!(
                "No workouts scheduled between {from} and {until}."
            ));
        }

        let lines: Vec<String> = workouts
            .iter()
            .map(|w| {
                format!(
                    "- {} {} ({})",
                    w.scheduled_for.format("%a %Y-%m-%d"),
                    w.title,
                    w.status
                )
            })
            .collect();
        Ok(format!(
            "Schedule from {from} ({} workouts):\n{}",
            workouts.len(),
            lines.join("\n")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::context::testing::test_context;
    use crate::tools::{CreateWorkoutHandler, FAILURE_MARKER};

    #[tokio::test]
    async fn lists_workouts_in_window_sorted_by_date() {
        let mut ctx = test_context();
        for (title, date) in [("Upper B", "2026-03-04"), ("Lower A", "2026-03-02")] {
            CreateWorkoutHandler
                .execute_only(json!({ "title": title, "date": date }), &mut ctx)
                .await
                .unwrap();
        }

        let result = ShowScheduleHandler
            .execute_only(json!({ "from": "2026-03-01", "days": 7 }), &mut ctx)
            .await
            .unwrap();
        let lower = result.find("Lower A").unwrap();
        let upper = result.find("Upper B").unwrap();
        assert!(lower < upper, "expected date order in: {result}");
    }

    #[tokio::test]
    async fn empty_window_reports_no_workouts() {
        let mut ctx = test_context();
        let result = ShowScheduleHandler
            .execute_only(json!({ "from": "2031-01-01" }), &mut ctx)
            .await
            .unwrap();
        assert!(result.starts_with("No workouts scheduled"));
    }

    #[tokio::test]
    async fn queues_suggestion_chips() {
        let mut ctx = test_context();
        ShowScheduleHandler
            .execute_only(json!({}), &mut ctx)
            .await
            .unwrap();
        let artifacts = ctx.take_artifacts();
        assert!(artifacts
            .iter()
            .any(|a| matches!(a, UiArtifact::SuggestionChips { .. })));
    }

    #[tokio::test]
    async fn rejects_oversized_window() {
        let mut ctx = test_context();
        let result = ShowScheduleHandler
            .execute_only(json!({ "days": 365 }), &mut ctx)
            .await
            .unwrap();
        assert!(result.starts_with(FAILURE_MARKER));
    }
}
