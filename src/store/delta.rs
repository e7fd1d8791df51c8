//! Sparse entity patches and the fold merge
//!
//! A delta records field overrides for one entity at one point in time.
//! Folding applies deltas in (timestamp, seq, id) order; the last write to a
//! field wins, and fields a delta does not mention are left untouched.

use crate::domain::{CompletionState, EntityRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A sparse, timestamped patch to one entity document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub id: String,
    pub entity: EntityRef,
    /// Field overrides. BTreeMap keeps serialization deterministic.
    pub set: BTreeMap<String, Value>,
    /// Optional lifecycle transition, folded into the document's `status`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<CompletionState>,
    pub timestamp: DateTime<Utc>,
    /// Assigned by the durable log on append; 0 until then.
    #[serde(default)]
    pub seq: i64,
}

impl Delta {
    pub fn new(entity: EntityRef) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity,
            set: BTreeMap::new(),
            completion: None,
            timestamp: Utc::now(),
            seq: 0,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set.insert(key.into(), value);
        self
    }

    pub fn with_completion(mut self, state: CompletionState) -> Self {
        self.completion = Some(state);
        self
    }

    #[cfg(test)]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Ordering key for the merge. The id tiebreak keeps folds deterministic
    /// for deltas that never went through the log.
    fn sort_key(&self) -> (DateTime<Utc>, i64, &str) {
        (self.timestamp, self.seq, &self.id)
    }
}

/// Fold one delta into a document. A missing or non-object base is treated as
/// an empty document, so entity creation is just a delta over nothing.
pub fn fold(base: &Value, delta: &Delta) -> Value {
    let mut doc = match base {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    for (key, value) in &delta.set {
        doc.insert(key.clone(), value.clone());
    }
    if let Some(state) = delta.completion {
        doc.insert(
            "status".to_string(),
            serde_json::to_value(state).unwrap_or(Value::Null),
        );
    }
    Value::Object(doc)
}

/// Fold a set of deltas into a base document in merge order.
pub fn fold_all<'a, I>(base: Option<&Value>, deltas: I) -> Value
where
    I: IntoIterator<Item = &'a Delta>,
{
    let mut ordered: Vec<&Delta> = deltas.into_iter().collect();
    ordered.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let mut doc = base.cloned().unwrap_or(Value::Object(Map::new()));
    for delta in ordered {
        doc = fold(&doc, delta);
    }
    doc
}
