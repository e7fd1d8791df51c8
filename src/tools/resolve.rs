//! Fuzzy entity reference resolution
//!
//! The caller is a probabilistic model, not a typed compiler: references
//! arrive as ids, names, nicknames, or fragments. Resolution walks a chain
//! of increasingly tolerant stages and fails only after all of them miss:
//! exact id, alias table, case-insensitive substring, Jaro-Winkler
//! similarity.

use strsim::jaro_winkler;

/// Minimum similarity for the final fuzzy stage. Below this the reference is
/// more likely a different entity than a typo.
const SIMILARITY_THRESHOLD: f64 = 0.85;

/// Common gym vocabulary for canonical exercise slugs.
pub const EXERCISE_ALIASES: &[(&str, &str)] = &[
    ("squat", "barbell_back_squat"),
    ("back squat", "barbell_back_squat"),
    ("bench", "barbell_bench_press"),
    ("bench press", "barbell_bench_press"),
    ("deadlift", "conventional_deadlift"),
    ("dl", "conventional_deadlift"),
    ("ohp", "overhead_press"),
    ("press", "overhead_press"),
    ("row", "barbell_row"),
    ("pullup", "pull_up"),
    ("pull-up", "pull_up"),
    ("chin", "pull_up"),
];

/// One resolvable entity: its id and a human-facing label.
#[derive(Debug, Clone)]
pub struct ResolutionCandidate {
    pub id: String,
    pub label: String,
}

impl ResolutionCandidate {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Resolve a model-supplied reference against candidates. Returns the
/// candidate id, or `None` when every stage misses.
pub fn resolve_reference(
    query: &str,
    candidates: &[ResolutionCandidate],
    aliases: &[(&str, &str)],
) -> Option<String> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }
    let query_lower = query.to_lowercase();

    // Stage 1: exact id.
    if let Some(hit) = candidates.iter().find(|c| c.id == query) {
        return Some(hit.id.clone());
    }

    // Stage 2: alias table, mapped alias must name a real candidate.
    if let Some((_, canonical)) = aliases.iter().find(|(alias, _)| *alias == query_lower) {
        if let Some(hit) = candidates.iter().find(|c| c.id == *canonical) {
            return Some(hit.id.clone());
        }
    }

    // Stage 3: case-insensitive substring over labels and ids. More than one
    // hit means the reference is ambiguous; guessing between real entities is
    // worse than failing.
    let substring_hits: Vec<&ResolutionCandidate> = candidates
        .iter()
        .filter(|c| {
            c.label.to_lowercase().contains(&query_lower)
                || c.id.to_lowercase().contains(&query_lower)
        })
        .collect();
    match substring_hits.as_slice() {
        [only] => return Some(only.id.clone()),
        [] => {}
        _ => return None,
    }

    // Stage 4: best similarity over labels, above the threshold.
    let mut best: Option<(&ResolutionCandidate, f64)> = None;
    for candidate in candidates {
        let score = jaro_winkler(&query_lower, &candidate.label.to_lowercase())
            .max(jaro_winkler(&query_lower, &candidate.id.to_lowercase()));
        if score >= SIMILARITY_THRESHOLD && best.is_none_or(|(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }
    best.map(|(candidate, _)| candidate.id.clone())
}
