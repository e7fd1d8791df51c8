//! Property-based tests for the overlay fold
//!
//! These verify the merge invariants the rest of the system leans on:
//! - Folding the same delta twice (duplicate delivery) is a no-op
//! - Deltas touching disjoint fields commute
//! - Overlapping fields resolve last-write-wins by timestamp
//! - Compacting confirmed deltas into the base never changes the view

use super::delta::{fold_all, Delta};
use super::overlay::OverlayStore;
use crate::domain::{EntityKind, EntityRef};
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::Value;
use std::collections::BTreeMap;

fn entity() -> EntityRef {
    EntityRef::new(EntityKind::Workout, "w1")
}

/// Simple JSON leaf values.
fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(|n| Value::Number(n.into())),
        "[a-zA-Z0-9 ]{0,24}".prop_map(Value::String),
    ]
}

fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (1_700_000_000i64..1_800_000_000).prop_map(|secs| Utc.timestamp_opt(secs, 0).unwrap())
}

/// Field overrides drawn from a small key alphabet so overlaps happen.
fn arb_fields() -> impl Strategy<Value = BTreeMap<String, Value>> {
    proptest::collection::btree_map("[a-f]", arb_value(), 1..4)
}

fn arb_delta() -> impl Strategy<Value = Delta> {
    (arb_fields(), arb_timestamp()).prop_map(|(set, timestamp)| {
        let mut delta = Delta::new(entity()).with_timestamp(timestamp);
        delta.set = set;
        delta
    })
}

fn arb_base() -> impl Strategy<Value = Value> {
    arb_fields().prop_map(|fields| Value::Object(fields.into_iter().collect()))
}

proptest! {
    #[test]
    fn fold_is_idempotent(base in arb_base(), delta in arb_delta()) {
        let once = fold_all(Some(&base), [&delta]);
        let twice = fold_all(Some(&base), [&delta, &delta]);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn disjoint_fields_commute(
        base in arb_base(),
        a in arb_delta(),
        b in arb_delta(),
    ) {
        // Rename b's keys into a disjoint alphabet.
        let mut b = b;
        b.set = b
            .set
            .into_iter()
            .map(|(k, v)| (format!("z_{k}"), v))
            .collect();

        let forward = {
            let store = OverlayStore::new();
            store.set_base(entity(), base.clone());
            store.apply(a.clone());
            store.apply(b.clone());
            store.effective_view(&entity()).unwrap()
        };
        let reverse = {
            let store = OverlayStore::new();
            store.set_base(entity(), base.clone());
            store.apply(b.clone());
            store.apply(a.clone());
            store.effective_view(&entity()).unwrap()
        };
        prop_assert_eq!(forward, reverse);
    }

    #[test]
    fn overlapping_field_is_last_write_wins(
        earlier_value in arb_value(),
        later_value in arb_value(),
        earlier_ts in 1_700_000_000i64..1_750_000_000,
        gap in 1i64..1_000_000,
    ) {
        let earlier = Delta::new(entity())
            .with_field("title", earlier_value)
            .with_timestamp(Utc.timestamp_opt(earlier_ts, 0).unwrap());
        let later = Delta::new(entity())
            .with_field("title", later_value.clone())
            .with_timestamp(Utc.timestamp_opt(earlier_ts + gap, 0).unwrap());

        for pair in [[&earlier, &later], [&later, &earlier]] {
            let store = OverlayStore::new();
            for delta in pair {
                store.apply((*delta).clone());
            }
            let view = store.effective_view(&entity()).unwrap();
            prop_assert_eq!(&view["title"], &later_value);
        }
    }

    #[test]
    fn compaction_preserves_the_view(
        base in arb_base(),
        deltas in proptest::collection::vec(arb_delta(), 1..6),
    ) {
        let store = OverlayStore::new();
        store.set_base(entity(), base);
        for delta in &deltas {
            store.apply(delta.clone());
        }
        let before = store.effective_view(&entity()).unwrap().to_string();

        // Confirm deltas in merge order, the order the outbox uses.
        let ordered = store.pending_for(&entity());
        for delta in &ordered {
            prop_assert!(store.compact(&delta.id));
            let after = store.effective_view(&entity()).unwrap().to_string();
            prop_assert_eq!(&before, &after);
        }
        prop_assert_eq!(store.pending_len(), 0);
    }
}
