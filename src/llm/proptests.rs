//! Property-based tests for the stream event parser
//!
//! These verify the transport-framing invariants:
//! - Chunk boundaries carry no meaning: a feed split at arbitrary byte
//!   positions produces exactly the events of the unsplit feed
//! - A tool call without a done record is never sealed

use super::stream::StreamEventParser;
use super::types::StreamEvent;
use proptest::prelude::*;
use serde_json::json;

/// One logical record in a synthetic feed.
#[derive(Debug, Clone)]
enum FeedRecord {
    Text(String),
    CallStarted { id: String, name: String },
    CallDelta { id: String, fragment: String },
    CallDone { id: String },
    Completed,
}

fn render(records: &[FeedRecord]) -> String {
    let mut out = String::from("event: turn_started\ndata: {}\n\n");
    for record in records {
        let (event_type, data) = match record {
            FeedRecord::Text(delta) => ("text_delta", json!({ "delta": delta })),
            FeedRecord::CallStarted { id, name } => (
                "tool_call_started",
                json!({ "call_id": id, "name": name }),
            ),
            FeedRecord::CallDelta { id, fragment } => (
                "tool_call_delta",
                json!({ "call_id": id, "delta": fragment }),
            ),
            FeedRecord::CallDone { id } => ("tool_call_done", json!({ "call_id": id })),
            FeedRecord::Completed => ("turn_completed", json!({ "response_id": "r1" })),
        };
        out.push_str(&format!("event: {event_type}\ndata: {data}\n\n"));
    }
    out
}

fn parse_whole(feed: &str) -> Vec<StreamEvent> {
    let mut parser = StreamEventParser::new();
    parser.feed(feed.as_bytes())
}

fn parse_split(feed: &str, splits: &[usize]) -> Vec<StreamEvent> {
    let bytes = feed.as_bytes();
    let mut cuts: Vec<usize> = splits.iter().map(|s| s % (bytes.len() + 1)).collect();
    cuts.push(0);
    cuts.push(bytes.len());
    cuts.sort_unstable();
    cuts.dedup();

    let mut parser = StreamEventParser::new();
    let mut events = Vec::new();
    for window in cuts.windows(2) {
        events.extend(parser.feed(&bytes[window[0]..window[1]]));
    }
    events
}

/// Text payloads including multi-byte characters so splits can land inside
/// a UTF-8 sequence.
fn arb_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 äöüß→]{1,24}"
}

fn arb_call(index: usize, sealed: bool) -> impl Strategy<Value = Vec<FeedRecord>> {
    (
        "[a-z_]{3,12}",
        proptest::collection::vec("[a-z0-9\":{},]{1,12}", 0..4),
    )
        .prop_map(move |(name, fragments)| {
            let id = format!("call_{index}");
            let mut records = vec![FeedRecord::CallStarted {
                id: id.clone(),
                name,
            }];
            records.extend(fragments.into_iter().map(|fragment| FeedRecord::CallDelta {
                id: id.clone(),
                fragment,
            }));
            if sealed {
                records.push(FeedRecord::CallDone { id });
            }
            records
        })
}

fn arb_sealed_feed() -> impl Strategy<Value = Vec<FeedRecord>> {
    (
        proptest::collection::vec(arb_text().prop_map(FeedRecord::Text), 0..4),
        arb_call(0, true),
        proptest::collection::vec(arb_text().prop_map(FeedRecord::Text), 0..4),
    )
        .prop_map(|(before, call, after)| {
            let mut records = before;
            records.extend(call);
            records.extend(after);
            records.push(FeedRecord::Completed);
            records
        })
}

proptest! {
    #[test]
    fn split_feed_yields_identical_events(
        records in arb_sealed_feed(),
        splits in proptest::collection::vec(any::<usize>(), 0..12),
    ) {
        let feed = render(&records);
        let whole = parse_whole(&feed);
        let split = parse_split(&feed, &splits);
        prop_assert_eq!(whole, split);
    }

    #[test]
    fn unsealed_call_never_reaches_the_router(
        call in arb_call(0, false),
        splits in proptest::collection::vec(any::<usize>(), 0..8),
    ) {
        let mut records = call;
        records.push(FeedRecord::Completed);
        let feed = render(&records);

        for events in [parse_whole(&feed), parse_split(&feed, &splits)] {
            prop_assert!(
                !events
                    .iter()
                    .any(|e| matches!(e, StreamEvent::ToolCallCompleted { .. })),
                "unsealed call must not reach the router"
            );
            // The turn must end in a protocol-violation error, not success.
            prop_assert!(
                events
                    .iter()
                    .any(|e| matches!(e, StreamEvent::StreamError { .. })),
                "turn must end in a protocol-violation error"
            );
        }
    }
}
