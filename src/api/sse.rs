//! Server-Sent Events support
//!
//! Outbound events use the record shape `event: <type>\ndata: <json>\n\n`.
//! Text events carry `data.delta`; tool-call events carry `call_id`, `name`
//! and `arguments` at the top level of the payload. Custom event types like
//! `suggestion_chips` interleave; clients treat unknown types as inert.

use crate::orchestrator::OutboundEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// Convert the turn's outbound event channel into an SSE response.
pub fn sse_stream(
    rx: tokio::sync::mpsc::Receiver<OutboundEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = ReceiverStream::new(rx).map(|event| Ok(outbound_to_axum(&event)));

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn outbound_to_axum(event: &OutboundEvent) -> Event {
    Event::default()
        .event(&event.event_type)
        .data(event.data.to_string())
}
