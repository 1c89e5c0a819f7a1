//! Server-Sent Events stream of a live session's effects.
//!
//! The first event is the interviewer's greeting. Effects follow in
//! commit order until the session's actor retires and the broadcast
//! channel closes.

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::generation::prompt;
use crate::models::effect::SessionEffect;

#[derive(Serialize)]
struct Greeting {
    message: String,
}

fn greeting_event(position: &str) -> Event {
    let greeting = Greeting {
        message: prompt::greeting(position),
    };
    Event::default()
        .event("greeting")
        .json_data(&greeting)
        .unwrap_or_else(|_| Event::default().event("greeting").data(greeting.message))
}

fn effect_event(effect: &SessionEffect) -> Option<Event> {
    match Event::default().event(effect.event_name()).json_data(effect) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(%err, "failed to encode effect");
            None
        }
    }
}

/// Next deliverable effect, skipping over lag; `None` once the channel closes.
async fn next_effect(receiver: &mut broadcast::Receiver<SessionEffect>) -> Option<SessionEffect> {
    loop {
        match receiver.recv().await {
            Ok(effect) => return Some(effect),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "effect subscriber lagged");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

/// Greeting followed by every effect received on `receiver`.
pub fn effect_stream(
    session_id: String,
    position: &str,
    receiver: broadcast::Receiver<SessionEffect>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let greeting = stream::once(std::future::ready(Ok::<_, Infallible>(greeting_event(position))));

    let effects = stream::unfold(receiver, move |mut receiver| async move {
        let effect = next_effect(&mut receiver).await?;
        Some((effect_event(&effect), receiver))
    })
    .filter_map(|event| std::future::ready(event.map(Ok::<_, Infallible>)))
    .chain(stream::once(async move {
        debug!(session_id, "effect stream ended");
        Ok(Event::default().event("end").data("{}"))
    }));

    greeting.chain(effects)
}

/// Wrap an effect stream as an SSE response with keep-alive comments.
pub fn sse_response<S>(stream: S) -> Sse<KeepAliveStream<S>>
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    Sse::new(stream).keep_alive(KeepAlive::default())
}
