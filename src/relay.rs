use futures::{StreamExt, stream::BoxStream};
use serde_json::json;
use tracing::{info, warn};

use crate::generation::{EventStream, StreamEvent};

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

pub fn frame(payload: &str) -> String {
    format!("data: {payload}\n\n")
}

pub fn event_frame(event: &StreamEvent) -> String {
    match event {
        StreamEvent::Fragment(text) => frame(&json!({ "text": text }).to_string()),
        StreamEvent::ModelNotFound(missing) => {
            let payload = serde_json::to_string(&missing.to_body())
                .unwrap_or_else(|_| json!({ "error": missing.message() }).to_string());
            frame(&payload)
        }
        StreamEvent::Failed(message) => frame(&json!({ "error": message }).to_string()),
    }
}

struct RelayState {
    events: EventStream,
    fragments: usize,
    finished: bool,
}

/// Frames `events` one by one as they arrive.
///
/// Dropping the returned stream drops `events` and with it the backend
/// connection.
pub fn sse_frames(events: EventStream) -> BoxStream<'static, String> {
    let state = RelayState {
        events,
        fragments: 0,
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        match state.events.next().await {
            Some(event) => {
                match &event {
                    StreamEvent::Fragment(_) => state.fragments += 1,
                    StreamEvent::ModelNotFound(missing) => {
                        warn!(model = %missing.model_name, "model not found during streaming");
                        state.finished = true;
                    }
                    StreamEvent::Failed(message) => {
                        warn!(error = %message, fragments = state.fragments, "streaming generation failed");
                        state.finished = true;
                    }
                }
                Some((event_frame(&event), state))
            }
            None => {
                info!(chunks = state.fragments, "streaming completed");
                state.finished = true;
                Some((DONE_FRAME.to_string(), state))
            }
        }
    })
    .boxed()
}
