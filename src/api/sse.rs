//! Reply stream for one operator

use crate::menu::Keyboard;
use crate::runtime::{ChannelEvent, SessionSnapshot};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream};
use serde::Serialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Payload of every frame; the SSE event name mirrors `type`
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamFrame {
    Init {
        session: SessionSnapshot,
        keyboard: Keyboard,
    },
    Reply {
        text: String,
        keyboard: Keyboard,
    },
    Error {
        message: String,
    },
}

impl StreamFrame {
    fn name(&self) -> &'static str {
        match self {
            StreamFrame::Init { .. } => "init",
            StreamFrame::Reply { .. } => "reply",
            StreamFrame::Error { .. } => "error",
        }
    }

    fn into_event(self) -> Event {
        let event = Event::default().event(self.name());
        match serde_json::to_string(&self) {
            Ok(data) => event.data(data),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode stream frame");
                event.data("{}")
            }
        }
    }
}

impl From<ChannelEvent> for StreamFrame {
    fn from(event: ChannelEvent) -> Self {
        match event {
            ChannelEvent::Reply { text, keyboard } => StreamFrame::Reply { text, keyboard },
            ChannelEvent::Error { message } => StreamFrame::Error { message },
        }
    }
}

/// Stream the session as it is now, then every reply published after it.
///
/// A subscriber that falls behind loses the replies it missed rather than
/// the whole stream.
pub fn sse_stream(
    session: SessionSnapshot,
    keyboard: Keyboard,
    replies: broadcast::Receiver<ChannelEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = stream::iter([StreamFrame::Init { session, keyboard }]);
    let published = BroadcastStream::new(replies).filter_map(|received| match received {
        Ok(event) => Some(StreamFrame::from(event)),
        Err(lagged) => {
            tracing::debug!(error = %lagged, "Stream subscriber lagged");
            None
        }
    });

    let frames = init
        .chain(published)
        .map(|frame| Ok::<_, Infallible>(frame.into_event()));

    Sse::new(frames).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("ping"),
    )
}
