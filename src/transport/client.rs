//! WebSocket feed of realtime lifecycle events.
//!
//! Reads JSON `{type, ...}` frames and hands them to the dispatcher.
//! Malformed frames are logged and dropped — dispatch must never crash
//! on transport noise.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::AppError;

use super::dispatcher::EventDispatcher;

/// Consumes a realtime event stream until it closes or is cancelled.
pub struct RealtimeEventFeed {
    dispatcher: Arc<EventDispatcher>,
}

impl RealtimeEventFeed {
    pub fn new(dispatcher: Arc<EventDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Connect and pump events into the dispatcher.
    ///
    /// Returns when the server closes the stream or the token is
    /// cancelled. Reconnect policy belongs to the caller.
    pub async fn run(&self, url: &str, cancel: &CancellationToken) -> Result<(), AppError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| AppError::Transport(format!("invalid transport url: {e}")))?;
        let (stream, _) = connect_async(parsed.as_str())
            .await
            .map_err(|e| AppError::Transport(format!("connect failed: {e}")))?;
        info!(url, "Realtime event feed connected");

        let (_write, mut read) = stream.split();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Realtime event feed cancelled");
                    return Ok(());
                }
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => self.handle_frame(text.as_str()),
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Realtime event feed closed by server");
                        return Ok(());
                    }
                    Some(Ok(other)) => {
                        debug!(kind = ?other, "Ignoring non-text transport frame");
                    }
                    Some(Err(e)) => {
                        return Err(AppError::Transport(format!("stream error: {e}")));
                    }
                },
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Dropping malformed transport frame");
                return;
            }
        };
        let raw_type = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        self.dispatcher.dispatch(&raw_type, &value);
    }
}
