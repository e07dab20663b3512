//! JSON-lines chat collaborator
//!
//! Inbound: one `ChatEvent` JSON object per line.
//! Outbound: one `Outbound` JSON object per line, e.g.
//! `{"action":"send","channel_id":"42","text":"france"}`.
//!
//! The session with the real chat service lives outside this crate; it
//! pipes events in and relays actions out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, Mutex};

use crate::error::{OracleError, OracleResult};
use crate::scheduler::ChatGateway;
use crate::types::ChatEvent;

/// An action requested of the chat collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Outbound {
    Send { channel_id: String, text: String },
    Typing { channel_id: String },
}

/// Writes outbound actions as JSON lines
pub struct LineGateway<W> {
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> LineGateway<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    async fn emit(&self, action: &Outbound) -> OracleResult<()> {
        let mut line = serde_json::to_string(action).map_err(|e| OracleError::Send(e.to_string()))?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| OracleError::Send(e.to_string()))?;
        writer.flush().await.map_err(|e| OracleError::Send(e.to_string()))
    }
}

pub type StdioGateway = LineGateway<tokio::io::Stdout>;

impl StdioGateway {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ChatGateway for LineGateway<W> {
    async fn send_text(&self, channel_id: &str, text: &str) -> OracleResult<()> {
        self.emit(&Outbound::Send {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
        })
        .await
    }

    async fn send_typing(&self, channel_id: &str) -> OracleResult<()> {
        self.emit(&Outbound::Typing {
            channel_id: channel_id.to_string(),
        })
        .await
    }
}

/// Publish every parseable line of `reader` as a chat event.
/// Returns the number of events published once the input ends.
pub async fn pump_events<R>(reader: R, events: broadcast::Sender<ChatEvent>) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut published = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<ChatEvent>(line) {
            Ok(event) => {
                // No receivers just means nothing is listening yet
                let _ = events.send(event);
                published += 1;
            }
            Err(e) => tracing::warn!("Skipping malformed event line: {}", e),
        }
    }

    Ok(published)
}

#[cfg(test)]
pub(crate) use recording::RecordingGateway;

#[cfg(test)]
mod recording {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// Keeps every outbound action in memory
    #[derive(Default)]
    pub struct RecordingGateway {
        actions: StdMutex<Vec<Outbound>>,
        fail: bool,
    }

    impl RecordingGateway {
        pub fn failing() -> Self {
            Self {
                actions: StdMutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn actions(&self) -> Vec<Outbound> {
            self.actions.lock().unwrap().clone()
        }

        /// (channel, text) of every send, in order
        pub fn sent(&self) -> Vec<(String, String)> {
            self.actions()
                .into_iter()
                .filter_map(|action| match action {
                    Outbound::Send { channel_id, text } => Some((channel_id, text)),
                    Outbound::Typing { .. } => None,
                })
                .collect()
        }

        pub fn texts(&self) -> Vec<String> {
            self.sent().into_iter().map(|(_, text)| text).collect()
        }
    }

    #[async_trait]
    impl ChatGateway for RecordingGateway {
        async fn send_text(&self, channel_id: &str, text: &str) -> OracleResult<()> {
            if self.fail {
                return Err(OracleError::Send("gateway closed".to_string()));
            }
            self.actions.lock().unwrap().push(Outbound::Send {
                channel_id: channel_id.to_string(),
                text: text.to_string(),
            });
            Ok(())
        }

        async fn send_typing(&self, channel_id: &str) -> OracleResult<()> {
            if self.fail {
                return Err(OracleError::Send("gateway closed".to_string()));
            }
            self.actions.lock().unwrap().push(Outbound::Typing {
                channel_id: channel_id.to_string(),
            });
            Ok(())
        }
    }
}
