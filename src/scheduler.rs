//! Reply scheduling
//!
//! Answers go out after a uniformly random delay so they do not look
//! instantaneous. Each send is its own task; the returned handle resolves
//! to the send result, which callers are free to ignore.

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::DelayRange;
use crate::error::OracleResult;

/// Outbound primitives of the chat collaborator
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send_text(&self, channel_id: &str, text: &str) -> OracleResult<()>;

    async fn send_typing(&self, channel_id: &str) -> OracleResult<()>;
}

/// Draw a delay uniformly from `range` (inclusive)
pub fn draw_delay(range: DelayRange) -> Duration {
    let ms = if range.min_ms >= range.max_ms {
        range.min_ms
    } else {
        rand::thread_rng().gen_range(range.min_ms..=range.max_ms)
    };
    Duration::from_millis(ms)
}

#[derive(Clone)]
pub struct ReplyScheduler {
    gateway: Arc<dyn ChatGateway>,
}

impl ReplyScheduler {
    pub fn new(gateway: Arc<dyn ChatGateway>) -> Self {
        Self { gateway }
    }

    /// Send `text` after a random delay drawn from `range`
    pub fn schedule(&self, channel_id: &str, text: &str, range: DelayRange) -> JoinHandle<OracleResult<()>> {
        self.spawn_reply(channel_id, text, range, false)
    }

    /// Like `schedule`, but show a typing indicator before waiting
    pub fn schedule_typing(&self, channel_id: &str, text: &str, range: DelayRange) -> JoinHandle<OracleResult<()>> {
        self.spawn_reply(channel_id, text, range, true)
    }

    /// Send immediately, logging failure
    pub async fn send_now(&self, channel_id: &str, text: &str) -> OracleResult<()> {
        let result = self.gateway.send_text(channel_id, text).await;
        if let Err(e) = &result {
            tracing::warn!("Immediate send to {} failed: {}", channel_id, e);
        }
        result
    }

    fn spawn_reply(
        &self,
        channel_id: &str,
        text: &str,
        range: DelayRange,
        typing: bool,
    ) -> JoinHandle<OracleResult<()>> {
        let gateway = self.gateway.clone();
        let channel_id = channel_id.to_string();
        let text = text.to_string();
        let delay = draw_delay(range);

        tokio::spawn(async move {
            if typing {
                if let Err(e) = gateway.send_typing(&channel_id).await {
                    tracing::debug!("Typing indicator failed in {}: {}", channel_id, e);
                }
            }

            tokio::time::sleep(delay).await;

            let result = gateway.send_text(&channel_id, &text).await;
            match &result {
                Ok(()) => tracing::info!("Answered {:?} in {} after {:?}", text, channel_id, delay),
                Err(e) => tracing::warn!("Reply to {} failed: {}", channel_id, e),
            }
            result
        })
    }
}
