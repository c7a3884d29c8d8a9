//! Inbound chat events

use crate::errors::GatewayError;
use crate::games::types::{ScopeId, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tracing::warn;

/// One message posted in a chat or private conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatEvent {
    /// Chat id, or the peer id for private messages
    pub peer_id: ScopeId,
    pub from_id: UserId,
    pub text: String,
    #[serde(default)]
    pub message_id: u64,
}

#[async_trait]
pub trait EventSource: Send {
    /// Next event, or `None` once the source is exhausted
    async fn next_event(&mut self) -> Result<Option<ChatEvent>, GatewayError>;
}

/// Reads one JSON-encoded [`ChatEvent`] per line; malformed lines are skipped
pub struct LineEventSource<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin + Send> LineEventSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, buf: Vec::new() }
    }
}

impl LineEventSource<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> EventSource for LineEventSource<R> {
    async fn next_event(&mut self) -> Result<Option<ChatEvent>, GatewayError> {
        loop {
            self.buf.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .await
                .map_err(|e| GatewayError::SourceClosed(e.to_string()))?;
            if read == 0 {
                return Ok(None);
            }
            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    warn!(error = %e, "Skipping event line that is not UTF-8");
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(event) => return Ok(Some(event)),
                Err(e) => warn!(error = %e, "Skipping malformed event line"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_events_and_skips_garbage() {
        let input = b"{\"peer_id\":1,\"from_id\":2,\"text\":\"/balance\"}\n\nnot json\n{\"peer_id\":1,\"from_id\":3,\"text\":\"hi\",\"message_id\":9}\n";
        let mut source = LineEventSource::new(&input[..]);

        let first = source.next_event().await.unwrap().unwrap();
        assert_eq!(first.from_id, 2);
        assert_eq!(first.message_id, 0);

        let second = source.next_event().await.unwrap().unwrap();
        assert_eq!(second.text, "hi");
        assert_eq!(second.message_id, 9);

        assert!(source.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_skipped() {
        let input = b"\xff\xfe garbage\n{\"peer_id\":4,\"from_id\":5,\"text\":\"/top\"}\n";
        let mut source = LineEventSource::new(&input[..]);

        let event = source.next_event().await.unwrap().unwrap();
        assert_eq!(event.peer_id, 4);
        assert_eq!(event.text, "/top");
        assert!(source.next_event().await.unwrap().is_none());
    }
}
