//! Server-sent-events plumbing shared by the streaming backends.
//!
//! Both providers stream completions as SSE `data:` lines. A spawned reader
//! task parses the byte stream line by line and forwards extracted text
//! fragments over an unbounded channel; the receiving half is the stream
//! handed back to the caller. A failure is forwarded as one final `Err` item
//! before the channel closes.

use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::{LlmError, Result};

/// Spawns a reader task for an SSE response and returns the fragment stream.
///
/// `extract` pulls the text fragment (if any) out of one decoded event.
pub(crate) fn spawn<F>(request: reqwest::RequestBuilder, extract: F) -> BoxStream<'static, Result<String>>
where
    F: Fn(&serde_json::Value) -> Option<String> + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::unbounded();
    tokio::spawn(async move {
        if let Err(err) = pump(request, &extract, &tx).await {
            let _ = tx.unbounded_send(Err(err));
        }
    });
    rx.boxed()
}

async fn pump<F>(
    request: reqwest::RequestBuilder,
    extract: &F,
    tx: &mpsc::UnboundedSender<Result<String>>,
) -> Result<()>
where
    F: Fn(&serde_json::Value) -> Option<String>,
{
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(LlmError::status(status.as_u16(), message));
    }

    let mut body = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    while let Some(chunk) = body.next().await {
        buffer.extend_from_slice(&chunk?);
        while let Some(newline) = buffer.iter().position(|&byte| byte == b'\n') {
            let line: Vec<u8> = buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let Some(data) = line.trim().strip_prefix("data: ") else {
                continue;
            };
            if data == "[DONE]" {
                continue;
            }
            // Keep-alive comments and event-name lines are not JSON.
            let Ok(event) = serde_json::from_str::<serde_json::Value>(data) else {
                continue;
            };
            if let Some(text) = extract(&event) {
                if tx.unbounded_send(Ok(text)).is_err() {
                    // Receiver dropped; stop reading.
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}
