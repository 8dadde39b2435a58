//! WebSocket push subscription for one job's lifecycle updates.
//!
//! Connects to the server's `/api/v1/ws` endpoint and forwards frames
//! matching the requested job id into an unbounded channel. The socket
//! dropping is not treated as an error anywhere: push is best-effort by
//! design, and the reconciliation poll covers any gap.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use muse_core::job_events::JobUpdate;
use muse_core::types::DbId;

/// Connect and spawn a reader task that feeds job updates into a channel.
///
/// The task ends when the socket closes or the receiver is dropped.
pub async fn subscribe(
    base_url: &str,
    token: &str,
    job_id: DbId,
) -> Result<mpsc::UnboundedReceiver<JobUpdate>, tokio_tungstenite::tungstenite::Error> {
    let ws_url = format!("{}/api/v1/ws?token={}", ws_base(base_url), token);
    let (stream, _response) = connect_async(&ws_url).await?;

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let (_sink, mut reader) = stream.split();
        while let Some(frame) = reader.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            };

            let Some(update) = parse_update(&text) else {
                continue;
            };
            if update.job_id != job_id {
                continue;
            }
            if tx.send(update).is_err() {
                break;
            }
        }
        tracing::debug!(job_id, "Push subscription ended");
    });

    Ok(rx)
}

/// Extract a [`JobUpdate`] from a push frame, if it is a job message.
pub fn parse_update(text: &str) -> Option<JobUpdate> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    if !value["type"].as_str()?.starts_with("job_") {
        return None;
    }
    serde_json::from_value(value["job"].clone()).ok()
}

/// Derive the WebSocket base URL from the HTTP base URL.
fn ws_base(base_url: &str) -> String {
    if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base_url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_base_rewrites_scheme() {
        assert_eq!(ws_base("https://api.example.com"), "wss://api.example.com");
        assert_eq!(ws_base("http://localhost:3000"), "ws://localhost:3000");
    }

    #[test]
    fn parse_update_reads_job_frames() {
        let text = r#"{"type":"job_completed","job":{"job_id":7,"kind":"upscale","status":"completed","output_url":"u"},"timestamp":"2025-01-01T00:00:00Z"}"#;
        let update = parse_update(text).unwrap();
        assert_eq!(update.job_id, 7);
        assert_eq!(update.status, "completed");
    }

    #[test]
    fn parse_update_ignores_other_frames() {
        assert!(parse_update(r#"{"type":"ping"}"#).is_none());
        assert!(parse_update("not json").is_none());
    }
}
