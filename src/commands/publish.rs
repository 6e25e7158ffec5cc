//! `tailship event`: publish one event.
//!
//! ```bash
//! tailship event --source deploy --tag prod --content "release 1.4 rolled out"
//! echo "from a pipe" | tailship event --source cron
//! ```

// Rust guideline compliant 2026-02

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;

use crate::event::Event;
use crate::transport::Endpoint;
use crate::Client;

/// Publish `content` (or stdin when `None`) as one event and return it.
pub async fn run(
    client: &Client,
    source: &str,
    tags: &[String],
    content: Option<String>,
) -> Result<Event> {
    let content = match content {
        Some(content) => content.into_bytes(),
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .context("Failed to read event content from stdin")?;
            buf
        }
    };

    let event = build_event(source, tags, content);
    client
        .send(&event)
        .await
        .with_context(|| format!("Failed to publish event to {}", client.base_url()))?;
    log::info!("Published event {}", event.id);

    if let Err(e) = client.close(Endpoint::Event, "done").await {
        log::debug!("Closing event connection failed: {e}");
    }
    Ok(event)
}

/// Event for `content` from `source`; tags are left unset when empty.
pub fn build_event(source: &str, tags: &[String], content: Vec<u8>) -> Event {
    let event = Event::new(source, content);
    if tags.is_empty() {
        event
    } else {
        event.with_tags(tags.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_event_tags() {
        let event = build_event("deploy", &["prod".to_string()], b"done".to_vec());
        assert_eq!(event.source, "deploy");
        assert_eq!(event.tags, Some(vec!["prod".to_string()]));
        assert_eq!(build_event("deploy", &[], Vec::new()).tags, None);
    }

    #[tokio::test]
    async fn test_run_unreachable_server_fails() {
        let client = Client::new("ws://127.0.0.1:1");
        let result = run(&client, "s", &[], Some("c".to_string())).await;
        assert!(result.is_err());
    }
}
