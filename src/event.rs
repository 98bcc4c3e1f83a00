//! Trigger adapter: turn lines of an event feed into [`StorageEvent`]s.
//!
//! The pipeline does not subscribe to anything itself. Whatever delivers
//! "object created" notifications (an event grid webhook relay, a queue
//! consumer, a shell pipe) writes one event per line, and this module reads
//! them. Accepted line forms:
//!
//! ```text
//! reports/Q1.pdf                                          bare key
//! {"key": "reports/Q1.pdf"}                               explicit key
//! {"subject": "/blobServices/default/containers/input-files/blobs/reports/Q1.pdf"}
//! {"data": {"url": "https://acct.blob.core.windows.net/input-files/reports/Q1.pdf"}}
//! [ {...}, {...} ]                                        batch of the above
//! ```
//!
//! Blank lines are ignored. Events whose `eventType` is not a creation event
//! (deletions, tier changes) are dropped. Unusable lines are logged and
//! skipped; they never end the feed.

use crate::error::EventError;
use futures::stream::{self, Stream, StreamExt};
use percent_encoding::percent_decode_str;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

/// Marker preceding the object key in a blob event subject.
const SUBJECT_BLOBS_MARKER: &str = "/blobs/";

/// One "object created" notification: the key of the new object within the
/// input location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEvent {
    pub key: String,
}

impl StorageEvent {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Parse one feed line into zero or more events.
    pub fn parse(line: &str) -> Result<Vec<StorageEvent>, EventError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Vec::new());
        }
        if !line.starts_with('{') && !line.starts_with('[') {
            return Ok(vec![StorageEvent::new(line)]);
        }

        match serde_json::from_str::<Value>(line)? {
            Value::Array(items) => {
                let mut events = Vec::with_capacity(items.len());
                for item in &items {
                    events.extend(from_json(item)?);
                }
                Ok(events)
            }
            value => Ok(from_json(&value)?.into_iter().collect()),
        }
    }
}

fn from_json(value: &Value) -> Result<Option<StorageEvent>, EventError> {
    if let Some(kind) = value.get("eventType").and_then(Value::as_str) {
        if !kind.contains("Created") {
            debug!("Ignoring {} event", kind);
            return Ok(None);
        }
    }

    if let Some(key) = value.get("key").and_then(Value::as_str) {
        return Ok(Some(StorageEvent::new(key)));
    }

    if let Some(subject) = value.get("subject").and_then(Value::as_str) {
        return match subject.split_once(SUBJECT_BLOBS_MARKER) {
            Some((_, key)) if !key.is_empty() => Ok(Some(StorageEvent::new(key))),
            _ => Err(EventError::NotAnObject {
                field: "subject",
                value: subject.to_string(),
            }),
        };
    }

    let url = value
        .get("url")
        .or_else(|| value.get("data").and_then(|d| d.get("url")))
        .and_then(Value::as_str);
    if let Some(url) = url {
        return key_from_url(url).map(|key| Some(StorageEvent::new(key)));
    }

    Err(EventError::MissingKey)
}

/// `https://host/<container>/<key...>` → `<key...>`, percent-decoded. Keys
/// whose escapes do not decode to UTF-8 are rejected.
fn key_from_url(url: &str) -> Result<String, EventError> {
    let not_an_object = || EventError::NotAnObject {
        field: "url",
        value: url.to_string(),
    };
    let parsed = Url::parse(url).map_err(|_| not_an_object())?;
    let path = parsed.path().trim_start_matches('/');
    match path.split_once('/') {
        Some((_container, key)) if !key.is_empty() => percent_decode_str(key)
            .decode_utf8()
            .map(|key| key.into_owned())
            .map_err(|_| not_an_object()),
        _ => Err(not_an_object()),
    }
}

/// Read events line by line until EOF. A read error ends the feed.
pub fn event_stream<R>(reader: R) -> impl Stream<Item = StorageEvent> + Send
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    stream::unfold(reader.lines(), |mut lines| async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match StorageEvent::parse(&line) {
                    Ok(events) if events.is_empty() => continue,
                    Ok(events) => return Some((stream::iter(events), lines)),
                    Err(e) => {
                        warn!(line = %line.trim(), error = %e, "skipping unusable event");
                        continue;
                    }
                },
                Ok(None) => return None,
                Err(e) => {
                    warn!("event feed read failed: {}", e);
                    return None;
                }
            }
        }
    })
    .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(line: &str) -> Vec<String> {
        StorageEvent::parse(line)
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect()
    }

    #[test]
    fn bare_keys_and_blank_lines() {
        assert_eq!(keys("  reports/Q1.pdf \n"), vec!["reports/Q1.pdf"]);
        assert!(keys("   ").is_empty());
    }

    #[test]
    fn json_key_and_subject() {
        assert_eq!(keys(r#"{"key":"a/b.docx"}"#), vec!["a/b.docx"]);
        assert_eq!(
            keys(r#"{"subject":"/blobServices/default/containers/input-files/blobs/deep/dir/Q1 final.pdf","eventType":"Microsoft.Storage.BlobCreated"}"#),
            vec!["deep/dir/Q1 final.pdf"]
        );
    }

    #[test]
    fn url_container_is_stripped_and_decoded() {
        assert_eq!(
            keys(r#"{"data":{"url":"https://acct.blob.core.windows.net/input-files/deep/Q1%20final.pdf"}}"#),
            vec!["deep/Q1 final.pdf"]
        );
    }

    #[test]
    fn batches_and_non_creation_events() {
        let line = r#"[{"key":"one.txt"},{"key":"gone.txt","eventType":"Microsoft.Storage.BlobDeleted"},{"key":"two.txt"}]"#;
        assert_eq!(keys(line), vec!["one.txt", "two.txt"]);
    }

    #[test]
    fn unusable_lines_are_errors() {
        assert!(matches!(
            StorageEvent::parse("{not json"),
            Err(EventError::Json(_))
        ));
        assert!(matches!(
            StorageEvent::parse(r#"{"id":"123"}"#),
            Err(EventError::MissingKey)
        ));
        assert!(matches!(
            StorageEvent::parse(r#"{"subject":"/blobServices/default/containers/input-files"}"#),
            Err(EventError::NotAnObject { field: "subject", .. })
        ));
        assert!(matches!(
            StorageEvent::parse(r#"{"url":"https://acct.blob.core.windows.net/input-files"}"#),
            Err(EventError::NotAnObject { field: "url", .. })
        ));
    }

    #[test]
    fn malformed_escapes_are_kept_verbatim() {
        assert_eq!(
            keys(r#"{"url":"https://acct.blob.core.windows.net/input-files/100%25%zz.txt"}"#),
            vec!["100%%zz.txt"]
        );
    }

    #[test]
    fn non_utf8_escapes_are_rejected() {
        assert!(matches!(
            StorageEvent::parse(r#"{"url":"https://acct.blob.core.windows.net/input-files/bad%FF.pdf"}"#),
            Err(EventError::NotAnObject { field: "url", .. })
        ));
    }

    #[tokio::test]
    async fn stream_skips_bad_lines() {
        let feed: &[u8] = b"a.txt\n\n{broken\n{\"key\":\"b.pdf\"}\n";
        let events: Vec<_> = event_stream(feed).collect().await;
        assert_eq!(events, vec![StorageEvent::new("a.txt"), StorageEvent::new("b.pdf")]);
    }
}
