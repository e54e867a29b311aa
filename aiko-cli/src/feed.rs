//! Newline-delimited JSON chat feed
//!
//! Each line is either a chat message
//! (`{"username":"...","text":"...","is_donation":true,"donation_amount":5}`)
//! or a viewer count update (`{"viewer_count":120}`).

use aiko_core::bus::{ChatIngestor, ChatMessage, Event, EventBus, EventType};
use aiko_core::utils::truncate;
use serde::Deserialize;
use std::io::BufRead;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Lines buffered between the reader thread and the feed
const LINE_BUFFER: usize = 256;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedLine {
    Viewers {
        viewer_count: u64,
    },
    Chat(ChatMessage),
}

/// Counters for one feed run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedStats {
    pub messages: usize,
    pub viewer_updates: usize,
    pub skipped: usize,
}

/// Read lines from a blocking source on a detached thread
///
/// The channel closes at EOF or on the first read error. Nothing waits for
/// the thread, so a read parked on an idle terminal never holds up runtime
/// shutdown.
pub fn spawn_line_reader<R>(reader: R) -> mpsc::Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    let spawned = std::thread::Builder::new()
        .name("aiko-feed".to_string())
        .spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Chat feed read failed: {}", e);
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        warn!("Failed to start chat feed reader: {}", e);
    }
    rx
}

/// Consume lines until the reader closes, ingesting chat and publishing
/// viewer counts
///
/// Bad lines are logged and skipped.
pub async fn pump(
    mut lines: mpsc::Receiver<String>,
    ingestor: &ChatIngestor,
    bus: &EventBus,
    source: &str,
) -> FeedStats {
    let mut stats = FeedStats::default();

    while let Some(line) = lines.recv().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<FeedLine>(line) {
            Ok(FeedLine::Viewers { viewer_count }) => {
                stats.viewer_updates += 1;
                let event = Event::new(EventType::ViewerCount)
                    .with_payload("count", viewer_count)
                    .with_source(source);
                if let Err(e) = bus.publish(event).await {
                    warn!("Viewer count subscriber failed: {}", e);
                }
            }
            Ok(FeedLine::Chat(msg)) if msg.text.trim().is_empty() => {
                debug!("Skipping empty message from {}", msg.username);
                stats.skipped += 1;
            }
            Ok(FeedLine::Chat(msg)) => {
                stats.messages += 1;
                if let Err(e) = ingestor.ingest(msg).await {
                    warn!("Chat subscriber failed: {}", e);
                }
            }
            Err(e) => {
                warn!("Skipping malformed feed line ({}): {}", e, truncate(line, 100));
                stats.skipped += 1;
            }
        }
    }
    stats
}
