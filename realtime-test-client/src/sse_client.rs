use anyhow::Result;
use eventsource_client::{self as es, Client};
use futures_util::stream::StreamExt;
use log::*;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// One parsed frame off the stream. Frames are data-only JSON carrying
/// their own `kind` discriminator and per-connection `sequence`, so there
/// is no `event:` field to switch on.
#[derive(Debug, Clone, Deserialize)]
pub struct Frame {
    pub kind: String,
    pub sequence: u64,
    /// Absent on heartbeats.
    #[serde(default)]
    pub payload: Value,
    /// Stamped as the frame is parsed off the wire.
    #[serde(skip, default = "Instant::now")]
    pub received_at: Instant,
}

pub struct Connection {
    pub client_label: String,
    frame_rx: mpsc::UnboundedReceiver<Frame>,
    _handle: tokio::task::JoinHandle<()>,
}

impl Connection {
    pub async fn establish(base_url: &str, identity: &str, client_label: String) -> Result<Self> {
        let url = format!("{}/sse?identity={}", base_url, identity);
        let (tx, rx) = mpsc::unbounded_channel();

        let client = es::ClientBuilder::for_url(&url)?.build();

        let label = client_label.clone();
        let handle = tokio::spawn(async move {
            let mut stream = client.stream();

            loop {
                match stream.next().await {
                    Some(Ok(es::SSE::Event(event))) => {
                        if let Ok(frame) = serde_json::from_str::<Frame>(&event.data) {
                            if tx.send(frame).is_err() {
                                debug!("Frame receiver dropped for {}", label);
                                break;
                            }
                        }
                    }
                    Some(Ok(es::SSE::Comment(_))) => {
                        // Nothing rides on comments; heartbeats arrive as
                        // sequenced frames like everything else.
                    }
                    Some(Err(e)) => {
                        warn!("Stream error for {}: {}", label, e);
                    }
                    None => {
                        debug!("Stream ended for {}", label);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            client_label,
            frame_rx: rx,
            _handle: handle,
        })
    }

    /// Wait for the next frame of the given kind, skipping frames of other
    /// kinds (heartbeats, stale notifications).
    pub async fn wait_for_kind(&mut self, kind: &str, timeout: Duration) -> Result<Frame> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                anyhow::bail!("Timeout waiting for {} frame", kind);
            }

            match tokio::time::timeout(remaining, self.frame_rx.recv()).await {
                Ok(Some(frame)) if frame.kind == kind => {
                    return Ok(frame);
                }
                Ok(Some(_)) => {
                    // Wrong kind, keep waiting
                    continue;
                }
                Ok(None) => {
                    anyhow::bail!("Stream connection closed");
                }
                Err(_) => {
                    anyhow::bail!("Timeout waiting for {} frame", kind);
                }
            }
        }
    }

    /// Discard everything already buffered, so the next wait only observes
    /// frames caused by the current scenario.
    pub fn drain(&mut self) {
        while self.frame_rx.try_recv().is_ok() {}
    }
}
