//! Probe event ingestion
//!
//! Agents connect over TCP and write one event per line. Every connection is
//! read by its own task; all lines funnel into one bounded channel drained by
//! a single routing worker.

use crate::services::message_router::MessageRouter;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub type RawEvent = Vec<u8>;

const ACCEPT_RETRY_BASE: Duration = Duration::from_millis(10);
const ACCEPT_RETRY_MAX: Duration = Duration::from_secs(1);

/// Pause before the next accept after `failures` consecutive accept errors
fn accept_backoff(failures: u32) -> Duration {
    let factor = 1u32 << failures.saturating_sub(1).min(7);
    ACCEPT_RETRY_BASE.saturating_mul(factor).min(ACCEPT_RETRY_MAX)
}

pub struct ProbeListener {
    listener: TcpListener,
}

impl ProbeListener {
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Probe listener bound on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept agent connections until the event channel closes
    pub async fn run(self, events: mpsc::Sender<RawEvent>) {
        let mut failures = 0u32;
        loop {
            let (stream, peer) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        let pause = accept_backoff(failures);
                        warn!(failures, pause_ms = pause.as_millis() as u64, "Failed to accept probe connection: {}", e);
                        tokio::select! {
                            _ = tokio::time::sleep(pause) => continue,
                            _ = events.closed() => break,
                        }
                    },
                },
                _ = events.closed() => break,
            };
            failures = 0;

            debug!(%peer, "Agent connected");
            let events = events.clone();
            tokio::spawn(async move {
                match read_events(stream, &events).await {
                    Ok(lines) => debug!(%peer, lines, "Agent disconnected"),
                    Err(e) => warn!(%peer, "Probe connection failed: {}", e),
                }
            });
        }
        info!("Probe listener stopped");
    }
}

/// Forward every non-empty line of `reader`; a full channel pauses reading
pub async fn read_events<R>(reader: R, events: &mpsc::Sender<RawEvent>) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);
    let mut lines = 0u64;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(lines);
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        if buf.is_empty() {
            continue;
        }
        if events.send(buf.clone()).await.is_err() {
            return Ok(lines);
        }
        lines += 1;
    }
}

/// Routing worker: process each event to completion, in arrival order
pub async fn run_router_loop(router: Arc<MessageRouter>, mut events: mpsc::Receiver<RawEvent>) -> u64 {
    let mut routed = 0u64;
    while let Some(raw) = events.recv().await {
        routed += 1;
        if let Err(e) = router.route(&raw).await {
            warn!(error_code = e.error_code(), "Dropping probe event: {}", e);
        }
    }
    info!(routed, "Routing worker stopped");
    routed
}
