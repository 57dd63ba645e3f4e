//! Receive loop: polls the byte source, feeds the protocol and answers the sender.
//!
//! The loop is the only owner of the [`Receiver`]. Each byte is fully processed
//! (decode, dispatch, optional status reply) before the next one is polled; the
//! loop only yields to the runtime when the source has nothing to offer.

use crate::link::{ByteSource, Responder};
use crate::metrics::Stats;
use crate::transfer::{CompletedTransfer, Dispatch, Receiver, Sink};
use anyhow::{anyhow, Result};
use log::{debug, info};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Bytes processed before the loop checks for shutdown again.
const BURST: usize = 4096;

/// Result of a single poll of the byte source.
#[derive(Debug, PartialEq, Eq)]
pub enum Poll {
    /// A byte was consumed; carries the dispatch if it closed a frame.
    Byte(Option<DispatchSummary>),
    /// Nothing available right now.
    Idle,
    /// The source will never produce more bytes.
    Exhausted,
}

/// Condensed view of a [`Dispatch`] for callers of [`ReceiveServer::poll_once`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchSummary {
    Ignored,
    Accepted,
    Completed(CompletedTransfer),
    Rejected(&'static str),
}

impl From<&Dispatch> for DispatchSummary {
    fn from(d: &Dispatch) -> Self {
        match d {
            Dispatch::Ignored => DispatchSummary::Ignored,
            Dispatch::Meta(Err(r)) | Dispatch::Data(Err(r)) => DispatchSummary::Rejected(r.label()),
            _ => match d.completed() {
                Some(done) => DispatchSummary::Completed(done.clone()),
                None => DispatchSummary::Accepted,
            },
        }
    }
}

/// Totals printed when the loop stops.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub bytes_polled: u64,
    pub stats: Stats,
    pub completed: Vec<CompletedTransfer>,
}

pub struct ReceiveServer<B, R, S: Sink> {
    source: B,
    responder: R,
    receiver: Receiver<S>,
    flow_control: bool,
    idle_sleep: Duration,
    bytes_polled: u64,
    completed: Vec<CompletedTransfer>,
}

impl<B: ByteSource, R: Responder, S: Sink> ReceiveServer<B, R, S> {
    pub fn new(source: B, responder: R, receiver: Receiver<S>) -> Self {
        Self {
            source,
            responder,
            receiver,
            flow_control: false,
            idle_sleep: Duration::from_millis(5),
            bytes_polled: 0,
            completed: Vec::new(),
        }
    }

    /// Send `ACK`/`END`/`BAD` after each processed META or DATA frame.
    pub fn with_flow_control(mut self, enabled: bool) -> Self {
        self.flow_control = enabled;
        self
    }

    pub fn with_idle_sleep(mut self, idle: Duration) -> Self {
        self.idle_sleep = idle;
        self
    }

    pub fn receiver(&self) -> &Receiver<S> {
        &self.receiver
    }

    pub fn responder(&self) -> &R {
        &self.responder
    }

    pub fn completed(&self) -> &[CompletedTransfer] {
        &self.completed
    }

    pub fn into_parts(self) -> (B, R, Receiver<S>) {
        (self.source, self.responder, self.receiver)
    }

    /// Poll the source once and process the byte, if any.
    pub fn poll_once(&mut self) -> Result<Poll> {
        let byte = match self.source.poll_byte() {
            Ok(Some(b)) => b,
            Ok(None) if self.source.is_exhausted() => return Ok(Poll::Exhausted),
            Ok(None) => return Ok(Poll::Idle),
            Err(e) => return Err(anyhow!("Link read error: {}", e)),
        };
        self.bytes_polled += 1;
        let Some(dispatch) = self.receiver.feed(byte) else {
            return Ok(Poll::Byte(None));
        };
        if self.flow_control {
            if let Some(status) = dispatch.response() {
                self.responder
                    .send_all(status.as_bytes())
                    .map_err(|e| anyhow!("Failed to send {:?}: {}", status, e))?;
            }
        }
        if let Some(done) = dispatch.completed() {
            self.completed.push(done.clone());
        }
        Ok(Poll::Byte(Some(DispatchSummary::from(&dispatch))))
    }

    /// Run until the source is exhausted or `shutdown` resolves.
    pub async fn run_until<F: Future>(&mut self, shutdown: F) -> Result<RunSummary> {
        tokio::pin!(shutdown);
        loop {
            let mut idle = false;
            for _ in 0..BURST {
                match self.poll_once()? {
                    Poll::Byte(_) => {}
                    Poll::Idle => {
                        idle = true;
                        break;
                    }
                    Poll::Exhausted => {
                        debug!("Byte source exhausted after {} bytes", self.bytes_polled);
                        return Ok(self.summary());
                    }
                }
            }
            let pause = if idle { self.idle_sleep } else { Duration::ZERO };
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping receive loop");
                    return Ok(self.summary());
                }
                _ = sleep(pause) => {}
            }
        }
    }

    /// Run until the source is exhausted or Ctrl-C.
    pub async fn run(&mut self) -> Result<RunSummary> {
        self.run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            bytes_polled: self.bytes_polled,
            stats: self.receiver.stats().clone(),
            completed: self.completed.clone(),
        }
    }
}
