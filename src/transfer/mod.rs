//! # Transfer Protocol Module
//!
//! Reassembles one file from a stream of SLIP frames: a META frame opens a
//! session, DATA frames fill it strictly in sequence, and the session closes
//! once the declared size has arrived.
//!
//! ## Flow
//!
//! ```text
//! byte ──► SlipDecoder ──► Receiver::dispatch ──┬─► on_meta ──► TransferSession (replace)
//!                                               └─► on_data ──► Sink::write ──► Sink::finalize
//! ```
//!
//! ## Rejections
//!
//! Every problem with a single frame ([`RejectReason`]) drops just that frame.
//! All checks for a frame run before any state changes, so a rejected frame
//! leaves the session exactly as it was. Only a failing [`Sink`] ends the
//! session early.
//!
//! ## Usage
//!
//! ```rust
//! use slipxfer::transfer::{DataFrame, MemorySink, MetaFrame, Receiver};
//!
//! let mut rx = Receiver::new(MemorySink::new(1024));
//! let meta = MetaFrame { version: 1, file_id: 1, total_size: 2, chunk_hint: 2, name: b"a" };
//! rx.on_meta(&meta.encode()).unwrap();
//! let data = DataFrame { file_id: 1, seq: 0, payload: &[7, 8] };
//! rx.on_data(&data.encode()).unwrap();
//! assert_eq!(rx.sink().contents(), &[7, 8]);
//! ```

pub mod error;
pub mod sender;
pub mod session;
pub mod sink;
pub mod wire;

pub use error::{RejectReason, SendError, SinkError};
pub use sender::{Sender, SenderOptions};
pub use session::TransferSession;
pub use sink::{FileSink, MemorySink, Sink};
pub use wire::{DataFrame, MetaFrame};

use crate::link::slip::{DecoderState, SlipDecoder, DEFAULT_MAX_FRAME};
use crate::logutil::{escape_log, hex_snippet};
use crate::metrics::Stats;
use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use serde::Serialize;
use std::path::PathBuf;
use wire::{TYPE_DATA, TYPE_META};

/// Three-byte status sent back to a flow-controlled sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Frame accepted, more expected.
    Ack,
    /// Frame accepted and the transfer is complete.
    Done,
    /// Frame rejected.
    Bad,
}

impl Response {
    pub const fn as_bytes(self) -> &'static [u8; 3] {
        match self {
            Response::Ack => b"ACK",
            Response::Done => b"END",
            Response::Bad => b"BAD",
        }
    }

    /// Match the last three bytes seen on the link.
    pub fn from_window(window: &[u8]) -> Option<Self> {
        match window {
            b"ACK" => Some(Response::Ack),
            b"END" => Some(Response::Done),
            b"BAD" => Some(Response::Bad),
            _ => None,
        }
    }
}

/// Completion signal, produced exactly once per transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedTransfer {
    pub file_id: u32,
    pub name: String,
    pub size: u32,
    pub crc32: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Final path when the sink writes to disk.
    pub location: Option<PathBuf>,
}

/// Result of an accepted DATA frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Accepted { seq: u32, received: u32 },
    Complete(CompletedTransfer),
}

/// What happened to one decoded frame.
#[derive(Debug)]
pub enum Dispatch {
    /// Empty frame or unknown type byte.
    Ignored,
    Meta(Result<(), RejectReason>),
    Data(Result<Progress, RejectReason>),
}

impl Dispatch {
    /// Status to send back when flow control is enabled.
    pub fn response(&self) -> Option<Response> {
        match self {
            Dispatch::Ignored => None,
            Dispatch::Meta(Ok(())) => Some(Response::Ack),
            Dispatch::Data(Ok(Progress::Accepted { .. })) => Some(Response::Ack),
            Dispatch::Data(Ok(Progress::Complete(_))) => Some(Response::Done),
            Dispatch::Meta(Err(_)) | Dispatch::Data(Err(_)) => Some(Response::Bad),
        }
    }

    pub fn completed(&self) -> Option<&CompletedTransfer> {
        match self {
            Dispatch::Data(Ok(Progress::Complete(done))) => Some(done),
            _ => None,
        }
    }
}

/// Protocol context: decoder, the single session and the sink it writes to.
///
/// Owned by the polling loop; nothing here is global.
pub struct Receiver<S: Sink> {
    decoder: SlipDecoder,
    session: Option<TransferSession>,
    sink: S,
    stats: Stats,
}

impl<S: Sink> Receiver<S> {
    pub fn new(sink: S) -> Self {
        Self::with_max_frame(sink, DEFAULT_MAX_FRAME)
    }

    pub fn with_max_frame(sink: S, max_frame: usize) -> Self {
        Self {
            decoder: SlipDecoder::with_capacity(max_frame),
            session: None,
            sink,
            stats: Stats::default(),
        }
    }

    /// Current or most recent session. Inactive once complete or failed.
    pub fn session(&self) -> Option<&TransferSession> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_active())
    }

    pub fn decoder_state(&self) -> DecoderState {
        self.decoder.state()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Feed one raw link byte. Returns the dispatch result when it closes a frame.
    pub fn feed(&mut self, byte: u8) -> Option<Dispatch> {
        match self.decoder.feed(byte) {
            Ok(Some(frame)) => {
                self.stats.frames_decoded += 1;
                trace!("SLIP frame {} bytes: {}", frame.len(), hex_snippet(&frame, 24));
                Some(self.dispatch(&frame))
            }
            Ok(None) => None,
            Err(e) => {
                warn!("{}", e);
                self.stats.record_reject(&RejectReason::FramingOverflow);
                None
            }
        }
    }

    /// Route a decoded frame by its type byte.
    pub fn dispatch(&mut self, frame: &[u8]) -> Dispatch {
        let Some(&kind) = frame.first() else {
            return Dispatch::Ignored;
        };
        let outcome = match kind {
            TYPE_META => Dispatch::Meta(self.on_meta(frame)),
            TYPE_DATA => Dispatch::Data(self.on_data(frame)),
            other => {
                trace!("Ignoring frame type 0x{:02x}", other);
                Dispatch::Ignored
            }
        };
        self.record(&outcome);
        outcome
    }

    fn record(&mut self, outcome: &Dispatch) {
        match outcome {
            Dispatch::Ignored => self.stats.frames_ignored += 1,
            Dispatch::Meta(Ok(())) => self.stats.meta_accepted += 1,
            Dispatch::Data(Ok(progress)) => {
                self.stats.data_accepted += 1;
                if let Progress::Complete(done) = progress {
                    self.stats.transfers_completed += 1;
                    self.stats.payload_bytes += u64::from(done.size);
                }
            }
            Dispatch::Meta(Err(reason)) | Dispatch::Data(Err(reason)) => {
                self.stats.record_reject(reason);
                if reason.is_fatal() {
                    error!("Transfer aborted: {}", reason);
                } else {
                    debug!("Frame rejected: {}", reason);
                }
            }
        }
    }

    /// Start a new session from a META frame, replacing any previous one.
    pub fn on_meta(&mut self, frame: &[u8]) -> Result<(), RejectReason> {
        let meta = MetaFrame::parse(frame)?;
        let capacity = self.sink.capacity();
        if meta.total_size > capacity {
            return Err(RejectReason::CapacityExceeded {
                requested: u64::from(meta.total_size),
                limit: u64::from(capacity),
            });
        }

        let session = TransferSession::from_meta(&meta);
        if let Some(prev) = self.session.as_ref().filter(|s| s.is_active()) {
            info!(
                "Transfer 0x{:08x} superseded at {}/{} bytes",
                prev.file_id(),
                prev.received(),
                prev.total_size()
            );
        }
        if let Err(e) = self
            .sink
            .begin(session.file_id(), session.name(), session.total_size())
        {
            self.session = None;
            return Err(e.into());
        }
        info!(
            "META file_id=0x{:08x} size={} chunk={} name={}",
            session.file_id(),
            session.total_size(),
            session.chunk_hint(),
            escape_log(session.name())
        );
        self.session = Some(session);
        Ok(())
    }

    /// Append a DATA frame to the active session.
    pub fn on_data(&mut self, frame: &[u8]) -> Result<Progress, RejectReason> {
        let session = match self.session.as_mut() {
            Some(s) if s.is_active() => s,
            _ => return Err(RejectReason::NoActiveSession),
        };
        let data = DataFrame::parse(frame)?;
        session.check(&data, self.sink.capacity())?;

        if let Err(e) = self.sink.write(session.cursor(), data.payload) {
            session.deactivate();
            self.sink.abort();
            return Err(e.into());
        }
        if !session.commit(data.payload) {
            trace!(
                "DATA seq={} len={} ({}/{})",
                data.seq,
                data.payload.len(),
                session.received(),
                session.total_size()
            );
            return Ok(Progress::Accepted {
                seq: data.seq,
                received: session.received(),
            });
        }

        let location = self.sink.finalize()?;
        let done = CompletedTransfer {
            file_id: session.file_id(),
            name: session.name().to_string(),
            size: session.received(),
            crc32: session.crc32(),
            started_at: session.started_at(),
            completed_at: Utc::now(),
            location,
        };
        info!(
            "Transfer 0x{:08x} complete: {} bytes crc32=0x{:08x} name={}",
            done.file_id,
            done.size,
            done.crc32,
            escape_log(&done.name)
        );
        Ok(Progress::Complete(done))
    }
}
