//! # slipxfer - File Transfer over SLIP-framed Serial Links
//!
//! slipxfer moves a single named file across a slow serial link. The sender
//! announces the file with a META frame and streams it as numbered DATA frames;
//! the receiver recovers frame boundaries with SLIP, checks each frame and
//! rebuilds the file byte for byte.
//!
//! ## Features
//!
//! - **SLIP Decoding**: Byte-at-a-time decoder that drops oversized frames whole
//! - **Strict Reassembly**: One session at a time, DATA accepted only in exact sequence
//! - **Fail-closed Validation**: Every check runs before any state changes
//! - **Flow Control**: Optional `ACK`/`END`/`BAD` replies for stop-and-wait senders
//! - **Sinks**: Fixed memory region or atomically renamed files on disk
//! - **Sender**: Host-side tool with retransmission on `BAD` or silence
//!
//! ## Quick Start
//!
//! ```rust
//! use slipxfer::link::slip::slip_encode;
//! use slipxfer::transfer::{DataFrame, MemorySink, MetaFrame, Receiver};
//!
//! let mut rx = Receiver::new(MemorySink::new(64));
//! let meta = MetaFrame { version: 1, file_id: 9, total_size: 3, chunk_hint: 3, name: b"hi.txt" };
//! let data = DataFrame { file_id: 9, seq: 0, payload: b"hey" };
//!
//! let mut wire = slip_encode(&meta.encode());
//! wire.extend(slip_encode(&data.encode()));
//! for b in wire {
//!     rx.feed(b);
//! }
//! assert_eq!(rx.sink().contents(), b"hey");
//! assert!(!rx.is_active());
//! ```
//!
//! ## Module Organization
//!
//! - [`link`] - SLIP codec, byte sources and responders (serial port, readers)
//! - [`transfer`] - Wire formats, session state, sinks, receiver and sender
//! - [`server`] - Polling loop tying a byte source to a receiver
//! - [`config`] - Configuration loading and validation
//! - [`metrics`] - Receive counters
//! - [`logutil`] - Log sanitising helpers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  ReceiveServer  │ ← polling loop, status replies
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │    Receiver     │ ← SLIP decode, dispatch, session
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │      Sink       │ ← memory region or file
//! └─────────────────┘
//! ```

pub mod config;
pub mod link;
pub mod logutil;
pub mod metrics;
pub mod server;
pub mod transfer;
