//! Test utilities & fixtures.
//! Builders for raw META/DATA frames and SLIP-encoded link streams.

use slipxfer::link::slip::slip_encode;
use slipxfer::transfer::{DataFrame, MetaFrame};
use std::collections::VecDeque;

pub fn meta(file_id: u32, total_size: u32, name: &str) -> Vec<u8> {
    MetaFrame {
        version: 1,
        file_id,
        total_size,
        chunk_hint: 2,
        name: name.as_bytes(),
    }
    .encode()
}

pub fn data(file_id: u32, seq: u32, payload: &[u8]) -> Vec<u8> {
    DataFrame {
        file_id,
        seq,
        payload,
    }
    .encode()
}

/// SLIP-encode each frame back to back, as they would arrive on the link.
#[allow(dead_code)] // Not every test binary replays a full stream.
pub fn wire(frames: &[Vec<u8>]) -> VecDeque<u8> {
    frames.iter().flat_map(|f| slip_encode(f)).collect()
}

/// Split a reply stream into its 3-byte status words.
#[allow(dead_code)]
pub fn statuses(replies: &[u8]) -> Vec<String> {
    replies
        .chunks(3)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect()
}
