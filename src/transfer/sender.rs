//! Host side of the link: turns a file into META + DATA frames.
//!
//! With flow control the sender waits for a status after every frame and
//! resends the same frame (same `seq`) on `BAD` or silence, up to
//! `max_retries` times.

use super::error::SendError;
use super::session::crc32;
use super::wire::{DataFrame, MetaFrame, META_VERSION, NAME_MAX};
use super::Response;
use crate::link::slip::slip_encode;
use crate::link::ByteSource;
use log::{debug, info, warn};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

pub const MIN_CHUNK: usize = 64;
pub const MAX_CHUNK: usize = 4096;

/// Chunk sizes outside 64..=4096 are clamped.
pub fn clamp_chunk(chunk: usize) -> usize {
    chunk.clamp(MIN_CHUNK, MAX_CHUNK)
}

#[derive(Debug, Clone)]
pub struct SenderOptions {
    pub chunk: usize,
    pub flow_control: bool,
    pub ack_timeout: Duration,
    pub max_retries: u32,
}

impl Default for SenderOptions {
    fn default() -> Self {
        Self {
            chunk: 1024,
            flow_control: true,
            ack_timeout: Duration::from_millis(2000),
            max_retries: 3,
        }
    }
}

/// Summary of a finished send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendReport {
    pub file_id: u32,
    pub size: u32,
    pub frames: u32,
    pub retransmissions: u32,
    pub crc32: u32,
}

/// One unescaped frame of a transfer and its DATA sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutFrame {
    pub seq: Option<u32>,
    pub bytes: Vec<u8>,
}

/// META followed by DATA frames `0, 1, 2, ...` for `data`.
///
/// An empty file still gets one empty DATA frame so the receiver sees the
/// transfer complete.
pub fn transfer_frames(
    name: &str,
    data: &[u8],
    file_id: u32,
    chunk: usize,
) -> Result<Vec<OutFrame>, SendError> {
    let size = u32::try_from(data.len()).map_err(|_| SendError::TooLarge(data.len() as u64))?;
    let chunk = clamp_chunk(chunk);
    let name = truncate_name(name);
    let mut frames = Vec::with_capacity(data.len() / chunk + 2);
    frames.push(OutFrame {
        seq: None,
        bytes: MetaFrame {
            version: META_VERSION,
            file_id,
            total_size: size,
            chunk_hint: chunk as u16,
            name: name.as_bytes(),
        }
        .encode(),
    });
    let chunks: Vec<&[u8]> = if data.is_empty() {
        vec![data]
    } else {
        data.chunks(chunk).collect()
    };
    for (seq, payload) in chunks.into_iter().enumerate() {
        let seq = seq as u32;
        frames.push(OutFrame {
            seq: Some(seq),
            bytes: DataFrame {
                file_id,
                seq,
                payload,
            }
            .encode(),
        });
    }
    Ok(frames)
}

/// The SLIP byte stream a no-flow-control send would put on the wire.
pub fn encode_transfer(
    name: &str,
    data: &[u8],
    file_id: u32,
    chunk: usize,
) -> Result<Vec<u8>, SendError> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 16 + 64);
    for frame in transfer_frames(name, data, file_id, chunk)? {
        out.extend_from_slice(&slip_encode(&frame.bytes));
    }
    Ok(out)
}

/// Cut at a char boundary so the name fits the one-byte length field.
fn truncate_name(name: &str) -> &str {
    if name.len() <= NAME_MAX {
        return name;
    }
    let mut cut = NAME_MAX;
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }
    &name[..cut]
}

pub struct Sender<L> {
    link: L,
    opts: SenderOptions,
}

impl<L: ByteSource + Write> Sender<L> {
    pub fn new(link: L, opts: SenderOptions) -> Self {
        Self { link, opts }
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn into_inner(self) -> L {
        self.link
    }

    /// Send the file at `path` under its base name with a random file id.
    pub fn send_file(&mut self, path: &Path) -> Result<SendReport, SendError> {
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.send_bytes(&name, &data, rand::random::<u32>())
    }

    pub fn send_bytes(
        &mut self,
        name: &str,
        data: &[u8],
        file_id: u32,
    ) -> Result<SendReport, SendError> {
        let frames = transfer_frames(name, data, file_id, self.opts.chunk)?;
        let total = data.len();
        info!(
            "[META] fid=0x{:08x} size={} chunk={} name={}",
            file_id,
            total,
            clamp_chunk(self.opts.chunk),
            crate::logutil::escape_log(name)
        );

        let started = Instant::now();
        let mut sent_bytes = 0usize;
        let mut retransmissions = 0u32;
        for frame in &frames {
            retransmissions += self.send_frame(frame)?;
            if let Some(seq) = frame.seq {
                sent_bytes = (sent_bytes + clamp_chunk(self.opts.chunk)).min(total);
                if (seq + 1) % 16 == 0 || sent_bytes == total {
                    debug!("[DATA] {}/{} bytes sent", sent_bytes, total);
                }
            }
        }

        let secs = started.elapsed().as_secs_f64().max(1e-9);
        let report = SendReport {
            file_id,
            size: total as u32,
            frames: frames.len() as u32 - 1,
            retransmissions,
            crc32: crc32(data),
        };
        info!(
            "[DONE] {} bytes in {:.3}s ({:.1} KB/s, frames={}, resent={}) crc32=0x{:08x}",
            total,
            secs,
            total as f64 / 1024.0 / secs,
            report.frames,
            report.retransmissions,
            report.crc32
        );
        Ok(report)
    }

    /// Write one frame, retrying per the options. Returns the retransmission count.
    fn send_frame(&mut self, frame: &OutFrame) -> Result<u32, SendError> {
        let encoded = slip_encode(&frame.bytes);
        let mut attempt = 0u32;
        loop {
            self.link.write_all(&encoded)?;
            self.link.flush()?;
            if !self.opts.flow_control {
                return Ok(0);
            }
            match self.wait_status()? {
                Some(Response::Ack) | Some(Response::Done) => return Ok(attempt),
                status => {
                    if attempt >= self.opts.max_retries {
                        return Err(match status {
                            None => SendError::AckTimeout(self.opts.ack_timeout.as_millis() as u64),
                            Some(_) => SendError::Rejected {
                                seq: frame.seq,
                                attempts: attempt + 1,
                            },
                        });
                    }
                    attempt += 1;
                    warn!(
                        "No acceptance for seq {:?} ({:?}), resending (attempt {})",
                        frame.seq,
                        status,
                        attempt + 1
                    );
                }
            }
        }
    }

    /// Scan incoming bytes for a status word until the ack timeout expires.
    fn wait_status(&mut self) -> Result<Option<Response>, SendError> {
        let deadline = Instant::now() + self.opts.ack_timeout;
        let mut window: Vec<u8> = Vec::with_capacity(3);
        loop {
            match self.link.poll_byte()? {
                Some(b) => {
                    if window.len() == 3 {
                        window.remove(0);
                    }
                    window.push(b);
                    if let Some(status) = Response::from_window(&window) {
                        return Ok(Some(status));
                    }
                }
                None => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::slip::SlipDecoder;

    #[test]
    fn frames_cover_data_in_order() {
        let data: Vec<u8> = (0..200u8).collect();
        let frames = transfer_frames("f.bin", &data, 7, 64).unwrap();
        assert_eq!(frames.len(), 1 + 4);
        assert_eq!(frames[0].seq, None);
        let meta = MetaFrame::parse(&frames[0].bytes).unwrap();
        assert_eq!((meta.file_id, meta.total_size, meta.chunk_hint), (7, 200, 64));
        assert_eq!(meta.name, b"f.bin");
        let mut joined = Vec::new();
        for (i, f) in frames[1..].iter().enumerate() {
            let d = DataFrame::parse(&f.bytes).unwrap();
            assert_eq!(d.seq, i as u32);
            assert_eq!(f.seq, Some(i as u32));
            joined.extend_from_slice(d.payload);
        }
        assert_eq!(joined, data);
    }

    #[test]
    fn empty_file_gets_single_empty_data_frame() {
        let frames = transfer_frames("e", &[], 1, 1024).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(DataFrame::parse(&frames[1].bytes).unwrap().payload.is_empty());
    }

    #[test]
    fn chunk_is_clamped() {
        assert_eq!(clamp_chunk(1), MIN_CHUNK);
        assert_eq!(clamp_chunk(100_000), MAX_CHUNK);
        assert_eq!(clamp_chunk(512), 512);
    }

    #[test]
    fn long_names_are_cut_on_char_boundary() {
        let name = "é".repeat(200); // 400 bytes
        let cut = truncate_name(&name);
        assert!(cut.len() <= NAME_MAX);
        assert_eq!(cut.len() % 2, 0);
    }

    #[test]
    fn encoded_stream_decodes_back_to_frames() {
        let data = vec![0xC0, 0xDB, 0x00, 0xC0];
        let stream = encode_transfer("x", &data, 3, 64).unwrap();
        let mut dec = SlipDecoder::new();
        let frames = dec.push(&stream);
        assert_eq!(frames.len(), 2);
        assert_eq!(DataFrame::parse(&frames[1]).unwrap().payload, &data[..]);
    }
}
