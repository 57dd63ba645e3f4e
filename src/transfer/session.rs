//! State of the single in-flight transfer.

use super::error::RejectReason;
use super::wire::{DataFrame, MetaFrame, NAME_MAX};
use chrono::{DateTime, Utc};
use crc::{Crc, Digest, CRC_32_ISO_HDLC};

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// CRC-32 (ISO-HDLC) of `data`, the same digest a session keeps of its payload.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// One file transfer, created by a META frame and advanced by DATA frames.
///
/// Fields only change through [`TransferSession::commit`], which runs after
/// every check for a frame has passed.
pub struct TransferSession {
    file_id: u32,
    total_size: u32,
    chunk_hint: u16,
    received: u32,
    expected_seq: u32,
    name: String,
    active: bool,
    digest: Digest<'static, u32>,
    started_at: DateTime<Utc>,
}

impl std::fmt::Debug for TransferSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferSession")
            .field("file_id", &format_args!("0x{:08x}", self.file_id))
            .field("total_size", &self.total_size)
            .field("chunk_hint", &self.chunk_hint)
            .field("received", &self.received)
            .field("expected_seq", &self.expected_seq)
            .field("name", &self.name)
            .field("active", &self.active)
            .finish()
    }
}

impl TransferSession {
    /// Fresh, active session for an already validated META frame.
    pub fn from_meta(meta: &MetaFrame<'_>) -> Self {
        Self {
            file_id: meta.file_id,
            total_size: meta.total_size,
            chunk_hint: meta.chunk_hint,
            received: 0,
            expected_seq: 0,
            name: bounded_name(meta.name),
            active: true,
            digest: CRC32.digest(),
            started_at: Utc::now(),
        }
    }

    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    pub fn total_size(&self) -> u32 {
        self.total_size
    }

    /// Advisory only; DATA payloads are not checked against it.
    pub fn chunk_hint(&self) -> u16 {
        self.chunk_hint
    }

    pub fn received(&self) -> u32 {
        self.received
    }

    pub fn expected_seq(&self) -> u32 {
        self.expected_seq
    }

    /// Write offset into the sink. Always equal to `received`.
    pub fn cursor(&self) -> u32 {
        self.received
    }

    pub fn remaining(&self) -> u32 {
        self.total_size - self.received
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// CRC-32 of the payload accepted so far.
    pub fn crc32(&self) -> u32 {
        self.digest.clone().finalize()
    }

    /// Identity, ordering and capacity checks for a DATA frame, in that order.
    pub fn check(&self, data: &DataFrame<'_>, sink_capacity: u32) -> Result<(), RejectReason> {
        if data.file_id != self.file_id {
            return Err(RejectReason::StaleOrForeignFrame {
                expected: self.file_id,
                got: data.file_id,
            });
        }
        if data.seq != self.expected_seq {
            return Err(RejectReason::OutOfOrder {
                expected: self.expected_seq,
                got: data.seq,
            });
        }
        let end = self.received as u64 + data.payload.len() as u64;
        let limit = self.total_size.min(sink_capacity) as u64;
        if end > limit {
            return Err(RejectReason::CapacityExceeded {
                requested: end,
                limit,
            });
        }
        Ok(())
    }

    /// Account for an accepted payload. Returns true when the transfer is complete.
    pub fn commit(&mut self, payload: &[u8]) -> bool {
        self.digest.update(payload);
        // `check` bounded this by total_size, so it cannot wrap.
        self.received += payload.len() as u32;
        self.expected_seq = self.expected_seq.wrapping_add(1);
        if self.received == self.total_size {
            self.active = false;
        }
        !self.active
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }
}

/// Name up to the first NUL, capped at [`NAME_MAX`] bytes. Invalid UTF-8 is
/// replaced rather than rejected.
fn bounded_name(raw: &[u8]) -> String {
    let raw = &raw[..raw.len().min(NAME_MAX)];
    let raw = raw.split(|&b| b == 0).next().unwrap_or_default();
    String::from_utf8_lossy(raw).into_owned()
}
