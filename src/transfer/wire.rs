//! Byte-exact META / DATA frame layouts (all multi-byte fields little-endian).
//!
//! ```text
//! META: 0x01 version:u8 file_id:u32 total_size:u32 chunk_hint:u16 name_len:u8 name[name_len]
//! DATA: 0x02 file_id:u32 seq:u32 payload_len:u16 payload[payload_len]
//! ```

use super::error::RejectReason;

pub const TYPE_META: u8 = 0x01;
pub const TYPE_DATA: u8 = 0x02;

/// Version byte written by our sender. Ignored on receive.
pub const META_VERSION: u8 = 1;

pub const META_HEADER_LEN: usize = 13;
pub const DATA_HEADER_LEN: usize = 11;

/// Longest name the one-byte length field can carry.
pub const NAME_MAX: usize = u8::MAX as usize;

#[inline]
fn rd16(p: &[u8]) -> u16 {
    u16::from_le_bytes([p[0], p[1]])
}

#[inline]
fn rd32(p: &[u8]) -> u32 {
    u32::from_le_bytes([p[0], p[1], p[2], p[3]])
}

/// Parsed META frame borrowing its name from the frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaFrame<'a> {
    pub version: u8,
    pub file_id: u32,
    pub total_size: u32,
    pub chunk_hint: u16,
    pub name: &'a [u8],
}

impl<'a> MetaFrame<'a> {
    /// Checks the fixed header and that the declared name fits inside the frame.
    pub fn parse(frame: &'a [u8]) -> Result<Self, RejectReason> {
        if frame.len() < META_HEADER_LEN {
            return Err(RejectReason::MalformedHeader {
                len: frame.len(),
                min: META_HEADER_LEN,
            });
        }
        let name_len = frame[12] as usize;
        let available = frame.len() - META_HEADER_LEN;
        if name_len > available {
            return Err(RejectReason::LengthMismatch {
                declared: name_len,
                available,
            });
        }
        Ok(Self {
            version: frame[1],
            file_id: rd32(&frame[2..]),
            total_size: rd32(&frame[6..]),
            chunk_hint: rd16(&frame[10..]),
            name: &frame[META_HEADER_LEN..META_HEADER_LEN + name_len],
        })
    }

    /// Unescaped frame bytes. Names longer than [`NAME_MAX`] are truncated.
    pub fn encode(&self) -> Vec<u8> {
        let name = &self.name[..self.name.len().min(NAME_MAX)];
        let mut out = Vec::with_capacity(META_HEADER_LEN + name.len());
        out.push(TYPE_META);
        out.push(self.version);
        out.extend_from_slice(&self.file_id.to_le_bytes());
        out.extend_from_slice(&self.total_size.to_le_bytes());
        out.extend_from_slice(&self.chunk_hint.to_le_bytes());
        out.push(name.len() as u8);
        out.extend_from_slice(name);
        out
    }
}

/// Parsed DATA frame borrowing its payload from the frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFrame<'a> {
    pub file_id: u32,
    pub seq: u32,
    pub payload: &'a [u8],
}

impl<'a> DataFrame<'a> {
    /// Checks the fixed header and that the declared payload fits inside the
    /// frame. Bytes past the declared payload are ignored.
    pub fn parse(frame: &'a [u8]) -> Result<Self, RejectReason> {
        if frame.len() < DATA_HEADER_LEN {
            return Err(RejectReason::MalformedHeader {
                len: frame.len(),
                min: DATA_HEADER_LEN,
            });
        }
        let payload_len = rd16(&frame[9..]) as usize;
        let available = frame.len() - DATA_HEADER_LEN;
        if payload_len > available {
            return Err(RejectReason::LengthMismatch {
                declared: payload_len,
                available,
            });
        }
        Ok(Self {
            file_id: rd32(&frame[1..]),
            seq: rd32(&frame[5..]),
            payload: &frame[DATA_HEADER_LEN..DATA_HEADER_LEN + payload_len],
        })
    }

    /// Unescaped frame bytes. Payloads longer than `u16::MAX` are truncated.
    pub fn encode(&self) -> Vec<u8> {
        let payload = &self.payload[..self.payload.len().min(u16::MAX as usize)];
        let mut out = Vec::with_capacity(DATA_HEADER_LEN + payload.len());
        out.push(TYPE_DATA);
        out.extend_from_slice(&self.file_id.to_le_bytes());
        out.extend_from_slice(&self.seq.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }
}
