//! SLIP framing for the serial transfer link
//!
//! Frames on the wire are SLIP (RFC 1055) encoded. The decoder consumes one byte
//! at a time and only opens a frame after it has seen an `END` delimiter, so line
//! noise before the first delimiter never reaches the frame handlers.

pub const END: u8 = 0xC0; // frame delimiter
pub const ESC: u8 = 0xDB;
pub const ESC_END: u8 = 0xDC;
pub const ESC_ESC: u8 = 0xDD;

/// Default frame capacity (10 KiB), matching the receive buffer on the device.
pub const DEFAULT_MAX_FRAME: usize = 10 * 1024;

/// Decoder position within the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderState {
    /// No delimiter seen yet (or the last frame overflowed); bytes are dropped.
    #[default]
    Idle,
    InFrame,
    /// Previous byte was `ESC`.
    Escaped,
}

/// Raised when a frame grows past the decoder capacity. The partial frame is
/// discarded and the decoder waits for the next `END`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("SLIP frame exceeded {capacity} bytes and was dropped")]
pub struct FrameOverflow {
    pub capacity: usize,
}

#[derive(Debug)]
pub struct SlipDecoder {
    buf: Vec<u8>,
    state: DecoderState,
    capacity: usize,
}

impl Default for SlipDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SlipDecoder {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_FRAME)
    }

    /// Decoder that drops any frame longer than `capacity` decoded bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity.min(DEFAULT_MAX_FRAME)),
            state: DecoderState::Idle,
            capacity,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of decoded bytes waiting for the closing delimiter.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partial frame and wait for a fresh delimiter.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = DecoderState::Idle;
    }

    /// Feed a single byte. Returns a frame when `byte` closes a non-empty one.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Vec<u8>>, FrameOverflow> {
        match byte {
            END => {
                // A delimiter closes the current frame and opens the next one.
                // Back-to-back delimiters (keep-alive) produce nothing.
                let frame = if self.state == DecoderState::InFrame && !self.buf.is_empty() {
                    Some(std::mem::take(&mut self.buf))
                } else {
                    self.buf.clear();
                    None
                };
                self.state = DecoderState::InFrame;
                Ok(frame)
            }
            ESC => {
                if self.state == DecoderState::InFrame {
                    self.state = DecoderState::Escaped;
                }
                Ok(None)
            }
            _ => {
                let decoded = match self.state {
                    DecoderState::Idle => return Ok(None),
                    DecoderState::InFrame => byte,
                    DecoderState::Escaped => {
                        self.state = DecoderState::InFrame;
                        match byte {
                            ESC_END => END,
                            ESC_ESC => ESC,
                            other => other, // invalid escape, pass through
                        }
                    }
                };
                if self.buf.len() >= self.capacity {
                    self.reset();
                    return Err(FrameOverflow {
                        capacity: self.capacity,
                    });
                }
                self.buf.push(decoded);
                Ok(None)
            }
        }
    }

    /// Push bytes, returning any completed frames. Oversized frames are skipped.
    pub fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for &b in data {
            match self.feed(b) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => {}
                Err(e) => log::warn!("{}", e),
            }
        }
        frames
    }
}

/// Encode `payload` as a complete SLIP frame, including a leading `END` so any
/// noise already on the line is flushed as an empty frame.
pub fn slip_encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + payload.len() / 32 + 2);
    slip_encode_into(payload, &mut out);
    out
}

/// Append the SLIP encoding of `payload` to `out`.
pub fn slip_encode_into(payload: &[u8], out: &mut Vec<u8>) {
    out.push(END);
    for &b in payload {
        match b {
            END => {
                out.push(ESC);
                out.push(ESC_END);
            }
            ESC => {
                out.push(ESC);
                out.push(ESC_ESC);
            }
            _ => out.push(b),
        }
    }
    out.push(END);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(dec: &mut SlipDecoder, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for &b in bytes {
            if let Ok(Some(f)) = dec.feed(b) {
                frames.push(f);
            }
        }
        frames
    }

    #[test]
    fn bytes_before_first_delimiter_are_dropped() {
        let mut dec = SlipDecoder::new();
        let frames = feed_all(&mut dec, &[0x01, 0x02, END, 0x03, END]);
        assert_eq!(frames, vec![vec![0x03]]);
    }

    #[test]
    fn no_delimiter_means_no_frames() {
        let mut dec = SlipDecoder::new();
        let noise: Vec<u8> = (0u8..=255).filter(|&b| b != END).collect();
        assert!(feed_all(&mut dec, &noise).is_empty());
        assert_eq!(dec.state(), DecoderState::Idle);
    }

    #[test]
    fn keep_alive_delimiters_emit_nothing() {
        let mut dec = SlipDecoder::new();
        let frames = feed_all(&mut dec, &[END, END, END, 0x42, END, END]);
        assert_eq!(frames, vec![vec![0x42]]);
        assert_eq!(dec.state(), DecoderState::InFrame);
    }

    #[test]
    fn escapes_are_unescaped() {
        let mut dec = SlipDecoder::new();
        let frames = feed_all(&mut dec, &[END, 0x10, ESC, ESC_END, ESC, ESC_ESC, 0x11, END]);
        assert_eq!(frames, vec![vec![0x10, END, ESC, 0x11]]);
    }

    #[test]
    fn invalid_escape_passes_byte_through() {
        let mut dec = SlipDecoder::new();
        let frames = feed_all(&mut dec, &[END, ESC, 0x41, END]);
        assert_eq!(frames, vec![vec![0x41]]);
    }

    #[test]
    fn delimiter_after_escape_aborts_frame() {
        let mut dec = SlipDecoder::new();
        let frames = feed_all(&mut dec, &[END, 0x01, ESC, END, 0x02, END]);
        assert_eq!(frames, vec![vec![0x02]]);
    }

    #[test]
    fn overflow_drops_whole_frame_and_resyncs() {
        let mut dec = SlipDecoder::with_capacity(4);
        assert_eq!(feed_all(&mut dec, &[END, 1, 2, 3, 4]).len(), 0);
        assert_eq!(dec.feed(5), Err(FrameOverflow { capacity: 4 }));
        assert_eq!(dec.state(), DecoderState::Idle);
        assert_eq!(dec.buffered(), 0);
        // Tail of the oversized frame is ignored; its END opens the next frame.
        let frames = feed_all(&mut dec, &[6, 7, END, 9, 8, END]);
        assert_eq!(frames, vec![vec![9, 8]]);
    }

    #[test]
    fn frame_at_exact_capacity_is_kept() {
        let mut dec = SlipDecoder::with_capacity(3);
        let frames = feed_all(&mut dec, &[END, 1, 2, 3, END]);
        assert_eq!(frames, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn random_streams_without_delimiter_emit_nothing() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let mut dec = SlipDecoder::new();
            // Start inside a frame so the bytes are actually buffered
            assert_eq!(dec.feed(END), Ok(None));
            let len = rng.gen_range(0..512);
            let noise: Vec<u8> = (0..len)
                .map(|_| match rng.gen_range(0..4) {
                    0 => ESC,
                    1 => ESC_END,
                    _ => rng.gen_range(0..=255u8),
                })
                .filter(|&b| b != END)
                .collect();
            assert!(feed_all(&mut dec, &noise).is_empty());
        }
    }

    #[test]
    fn encode_then_decode_reproduces_payload() {
        let payload = vec![0x00, END, ESC, ESC_END, ESC_ESC, END, END, 0xFF];
        let mut dec = SlipDecoder::new();
        let frames = dec.push(&slip_encode(&payload));
        assert_eq!(frames, vec![payload]);
    }

    #[test]
    fn every_single_byte_payload_round_trips() {
        let mut dec = SlipDecoder::new();
        for b in 0u8..=255 {
            assert_eq!(dec.push(&slip_encode(&[b])), vec![vec![b]], "byte 0x{:02x}", b);
        }
    }

    #[test]
    fn random_payloads_dense_in_specials_round_trip() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut dec = SlipDecoder::new();
        for _ in 0..200 {
            let len = rng.gen_range(1..=2048);
            let payload: Vec<u8> = (0..len)
                .map(|_| match rng.gen_range(0..3) {
                    0 => END,
                    1 => ESC,
                    _ => rng.gen(),
                })
                .collect();
            assert_eq!(dec.push(&slip_encode(&payload)), vec![payload]);
        }
    }

    #[test]
    fn encoder_escapes_special_bytes() {
        assert_eq!(
            slip_encode(&[END, 0x01, ESC]),
            vec![END, ESC, ESC_END, 0x01, ESC, ESC_ESC, END]
        );
    }
}
