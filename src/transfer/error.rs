use thiserror::Error;

/// Why a frame was dropped. Every variant except [`RejectReason::Storage`] is
/// recovered locally: the frame is discarded and processing continues.
#[derive(Debug, Error)]
pub enum RejectReason {
    /// Frame grew past the decoder capacity.
    #[error("frame exceeded decoder capacity")]
    FramingOverflow,

    /// Frame shorter than its fixed header.
    #[error("frame too short: {len} bytes, header needs {min}")]
    MalformedHeader { len: usize, min: usize },

    /// Declared name or payload length runs past the end of the frame.
    #[error("declared length {declared} exceeds the {available} bytes left in frame")]
    LengthMismatch { declared: usize, available: usize },

    /// Would exceed the sink capacity or the declared total size.
    #[error("{requested} bytes exceed limit of {limit}")]
    CapacityExceeded { requested: u64, limit: u64 },

    /// DATA frame for a file id other than the active session's.
    #[error("file id 0x{got:08x} does not match active session 0x{expected:08x}")]
    StaleOrForeignFrame { expected: u32, got: u32 },

    /// DATA sequence number is not the next expected one.
    #[error("sequence {got} out of order (expected {expected})")]
    OutOfOrder { expected: u32, got: u32 },

    /// DATA frame arrived while no transfer is active.
    #[error("no active transfer session")]
    NoActiveSession,

    /// The sink failed; the session has been deactivated.
    #[error("storage failure: {0}")]
    Storage(#[from] SinkError),
}

impl RejectReason {
    /// Short stable label, used for per-reason counters.
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::FramingOverflow => "framing_overflow",
            RejectReason::MalformedHeader { .. } => "malformed_header",
            RejectReason::LengthMismatch { .. } => "length_mismatch",
            RejectReason::CapacityExceeded { .. } => "capacity_exceeded",
            RejectReason::StaleOrForeignFrame { .. } => "stale_or_foreign",
            RejectReason::OutOfOrder { .. } => "out_of_order",
            RejectReason::NoActiveSession => "no_active_session",
            RejectReason::Storage(_) => "storage",
        }
    }

    /// Collaborator failures end the session; everything else is per-frame.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RejectReason::Storage(_))
    }
}

/// Errors raised by a [`super::Sink`].
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("write of {len} bytes at offset {offset} exceeds sink capacity {capacity}")]
    Capacity { offset: u32, len: usize, capacity: u32 },

    #[error("no destination open")]
    NotOpen,
}

/// Errors raised while sending a file.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file of {0} bytes does not fit the 32-bit size field")]
    TooLarge(u64),

    #[error("no status from receiver within {0} ms")]
    AckTimeout(u64),

    #[error("receiver rejected frame (seq {seq:?}) after {attempts} attempts")]
    Rejected { seq: Option<u32>, attempts: u32 },
}
