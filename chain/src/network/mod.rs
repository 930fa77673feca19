//! Wire-level transport: framing and the raw message envelope.
//!
//! This module is deliberately ignorant of gossip semantics (fanout,
//! deduplication, rate limiting); see [`crate::gossip`] for that.

pub mod transport;

pub use transport::{FrameError, MAX_FRAME_LEN, read_frame, write_frame};
