//! Audio Frame Assembly
//!
//! Clients stream one recording per turn as a sequence of binary chunks of a
//! WebM container. The assembler only starts a recording on a chunk carrying
//! the container's EBML signature, so trailing fragments of an earlier
//! recording can never become the head of the next one.

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

/// EBML magic number that opens every WebM stream.
pub const CONTAINER_SIGNATURE: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    /// A frame that should open a recording lacks the container signature.
    #[error("discarded {len}-byte frame without a container signature")]
    InvalidSignature { len: usize },
    /// Audio arrived while no recording was in progress.
    #[error("discarded {len}-byte frame received outside of a recording")]
    NotRecording { len: usize },
}

/// Accumulates the binary chunks of a single recording.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    state: RecordingState,
    buffer: BytesMut,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Starts a new recording if `frame` opens with the container signature.
    ///
    /// Leftover bytes from an earlier recording are dropped rather than merged.
    pub fn begin_if_valid(&mut self, frame: &[u8]) -> bool {
        if !frame.starts_with(&CONTAINER_SIGNATURE) {
            warn!(bytes = frame.len(), "Ignoring leading frame without container signature");
            return false;
        }
        if !self.buffer.is_empty() {
            warn!(
                bytes = self.buffer.len(),
                "Clearing leftover buffer data from previous request"
            );
            self.buffer.clear();
        }
        self.buffer.extend_from_slice(frame);
        self.state = RecordingState::Recording;
        debug!(bytes = frame.len(), "Recording started");
        true
    }

    /// Extends the current recording.
    pub fn append(&mut self, frame: &[u8]) -> Result<(), FrameError> {
        if self.state != RecordingState::Recording {
            return Err(FrameError::NotRecording { len: frame.len() });
        }
        self.buffer.extend_from_slice(frame);
        debug!(
            bytes = frame.len(),
            total = self.buffer.len(),
            "Buffered audio chunk"
        );
        Ok(())
    }

    /// Routes a frame to `begin_if_valid` or `append` depending on the current state.
    pub fn accept(&mut self, frame: &[u8]) -> Result<(), FrameError> {
        match self.state {
            RecordingState::Idle => {
                if self.begin_if_valid(frame) {
                    Ok(())
                } else {
                    Err(FrameError::InvalidSignature { len: frame.len() })
                }
            }
            RecordingState::Recording => self.append(frame),
        }
    }

    /// Takes the accumulated recording and returns to `Idle` with an empty buffer.
    pub fn finalize(&mut self) -> Bytes {
        self.state = RecordingState::Idle;
        std::mem::take(&mut self.buffer).freeze()
    }

    /// Drops any buffered audio and returns to `Idle`.
    pub fn reset(&mut self) {
        self.state = RecordingState::Idle;
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webm_frame(payload: &[u8]) -> Vec<u8> {
        let mut frame = CONTAINER_SIGNATURE.to_vec();
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn test_invalid_leading_frames_accept_nothing() {
        let mut assembler = FrameAssembler::new();
        let frames: [&[u8]; 4] = [b"\x00\x01\x02\x03", b"junk", b"", &[0x1A, 0x45, 0xDF]];

        for frame in frames {
            assert_eq!(
                assembler.accept(frame),
                Err(FrameError::InvalidSignature { len: frame.len() })
            );
        }

        assert_eq!(assembler.state(), RecordingState::Idle);
        assert!(assembler.is_empty());
    }

    #[test]
    fn test_recording_accumulates_in_arrival_order() {
        let mut assembler = FrameAssembler::new();
        assembler.accept(&webm_frame(b"head")).unwrap();
        assembler.accept(b"-mid").unwrap();
        assembler.accept(b"-tail").unwrap();

        assert_eq!(assembler.state(), RecordingState::Recording);
        let audio = assembler.finalize();
        assert_eq!(&audio[4..], b"head-mid-tail");
    }

    #[test]
    fn test_finalize_always_leaves_idle_and_empty() {
        let mut assembler = FrameAssembler::new();
        assert!(assembler.finalize().is_empty());
        assert_eq!(assembler.state(), RecordingState::Idle);

        assembler.accept(&webm_frame(&[1, 2, 3])).unwrap();
        let audio = assembler.finalize();
        assert_eq!(audio.len(), 7);
        assert!(assembler.is_empty());
        assert_eq!(assembler.state(), RecordingState::Idle);
    }

    #[test]
    fn test_append_outside_recording_is_rejected() {
        let mut assembler = FrameAssembler::new();
        assert_eq!(
            assembler.append(b"stray"),
            Err(FrameError::NotRecording { len: 5 })
        );
        assert!(assembler.is_empty());
    }

    #[test]
    fn test_stray_fragment_after_finalize_does_not_start_recording() {
        let mut assembler = FrameAssembler::new();
        assembler.accept(&webm_frame(b"turn-one")).unwrap();
        assembler.finalize();

        assert!(assembler.accept(b"late-fragment").is_err());
        assembler.accept(&webm_frame(b"turn-two")).unwrap();
        assert_eq!(&assembler.finalize()[4..], b"turn-two");
    }

    #[test]
    fn test_begin_discards_leftover_buffer() {
        let mut assembler = FrameAssembler::new();
        assembler.accept(&webm_frame(b"old")).unwrap();
        assert!(assembler.begin_if_valid(&webm_frame(b"new")));
        assert_eq!(&assembler.finalize()[4..], b"new");
    }

    #[test]
    fn test_reset_clears_recording() {
        let mut assembler = FrameAssembler::new();
        assembler.accept(&webm_frame(b"abc")).unwrap();
        assembler.reset();
        assert_eq!(assembler.state(), RecordingState::Idle);
        assert!(assembler.is_empty());
    }
}
