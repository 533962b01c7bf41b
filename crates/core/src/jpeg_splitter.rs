//! Incremental splitter for concatenated JPEG byte streams.
//!
//! `ffmpeg -f image2pipe` writes JPEG frames back to back on stdout. The
//! splitter scans for start-of-image (`FF D8`) and end-of-image (`FF D9`)
//! markers and emits each complete frame as soon as its end marker arrives,
//! so a whole video never has to be buffered in memory. Input may be fed in
//! arbitrarily sized chunks; the scanner state carries over between them.

// ---------------------------------------------------------------------------
// Markers
// ---------------------------------------------------------------------------

const MARKER_PREFIX: u8 = 0xFF;
const START_OF_IMAGE: u8 = 0xD8;
const END_OF_IMAGE: u8 = 0xD9;

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Scanner state between two bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitterState {
    /// Outside a frame, looking for `FF`.
    WaitingStartA,
    /// Saw `FF` outside a frame, expecting `D8`.
    WaitingStartB,
    /// Inside a frame, looking for `FF`.
    WaitingEndA,
    /// Saw `FF` inside a frame, expecting `D9`.
    WaitingEndB,
}

/// Streaming JPEG frame splitter.
#[derive(Debug)]
pub struct JpegSplitter {
    state: SplitterState,
    frame: Vec<u8>,
    frames_emitted: usize,
}

impl JpegSplitter {
    pub fn new() -> Self {
        Self {
            state: SplitterState::WaitingStartA,
            frame: Vec::new(),
            frames_emitted: 0,
        }
    }

    /// Current scanner state.
    pub fn state(&self) -> SplitterState {
        self.state
    }

    /// Number of complete frames emitted so far.
    pub fn frames_emitted(&self) -> usize {
        self.frames_emitted
    }

    /// Feed a chunk of the stream, calling `on_frame` for every frame that
    /// is completed within this chunk.
    ///
    /// Each emitted frame starts with `FF D8` and ends with `FF D9`. Bytes
    /// between frames are discarded.
    pub fn push(&mut self, chunk: &[u8], mut on_frame: impl FnMut(Vec<u8>)) {
        for &byte in chunk {
            match self.state {
                SplitterState::WaitingStartA => {
                    if byte == MARKER_PREFIX {
                        self.state = SplitterState::WaitingStartB;
                    }
                }
                SplitterState::WaitingStartB => {
                    if byte == START_OF_IMAGE {
                        self.frame.push(MARKER_PREFIX);
                        self.frame.push(START_OF_IMAGE);
                        self.state = SplitterState::WaitingEndA;
                    } else if byte != MARKER_PREFIX {
                        self.state = SplitterState::WaitingStartA;
                    }
                }
                SplitterState::WaitingEndA => {
                    if byte == MARKER_PREFIX {
                        self.state = SplitterState::WaitingEndB;
                    } else {
                        self.frame.push(byte);
                    }
                }
                SplitterState::WaitingEndB => {
                    if byte == END_OF_IMAGE {
                        self.frame.push(MARKER_PREFIX);
                        self.frame.push(END_OF_IMAGE);
                        self.frames_emitted += 1;
                        on_frame(std::mem::take(&mut self.frame));
                        self.state = SplitterState::WaitingStartA;
                    } else if byte == MARKER_PREFIX {
                        // Fill byte: the earlier FF is payload, this one may
                        // still open the end marker.
                        self.frame.push(MARKER_PREFIX);
                    } else {
                        // False-positive end marker: both bytes are payload.
                        self.frame.push(MARKER_PREFIX);
                        self.frame.push(byte);
                        self.state = SplitterState::WaitingEndA;
                    }
                }
            }
        }
    }

    /// Split a complete in-memory stream into frames.
    pub fn split(stream: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        Self::new().push(stream, |frame| frames.push(frame));
        frames
    }

    /// Bytes of a frame that was started but never terminated.
    pub fn pending_len(&self) -> usize {
        self.frame.len()
    }
}

impl Default for JpegSplitter {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8];
        bytes.extend_from_slice(payload);
        bytes.extend_from_slice(&[0xFF, 0xD9]);
        bytes
    }

    #[test]
    fn splits_three_back_to_back_frames() {
        let frames = [frame(&[1, 2, 3]), frame(&[4, 5]), frame(&[6])];
        let stream = frames.concat();

        let split = JpegSplitter::split(&stream);

        assert_eq!(split.len(), 3);
        for (got, expected) in split.iter().zip(frames.iter()) {
            assert_eq!(&got[..2], &[0xFF, 0xD8]);
            assert_eq!(&got[got.len() - 2..], &[0xFF, 0xD9]);
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn end_marker_prefix_inside_payload_does_not_end_frame() {
        // FF followed by something other than D9 is payload.
        let expected = frame(&[0x10, 0xFF, 0x00, 0x20, 0xFF, 0xC4, 0x30]);

        let split = JpegSplitter::split(&expected);

        assert_eq!(split, vec![expected]);
    }

    #[test]
    fn fill_bytes_before_end_marker_still_terminate() {
        let stream = [0xFF, 0xD8, 0x01, 0xFF, 0xFF, 0xD9];

        let split = JpegSplitter::split(&stream);

        assert_eq!(split, vec![stream.to_vec()]);
    }

    #[test]
    fn garbage_between_frames_is_ignored() {
        let mut stream = vec![0x00, 0x13, 0xFF, 0x42];
        stream.extend(frame(&[7, 7]));
        stream.extend([0xAA, 0xFF]);
        stream.extend(frame(&[8]));

        let split = JpegSplitter::split(&stream);

        assert_eq!(split, vec![frame(&[7, 7]), frame(&[8])]);
    }

    #[test]
    fn repeated_prefix_before_start_marker_opens_frame() {
        let mut stream = vec![0xFF, 0xFF];
        stream.extend_from_slice(&[0xD8, 0x05, 0xFF, 0xD9]);

        let split = JpegSplitter::split(&stream);

        assert_eq!(split, vec![frame(&[0x05])]);
    }

    #[test]
    fn state_survives_chunk_boundaries() {
        let stream = [frame(&[1, 0xFF, 2]), frame(&[3])].concat();
        let mut splitter = JpegSplitter::new();
        let mut frames = Vec::new();

        for byte in &stream {
            splitter.push(std::slice::from_ref(byte), |f| frames.push(f));
        }

        assert_eq!(frames, vec![frame(&[1, 0xFF, 2]), frame(&[3])]);
        assert_eq!(splitter.frames_emitted(), 2);
        assert_eq!(splitter.state(), SplitterState::WaitingStartA);
    }

    #[test]
    fn unterminated_frame_is_not_emitted() {
        let mut splitter = JpegSplitter::new();
        let mut frames = Vec::new();

        splitter.push(&[0xFF, 0xD8, 1, 2, 3], |f| frames.push(f));

        assert!(frames.is_empty());
        assert_eq!(splitter.state(), SplitterState::WaitingEndA);
        assert_eq!(splitter.pending_len(), 5);
    }
}
