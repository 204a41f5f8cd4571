use super::{RawFrame, FRAME_LENGTH};

/// Result of feeding one chunk to a [`FrameAccumulator`]
#[derive(Debug, PartialEq, Eq)]
pub enum Append {
    /// More bytes are needed
    Incomplete,
    /// Exactly one frame has been received. The accumulator is empty again.
    Complete(RawFrame),
    /// The chunk would run past the end of the frame. Nothing was copied;
    /// the accumulator must be reset or dropped.
    Overflow { received: usize },
}

/// Assembles one [`RawFrame`] from reads of arbitrary size.
///
/// The device sends its dump with no framing, so a frame is complete when
/// exactly [`FRAME_LENGTH`] bytes have arrived. More bytes than that means
/// the stream is out of step with the frame boundary.
pub struct FrameAccumulator {
    buffer: [u8; FRAME_LENGTH],
    cursor: usize,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self {
            buffer: [0; FRAME_LENGTH],
            cursor: 0,
        }
    }

    pub fn append(&mut self, chunk: &[u8]) -> Append {
        let received = self.cursor + chunk.len();
        if received > FRAME_LENGTH {
            return Append::Overflow { received };
        }

        self.buffer[self.cursor..received].copy_from_slice(chunk);
        self.cursor = received;

        if self.cursor == FRAME_LENGTH {
            let frame = RawFrame::new(self.buffer);
            self.reset();
            Append::Complete(frame)
        } else {
            Append::Incomplete
        }
    }

    /// Number of bytes buffered so far
    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequence() -> Vec<u8> {
        (0..FRAME_LENGTH).map(|i| (i * 7 % 251) as u8).collect()
    }

    fn feed(sizes: &[usize]) -> Vec<Append> {
        let bytes = sequence();
        let mut accumulator = FrameAccumulator::new();
        let mut offset = 0;
        let mut results = Vec::new();
        for &size in sizes {
            results.push(accumulator.append(&bytes[offset..offset + size]));
            offset += size;
        }
        results
    }

    #[test]
    fn test_any_split_yields_one_complete_frame() {
        let splits: [&[usize]; 5] = [
            &[130],
            &[10; 13],
            &[40, 90],
            &[1, 2, 3, 50, 0, 74],
            &[129, 1],
        ];
        let expected = RawFrame::try_from(&sequence()[..]).unwrap();
        for sizes in splits {
            let mut results = feed(sizes);
            let last = results.pop().unwrap();
            assert_eq!(last, Append::Complete(expected.clone()), "split {sizes:?}");
            assert!(results.iter().all(|r| *r == Append::Incomplete), "split {sizes:?}");
        }
    }

    #[test]
    fn test_every_two_and_three_way_split() {
        let expected = RawFrame::try_from(&sequence()[..]).unwrap();
        for first in 0..FRAME_LENGTH {
            let results = feed(&[first, FRAME_LENGTH - first]);
            assert_eq!(results[0], Append::Incomplete, "split at {first}");
            assert_eq!(results[1], Append::Complete(expected.clone()), "split at {first}");
        }
        for first in (0..FRAME_LENGTH).step_by(7) {
            for second in (0..FRAME_LENGTH - first).step_by(11) {
                let sizes = [first, second, FRAME_LENGTH - first - second];
                let mut results = feed(&sizes);
                assert_eq!(results.pop(), Some(Append::Complete(expected.clone())), "{sizes:?}");
                assert!(results.iter().all(|r| *r == Append::Incomplete), "{sizes:?}");
            }
        }
    }

    #[test]
    fn test_single_oversized_chunk_overflows() {
        let mut accumulator = FrameAccumulator::new();
        let chunk = [0u8; 145];
        assert_eq!(accumulator.append(&chunk), Append::Overflow { received: 145 });
        assert!(accumulator.is_empty());
    }

    #[test]
    fn test_overflow_across_boundary_is_not_truncated() {
        let mut accumulator = FrameAccumulator::new();
        assert_eq!(accumulator.append(&[1u8; 100]), Append::Incomplete);
        assert_eq!(accumulator.append(&[2u8; 31]), Append::Overflow { received: 131 });
        // nothing from the offending chunk was copied
        assert_eq!(accumulator.len(), 100);
    }

    #[test]
    fn test_reusable_after_complete_and_reset() {
        let mut accumulator = FrameAccumulator::new();
        assert!(matches!(accumulator.append(&[0u8; FRAME_LENGTH]), Append::Complete(_)));
        assert!(accumulator.is_empty());

        accumulator.append(&[0u8; 20]);
        accumulator.reset();
        assert!(matches!(
            accumulator.append(&[3u8; FRAME_LENGTH]),
            Append::Complete(f) if f.as_bytes()[0] == 3
        ));
    }
}
