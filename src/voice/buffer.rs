//! Bounded utterance buffer with exactly-once drain

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::frame::Frame;

#[derive(Debug, Default)]
struct Inner {
    frames: VecDeque<Frame>,
    /// Always the sum of `byte_len()` over `frames`
    size: usize,
}

/// Ordered accumulator of captured frames
///
/// Every operation takes the lock for its whole critical section, so a
/// `drain` can never interleave with an in-flight `append`: of two
/// concurrent drains over the same span, one receives the audio and the
/// other observes an empty buffer.
#[derive(Debug, Default)]
pub struct UtteranceBuffer {
    inner: Mutex<Inner>,
}

impl UtteranceBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the buffer, recovering the data if a previous holder panicked
    ///
    /// Every mutation keeps `size` consistent before it can unwind, so the
    /// guarded data is valid even after a poison.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a frame and return the buffered byte size after the append
    pub fn append(&self, frame: Frame) -> usize {
        let mut inner = self.lock();
        inner.size += frame.byte_len();
        inner.frames.push_back(frame);
        inner.size
    }

    /// Total buffered bytes
    #[must_use]
    pub fn size(&self) -> usize {
        self.lock().size
    }

    /// Number of buffered frames
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.lock().frames.len()
    }

    /// Whether nothing is buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().size == 0
    }

    /// Remove every frame and return them as one contiguous PCM16 byte run
    pub fn drain(&self) -> Vec<u8> {
        let frames = {
            let mut inner = self.lock();
            inner.size = 0;
            std::mem::take(&mut inner.frames)
        };

        let total = frames.iter().map(Frame::byte_len).sum();
        let mut out = Vec::with_capacity(total);
        for frame in &frames {
            frame.write_le_bytes(&mut out);
        }
        out
    }

    /// Discard every frame, returning how many bytes were dropped
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let dropped = inner.size;
        inner.frames.clear();
        inner.size = 0;
        dropped
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn frame(value: i16, len: usize) -> Frame {
        Frame::new(vec![value; len])
    }

    #[test]
    fn test_size_tracks_appends() {
        let buffer = UtteranceBuffer::new();
        assert!(buffer.is_empty());

        assert_eq!(buffer.append(frame(1, 160)), 320);
        assert_eq!(buffer.append(frame(2, 80)), 480);
        assert_eq!(buffer.size(), 480);
        assert_eq!(buffer.frame_count(), 2);
    }

    #[test]
    fn test_drain_preserves_order_and_empties() {
        let buffer = UtteranceBuffer::new();
        buffer.append(frame(1, 2));
        buffer.append(frame(2, 2));

        let bytes = buffer.drain();
        assert_eq!(bytes, vec![1, 0, 1, 0, 2, 0, 2, 0]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.frame_count(), 0);

        // A second drain over the same span sees nothing
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn test_clear_discards() {
        let buffer = UtteranceBuffer::new();
        buffer.append(frame(5, 160));
        assert_eq!(buffer.clear(), 320);
        assert_eq!(buffer.size(), 0);
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn test_concurrent_drains_hand_off_each_byte_once() {
        let buffer = Arc::new(UtteranceBuffer::new());
        let drained = Arc::new(AtomicUsize::new(0));
        let appended = 400 * 320;

        let writer = {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                for i in 0..400_i16 {
                    buffer.append(frame(i, 160));
                }
            })
        };

        let drainers: Vec<_> = (0..4)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                let drained = Arc::clone(&drained);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        drained.fetch_add(buffer.drain().len(), Ordering::SeqCst);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for handle in drainers {
            handle.join().unwrap();
        }
        drained.fetch_add(buffer.drain().len(), Ordering::SeqCst);

        assert_eq!(drained.load(Ordering::SeqCst), appended);
        assert_eq!(buffer.size(), 0);
    }
}
