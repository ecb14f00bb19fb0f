/// Cursor into the frame slot ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameIndex {
    current: usize,
    frames_in_flight: usize,
}

impl FrameIndex {
    /// `frames_in_flight` must be non-zero; the pool rejects zero before an
    /// index is ever built.
    pub fn new(frames_in_flight: usize) -> Self {
        debug_assert!(frames_in_flight > 0);
        Self {
            current: 0,
            frames_in_flight,
        }
    }

    #[inline]
    pub fn current(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Moves to the next slot, wrapping to 0 after the last one.
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % self.frames_in_flight;
        self.current
    }
}
