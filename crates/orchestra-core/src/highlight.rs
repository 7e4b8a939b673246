/// Cosmetic pointer into the run list. It only ever reads the run count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HighlightCursor {
    index: usize,
}

impl HighlightCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current index, clamped back to the front when the list has shrunk below it.
    pub fn observe(&mut self, count: usize) -> usize {
        if count > 0 && self.index >= count {
            self.index = 0;
        }
        self.index
    }

    /// Moves one step forward, wrapping at `count`. Does nothing for an empty list.
    pub fn advance(&mut self, count: usize) -> bool {
        if count == 0 {
            return false;
        }
        let current = self.observe(count);
        self.index = (current + 1) % count;
        true
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }
}
