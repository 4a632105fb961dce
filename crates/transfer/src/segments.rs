//! Splitting an object into contiguous segments.

/// A byte range `[start, end)` of the source object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: u64,
    pub end: u64,
}

impl Segment {
    /// Returns the segment that begins at `cursor`, or `None` once the whole
    /// object has been covered.
    ///
    /// A `step` of zero is treated as one byte.
    pub fn at(cursor: u64, step: usize, size: u64) -> Option<Self> {
        if cursor >= size {
            return None;
        }
        let step = step.max(1) as u64;
        Some(Self {
            start: cursor,
            end: cursor.saturating_add(step).min(size),
        })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Iterator over every segment of an object, in order.
#[derive(Debug, Clone)]
pub struct SegmentPlan {
    size: u64,
    step: usize,
    cursor: u64,
}

impl SegmentPlan {
    pub fn new(size: u64, step: usize) -> Self {
        Self {
            size,
            step,
            cursor: 0,
        }
    }
}

impl Iterator for SegmentPlan {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        let segment = Segment::at(self.cursor, self.step, self.size)?;
        self.cursor = segment.end;
        Some(segment)
    }
}
