use crate::Count;
use crate::error::Error;

/// family size bounds for one evaluation epoch. probability vectors
/// run over [0, max]; root vectors over [root_min, root_max].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeRange {
    pub min: Count,
    pub max: Count,
    pub root_min: Count,
    pub root_max: Count,
}

impl SizeRange {
    pub fn new(min: Count, max: Count, root_min: Count, root_max: Count) -> Result<Self, Error> {
        if min > max {
            return Err(Error::OutOfRange {
                value: min,
                bound: max,
            });
        }
        if root_min < min {
            return Err(Error::OutOfRange {
                value: root_min,
                bound: min,
            });
        }
        if root_max > max || root_min > root_max {
            return Err(Error::OutOfRange {
                value: root_max,
                bound: max,
            });
        }
        Ok(Self {
            min,
            max,
            root_min,
            root_max,
        })
    }

    /// the full range up to max, roots included
    pub fn span(max: Count) -> Self {
        Self {
            min: 0,
            max,
            root_min: 0,
            root_max: max,
        }
    }

    /// sized from the largest observed count plus headroom, so that
    /// ancestral sizes above every observation keep probability mass
    pub fn observed(largest: Count) -> Self {
        Self::span(largest + largest / 5 + 5)
    }

    pub fn sizes(&self) -> usize {
        self.max + 1
    }

    pub fn roots(&self) -> std::ops::RangeInclusive<Count> {
        self.root_min..=self.root_max
    }

    pub fn root_count(&self) -> usize {
        self.root_max - self.root_min + 1
    }
}
