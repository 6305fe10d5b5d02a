// THEORY:
// A `DefectSet` is the final output of a calibration: the unique coordinates of the
// pixels that failed it. It is a pure data container. The set owns uniqueness, and
// iteration is row-major (top row first, left to right) so reports and overlays are
// deterministic. Order has no other meaning.

use std::cmp::Ordering;
use std::collections::BTreeSet;

/// A pixel position on the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelCoord {
    pub x: u32,
    pub y: u32,
}

impl PixelCoord {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl From<(u32, u32)> for PixelCoord {
    fn from((x, y): (u32, u32)) -> Self {
        Self { x, y }
    }
}

// Row-major: compare rows first.
impl Ord for PixelCoord {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.y, self.x).cmp(&(other.y, other.x))
    }
}

impl PartialOrd for PixelCoord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The set of defective pixel coordinates found by one calibration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefectSet {
    coords: BTreeSet<PixelCoord>,
}

impl DefectSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn contains(&self, coord: impl Into<PixelCoord>) -> bool {
        self.coords.contains(&coord.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PixelCoord> {
        self.coords.iter()
    }

    pub fn clear(&mut self) {
        self.coords.clear();
    }
}

impl FromIterator<PixelCoord> for DefectSet {
    fn from_iter<I: IntoIterator<Item = PixelCoord>>(iter: I) -> Self {
        Self {
            coords: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a DefectSet {
    type Item = &'a PixelCoord;
    type IntoIter = std::collections::btree_set::Iter<'a, PixelCoord>;

    fn into_iter(self) -> Self::IntoIter {
        self.coords.iter()
    }
}
