//! Rectangle and region set algebra in output pixel space
//!
//! A [`Region`] is the set of screen pixels that need repainting. It is stored
//! in a canonical banded form: horizontal bands sorted top to bottom, each
//! holding sorted, non-touching spans. Two regions that cover the same pixels
//! therefore always compare equal, which is what damage bookkeeping relies on.
//!
//! # Example
//!
//! ```
//! use wlframe::region::{Rect, Region};
//!
//! let mut damage = Region::new();
//! damage.union_rect(Rect::new(0, 0, 50, 50));
//! damage.union_rect(Rect::new(25, 25, 50, 50));
//! damage.intersect_rect(Rect::new(0, 0, 60, 60));
//!
//! assert_eq!(damage.extents(), Rect::new(0, 0, 60, 60));
//! assert_eq!(damage.area(), 50 * 50 + 35 * 35 - 25 * 25);
//! ```

use std::fmt;

/// An axis-aligned rectangle in pixel coordinates
///
/// Rectangles with a non-positive width or height are empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    /// X coordinate (pixels)
    pub x: i32,
    /// Y coordinate (pixels)
    pub y: i32,
    /// Width (pixels)
    pub width: i32,
    /// Height (pixels)
    pub height: i32,
}

impl Rect {
    /// Creates a new rectangle
    ///
    /// ```
    /// use wlframe::region::Rect;
    ///
    /// let rect = Rect::new(100, 100, 200, 150);
    /// assert_eq!(rect.area(), 30000);
    /// ```
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Creates a rectangle from two corners
    pub fn from_corners(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        let x = x1.min(x2);
        let y = y1.min(y2);
        Self {
            x,
            y,
            width: x1.max(x2).saturating_sub(x),
            height: y1.max(y2).saturating_sub(y),
        }
    }

    /// Right edge (exclusive), clamped to `i32::MAX`
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Bottom edge (exclusive), clamped to `i32::MAX`
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Returns the area of this rectangle in pixels
    pub fn area(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.width as u64 * self.height as u64
        }
    }

    /// Checks if this rectangle shares any pixels with another
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.is_empty()
            || other.is_empty()
            || self.right() <= other.x
            || other.right() <= self.x
            || self.bottom() <= other.y
            || other.bottom() <= self.y)
    }

    /// Computes the intersection of two rectangles
    ///
    /// Returns `None` if the rectangles don't intersect.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        if !self.intersects(other) {
            return None;
        }

        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        Some(Rect::from_corners(x1, y1, x2, y2))
    }

    /// Checks if this rectangle contains a point
    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Checks if this rectangle completely contains another
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.is_empty()
            || (other.x >= self.x
                && other.y >= self.y
                && other.right() <= self.right()
                && other.bottom() <= self.bottom())
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Half-open horizontal interval `[start, end)`
type Span = (i32, i32);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Band {
    top: i32,
    bottom: i32,
    spans: Vec<Span>,
}

/// A set of pixels described by non-overlapping rectangles
///
/// Closed under union, intersection and subtraction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Region {
    bands: Vec<Band>,
}

impl Region {
    /// Creates an empty region
    pub fn new() -> Self {
        Self { bands: Vec::new() }
    }

    /// Creates a region covering a single rectangle
    pub fn from_rect(rect: Rect) -> Self {
        if rect.is_empty() {
            return Self::new();
        }
        Self {
            bands: vec![Band {
                top: rect.y,
                bottom: rect.bottom(),
                spans: vec![(rect.x, rect.right())],
            }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Removes every rectangle from the region
    pub fn clear(&mut self) {
        self.bands.clear();
    }

    /// Adds every pixel of `other` to this region
    pub fn union(&mut self, other: &Region) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            self.bands = other.bands.clone();
            return;
        }
        *self = combine(self, other, |a, b| a || b);
    }

    /// Adds a rectangle to this region
    pub fn union_rect(&mut self, rect: Rect) {
        self.union(&Region::from_rect(rect));
    }

    /// Keeps only the pixels also covered by `other`
    pub fn intersect(&mut self, other: &Region) {
        *self = combine(self, other, |a, b| a && b);
    }

    /// Clips this region to a rectangle
    pub fn intersect_rect(&mut self, rect: Rect) {
        self.intersect(&Region::from_rect(rect));
    }

    /// Removes the pixels covered by `other`
    pub fn subtract(&mut self, other: &Region) {
        if other.is_empty() {
            return;
        }
        *self = combine(self, other, |a, b| a && !b);
    }

    /// Moves every rectangle by `(dx, dy)`
    ///
    /// Edges saturate at the `i32` limits; pixels pushed past them are lost.
    pub fn translate(&mut self, dx: i32, dy: i32) {
        for band in &mut self.bands {
            band.top = band.top.saturating_add(dy);
            band.bottom = band.bottom.saturating_add(dy);
            for span in &mut band.spans {
                span.0 = span.0.saturating_add(dx);
                span.1 = span.1.saturating_add(dx);
            }
            band.spans.retain(|s| s.0 < s.1);
        }
        self.bands.retain(|b| b.top < b.bottom && !b.spans.is_empty());
    }

    /// Returns the smallest rectangle containing the whole region
    ///
    /// An empty region has empty extents at the origin.
    pub fn extents(&self) -> Rect {
        let (Some(first), Some(last)) = (self.bands.first(), self.bands.last()) else {
            return Rect::default();
        };
        let left = self
            .bands
            .iter()
            .filter_map(|b| b.spans.first().map(|s| s.0))
            .min()
            .unwrap_or(0);
        let right = self
            .bands
            .iter()
            .filter_map(|b| b.spans.last().map(|s| s.1))
            .max()
            .unwrap_or(0);
        Rect::from_corners(left, first.top, right, last.bottom)
    }

    /// Iterates over the non-overlapping rectangles making up the region
    pub fn rects(&self) -> impl Iterator<Item = Rect> + '_ {
        self.bands.iter().flat_map(|band| {
            band.spans.iter().map(move |&(start, end)| {
                Rect::from_corners(start, band.top, end, band.bottom)
            })
        })
    }

    /// Number of rectangles in the canonical decomposition
    pub fn rect_count(&self) -> usize {
        self.bands.iter().map(|b| b.spans.len()).sum()
    }

    /// Number of pixels covered
    pub fn area(&self) -> u64 {
        self.rects().map(|r| r.area()).sum()
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        band_at(&self.bands, y).is_some_and(|spans| span_covers(spans, x))
    }

    /// Checks if every pixel of `other` is also in this region
    pub fn contains_region(&self, other: &Region) -> bool {
        let mut rest = other.clone();
        rest.subtract(self);
        rest.is_empty()
    }
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        Region::from_rect(rect)
    }
}

impl FromIterator<Rect> for Region {
    fn from_iter<I: IntoIterator<Item = Rect>>(iter: I) -> Self {
        let mut region = Region::new();
        for rect in iter {
            region.union_rect(rect);
        }
        region
    }
}

/// Spans of the band covering scanline `y`, if any
fn band_at(bands: &[Band], y: i32) -> Option<&[Span]> {
    let idx = bands.partition_point(|b| b.bottom <= y);
    bands
        .get(idx)
        .filter(|b| b.top <= y)
        .map(|b| b.spans.as_slice())
}

fn span_covers(spans: &[Span], x: i32) -> bool {
    let idx = spans.partition_point(|s| s.1 <= x);
    spans.get(idx).is_some_and(|s| s.0 <= x)
}

fn push_edges(edges: &mut Vec<i32>, spans: &[Span]) {
    for &(start, end) in spans {
        edges.push(start);
        edges.push(end);
    }
}

/// Applies a boolean operation to two span lists of the same band
fn combine_spans(a: &[Span], b: &[Span], op: fn(bool, bool) -> bool) -> Vec<Span> {
    let mut edges = Vec::with_capacity((a.len() + b.len()) * 2);
    push_edges(&mut edges, a);
    push_edges(&mut edges, b);
    edges.sort_unstable();
    edges.dedup();

    let mut out: Vec<Span> = Vec::new();
    for pair in edges.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        if !op(span_covers(a, start), span_covers(b, start)) {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.1 == start => last.1 = end,
            _ => out.push((start, end)),
        }
    }
    out
}

/// Applies a boolean operation to two regions, producing a canonical region
fn combine(a: &Region, b: &Region, op: fn(bool, bool) -> bool) -> Region {
    let mut edges = Vec::with_capacity((a.bands.len() + b.bands.len()) * 2);
    for band in a.bands.iter().chain(b.bands.iter()) {
        edges.push(band.top);
        edges.push(band.bottom);
    }
    edges.sort_unstable();
    edges.dedup();

    let mut bands: Vec<Band> = Vec::new();
    for pair in edges.windows(2) {
        let (top, bottom) = (pair[0], pair[1]);
        let spans = combine_spans(
            band_at(&a.bands, top).unwrap_or(&[]),
            band_at(&b.bands, top).unwrap_or(&[]),
            op,
        );
        if spans.is_empty() {
            continue;
        }
        match bands.last_mut() {
            Some(last) if last.bottom == top && last.spans == spans => last.bottom = bottom,
            _ => bands.push(Band { top, bottom, spans }),
        }
    }
    Region { bands }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_area() {
        assert_eq!(Rect::new(0, 0, 100, 50).area(), 5000);
        assert_eq!(Rect::new(0, 0, -4, 50).area(), 0);
    }

    #[test]
    fn test_rect_intersection() {
        let r1 = Rect::new(0, 0, 100, 100);
        let r2 = Rect::new(50, 50, 100, 100);

        assert!(r1.intersects(&r2));
        assert_eq!(r1.intersection(&r2), Some(Rect::new(50, 50, 50, 50)));
        assert!(r1.intersection(&Rect::new(200, 200, 5, 5)).is_none());
    }

    #[test]
    fn test_rect_from_corners_reversed() {
        assert_eq!(Rect::from_corners(110, 70, 10, 20), Rect::new(10, 20, 100, 50));
    }

    #[test]
    fn test_rect_contains() {
        let outer = Rect::new(0, 0, 100, 100);
        assert!(outer.contains_point(99, 99));
        assert!(!outer.contains_point(100, 0));
        assert!(outer.contains_rect(&Rect::new(10, 10, 50, 50)));
        assert!(!outer.contains_rect(&Rect::new(50, 50, 100, 100)));
    }

    #[test]
    fn test_rect_edges_saturate() {
        let rect = Rect::new(i32::MAX - 5, i32::MAX - 2, 100, 10);
        assert_eq!(rect.right(), i32::MAX);
        assert_eq!(rect.bottom(), i32::MAX);
        assert_eq!(Rect::from_corners(i32::MIN, 0, i32::MAX, 1).width, i32::MAX);

        let region = Region::from_rect(rect);
        assert_eq!(region.extents(), Rect::new(i32::MAX - 5, i32::MAX - 2, 5, 2));
        assert!(!region.contains_point(i32::MAX - 6, i32::MAX - 1));

        let mut clipped = region.clone();
        clipped.intersect_rect(Rect::new(0, 0, 100, 100));
        assert!(clipped.is_empty());
    }

    #[test]
    fn test_translate_past_limit_drops_pixels() {
        let mut region = Region::from_rect(Rect::new(0, 0, 10, 10));
        region.translate(i32::MAX, 0);
        assert!(region.is_empty());
    }

    #[test]
    fn test_empty_rect_makes_empty_region() {
        assert!(Region::from_rect(Rect::new(10, 10, 0, 20)).is_empty());
    }

    #[test]
    fn test_union_overlapping_rects() {
        let mut region = Region::from_rect(Rect::new(0, 0, 10, 10));
        region.union_rect(Rect::new(5, 5, 10, 10));

        assert_eq!(region.area(), 100 + 100 - 25);
        assert_eq!(region.extents(), Rect::new(0, 0, 15, 15));
        assert!(region.contains_point(12, 12));
        assert!(!region.contains_point(12, 2));
    }

    #[test]
    fn test_union_is_canonical() {
        // Two halves side by side coalesce into the full rectangle
        let mut halves = Region::from_rect(Rect::new(0, 0, 5, 10));
        halves.union_rect(Rect::new(5, 0, 5, 10));
        assert_eq!(halves, Region::from_rect(Rect::new(0, 0, 10, 10)));
        assert_eq!(halves.rect_count(), 1);

        // Stacked halves coalesce vertically as well
        let mut stacked = Region::from_rect(Rect::new(0, 0, 10, 4));
        stacked.union_rect(Rect::new(0, 4, 10, 6));
        assert_eq!(stacked, halves);
    }

    #[test]
    fn test_union_order_independent() {
        let rects = [
            Rect::new(0, 0, 30, 30),
            Rect::new(20, 10, 30, 5),
            Rect::new(-5, 25, 10, 40),
        ];
        let forward: Region = rects.iter().copied().collect();
        let backward: Region = rects.iter().rev().copied().collect();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_intersect_rect_clips() {
        let mut region = Region::from_rect(Rect::new(-10, -10, 50, 50));
        region.union_rect(Rect::new(90, 90, 40, 40));
        region.intersect_rect(Rect::new(0, 0, 100, 100));

        let mut expected = Region::from_rect(Rect::new(0, 0, 40, 40));
        expected.union_rect(Rect::new(90, 90, 10, 10));
        assert_eq!(region, expected);
    }

    #[test]
    fn test_intersect_disjoint_is_empty() {
        let mut region = Region::from_rect(Rect::new(0, 0, 10, 10));
        region.intersect_rect(Rect::new(10, 0, 10, 10));
        assert!(region.is_empty());
    }

    #[test]
    fn test_subtract_punches_hole() {
        let mut region = Region::from_rect(Rect::new(0, 0, 30, 30));
        region.subtract(&Region::from_rect(Rect::new(10, 10, 10, 10)));

        assert_eq!(region.area(), 900 - 100);
        assert!(!region.contains_point(15, 15));
        assert!(region.contains_point(5, 15));
        assert_eq!(region.rect_count(), 4);
    }

    #[test]
    fn test_contains_region() {
        let big = Region::from_rect(Rect::new(0, 0, 100, 100));
        let small = Region::from_rect(Rect::new(10, 10, 10, 10));
        assert!(big.contains_region(&small));
        assert!(!small.contains_region(&big));
        assert!(small.contains_region(&Region::new()));
    }

    #[test]
    fn test_translate() {
        let mut region = Region::from_rect(Rect::new(0, 0, 10, 10));
        region.translate(5, -5);
        assert_eq!(region, Region::from_rect(Rect::new(5, -5, 10, 10)));
    }

    #[test]
    fn test_clear() {
        let mut region = Region::from_rect(Rect::new(0, 0, 10, 10));
        region.clear();
        assert!(region.is_empty());
        assert_eq!(region.extents(), Rect::default());
    }
}
