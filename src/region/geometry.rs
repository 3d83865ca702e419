//! One-dimensional request geometry.
//!
//! A region request is resolved one axis at a time. Each axis is a [`Span`]:
//! a signed start and a length. The resolver clips the requested span against
//! the level bounds, optionally scales it into level-0 coordinates, and later
//! works out how much zero padding restores the caller's requested extent.

/// A half-open interval `[start, start + len)` on one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: i64,
    pub len: i64,
}

impl Span {
    pub const fn new(start: i64, len: i64) -> Self {
        Self { start, len }
    }

    /// Exclusive end coordinate.
    pub fn end(&self) -> i64 {
        self.start.saturating_add(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len <= 0
    }

    /// Clip against `[0, bound)`.
    ///
    /// A negative start shortens the span by the overshoot and moves the start
    /// to 0. The length is then clamped so the span ends at `bound` at most.
    /// A span lying entirely outside comes back with length 0.
    pub fn clip(self, bound: u32) -> Span {
        let bound = i64::from(bound);
        let (start, len) = if self.start < 0 {
            (0, self.len.saturating_add(self.start))
        } else {
            (self.start, self.len)
        };
        let len = len.min(bound - start).max(0);
        Span { start, len }
    }

    /// Scale both ends by an integer factor.
    pub fn scale(self, factor: i64) -> Span {
        Span {
            start: self.start.saturating_mul(factor),
            len: self.len.saturating_mul(factor),
        }
    }

    /// Floor-divide start and length by `factor`.
    pub fn shrink(self, factor: i64) -> Span {
        if factor <= 1 {
            return self;
        }
        Span {
            start: self.start.div_euclid(factor),
            len: self.len.div_euclid(factor),
        }
    }

    /// Padding `(before, after)` that places `self` inside `requested`.
    ///
    /// `before` is the distance from the requested start to the valid data,
    /// `after` is whatever remains to reach the requested length. Both are
    /// clamped at 0 so a rounding overshoot never produces negative padding.
    pub fn padding(&self, requested: Span) -> (u32, u32) {
        let before = (self.start - requested.start).clamp(0, requested.len);
        let after = (requested.len - before - self.len.max(0)).max(0);
        (to_u32(before), to_u32(after))
    }
}

fn to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

// =============================================================================
// Tests
// =============================================================================
