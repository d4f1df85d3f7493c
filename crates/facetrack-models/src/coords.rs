//! Bounding box in integer pixel coordinates.
//!
//! Every detector emits `BoundingBox` values; filters, the portrait transform
//! and the writers operate on copies of them.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum supported x coordinate and width (4 × 4K).
pub const MAX_W: u32 = 15360;

/// Maximum supported y coordinate and height (4 × 4K).
pub const MAX_H: u32 = 8640;

/// Errors raised by coordinate operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordsError {
    #[error("{name}={value} is out of range [0, {max}]")]
    OutOfRange {
        name: &'static str,
        value: i64,
        max: u32,
    },

    #[error("Confidence {0} is not in range [0, 1]")]
    InvalidConfidence(f32),

    #[error("Scale coefficient must be a positive number, got {0}")]
    InvalidCoefficient(f64),

    #[error("Scaled size {width}x{height} exceeds bounds {max_width}x{max_height}")]
    SizeExceeded {
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },

    #[error("Box at ({x}, {y}) of size {w}x{h} leaves image bounds {width}x{height}")]
    OutOfBounds {
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        width: u32,
        height: u32,
    },
}

/// Axis-aligned rectangle with an optional detection confidence.
///
/// Equality compares `(x, y, w, h)` only, so a box can be compared against
/// literal arrays, tuples or slices of coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "BoxRepr", into = "BoxRepr")]
pub struct BoundingBox {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    confidence: Option<f32>,
}

#[derive(Serialize, Deserialize)]
struct BoxRepr {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confidence: Option<f32>,
}

impl TryFrom<BoxRepr> for BoundingBox {
    type Error = CoordsError;

    fn try_from(repr: BoxRepr) -> Result<Self, Self::Error> {
        let bbox = BoundingBox::new(repr.x, repr.y, repr.w, repr.h)?;
        match repr.confidence {
            Some(c) => bbox.with_confidence(c),
            None => Ok(bbox),
        }
    }
}

impl From<BoundingBox> for BoxRepr {
    fn from(b: BoundingBox) -> Self {
        Self {
            x: b.x,
            y: b.y,
            w: b.w,
            h: b.h,
            confidence: b.confidence,
        }
    }
}

fn check_range(name: &'static str, value: i64, max: u32) -> Result<u32, CoordsError> {
    if value < 0 || value > max as i64 {
        return Err(CoordsError::OutOfRange { name, value, max });
    }
    Ok(value as u32)
}

fn check_confidence(value: f32) -> Result<f32, CoordsError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(CoordsError::InvalidConfidence(value));
    }
    Ok(value)
}

impl BoundingBox {
    /// Create a new box without confidence.
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Result<Self, CoordsError> {
        Ok(Self {
            x: check_range("x", x as i64, MAX_W)?,
            y: check_range("y", y as i64, MAX_H)?,
            w: check_range("w", w as i64, MAX_W)?,
            h: check_range("h", h as i64, MAX_H)?,
            confidence: None,
        })
    }

    /// Return this box with the given confidence attached.
    pub fn with_confidence(mut self, confidence: f32) -> Result<Self, CoordsError> {
        self.set_confidence(confidence)?;
        Ok(self)
    }

    #[inline]
    pub fn x(&self) -> u32 {
        self.x
    }

    #[inline]
    pub fn y(&self) -> u32 {
        self.y
    }

    #[inline]
    pub fn w(&self) -> u32 {
        self.w
    }

    #[inline]
    pub fn h(&self) -> u32 {
        self.h
    }

    /// Right edge (exclusive).
    #[inline]
    pub fn x2(&self) -> u32 {
        self.x + self.w
    }

    /// Bottom edge (exclusive).
    #[inline]
    pub fn y2(&self) -> u32 {
        self.y + self.h
    }

    /// Detection confidence, 0 when none was assigned.
    #[inline]
    pub fn confidence(&self) -> f32 {
        self.confidence.unwrap_or(0.0)
    }

    /// Whether a confidence was ever assigned.
    pub fn has_confidence(&self) -> bool {
        self.confidence.is_some()
    }

    pub fn set_confidence(&mut self, confidence: f32) -> Result<(), CoordsError> {
        self.confidence = Some(check_confidence(confidence)?);
        Ok(())
    }

    /// Independent copy of this box, confidence included.
    pub fn copy(&self) -> Self {
        *self
    }

    /// Box area in pixels.
    #[inline]
    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    /// Size of this box once scaled by `coeff`, checked against `bounds`.
    fn scaled_size(&self, coeff: f64, bounds: Option<(u32, u32)>) -> Result<(u32, u32), CoordsError> {
        if !(coeff.is_finite() && coeff > 0.0) {
            return Err(CoordsError::InvalidCoefficient(coeff));
        }
        // `as` saturates, so oversized results land above the limits below.
        let new_w = (self.w as f64 * coeff) as u32;
        let new_h = (self.h as f64 * coeff) as u32;
        let (max_width, max_height) = match bounds {
            Some((width, height)) => (width.min(MAX_W), height.min(MAX_H)),
            None => (MAX_W, MAX_H),
        };
        if new_w > max_width || new_h > max_height {
            return Err(CoordsError::SizeExceeded {
                width: new_w,
                height: new_h,
                max_width,
                max_height,
            });
        }
        Ok((new_w, new_h))
    }

    /// Whether `scale(coeff, bounds)` would succeed.
    pub fn fits_scale(&self, coeff: f64, bounds: Option<(u32, u32)>) -> bool {
        self.scaled_size(coeff, bounds).is_ok()
    }

    /// Multiply width and height by `coeff`.
    ///
    /// Returns the `(shift_x, shift_y)` that recentres the scaled box on the
    /// original center. The position is not modified; callers apply the shift.
    /// On error the box is left unchanged.
    pub fn scale(&mut self, coeff: f64, bounds: Option<(u32, u32)>) -> Result<(i32, i32), CoordsError> {
        let (new_w, new_h) = self.scaled_size(coeff, bounds)?;
        let shift_x = (self.w as i64 - new_w as i64) / 2;
        let shift_y = (self.h as i64 - new_h as i64) / 2;
        self.w = new_w;
        self.h = new_h;
        Ok((shift_x as i32, shift_y as i32))
    }

    /// Translate the box, clamping `x` and `y` to zero.
    ///
    /// With `bounds`, fails if the shifted box would leave the image and the
    /// box is left unchanged.
    pub fn shift(&mut self, dx: i32, dy: i32, bounds: Option<(u32, u32)>) -> Result<(), CoordsError> {
        let x = (self.x as i64 + dx as i64).max(0);
        let y = (self.y as i64 + dy as i64).max(0);
        let x = check_range("x", x, MAX_W)?;
        let y = check_range("y", y, MAX_H)?;

        if let Some((width, height)) = bounds {
            if x as u64 + self.w as u64 > width as u64 || y as u64 + self.h as u64 > height as u64 {
                return Err(CoordsError::OutOfBounds {
                    x,
                    y,
                    w: self.w,
                    h: self.h,
                    width,
                    height,
                });
            }
        }

        self.x = x;
        self.y = y;
        Ok(())
    }

    /// Area in pixels shared by both boxes.
    pub fn intersection_area(&self, other: &BoundingBox) -> u64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.x2().min(other.x2());
        let y2 = self.y2().min(other.y2());

        if x2 <= x1 || y2 <= y1 {
            return 0;
        }
        (x2 - x1) as u64 * (y2 - y1) as u64
    }

    /// Whether both boxes share at least one pixel.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.intersection_area(other) > 0
    }

    /// Percentage of each box's own area covered by the intersection.
    ///
    /// Returns `(pct_of_self, pct_of_other)`; an empty box reports 0.
    pub fn overlap(&self, other: &BoundingBox) -> (f32, f32) {
        let inter = self.intersection_area(other) as f64;
        let pct = |area: u64| {
            if area == 0 {
                0.0
            } else {
                (inter / area as f64 * 100.0) as f32
            }
        };
        (pct(self.area()), pct(other.area()))
    }

    /// Intersection of this box with an image extent, `None` if empty.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let x2 = self.x2().min(width);
        let y2 = self.y2().min(height);
        if x2 <= self.x || y2 <= self.y {
            return None;
        }
        Some(BoundingBox {
            x: self.x,
            y: self.y,
            w: x2 - self.x,
            h: y2 - self.y,
            confidence: self.confidence,
        })
    }

    /// Coordinates as an `[x, y, w, h]` array.
    pub fn to_array(&self) -> [u32; 4] {
        [self.x, self.y, self.w, self.h]
    }
}

impl PartialEq for BoundingBox {
    fn eq(&self, other: &Self) -> bool {
        self.to_array() == other.to_array()
    }
}

impl Eq for BoundingBox {}

impl PartialEq<[u32; 4]> for BoundingBox {
    fn eq(&self, other: &[u32; 4]) -> bool {
        self.to_array() == *other
    }
}

impl PartialEq<(u32, u32, u32, u32)> for BoundingBox {
    fn eq(&self, other: &(u32, u32, u32, u32)) -> bool {
        self.to_array() == [other.0, other.1, other.2, other.3]
    }
}

impl PartialEq<[u32]> for BoundingBox {
    fn eq(&self, other: &[u32]) -> bool {
        other.len() >= 4 && self.to_array()[..] == other[..4]
    }
}

impl PartialEq<Vec<u32>> for BoundingBox {
    fn eq(&self, other: &Vec<u32>) -> bool {
        *self == other[..]
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.x, self.y, self.w, self.h)?;
        if let Some(c) = self.confidence {
            write!(f, ": {:.3}", c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_rejects_out_of_range() {
        assert!(BoundingBox::new(MAX_W, MAX_H, MAX_W, MAX_H).is_ok());
        assert!(matches!(
            BoundingBox::new(MAX_W + 1, 0, 10, 10),
            Err(CoordsError::OutOfRange { name: "x", .. })
        ));
        assert!(matches!(
            BoundingBox::new(0, 0, 10, MAX_H + 1),
            Err(CoordsError::OutOfRange { name: "h", .. })
        ));
    }

    #[test]
    fn test_confidence_defaults_to_zero() {
        let mut b = BoundingBox::new(1, 2, 3, 4).unwrap();
        assert_eq!(b.confidence(), 0.0);
        assert!(!b.has_confidence());
        b.set_confidence(0.5).unwrap();
        assert_eq!(b.confidence(), 0.5);
        assert!(b.set_confidence(1.5).is_err());
        assert!(b.set_confidence(-0.1).is_err());
        assert_eq!(b.confidence(), 0.5);
    }

    #[test]
    fn test_equality_ignores_confidence() {
        let a = BoundingBox::new(10, 20, 30, 40).unwrap().with_confidence(0.9).unwrap();
        let b = BoundingBox::new(10, 20, 30, 40).unwrap();
        assert_eq!(a, b);
        assert!(a == [10, 20, 30, 40]);
        assert!(a == (10, 20, 30, 40));
        assert!(a == vec![10, 20, 30, 40, 99]);
        assert!(a != vec![10, 20, 30]);
    }

    #[test]
    fn test_scale_returns_centering_shift() {
        let mut b = BoundingBox::new(100, 100, 50, 40).unwrap();
        let (sx, sy) = b.scale(2.0, None).unwrap();
        assert_eq!((b.w(), b.h()), (100, 80));
        assert_eq!((sx, sy), (-25, -20));
        // Position untouched until the shift is applied.
        assert_eq!((b.x(), b.y()), (100, 100));
    }

    #[test]
    fn test_scale_exceeding_bounds_leaves_box_unchanged() {
        let mut b = BoundingBox::new(0, 0, 60, 60).unwrap();
        let err = b.scale(2.0, Some((100, 100))).unwrap_err();
        assert!(matches!(err, CoordsError::SizeExceeded { .. }));
        assert_eq!(b, [0, 0, 60, 60]);
        assert!(!b.fits_scale(2.0, Some((100, 100))));
        assert!(b.fits_scale(1.5, Some((100, 100))));
    }

    #[test]
    fn test_scale_rejects_bad_coefficient() {
        let mut b = BoundingBox::new(0, 0, 10, 10).unwrap();
        assert!(matches!(b.scale(0.0, None), Err(CoordsError::InvalidCoefficient(_))));
        assert!(matches!(b.scale(f64::NAN, None), Err(CoordsError::InvalidCoefficient(_))));
    }

    #[test]
    fn test_shift_clamps_to_zero() {
        let mut b = BoundingBox::new(5, 5, 10, 10).unwrap();
        b.shift(-20, -3, None).unwrap();
        assert_eq!((b.x(), b.y()), (0, 2));
    }

    #[test]
    fn test_shift_out_of_bounds() {
        let mut b = BoundingBox::new(80, 10, 20, 20).unwrap();
        let err = b.shift(5, 0, Some((100, 100))).unwrap_err();
        assert!(matches!(err, CoordsError::OutOfBounds { .. }));
        assert_eq!((b.x(), b.y()), (80, 10));
        b.shift(-10, 10, Some((100, 100))).unwrap();
        assert_eq!((b.x(), b.y()), (70, 20));
    }

    #[test]
    fn test_overlap_percentages() {
        let outer = BoundingBox::new(0, 0, 100, 100).unwrap();
        let inner = BoundingBox::new(25, 25, 50, 50).unwrap();
        assert_eq!(outer.intersection_area(&inner), 2500);
        let (pct_self, pct_other) = inner.overlap(&outer);
        assert!((pct_self - 100.0).abs() < 1e-3);
        assert!((pct_other - 25.0).abs() < 1e-3);

        let far = BoundingBox::new(200, 200, 10, 10).unwrap();
        assert_eq!(outer.overlap(&far), (0.0, 0.0));
        assert!(!outer.intersects(&far));
    }

    #[test]
    fn test_clamp_to_image() {
        let b = BoundingBox::new(90, 90, 20, 20).unwrap().with_confidence(0.4).unwrap();
        let clamped = b.clamp_to(100, 100).unwrap();
        assert_eq!(clamped, [90, 90, 10, 10]);
        assert_eq!(clamped.confidence(), 0.4);
        assert!(b.clamp_to(50, 50).is_none());
    }

    #[test]
    fn test_serde_validates() {
        let json = r#"{"x":1,"y":2,"w":3,"h":4,"confidence":0.25}"#;
        let b: BoundingBox = serde_json::from_str(json).unwrap();
        assert_eq!(b, [1, 2, 3, 4]);
        assert_eq!(b.confidence(), 0.25);

        let bad = r#"{"x":1,"y":2,"w":3,"h":4,"confidence":2.0}"#;
        assert!(serde_json::from_str::<BoundingBox>(bad).is_err());
    }

    proptest! {
        #[test]
        fn prop_copy_equals_coordinates(
            x in 0..=MAX_W,
            y in 0..=MAX_H,
            w in 0..=MAX_W,
            h in 0..=MAX_H,
            c in 0.0f32..=1.0,
        ) {
            let b = BoundingBox::new(x, y, w, h).unwrap();
            let mut copy = b.copy();
            prop_assert!(copy == (x, y, w, h));
            copy.set_confidence(c).unwrap();
            prop_assert!(copy == vec![x, y, w, h]);
            prop_assert_eq!(copy, b);
        }
    }
}
