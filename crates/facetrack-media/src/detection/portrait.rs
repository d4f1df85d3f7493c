//! Portrait reframing of face boxes.
//!
//! A tight face box is enlarged into a head-and-shoulders framing: it is
//! scaled by the largest factor in `2.2, 2.1, ... 1.0` that still fits the
//! image, then moved back around the face. The vertical move is damped so the
//! framing shows more of the head than of the chin.

use crate::error::MediaResult;
use facetrack_models::{BoundingBox, CoordsError};
use tracing::debug;

/// Largest scale factor tried, in tenths.
const MAX_SCALE_TENTHS: u32 = 22;

/// Smallest scale factor tried, in tenths.
const MIN_SCALE_TENTHS: u32 = 10;

/// Divisor applied to the vertical recentring shift.
pub const VERTICAL_SHIFT_DAMPING: f64 = 1.5;

/// Largest scale factor fitting an image of `width` x `height`.
pub fn portrait_scale(bbox: &BoundingBox, width: u32, height: u32) -> Option<f64> {
    (MIN_SCALE_TENTHS..=MAX_SCALE_TENTHS)
        .rev()
        .map(|tenths| tenths as f64 / 10.0)
        .find(|coeff| bbox.fits_scale(*coeff, Some((width, height))))
}

/// Reframe `bbox` in place for an image of `width` x `height`.
///
/// Without a fitting scale the box is left untouched. A shift that would
/// leave the image is skipped and the box stays scaled at its previous
/// position; any other error is returned.
pub fn to_portrait(bbox: &mut BoundingBox, width: u32, height: u32) -> MediaResult<()> {
    let Some(coeff) = portrait_scale(bbox, width, height) else {
        debug!(%bbox, width, height, "No portrait scale fits the image");
        return Ok(());
    };

    let (shift_x, shift_y) = bbox.scale(coeff, Some((width, height)))?;
    let damped_y = (shift_y as f64 / VERTICAL_SHIFT_DAMPING) as i32;

    match bbox.shift(shift_x, damped_y, Some((width, height))) {
        Ok(()) => Ok(()),
        Err(e @ CoordsError::OutOfBounds { .. }) => {
            debug!(%bbox, error = %e, "Portrait shift skipped");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Reframe every box of a frame.
pub fn to_portraits(boxes: &mut [BoundingBox], width: u32, height: u32) -> MediaResult<()> {
    for bbox in boxes.iter_mut() {
        to_portrait(bbox, width, height)?;
    }
    Ok(())
}
