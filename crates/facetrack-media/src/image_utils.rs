//! Image helpers: crop, resize, blank frames and file output.

use crate::error::{MediaError, MediaResult};
use facetrack_models::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::path::Path;

/// Image file extensions accepted by [`save_image`].
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "bmp", "tif", "tiff", "gif", "pnm", "webp",
];

/// Whether `ext` (with or without leading dot) is a supported image extension.
pub fn is_image_extension(ext: &str) -> bool {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str())
}

/// Sub-image covered by `bbox`, clamped to the image extent.
///
/// Returns `None` when the box does not intersect the image.
pub fn crop(image: &RgbImage, bbox: &BoundingBox) -> Option<RgbImage> {
    let clamped = bbox.clamp_to(image.width(), image.height())?;
    Some(imageops::crop_imm(image, clamped.x(), clamped.y(), clamped.w(), clamped.h()).to_image())
}

/// Resize to `width` x `height`.
///
/// A non-positive dimension is derived from the other one to keep the aspect
/// ratio; when both are non-positive the image is returned unchanged.
pub fn resize(image: &RgbImage, width: i32, height: i32) -> RgbImage {
    let (w, h) = (image.width(), image.height());
    if w == 0 || h == 0 {
        return image.clone();
    }
    let (nw, nh) = match (width > 0, height > 0) {
        (false, false) => return image.clone(),
        (true, true) => (width as u32, height as u32),
        (true, false) => {
            let nw = width as u32;
            (nw, ((h as f64 * nw as f64 / w as f64).round() as u32).max(1))
        }
        (false, true) => {
            let nh = height as u32;
            (((w as f64 * nh as f64 / h as f64).round() as u32).max(1), nh)
        }
    };
    if (nw, nh) == (w, h) {
        return image.clone();
    }
    imageops::resize(image, nw, nh, FilterType::Triangle)
}

/// Black frame of the given size.
pub fn blank(width: u32, height: u32) -> RgbImage {
    RgbImage::new(width, height)
}

/// Write an image, checking the extension against [`IMAGE_EXTENSIONS`].
pub fn save_image(image: &RgbImage, path: &Path) -> MediaResult<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    if !is_image_extension(ext) {
        return Err(MediaError::UnsupportedFormat(format!(
            "image extension '{}' for {}",
            ext,
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    image.save(path)?;
    Ok(())
}

/// Conversions between OpenCV BGR matrices and `RgbImage`.
#[cfg(feature = "opencv")]
pub mod mat {
    use crate::error::{MediaError, MediaResult};
    use image::{ImageBuffer, RgbImage};
    use opencv::{core::Mat, imgproc, prelude::*};

    /// Convert a BGR frame into an RGB image.
    pub fn mat_to_rgb_image(mat: &Mat) -> MediaResult<RgbImage> {
        let rows = mat.rows();
        let cols = mat.cols();

        let mut rgb = Mat::default();
        imgproc::cvt_color_def(mat, &mut rgb, imgproc::COLOR_BGR2RGB)?;
        let data = rgb.data_bytes()?;

        ImageBuffer::from_raw(cols as u32, rows as u32, data.to_vec())
            .ok_or_else(|| MediaError::internal("Frame buffer size mismatch"))
    }

    /// Convert an RGB image into a BGR matrix.
    pub fn rgb_image_to_mat(image: &RgbImage) -> MediaResult<Mat> {
        let height = image.height() as i32;
        let flat = Mat::from_slice(image.as_raw())?;
        let reshaped = flat.reshape(3, height)?;

        let mut bgr = Mat::default();
        imgproc::cvt_color_def(&reshaped, &mut bgr, imgproc::COLOR_RGB2BGR)?;
        Ok(bgr)
    }

    /// Convert an RGB image into a single-channel grayscale matrix.
    pub fn rgb_image_to_gray_mat(image: &RgbImage) -> MediaResult<Mat> {
        let bgr = rgb_image_to_mat(image)?;
        let mut gray = Mat::default();
        imgproc::cvt_color_def(&bgr, &mut gray, imgproc::COLOR_BGR2GRAY)?;
        Ok(gray)
    }
}
