//! Drawing detections onto frames.

use crate::tracking::Landmarks;
use facetrack_models::BoundingBox;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

/// Thickness of face rectangles, in pixels.
pub const RECT_THICKNESS: u32 = 2;

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> Rgb<u8> {
    let c = v * s;
    let hp = h / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    let to_u8 = |f: f64| ((f + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgb([to_u8(r), to_u8(g), to_u8(b)])
}

/// Stable color of a person index.
///
/// Hues follow the golden ratio so that consecutive indices get well
/// separated colors.
pub fn person_color(index: usize) -> Rgb<u8> {
    let hue = (index as f64 * 0.618_033_988_749_895).fract() * 360.0;
    hsv_to_rgb(hue, 0.85, 0.95)
}

/// Draw a rectangle of [`RECT_THICKNESS`] pixels inside `bbox`.
pub fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    let Some(clamped) = bbox.clamp_to(image.width(), image.height()) else {
        return;
    };
    for inset in 0..RECT_THICKNESS {
        let (w, h) = (clamped.w(), clamped.h());
        if w <= 2 * inset || h <= 2 * inset {
            break;
        }
        let rect = Rect::at((clamped.x() + inset) as i32, (clamped.y() + inset) as i32)
            .of_size(w - 2 * inset, h - 2 * inset);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// Draw landmark points as small discs.
pub fn draw_landmarks(image: &mut RgbImage, points: &[(i32, i32)], radius: i32, color: Rgb<u8>) {
    for &(x, y) in points {
        draw_filled_circle_mut(image, (x, y), radius, color);
    }
}

/// Copy of `frame` with every face and its landmarks drawn.
///
/// `colors[j]` is the color of face `j`.
pub fn tag_image(
    frame: &RgbImage,
    faces: &[BoundingBox],
    landmarks: &[Landmarks],
    colors: &[Rgb<u8>],
) -> RgbImage {
    let mut tagged = frame.clone();
    for (j, face) in faces.iter().enumerate() {
        let color = colors.get(j).copied().unwrap_or_else(|| person_color(j));
        draw_box(&mut tagged, face, color);
        if let Some(points) = landmarks.get(j) {
            let radius = (face.w() / 80).max(1) as i32;
            draw_landmarks(&mut tagged, points, radius, color);
        }
    }
    tagged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_color_is_stable_and_distinct() {
        assert_eq!(person_color(3), person_color(3));
        assert_ne!(person_color(0), person_color(1));
        assert_ne!(person_color(1), person_color(2));
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), Rgb([255, 0, 0]));
        assert_eq!(hsv_to_rgb(120.0, 1.0, 1.0), Rgb([0, 255, 0]));
    }

    #[test]
    fn test_tag_image_draws_border() {
        let frame = RgbImage::new(50, 50);
        let face = BoundingBox::new(10, 10, 20, 20).unwrap();
        let red = Rgb([255, 0, 0]);
        let tagged = tag_image(&frame, &[face], &[vec![(20, 20)]], &[red]);

        assert_eq!(tagged.get_pixel(10, 10), &red);
        assert_eq!(tagged.get_pixel(11, 15), &red);
        assert_eq!(tagged.get_pixel(29, 29), &red);
        assert_eq!(tagged.get_pixel(20, 20), &red);
        assert_eq!(tagged.get_pixel(15, 25), &Rgb([0, 0, 0]));
        // source frame untouched
        assert_eq!(frame.get_pixel(10, 10), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_box_outside_image_is_ignored() {
        let mut image = RgbImage::new(10, 10);
        let face = BoundingBox::new(20, 20, 5, 5).unwrap();
        draw_box(&mut image, &face, Rgb([1, 2, 3]));
        assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }
}
