use image::{Rgb, RgbImage};
use imageproc::drawing;

use crate::KeyPoint;

/// Blue, the marker color of the `show` tool.
pub const KEYPOINT_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

/// Draw each keypoint as a circle with the diameter of its size and a spoke from the
/// centre towards its orientation, on a copy of `image`.
pub fn draw_rich_keypoints(image: &RgbImage, keypoints: &[KeyPoint], color: Rgb<u8>) -> RgbImage {
    let mut canvas = image.clone();
    for kp in keypoints {
        let radius = (kp.size / 2.).round().max(1.);
        let centre = (kp.x.round() as i32, kp.y.round() as i32);
        drawing::draw_hollow_circle_mut(&mut canvas, centre, radius as i32, color);
        let (sin, cos) = kp.angle.to_radians().sin_cos();
        drawing::draw_line_segment_mut(
            &mut canvas,
            (kp.x, kp.y),
            (kp.x + radius * cos, kp.y + radius * sin),
            color,
        );
    }
    canvas
}

#[cfg(test)]
fn keypoint(x: f32, y: f32, size: f32, angle: f32) -> KeyPoint {
    KeyPoint {
        x,
        y,
        size,
        angle,
        response: 1000.,
        octave: 0,
    }
}

#[test]
fn circle_and_spoke_are_drawn() {
    let image = RgbImage::new(64, 64);
    let out = draw_rich_keypoints(&image, &[keypoint(32., 32., 20., 0.)], KEYPOINT_COLOR);
    // circle of radius 10 crosses the horizontal and vertical axes
    assert_eq!(*out.get_pixel(32, 22), KEYPOINT_COLOR);
    assert_eq!(*out.get_pixel(22, 32), KEYPOINT_COLOR);
    // spoke towards angle 0 runs right of the centre
    assert_eq!(*out.get_pixel(37, 32), KEYPOINT_COLOR);
    assert_eq!(*out.get_pixel(27, 32), Rgb([0, 0, 0]));
    // the input is left untouched
    assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
}

#[test]
fn no_keypoints_leaves_copy_unchanged() {
    let image = RgbImage::from_pixel(8, 8, Rgb([10, 20, 30]));
    assert_eq!(draw_rich_keypoints(&image, &[], KEYPOINT_COLOR), image);
}

#[test]
fn keypoints_outside_the_image_are_clipped() {
    let image = RgbImage::new(16, 16);
    let out = draw_rich_keypoints(&image, &[keypoint(-40., 100., 30., 45.)], KEYPOINT_COLOR);
    assert_eq!(out.dimensions(), (16, 16));
}
