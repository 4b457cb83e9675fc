//! Orientation assignment and the 64 component SURF descriptor.

use std::f32::consts::PI as PI32;

use image::imageops::{resize, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use itertools::izip;
use log::trace;
use ndarray::{Array2, ArrayView2};
use nshare::AsNdarray2;

use crate::hessian::HAAR_SIZE0;
use crate::integral::{haar_response, resize_haar_pattern, IntegralImage};
use crate::SurfKeyPoint;

/// Radius (in units of the keypoint scale) of the disc sampled for orientation.
const ORI_RADIUS: i32 = 6;
/// Width of the sliding orientation window in degrees.
const ORI_WIN: i32 = 60;
/// Step of the sliding orientation window in degrees.
const ORI_SEARCH_INC: usize = 5;
const ORI_SIGMA: f32 = 2.5;

/// Side length of the resampled patch the descriptor is computed on.
const PATCH_SZ: usize = 20;
const DESC_SIGMA: f32 = 3.3;
/// 4x4 subregions of 5x5 samples.
const SUBREGIONS: usize = 4;
const SUBREGION_SZ: usize = PATCH_SZ / SUBREGIONS;

pub const DESCRIPTOR_SIZE: usize = SUBREGIONS * SUBREGIONS * 4;

const ORI_DX_PATTERN: [[i32; 5]; 2] = [[0, 0, 2, 4, -1], [2, 0, 4, 4, 1]];
const ORI_DY_PATTERN: [[i32; 5]; 2] = [[0, 0, 4, 2, 1], [0, 2, 4, 4, -1]];

type LumaFImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Normalized 1D Gaussian kernel of length `n`, centred between the middle samples
/// for even `n`.
fn gaussian_kernel(n: usize, sigma: f32) -> Vec<f32> {
    let centre = (n as f32 - 1.) * 0.5;
    let scale = -1. / (2. * sigma * sigma);
    let kernel: Vec<f32> = (0..n)
        .map(|i| ((i as f32 - centre).powi(2) * scale).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.into_iter().map(|k| k / sum).collect()
}

/// Integer sample offsets within `ORI_RADIUS` and their Gaussian weights.
struct OrientationSamples {
    offsets: Vec<(i32, i32)>,
    weights: Vec<f32>,
}

impl OrientationSamples {
    fn new() -> Self {
        let g = gaussian_kernel(2 * ORI_RADIUS as usize + 1, ORI_SIGMA);
        let (offsets, weights) = (-ORI_RADIUS..=ORI_RADIUS)
            .flat_map(|i| (-ORI_RADIUS..=ORI_RADIUS).map(move |j| (i, j)))
            .filter(|(i, j)| i * i + j * j <= ORI_RADIUS * ORI_RADIUS)
            .map(|(i, j)| {
                let w = g[(i + ORI_RADIUS) as usize] * g[(j + ORI_RADIUS) as usize];
                ((i, j), w)
            })
            .unzip();
        OrientationSamples { offsets, weights }
    }
}

/// Scale of a keypoint relative to the Gaussian the smallest box filter approximates.
#[inline]
fn keypoint_scale(size: f32) -> f32 {
    size * 1.2 / HAAR_SIZE0 as f32
}

/// Dominant gradient direction around a keypoint in degrees in `[0, 360)`.
///
/// Haar wavelet responses are sampled on a disc of radius `6s` and the direction of
/// the largest summed response inside a sliding 60 degree window wins. Returns `None`
/// if the wavelet does not fit into the image or no sample lies inside it.
fn assign_orientation(
    integral: &IntegralImage,
    samples: &OrientationSamples,
    kp: &SurfKeyPoint,
) -> Option<f32> {
    let s = keypoint_scale(kp.size);
    let grad_wav_size = 2 * (2. * s).round() as usize;
    let width = integral.width();
    let height = integral.height();
    if grad_wav_size == 0 || height + 1 < grad_wav_size || width + 1 < grad_wav_size {
        return None;
    }
    let dx = resize_haar_pattern(&ORI_DX_PATTERN, 4, grad_wav_size);
    let dy = resize_haar_pattern(&ORI_DY_PATTERN, 4, grad_wav_size);
    let half_wav = (grad_wav_size - 1) as f32 / 2.;

    let (resp_x, resp_y): (Vec<f32>, Vec<f32>) = samples
        .offsets
        .iter()
        .zip(&samples.weights)
        .filter_map(|((i, j), w)| {
            let x = (kp.x + *i as f32 * s - half_wav).round() as i64;
            let y = (kp.y + *j as f32 * s - half_wav).round() as i64;
            if x < 0
                || y < 0
                || x as usize + grad_wav_size > width
                || y as usize + grad_wav_size > height
            {
                return None;
            }
            let (x, y) = (x as usize, y as usize);
            Some((
                haar_response(integral, &dx, x, y) * w,
                haar_response(integral, &dy, x, y) * w,
            ))
        })
        .unzip();
    if resp_x.is_empty() {
        return None;
    }
    let angles: Vec<i32> = resp_x
        .iter()
        .zip(&resp_y)
        .map(|(x, y)| {
            let deg = y.atan2(*x).to_degrees();
            (if deg < 0. { deg + 360. } else { deg }).round() as i32
        })
        .collect();

    let mut best = (0f32, 0f32);
    let mut best_mod = 0f32;
    for window_start in (0..360).step_by(ORI_SEARCH_INC) {
        let (mut sum_x, mut sum_y) = (0f32, 0f32);
        for (angle, x, y) in izip!(&angles, &resp_x, &resp_y) {
            let d = (angle - window_start as i32).abs();
            if d < ORI_WIN / 2 || d > 360 - ORI_WIN / 2 {
                sum_x += x;
                sum_y += y;
            }
        }
        let m = sum_x * sum_x + sum_y * sum_y;
        if m > best_mod {
            best_mod = m;
            best = (sum_x, sum_y);
        }
    }
    let deg = (-best.1).atan2(best.0).to_degrees();
    Some(if deg < 0. { deg + 360. } else { deg })
}

/// Sample a square window of `win_size` pixels centred on `(x, y)` and rotated by
/// `angle` degrees, bilinearly interpolated and clamped at the image border.
/// Pixel values are scaled to `[0; 1]`.
fn rotated_window(img: &ArrayView2<u8>, x: f32, y: f32, angle: f32, win_size: usize) -> LumaFImage {
    let (height, width) = img.dim();
    let (sin, cos) = (angle * PI32 / 180.).sin_cos();
    let sin_dir = -sin;
    let cos_dir = cos;
    let win_offset = -((win_size - 1) as f32) / 2.;
    let start_x = x + win_offset * cos_dir + win_offset * sin_dir;
    let start_y = y - win_offset * sin_dir + win_offset * cos_dir;

    let mut win = LumaFImage::new(win_size as u32, win_size as u32);
    for i in 0..win_size {
        let row_x = start_x + i as f32 * sin_dir;
        let row_y = start_y + i as f32 * cos_dir;
        for j in 0..win_size {
            let px = row_x + j as f32 * cos_dir;
            let py = row_y - j as f32 * sin_dir;
            let ix = px.floor();
            let iy = py.floor();
            let value = if ix >= 0.
                && iy >= 0.
                && (ix as usize) < width - 1
                && (iy as usize) < height - 1
            {
                let (ix, iy) = (ix as usize, iy as usize);
                let a = px - ix as f32;
                let b = py - iy as f32;
                f32::from(img[(iy, ix)]) * (1. - a) * (1. - b)
                    + f32::from(img[(iy, ix + 1)]) * a * (1. - b)
                    + f32::from(img[(iy + 1, ix)]) * (1. - a) * b
                    + f32::from(img[(iy + 1, ix + 1)]) * a * b
            } else {
                let cx = (px.round().max(0.) as usize).min(width - 1);
                let cy = (py.round().max(0.) as usize).min(height - 1);
                f32::from(img[(cy, cx)])
            };
            win.put_pixel(j as u32, i as u32, Luma([value / 255.]));
        }
    }
    win
}

/// Compute the SURF descriptor of a keypoint at `(x, y)` with the given size and
/// orientation (degrees). The result has unit L2 norm unless the patch is flat.
pub fn compute_descriptor(
    img: &ArrayView2<u8>,
    x: f32,
    y: f32,
    size: f32,
    orientation: f32,
) -> [f32; DESCRIPTOR_SIZE] {
    let s = keypoint_scale(size);
    let win_size = (((PATCH_SZ + 1) as f32 * s) as usize).max(2);
    let win = rotated_window(img, x, y, orientation, win_size);
    let patch = resize(
        &win,
        PATCH_SZ as u32 + 1,
        PATCH_SZ as u32 + 1,
        FilterType::Triangle,
    );
    let patch = patch.as_ndarray2();

    let g = gaussian_kernel(PATCH_SZ, DESC_SIGMA);
    let mut desc = [0f32; DESCRIPTOR_SIZE];
    for (region, out) in desc.chunks_exact_mut(4).enumerate() {
        let region_y = (region / SUBREGIONS) * SUBREGION_SZ;
        let region_x = (region % SUBREGIONS) * SUBREGION_SZ;
        for i in region_y..region_y + SUBREGION_SZ {
            for j in region_x..region_x + SUBREGION_SZ {
                let w = g[i] * g[j];
                let dx = (patch[(i, j + 1)] - patch[(i, j)] + patch[(i + 1, j + 1)]
                    - patch[(i + 1, j)])
                    * w;
                let dy = (patch[(i + 1, j)] - patch[(i, j)] + patch[(i + 1, j + 1)]
                    - patch[(i, j + 1)])
                    * w;
                out[0] += dx;
                out[1] += dy;
                out[2] += dx.abs();
                out[3] += dy.abs();
            }
        }
    }
    let norm = desc.iter().map(|v| v * v).sum::<f32>().sqrt();
    let scale = 1. / (norm + f32::EPSILON);
    desc.iter_mut().for_each(|v| *v *= scale);
    desc
}

/// Assign orientations and compute descriptors. Keypoints for which no orientation
/// can be assigned are dropped, the returned descriptor rows follow the returned
/// keypoints.
pub fn describe_keypoints(
    img: &GrayImage,
    integral: &IntegralImage,
    keypoints: Vec<SurfKeyPoint>,
) -> (Vec<SurfKeyPoint>, Array2<f32>) {
    let samples = OrientationSamples::new();
    let n_detected = keypoints.len();
    let keypoints: Vec<SurfKeyPoint> = keypoints
        .into_iter()
        .filter_map(|mut kp| {
            kp.angle = assign_orientation(integral, &samples, &kp)?;
            Some(kp)
        })
        .collect();
    trace!(
        "Dropped {} keypoints without orientation.",
        n_detected - keypoints.len()
    );

    let pixels = img.as_ndarray2();
    let mut desc = Array2::zeros((keypoints.len(), DESCRIPTOR_SIZE));
    desc.rows_mut()
        .into_iter()
        .zip(&keypoints)
        .for_each(|(mut row, kp)| {
            let kpdesc = compute_descriptor(&pixels, kp.x, kp.y, kp.size, kp.angle);
            row.iter_mut()
                .zip(kpdesc)
                .for_each(|(el, descriptor_component)| *el = descriptor_component);
        });
    (keypoints, desc)
}

#[cfg(test)]
fn keypoint_at(x: f32, y: f32, size: f32) -> SurfKeyPoint {
    SurfKeyPoint {
        x,
        y,
        size,
        angle: 0.,
        response: 1000.,
        octave: 0,
    }
}

#[test]
fn gaussian_kernel_is_normalized() {
    for n in [13, 20] {
        let g = gaussian_kernel(n, 2.5);
        assert!((g.iter().sum::<f32>() - 1.).abs() < 1e-5);
        assert!((g[0] - g[n - 1]).abs() < 1e-7);
        assert!(g[n / 2] > g[0]);
    }
}

#[test]
fn orientation_follows_gradient() {
    let samples = OrientationSamples::new();

    let ramp_x = GrayImage::from_fn(64, 64, |x, _| Luma([(x * 3) as u8]));
    let angle = assign_orientation(
        &IntegralImage::new(&ramp_x),
        &samples,
        &keypoint_at(32., 32., 15.),
    )
    .unwrap();
    assert!(angle < 1. || angle > 359., "angle = {angle}");

    let ramp_y = GrayImage::from_fn(64, 64, |_, y| Luma([(y * 3) as u8]));
    let angle = assign_orientation(
        &IntegralImage::new(&ramp_y),
        &samples,
        &keypoint_at(32., 32., 15.),
    )
    .unwrap();
    assert!((angle - 90.).abs() < 1., "angle = {angle}");
}

#[test]
fn huge_keypoint_has_no_orientation() {
    let img = GrayImage::new(32, 32);
    let samples = OrientationSamples::new();
    let kp = keypoint_at(16., 16., 200.);
    assert!(assign_orientation(&IntegralImage::new(&img), &samples, &kp).is_none());
}

#[test]
fn descriptor_is_unit_length() {
    let img = GrayImage::from_fn(64, 64, |x, y| Luma([((x * 7 + y * 13) % 50) as u8 * 5]));
    let pixels = img.as_ndarray2();
    let desc = compute_descriptor(&pixels, 32., 32., 15., 30.);
    let norm = desc.iter().map(|v| v * v).sum::<f32>().sqrt();
    assert!((norm - 1.).abs() < 1e-3, "norm = {norm}");
    // absolute sums are never smaller than the signed ones
    for chunk in desc.chunks_exact(4) {
        assert!(chunk[2] + 1e-6 >= chunk[0].abs());
        assert!(chunk[3] + 1e-6 >= chunk[1].abs());
    }
}

#[test]
fn descriptor_rows_follow_keypoints() {
    let img = GrayImage::from_fn(64, 64, |x, y| Luma([((x * 7 + y * 13) % 50) as u8 * 5]));
    let integral = IntegralImage::new(&img);
    let keypoints = vec![keypoint_at(32., 32., 15.), keypoint_at(20., 40., 300.)];
    let (kept, desc) = describe_keypoints(&img, &integral, keypoints);
    assert_eq!(kept.len(), 1);
    assert_eq!(desc.nrows(), 1);
    assert_eq!(desc.ncols(), DESCRIPTOR_SIZE);
    assert_eq!(kept[0].x, 32.);
}
