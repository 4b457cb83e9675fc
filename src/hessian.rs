//! Box-filter approximation of the determinant of Hessian scale space.

use log::{debug, trace};
use ndarray::Array2;

use crate::integral::{haar_response, resize_haar_pattern, IntegralImage};

/// Side length of the smallest box filter.
pub(crate) const HAAR_SIZE0: usize = 9;
/// Filter size increment between consecutive layers of the first octave.
const HAAR_SIZE_INC: usize = 6;

/// Relative weight of the Dxy term in the determinant, compensating for the box
/// filter approximation of the Gaussian second derivatives.
const DXY_WEIGHT: f32 = 0.81;

const DX_PATTERN: [[i32; 5]; 3] = [[0, 2, 3, 7, 1], [3, 2, 6, 7, -2], [6, 2, 9, 7, 1]];
const DY_PATTERN: [[i32; 5]; 3] = [[2, 0, 7, 3, 1], [2, 3, 7, 6, -2], [2, 6, 7, 9, 1]];
const DXY_PATTERN: [[i32; 5]; 4] = [
    [1, 1, 4, 4, 1],
    [5, 1, 8, 4, -1],
    [1, 5, 4, 8, -1],
    [5, 5, 8, 8, 1],
];

/// Determinant of Hessian responses for one filter size.
///
/// Responses are stored on a grid subsampled by `step`. `det[(i, j)]` belongs to the
/// wavelet whose top-left corner is at `(step * (j - margin), step * (i - margin))`
/// with `margin = (size / 2) / step`. Cells the filter cannot reach stay zero.
#[derive(Debug, Clone)]
pub struct ResponseLayer {
    pub size: usize,
    pub step: usize,
    pub det: Array2<f32>,
}

impl ResponseLayer {
    /// A layer whose filter does not fit into the image, nothing is allocated for it.
    fn empty(size: usize, step: usize) -> Self {
        ResponseLayer {
            size,
            step,
            det: Array2::zeros((0, 0)),
        }
    }
}

/// Filter size of `layer` in `octave`, `None` if it does not fit into a `usize`.
pub fn filter_size(octave: usize, layer: usize) -> Option<usize> {
    let step = 1usize.checked_shl(u32::try_from(octave).ok()?)?;
    HAAR_SIZE_INC
        .checked_mul(layer)?
        .checked_add(HAAR_SIZE0)?
        .checked_mul(step)
}

/// Compute one layer of determinant of Hessian responses.
pub fn compute_layer(integral: &IntegralImage, size: usize, step: usize) -> ResponseLayer {
    let width = integral.width();
    let height = integral.height();
    if size > width || size > height {
        trace!("Filter size {size} exceeds image {width}x{height}, layer left empty.");
        return ResponseLayer::empty(size, step);
    }
    let mut layer = ResponseLayer {
        size,
        step,
        det: Array2::zeros((height / step, width / step)),
    };
    let dx = resize_haar_pattern(&DX_PATTERN, HAAR_SIZE0, size);
    let dy = resize_haar_pattern(&DY_PATTERN, HAAR_SIZE0, size);
    let dxy = resize_haar_pattern(&DXY_PATTERN, HAAR_SIZE0, size);

    let samples_y = 1 + (height - size) / step;
    let samples_x = 1 + (width - size) / step;
    let margin = (size / 2) / step;
    for i in 0..samples_y {
        for j in 0..samples_x {
            let x = j * step;
            let y = i * step;
            let vx = haar_response(integral, &dx, x, y);
            let vy = haar_response(integral, &dy, x, y);
            let vxy = haar_response(integral, &dxy, x, y);
            layer.det[(i + margin, j + margin)] = vx * vy - DXY_WEIGHT * vxy * vxy;
        }
    }
    layer
}

/// Build up to `octave_layers + 2` response layers for each octave.
/// The extra layers bound the search for extrema from below and above.
///
/// Only layers whose filter fits into the image are built, and octaves stop at the
/// first one whose smallest filter does not fit.
pub fn build_response_layers(
    integral: &IntegralImage,
    n_octaves: usize,
    octave_layers: usize,
) -> Vec<Vec<ResponseLayer>> {
    let max_size = integral.width().min(integral.height());
    let scale_space: Vec<Vec<ResponseLayer>> = (0..n_octaves)
        .map_while(|octave| {
            let sizes: Vec<usize> = (0..octave_layers + 2)
                .map_while(|layer| filter_size(octave, layer).filter(|size| *size <= max_size))
                .collect();
            if sizes.is_empty() {
                return None;
            }
            // filter_size succeeded, so the shift does not overflow
            let step = 1usize << octave;
            debug!("Octave {octave}: step {step}, filter sizes {sizes:?}");
            Some(
                sizes
                    .into_iter()
                    .map(|size| compute_layer(integral, size, step))
                    .collect(),
            )
        })
        .collect();
    if scale_space.len() < n_octaves {
        debug!(
            "Only {} of {n_octaves} octaves fit into the {}x{} image.",
            scale_space.len(),
            integral.width(),
            integral.height()
        );
    }
    scale_space
}

#[test]
fn filter_sizes_double_per_octave() {
    assert_eq!(filter_size(0, 0), Some(9));
    assert_eq!(filter_size(0, 1), Some(15));
    assert_eq!(filter_size(0, 3), Some(27));
    assert_eq!(filter_size(1, 0), Some(18));
    assert_eq!(filter_size(2, 1), Some(60));
}

#[test]
fn filter_size_overflow_is_none() {
    assert_eq!(filter_size(63, 0), None);
    assert_eq!(filter_size(64, 0), None);
    assert_eq!(filter_size(130, 1), None);
    assert_eq!(filter_size(0, usize::MAX / 2), None);
}

#[test]
fn blob_has_positive_determinant_at_centre() {
    use image::{GrayImage, Luma};
    // bright disc of radius 4 centred at (20, 20)
    let img = GrayImage::from_fn(41, 41, |x, y| {
        let dx = x as f32 - 20.0;
        let dy = y as f32 - 20.0;
        if dx * dx + dy * dy <= 16.0 {
            Luma([255])
        } else {
            Luma([0])
        }
    });
    let integral = IntegralImage::new(&img);
    let layer = compute_layer(&integral, 9, 1);
    assert_eq!(layer.det.dim(), (41, 41));
    // the wavelet centred on the blob has its top-left corner at (16, 16)
    let centre = layer.det[(20, 20)];
    assert!(centre > 0.0, "det at centre = {centre}");
    assert_eq!(layer.det[(0, 0)], 0.0);
}

#[test]
fn oversized_filter_gives_empty_layer() {
    let img = image::GrayImage::new(10, 30);
    let integral = IntegralImage::new(&img);
    let layer = compute_layer(&integral, 15, 1);
    assert_eq!(layer.size, 15);
    assert!(layer.det.is_empty());
}

#[test]
fn scale_space_stops_at_image_size() {
    let img = image::GrayImage::new(40, 100);
    let integral = IntegralImage::new(&img);
    // octave 0: 9 15 21 27 33 39, octave 1: 18 30, octave 2: 36
    let scale_space = build_response_layers(&integral, 200, 8);
    let sizes: Vec<Vec<usize>> = scale_space
        .iter()
        .map(|layers| layers.iter().map(|l| l.size).collect())
        .collect();
    assert_eq!(
        sizes,
        vec![vec![9, 15, 21, 27, 33, 39], vec![18, 30], vec![36]]
    );
    assert_eq!(scale_space[2][0].step, 4);
    assert_eq!(scale_space[2][0].det.dim(), (25, 10));
}
