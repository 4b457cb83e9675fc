use log::trace;
use ndarray::ArrayView2;

use crate::hessian::ResponseLayer;
use crate::SurfKeyPoint;

/// Finds maxima in `layers[1]` i.e. responses above `threshold` that are strictly
/// greater than all their 26 neighbours in the 3D response stack, and refines each
/// with [`interpolate_extremum`].
pub fn find_maxima_in_layer(
    layers: &[ResponseLayer],
    threshold: f32,
    octave: usize,
    layer_index: usize,
) -> Vec<SurfKeyPoint> {
    assert_eq!(layers.len(), 3);
    let below = &layers[0];
    let curr = &layers[1];
    let above = &layers[2];
    assert!(below.step == curr.step && curr.step == above.step);
    let size = curr.size;
    let step = curr.step;
    let (rows, cols) = curr.det.dim();

    // Ignore samples without a full 3x3x3 neighbourhood in the layer above
    let margin = (above.size / 2) / step + 1;
    if rows <= 2 * margin || cols <= 2 * margin {
        return Vec::new();
    }

    let p0 = below.det.view();
    let p1 = curr.det.view();
    let p2 = above.det.view();
    let mut maxima = Vec::new();
    for y in margin..(rows - margin) {
        for x in margin..(cols - margin) {
            let val = p1[(y, x)];
            if val <= threshold {
                continue;
            }
            let n9 = neighbourhood(&p0, &p1, &p2, x, y);
            let is_max = n9
                .iter()
                .flatten()
                .enumerate()
                .all(|(k, v)| k == 13 || val > *v);
            if !is_max {
                continue;
            }
            // Top-left corner of the wavelet in the image. The integer division
            // does not cancel with the multiplication.
            let sum_y = step * (y - (size / 2) / step);
            let sum_x = step * (x - (size / 2) / step);
            let mut kp = SurfKeyPoint {
                x: sum_x as f32 + (size - 1) as f32 * 0.5,
                y: sum_y as f32 + (size - 1) as f32 * 0.5,
                size: size as f32,
                angle: 0.0,
                response: val,
                octave,
            };
            let ds = (size - below.size) as f32;
            if interpolate_extremum(&n9, step as f32, ds, &mut kp) {
                maxima.push(kp);
            }
        }
    }
    trace!(
        "Octave {octave} layer {layer_index} (size {size}): {} maxima above {threshold}",
        maxima.len()
    );
    maxima
}

/// Responses around `(x, y)` in the layers below, at and above the candidate,
/// each row-major over the 3x3 window. The candidate itself is `[1][4]`.
fn neighbourhood(
    p0: &ArrayView2<f32>,
    p1: &ArrayView2<f32>,
    p2: &ArrayView2<f32>,
    x: usize,
    y: usize,
) -> [[f32; 9]; 3] {
    #[inline(always)]
    fn window(arr: &ArrayView2<f32>, x: usize, y: usize) -> [f32; 9] {
        [
            arr[(y - 1, x - 1)],
            arr[(y - 1, x)],
            arr[(y - 1, x + 1)],
            arr[(y, x - 1)],
            arr[(y, x)],
            arr[(y, x + 1)],
            arr[(y + 1, x - 1)],
            arr[(y + 1, x)],
            arr[(y + 1, x + 1)],
        ]
    }
    [window(p0, x, y), window(p1, x, y), window(p2, x, y)]
}

/// Maxima are found on the sampling grid of the response layers. The actual maximum
/// of the response function is located by fitting a quadratic (second order Taylor
/// expansion) around the sample and solving for its stationary point.
///
/// `dxy` is the grid spacing in pixels and `ds` the filter size difference to the
/// layer below. Returns `false` if the fitted offset leaves the neighbourhood.
fn interpolate_extremum(n9: &[[f32; 9]; 3], dxy: f32, ds: f32, kp: &mut SurfKeyPoint) -> bool {
    // Negative gradient
    let b1 = -(n9[1][5] - n9[1][3]) / 2.;
    let b2 = -(n9[1][7] - n9[1][1]) / 2.;
    let b3 = -(n9[2][4] - n9[0][4]) / 2.;

    // Hessian matrix, symmetric
    let h11 = n9[1][3] - 2. * n9[1][4] + n9[1][5];
    let h12 = (n9[1][8] - n9[1][6] - n9[1][2] + n9[1][0]) / 4.;
    let h13 = (n9[2][5] - n9[2][3] - n9[0][5] + n9[0][3]) / 4.;
    let h22 = n9[1][1] - 2. * n9[1][4] + n9[1][7];
    let h23 = (n9[2][7] - n9[2][1] - n9[0][7] + n9[0][1]) / 4.;
    let h33 = n9[0][4] - 2. * n9[1][4] + n9[2][4];

    let det = h11 * h22 * h33 - h11 * h23 * h23 - h12 * h12 * h33 + 2. * h12 * h13 * h23
        - h13 * h13 * h22;
    if det == 0. || !det.is_finite() {
        return false;
    }
    let hinv11 = (h22 * h33 - h23 * h23) / det;
    let hinv12 = (h13 * h23 - h12 * h33) / det;
    let hinv13 = (h12 * h23 - h13 * h22) / det;
    let hinv22 = (h11 * h33 - h13 * h13) / det;
    let hinv23 = (h12 * h13 - h11 * h23) / det;
    let hinv33 = (h11 * h22 - h12 * h12) / det;

    let offset_x = hinv11 * b1 + hinv12 * b2 + hinv13 * b3;
    let offset_y = hinv12 * b1 + hinv22 * b2 + hinv23 * b3;
    let offset_s = hinv13 * b1 + hinv23 * b2 + hinv33 * b3;

    let moved = offset_x != 0. || offset_y != 0. || offset_s != 0.;
    let within = offset_x.abs() <= 1. && offset_y.abs() <= 1. && offset_s.abs() <= 1.;
    if !(moved && within) {
        return false;
    }
    kp.x += offset_x * dxy;
    kp.y += offset_y * dxy;
    kp.size = (kp.size + offset_s * ds).round();
    true
}

#[cfg(test)]
fn test_keypoint() -> SurfKeyPoint {
    SurfKeyPoint {
        x: 10.0,
        y: 20.0,
        size: 15.0,
        angle: 0.0,
        response: 1.0,
        octave: 0,
    }
}

#[test]
fn symmetric_peak_moves_only_in_scale() {
    // Quadratic bowl in x and y, larger response towards the layer above.
    let plane = |centre: f32| {
        [
            centre - 2.,
            centre - 1.,
            centre - 2.,
            centre - 1.,
            centre,
            centre - 1.,
            centre - 2.,
            centre - 1.,
            centre - 2.,
        ]
    };
    let n9 = [plane(8.), plane(10.), plane(9.)];
    let mut kp = test_keypoint();
    assert!(interpolate_extremum(&n9, 1.0, 6.0, &mut kp));
    assert_eq!(kp.x, 10.0);
    assert_eq!(kp.y, 20.0);
    // offset_s = -(9 - 8) / 2 / (8 - 20 + 9) = 1/6 -> size 15 + 1 = 16
    assert_eq!(kp.size, 16.0);
}

#[test]
fn flat_neighbourhood_is_rejected() {
    let n9 = [[1.0; 9]; 3];
    let mut kp = test_keypoint();
    assert!(!interpolate_extremum(&n9, 1.0, 6.0, &mut kp));
    assert_eq!(kp.size, 15.0);
}

#[test]
fn single_peak_is_found() {
    use ndarray::Array2;
    let layer = |size: usize, peak: f32| {
        let mut det = Array2::zeros((40, 40));
        for y in 17..=23 {
            for x in 17..=23 {
                let d = (x as f32 - 20.).powi(2) + (y as f32 - 20.).powi(2);
                det[(y, x)] = peak - d;
            }
        }
        ResponseLayer {
            size,
            step: 1,
            det,
        }
    };
    let layers = [layer(9, 80.), layer(15, 100.), layer(21, 90.)];
    let maxima = find_maxima_in_layer(&layers, 50.0, 0, 1);
    assert_eq!(maxima.len(), 1);
    let kp = &maxima[0];
    assert_eq!(kp.response, 100.0);
    // wavelet top-left at 20 - 7 = 13, centre at 13 + 7 = 20
    assert!((kp.x - 20.0).abs() < 1e-4);
    assert!((kp.y - 20.0).abs() < 1e-4);

    // nothing survives a threshold above the peak
    assert!(find_maxima_in_layer(&layers, 100.0, 0, 1).is_empty());
}
