use image::GrayImage;
use ndarray::Array2;
use nshare::AsNdarray2;

/// Summed area table of an 8-bit grayscale image.
///
/// `sum[(y, x)]` holds the sum of all pixels above and left of `(x, y)`, so the
/// table is one row and one column larger than the image.
#[derive(Debug, Clone)]
pub struct IntegralImage {
    sum: Array2<f64>,
}

impl IntegralImage {
    pub fn new(img: &GrayImage) -> Self {
        let pixels = img.as_ndarray2();
        let (height, width) = pixels.dim();
        let mut sum = Array2::zeros((height + 1, width + 1));
        for y in 0..height {
            let mut row_sum = 0.0;
            for x in 0..width {
                row_sum += f64::from(pixels[(y, x)]);
                sum[(y + 1, x + 1)] = sum[(y, x + 1)] + row_sum;
            }
        }
        IntegralImage { sum }
    }

    /// Width of the source image.
    pub fn width(&self) -> usize {
        self.sum.ncols() - 1
    }

    /// Height of the source image.
    pub fn height(&self) -> usize {
        self.sum.nrows() - 1
    }

    /// Sum over the half open rectangle `[x0, x1) x [y0, y1)`.
    #[inline]
    pub fn box_sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        debug_assert!(x0 <= x1 && y0 <= y1);
        self.sum[(y1, x1)] - self.sum[(y0, x1)] - self.sum[(y1, x0)] + self.sum[(y0, x0)]
    }
}

/// One rectangle of a Haar wavelet, relative to the wavelet's top-left corner.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct HaarBox {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
    /// Weight divided by the box area.
    pub weight: f32,
}

/// Scale a wavelet defined on an `old_size` grid to `new_size`.
/// Each rectangle is given as `[x0, y0, x1, y1, weight]`.
pub fn resize_haar_pattern<const N: usize>(
    src: &[[i32; 5]; N],
    old_size: usize,
    new_size: usize,
) -> [HaarBox; N] {
    let ratio = new_size as f32 / old_size as f32;
    src.map(|[x0, y0, x1, y1, weight]| {
        let x0 = (ratio * x0 as f32).round() as usize;
        let y0 = (ratio * y0 as f32).round() as usize;
        let x1 = (ratio * x1 as f32).round() as usize;
        let y1 = (ratio * y1 as f32).round() as usize;
        let area = ((x1 - x0) * (y1 - y0)) as f32;
        HaarBox {
            x0,
            y0,
            x1,
            y1,
            weight: weight as f32 / area,
        }
    })
}

/// Response of a wavelet whose top-left corner sits at `(x, y)` in image coordinates.
#[inline]
pub fn haar_response(integral: &IntegralImage, boxes: &[HaarBox], x: usize, y: usize) -> f32 {
    boxes
        .iter()
        .map(|b| b.weight * integral.box_sum(x + b.x0, y + b.y0, x + b.x1, y + b.y1) as f32)
        .sum()
}

#[test]
fn integral_box_sums() {
    let img = GrayImage::from_fn(4, 3, |x, y| image::Luma([(x + 4 * y) as u8]));
    let integral = IntegralImage::new(&img);
    assert_eq!(integral.width(), 4);
    assert_eq!(integral.height(), 3);
    // whole image: 0 + 1 + ... + 11
    assert_eq!(integral.box_sum(0, 0, 4, 3), 66.0);
    // single pixel (2, 1) = 6
    assert_eq!(integral.box_sum(2, 1, 3, 2), 6.0);
    // second column: 1 + 5 + 9
    assert_eq!(integral.box_sum(1, 0, 2, 3), 15.0);
    assert_eq!(integral.box_sum(2, 2, 2, 3), 0.0);
}

#[test]
fn resized_haar_pattern_is_area_normalized() {
    let pattern = [[0, 2, 3, 7, 1], [3, 2, 6, 7, -2], [6, 2, 9, 7, 1]];
    let resized = resize_haar_pattern(&pattern, 9, 15);
    assert_eq!(resized[0].x0, 0);
    assert_eq!(resized[0].x1, 5);
    assert_eq!(resized[2].x1, 15);
    let middle = resized[1];
    let area = ((middle.x1 - middle.x0) * (middle.y1 - middle.y0)) as f32;
    assert!((middle.weight * area + 2.0).abs() < 1e-6);

    // A constant image has no second derivative.
    let img = GrayImage::from_pixel(20, 20, image::Luma([77]));
    let integral = IntegralImage::new(&img);
    let resized = resize_haar_pattern(&pattern, 9, 9);
    assert!(haar_response(&integral, &resized, 3, 3).abs() < 1e-3);
}
