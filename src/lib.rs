// This implementation of SURF is derived from the SURF detector in OpenCV's xfeatures2d
// module, originally contributed by Liu Liu.
// It is made available under the terms of the MIT license included in the root of this repository.
//
// Copyright 2000-2008 Intel Corporation
// Copyright 2009 Willow Garage Inc.

//! This crate contains an implementation of the SURF keypoint detector and descriptor,
//! together with the plumbing of the `show` tool used to tune its parameters on an
//! image collection before features are extracted in bulk.
//!
//! The detector aims to behave like OpenCV's `xfeatures2d::SURF` so that parameters
//! tuned here carry over:
//! - [1]: [Bay 2008](https://people.ee.ethz.ch/~surf/eccv06.pdf)
//! - [2]: [Evans 2009](https://github.com/herbertbay/SURF/blob/master/NotesOnOpenSURF.pdf)
//!
//! Box-filter responses are computed on an integral image of 8-bit intensities, so
//! `min_hessian` thresholds are in the same units as OpenCV's `hessianThreshold`.

pub mod cli;
mod descriptor;
pub mod draw;
pub mod driver;
mod error;
pub mod feature_image;
mod hessian;
mod integral;
pub mod keypoint_file;
mod local_extrema;
mod params;
pub mod viewer;

use ::image::GrayImage;
use log::{debug, info};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

pub use descriptor::DESCRIPTOR_SIZE;
pub use error::{Error, Result};
pub use params::DetectorParams;

use hessian::build_response_layers;
use integral::IntegralImage;
use local_extrema::find_maxima_in_layer;

#[derive(Debug, Clone, PartialEq)]
pub struct SurfResult {
    pub keypoints: Vec<KeyPoint>,
    /// Array of shape `(keypoints.len(), 64)` containing the SURF feature vectors in the same
    /// order as `keypoints`.
    pub descriptors: Array2<f32>,
}

#[derive(Debug, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct KeyPoint {
    pub x: f32,
    pub y: f32,
    /// Diameter in pixels, the side length of the box filter that detected the point.
    pub size: f32,
    /// Degrees in `[0; 360)`.
    pub angle: f32,
    /// Determinant of Hessian response.
    pub response: f32,
    pub octave: usize,
}

#[doc(hidden)]
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub struct SurfKeyPoint {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub angle: f32,
    pub response: f32,
    pub octave: usize,
}

impl From<SurfKeyPoint> for KeyPoint {
    fn from(kp: SurfKeyPoint) -> Self {
        KeyPoint {
            x: kp.x,
            y: kp.y,
            size: kp.size,
            angle: kp.angle,
            response: kp.response,
            octave: kp.octave,
        }
    }
}

/// Extract SURF features from `img`.
///
/// Only `min_hessian`, `octaves` and `octave_layers` of `params` are used here, the
/// size and response filters are applied by [`filter_keypoints`].
pub fn surf(img: &GrayImage, params: &DetectorParams) -> Result<SurfResult> {
    params.validate()?;
    let integral = IntegralImage::new(img);
    let keypoints = find_keypoints(
        &integral,
        params.octaves as usize,
        params.octave_layers as usize,
        params.min_hessian as f32,
    );
    debug!("Found {} scale space maxima.", keypoints.len());
    let (keypoints, descriptors) = descriptor::describe_keypoints(img, &integral, keypoints);
    info!("Extracted {} features", keypoints.len());
    Ok(SurfResult {
        keypoints: keypoints.into_iter().map(KeyPoint::from).collect(),
        descriptors,
    })
}

fn find_keypoints(
    integral: &IntegralImage,
    n_octaves: usize,
    octave_layers: usize,
    threshold: f32,
) -> Vec<SurfKeyPoint> {
    let scale_space = build_response_layers(integral, n_octaves, octave_layers);
    scale_space
        .iter()
        .enumerate()
        .flat_map(|(octave, layers)| {
            // the first and last layer only bound the search
            (1..layers.len().saturating_sub(1)).flat_map(move |layer| {
                find_maxima_in_layer(&layers[layer - 1..=layer + 1], threshold, octave, layer)
            })
        })
        .collect()
}

/// Keep keypoints with `size >= min_size` and `response >= min_response`, together
/// with their descriptor rows.
pub fn filter_keypoints(
    SurfResult {
        keypoints,
        descriptors,
    }: SurfResult,
    min_size: f32,
    min_response: f32,
) -> SurfResult {
    let keep: Vec<usize> = keypoints
        .iter()
        .enumerate()
        .filter(|(_, kp)| kp.size >= min_size && kp.response >= min_response)
        .map(|(i, _)| i)
        .collect();
    debug!(
        "Size >= {min_size} and response >= {min_response} keep {} of {} keypoints.",
        keep.len(),
        keypoints.len()
    );
    SurfResult {
        descriptors: descriptors.select(ndarray::Axis(0), &keep),
        keypoints: keep.iter().map(|i| keypoints[*i].clone()).collect(),
    }
}

#[cfg(test)]
pub(crate) fn blob_image(width: u32, height: u32, blobs: &[(f32, f32, f32)]) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let inside = blobs.iter().any(|(cx, cy, r)| {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            dx * dx + dy * dy <= r * r
        });
        ::image::Luma([if inside { 220 } else { 20 }])
    })
}

#[test]
fn blob_is_detected_near_its_centre() {
    let img = blob_image(96, 96, &[(48., 48., 6.)]);
    let params = DetectorParams {
        min_hessian: 100,
        octaves: 2,
        octave_layers: 2,
        min_size: 0,
        min_response: 0.,
    };
    let SurfResult {
        keypoints,
        descriptors,
    } = surf(&img, &params).unwrap();
    assert_eq!(keypoints.len(), descriptors.nrows());
    assert_eq!(descriptors.ncols(), DESCRIPTOR_SIZE);
    let nearest = keypoints
        .iter()
        .map(|kp| ((kp.x - 48.).powi(2) + (kp.y - 48.).powi(2)).sqrt())
        .min_by(f32::total_cmp)
        .expect("at least one keypoint");
    assert!(nearest < 3., "closest keypoint is {nearest}px away");
    assert!(keypoints.iter().all(|kp| kp.response > 100.));
}

#[test]
fn flat_image_has_no_keypoints() {
    let img = GrayImage::from_pixel(64, 64, ::image::Luma([128]));
    let res = surf(&img, &DetectorParams::default()).unwrap();
    assert!(res.keypoints.is_empty());
    assert_eq!(res.descriptors.dim(), (0, DESCRIPTOR_SIZE));
}

#[test]
fn invalid_params_are_rejected_before_detection() {
    let img = GrayImage::new(16, 16);
    let params = DetectorParams {
        octaves: 0,
        ..Default::default()
    };
    assert!(matches!(surf(&img, &params), Err(Error::InvalidParams(_))));
}

#[test]
fn filter_keeps_descriptor_rows_aligned() {
    let kp = |size: f32, response: f32| KeyPoint {
        x: 0.,
        y: 0.,
        size,
        angle: 0.,
        response,
        octave: 0,
    };
    let descriptors = Array2::from_shape_fn((4, DESCRIPTOR_SIZE), |(row, _)| row as f32);
    let res = SurfResult {
        keypoints: vec![kp(9., 600.), kp(60., 400.), kp(60., 700.), kp(50., 500.)],
        descriptors,
    };
    let res = filter_keypoints(res, 50., 500.);
    assert_eq!(res.keypoints, vec![kp(60., 700.), kp(50., 500.)]);
    assert_eq!(res.descriptors.nrows(), 2);
    assert_eq!(res.descriptors[(0, 0)], 2.);
    assert_eq!(res.descriptors[(1, 5)], 3.);
}

#[test]
fn octaves_beyond_the_image_add_nothing() {
    let img = blob_image(96, 96, &[(48., 48., 6.), (20., 70., 4.)]);
    let with_octaves = |octaves: i32| {
        let params = DetectorParams {
            min_hessian: 100,
            octaves,
            octave_layers: 2,
            min_size: 0,
            min_response: 0.,
        };
        surf(&img, &params).unwrap()
    };
    let reference = with_octaves(8);
    assert!(!reference.keypoints.is_empty());
    for octaves in [64, 65, 130, i32::MAX] {
        let res = with_octaves(octaves);
        assert_eq!(res.keypoints.len(), reference.keypoints.len(), "octaves = {octaves}");
        assert_eq!(res, reference);
    }
}

#[test]
fn tiny_image_has_no_scale_space() {
    let img = blob_image(8, 8, &[(4., 4., 2.)]);
    let res = surf(&img, &DetectorParams::default()).unwrap();
    assert!(res.keypoints.is_empty());
    assert_eq!(res.descriptors.dim(), (0, DESCRIPTOR_SIZE));
}
