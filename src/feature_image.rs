use std::path::Path;

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use ndarray::Array2;

use crate::draw::draw_rich_keypoints;
use crate::driver::FeatureSource;
use crate::{
    filter_keypoints, keypoint_file, surf, DetectorParams, Error, KeyPoint, Result, SurfResult,
    DESCRIPTOR_SIZE,
};

/// A decoded image together with the keypoints and descriptors found on it.
///
/// `descriptors` always has one row per keypoint.
#[derive(Debug, Clone)]
pub struct FeatureImage {
    image: RgbImage,
    gray: GrayImage,
    keypoints: Vec<KeyPoint>,
    descriptors: Array2<f32>,
}

impl FeatureImage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let img = image::open(path).map_err(|source| Error::Image {
            path: path.to_owned(),
            source,
        })?;
        Ok(Self::from_image(img))
    }

    pub fn from_image(img: DynamicImage) -> Self {
        FeatureImage {
            gray: img.to_luma8(),
            image: img.into_rgb8(),
            keypoints: Vec::new(),
            descriptors: Array2::zeros((0, DESCRIPTOR_SIZE)),
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn keypoints(&self) -> &[KeyPoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &Array2<f32> {
        &self.descriptors
    }

    /// Run the detector and keep keypoints with `size >= min_size` and
    /// `response >= min_response`.
    pub fn compute_and_filter(&mut self, params: &DetectorParams) -> Result<()> {
        let res = surf(&self.gray, params)?;
        let res = filter_keypoints(res, params.min_size as f32, params.min_response);
        self.set_features(res);
        Ok(())
    }

    /// Replace keypoints and descriptors with those stored in a keypoint file.
    pub fn read_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let res = keypoint_file::read_from_file(path)?;
        self.set_features(res);
        Ok(())
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        keypoint_file::write_to_file(
            &SurfResult {
                keypoints: self.keypoints.clone(),
                descriptors: self.descriptors.clone(),
            },
            path,
        )
    }

    pub fn render_keypoints(&self, color: Rgb<u8>) -> RgbImage {
        draw_rich_keypoints(&self.image, &self.keypoints, color)
    }

    fn set_features(
        &mut self,
        SurfResult {
            keypoints,
            descriptors,
        }: SurfResult,
    ) {
        debug_assert_eq!(keypoints.len(), descriptors.nrows());
        self.keypoints = keypoints;
        self.descriptors = descriptors;
    }
}

impl FeatureSource for FeatureImage {
    fn compute_and_filter(&mut self, params: &DetectorParams) -> Result<()> {
        FeatureImage::compute_and_filter(self, params)
    }

    fn read_from_file(&mut self, path: &Path) -> Result<()> {
        FeatureImage::read_from_file(self, path)
    }

    fn keypoints(&self) -> &[KeyPoint] {
        FeatureImage::keypoints(self)
    }

    fn render_keypoints(&self, color: Rgb<u8>) -> RgbImage {
        FeatureImage::render_keypoints(self, color)
    }
}

#[cfg(test)]
fn blob_feature_image() -> FeatureImage {
    let gray = crate::blob_image(96, 96, &[(48., 48., 6.)]);
    FeatureImage::from_image(DynamicImage::ImageLuma8(gray))
}

#[cfg(test)]
const PERMISSIVE: DetectorParams = DetectorParams {
    min_hessian: 100,
    octaves: 2,
    octave_layers: 2,
    min_size: 0,
    min_response: 0.,
};

#[test]
fn compute_keeps_keypoints_and_descriptors_aligned() {
    let mut img = blob_feature_image();
    img.compute_and_filter(&PERMISSIVE).unwrap();
    assert!(!img.keypoints().is_empty());
    assert_eq!(img.keypoints().len(), img.descriptors().nrows());
    assert_eq!(img.image().dimensions(), (96, 96));
}

#[test]
fn filter_thresholds_apply_after_detection() {
    let mut img = blob_feature_image();
    img.compute_and_filter(&PERMISSIVE).unwrap();
    let n_all = img.keypoints().len();
    let largest = img
        .keypoints()
        .iter()
        .map(|kp| kp.size)
        .fold(0f32, f32::max);

    img.compute_and_filter(&DetectorParams {
        min_size: largest as i32 + 1,
        ..PERMISSIVE
    })
    .unwrap();
    assert!(img.keypoints().is_empty());
    assert_eq!(img.descriptors().nrows(), 0);

    img.compute_and_filter(&DetectorParams {
        min_response: f32::MAX,
        ..PERMISSIVE
    })
    .unwrap();
    assert!(img.keypoints().is_empty());

    img.compute_and_filter(&PERMISSIVE).unwrap();
    assert_eq!(img.keypoints().len(), n_all);
}

#[test]
fn keypoints_survive_a_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blob.yml");
    let mut img = blob_feature_image();
    img.compute_and_filter(&PERMISSIVE).unwrap();
    img.write_to_file(&path).unwrap();

    let mut reloaded = blob_feature_image();
    reloaded.read_from_file(&path).unwrap();
    assert_eq!(reloaded.keypoints(), img.keypoints());
    assert_eq!(reloaded.descriptors(), img.descriptors());
}

#[test]
fn open_missing_image_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = FeatureImage::open(dir.path().join("missing.png")).unwrap_err();
    assert!(matches!(err, Error::Image { .. }));
}

#[test]
fn rendering_marks_keypoints() {
    let mut img = blob_feature_image();
    img.compute_and_filter(&PERMISSIVE).unwrap();
    let rendered = img.render_keypoints(Rgb([0, 0, 255]));
    assert_eq!(rendered.dimensions(), img.image().dimensions());
    assert!(rendered.pixels().any(|p| *p == Rgb([0, 0, 255])));
    assert!(img.image().pixels().all(|p| *p != Rgb([0, 0, 255])));
}
