//! YAML serialization of keypoints and their descriptors, so features computed once
//! can be inspected again without rerunning detection.

use std::fs;
use std::path::Path;

use itertools::Itertools;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::{Error, KeyPoint, Result, SurfResult, DESCRIPTOR_SIZE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeypointFile {
    pub keypoints: Vec<KeyPoint>,
    pub descriptors: Vec<Vec<f32>>,
}

impl From<&SurfResult> for KeypointFile {
    fn from(res: &SurfResult) -> Self {
        KeypointFile {
            keypoints: res.keypoints.clone(),
            descriptors: res
                .descriptors
                .rows()
                .into_iter()
                .map(|r| r.to_vec())
                .collect_vec(),
        }
    }
}

impl TryFrom<KeypointFile> for SurfResult {
    type Error = Error;

    /// Fails if the number of descriptors differs from the number of keypoints or if
    /// a descriptor does not have `DESCRIPTOR_SIZE` components.
    fn try_from(
        KeypointFile {
            keypoints,
            descriptors,
        }: KeypointFile,
    ) -> Result<Self> {
        if keypoints.len() != descriptors.len() {
            return Err(Error::KeypointCountMismatch {
                keypoints: keypoints.len(),
                descriptors: descriptors.len(),
            });
        }
        if let Some((index, desc)) = descriptors
            .iter()
            .find_position(|d| d.len() != DESCRIPTOR_SIZE)
        {
            return Err(Error::DescriptorWidth {
                index,
                len: desc.len(),
                expected: DESCRIPTOR_SIZE,
            });
        }
        let mut arr = Array2::zeros((descriptors.len(), DESCRIPTOR_SIZE));
        arr.rows_mut()
            .into_iter()
            .zip(&descriptors)
            .for_each(|(mut row, desc)| row.assign(&ArrayView1::from(desc.as_slice())));
        Ok(SurfResult {
            keypoints,
            descriptors: arr,
        })
    }
}

pub fn read_from_file(path: impl AsRef<Path>) -> Result<SurfResult> {
    let path = path.as_ref();
    let yaml = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    let file: KeypointFile = serde_yaml::from_str(&yaml).map_err(|source| Error::Yaml {
        path: path.to_owned(),
        source,
    })?;
    SurfResult::try_from(file)
}

pub fn write_to_file(res: &SurfResult, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let yaml = serde_yaml::to_string(&KeypointFile::from(res)).map_err(|source| Error::Yaml {
        path: path.to_owned(),
        source,
    })?;
    fs::write(path, yaml).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
fn sample_result(width: usize) -> SurfResult {
    SurfResult {
        keypoints: vec![
            KeyPoint {
                x: 10.5,
                y: 20.25,
                size: 27.,
                angle: 90.,
                response: 2500.,
                octave: 0,
            },
            KeyPoint {
                x: 3.,
                y: 4.,
                size: 54.,
                angle: 180.5,
                response: 12000.,
                octave: 1,
            },
        ],
        descriptors: Array2::from_shape_fn((2, width), |(r, c)| {
            (r * width + c) as f32 * 0.25
        }),
    }
}

#[test]
fn keypoint_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keypoints.yml");
    let res = sample_result(DESCRIPTOR_SIZE);
    write_to_file(&res, &path).unwrap();
    assert_eq!(read_from_file(&path).unwrap(), res);
}

#[test]
fn keypoint_file_layout() {
    let file = KeypointFile::from(&sample_result(3));
    insta::assert_snapshot!(serde_yaml::to_string(&file).unwrap(), @r"
    keypoints:
    - x: 10.5
      y: 20.25
      size: 27.0
      angle: 90.0
      response: 2500.0
      octave: 0
    - x: 3.0
      y: 4.0
      size: 54.0
      angle: 180.5
      response: 12000.0
      octave: 1
    descriptors:
    - - 0.0
      - 0.25
      - 0.5
    - - 0.75
      - 1.0
      - 1.25
    ");
}

#[test]
fn mismatched_descriptor_count_is_rejected() {
    let yaml = r"
keypoints:
  - {x: 1.0, y: 2.0, size: 9.0, angle: 0.0, response: 3000.0, octave: 0}
descriptors: []
";
    let file: KeypointFile = serde_yaml::from_str(yaml).unwrap();
    assert!(matches!(
        SurfResult::try_from(file),
        Err(Error::KeypointCountMismatch {
            keypoints: 1,
            descriptors: 0
        })
    ));
}

#[test]
fn ragged_descriptors_are_rejected() {
    let mut file = KeypointFile::from(&sample_result(DESCRIPTOR_SIZE));
    file.descriptors[1].pop();
    assert!(matches!(
        SurfResult::try_from(file),
        Err(Error::DescriptorWidth {
            index: 1,
            len: 63,
            expected: DESCRIPTOR_SIZE
        })
    ));
}

#[test]
fn descriptors_of_another_width_are_rejected() {
    let file = KeypointFile::from(&sample_result(3));
    assert!(matches!(
        SurfResult::try_from(file),
        Err(Error::DescriptorWidth {
            index: 0,
            len: 3,
            expected: DESCRIPTOR_SIZE
        })
    ));
}

#[test]
fn empty_file_gives_empty_descriptors() {
    let file: KeypointFile = serde_yaml::from_str("keypoints: []\ndescriptors: []\n").unwrap();
    let res = SurfResult::try_from(file).unwrap();
    assert!(res.keypoints.is_empty());
    assert_eq!(res.descriptors.dim(), (0, DESCRIPTOR_SIZE));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_from_file(dir.path().join("nope.yml")).unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
}
