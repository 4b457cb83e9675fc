use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Detector configuration for [`crate::surf`].
///
/// The YAML form uses the key `layers` for `octave_layers`. All five keys are
/// required, a file missing one of them fails to deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorParams {
    /// Hessian determinant threshold, candidates at or below it are discarded.
    pub min_hessian: i32,
    /// Number of octaves in the box-filter scale space.
    pub octaves: i32,
    /// Number of layers per octave that are searched for extrema.
    #[serde(rename = "layers")]
    pub octave_layers: i32,
    /// Smallest keypoint size (filter size in pixels) that survives filtering.
    pub min_size: i32,
    /// Smallest response that survives filtering.
    pub min_response: f32,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            min_hessian: 2000,
            octaves: 8,
            octave_layers: 8,
            min_size: 50,
            min_response: 500.0,
        }
    }
}

impl DetectorParams {
    pub fn from_yaml_str(yaml: &str, path: &Path) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|source| Error::Yaml {
            path: path.to_owned(),
            source,
        })
    }

    /// Read parameters from a YAML mapping on disk.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_yaml_str(&yaml, path)
    }

    /// The scale space needs at least one octave with one searchable layer.
    pub fn validate(&self) -> Result<()> {
        if self.octaves < 1 {
            return Err(Error::InvalidParams(format!(
                "octaves must be at least 1, got {}",
                self.octaves
            )));
        }
        if self.octave_layers < 1 {
            return Err(Error::InvalidParams(format!(
                "octave layers must be at least 1, got {}",
                self.octave_layers
            )));
        }
        Ok(())
    }
}

#[test]
fn params_from_yaml() {
    let yaml = "min_hessian: 100\noctaves: 3\nlayers: 3\nmin_size: 0\nmin_response: 0.0\n";
    let params = DetectorParams::from_yaml_str(yaml, Path::new("params.yml")).unwrap();
    assert_eq!(
        params,
        DetectorParams {
            min_hessian: 100,
            octaves: 3,
            octave_layers: 3,
            min_size: 0,
            min_response: 0.0,
        }
    );
}

#[test]
fn params_missing_layers_key() {
    let yaml = "min_hessian: 100\noctaves: 3\nmin_size: 0\nmin_response: 0.0\n";
    let err = DetectorParams::from_yaml_str(yaml, Path::new("params.yml")).unwrap_err();
    match err {
        Error::Yaml { source, .. } => assert!(source.to_string().contains("layers")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn params_integer_response_is_accepted() {
    let yaml = "{min_hessian: 2000, octaves: 8, layers: 8, min_size: 50, min_response: 500}";
    let params = DetectorParams::from_yaml_str(yaml, Path::new("params.yml")).unwrap();
    assert_eq!(params, DetectorParams::default());
}

#[test]
fn params_serialize_with_layers_key() {
    let params = DetectorParams {
        min_hessian: 100,
        octaves: 3,
        octave_layers: 3,
        min_size: 0,
        min_response: 0.5,
    };
    insta::assert_snapshot!(serde_yaml::to_string(&params).unwrap(), @r"
    min_hessian: 100
    octaves: 3
    layers: 3
    min_size: 0
    min_response: 0.5
    ");
}

#[test]
fn params_validation() {
    assert!(DetectorParams::default().validate().is_ok());
    let no_octaves = DetectorParams {
        octaves: 0,
        ..Default::default()
    };
    assert!(matches!(
        no_octaves.validate(),
        Err(Error::InvalidParams(_))
    ));
    let no_layers = DetectorParams {
        octave_layers: -1,
        ..Default::default()
    };
    assert!(matches!(no_layers.validate(), Err(Error::InvalidParams(_))));
}
