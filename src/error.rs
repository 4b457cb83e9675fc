use std::path::PathBuf;

/// Errors produced while loading images, parameter files and keypoint files.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open image '{}'", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to access '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML in '{}'", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("keypoint file has {keypoints} keypoints but {descriptors} descriptors")]
    KeypointCountMismatch {
        keypoints: usize,
        descriptors: usize,
    },

    #[error("descriptor {index} has {len} components, expected {expected}")]
    DescriptorWidth {
        index: usize,
        len: usize,
        expected: usize,
    },

    #[error("invalid detector parameters: {0}")]
    InvalidParams(String),

    #[error("failed to write output")]
    Output(#[from] std::io::Error),

    #[error("failed to save rendered image to '{}'", path.display())]
    SaveImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("viewer failed: {0}")]
    Viewer(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
