//! Dispatch of the three keypoint input modes and presentation of the result.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::{Rgb, RgbImage};
use log::debug;

use crate::draw::KEYPOINT_COLOR;
use crate::{DetectorParams, KeyPoint, Result};

/// Where the keypoints of an image come from. Resolved once from the command line,
/// with a keypoint file taking precedence over a parameter file, which takes
/// precedence over the numeric parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum InputMode {
    KeypointFile(PathBuf),
    ParamFile(PathBuf),
    CliParams(DetectorParams),
}

/// An image that keypoints can be computed for or loaded into.
pub trait FeatureSource {
    /// Detect keypoints with `params` and keep those passing the size and response filter.
    fn compute_and_filter(&mut self, params: &DetectorParams) -> Result<()>;
    /// Replace the keypoints with the contents of a keypoint file.
    fn read_from_file(&mut self, path: &Path) -> Result<()>;
    fn keypoints(&self) -> &[KeyPoint];
    /// A copy of the image with the keypoints drawn on top.
    fn render_keypoints(&self, color: Rgb<u8>) -> RgbImage;
}

/// Shows or stores a rendered image.
pub trait Presenter {
    fn present(&mut self, rendered: &RgbImage) -> Result<()>;
}

impl<P: Presenter + ?Sized> Presenter for Box<P> {
    fn present(&mut self, rendered: &RgbImage) -> Result<()> {
        (**self).present(rendered)
    }
}

impl<P: Presenter> Presenter for Vec<P> {
    fn present(&mut self, rendered: &RgbImage) -> Result<()> {
        self.iter_mut().try_for_each(|p| p.present(rendered))
    }
}

/// Fill `source` with keypoints according to `mode`.
///
/// Parameter files are parsed before any detection runs. The detection time of the
/// parameter file mode is written to `out`.
pub fn populate<S, W>(mode: &InputMode, source: &mut S, out: &mut W) -> Result<()>
where
    S: FeatureSource + ?Sized,
    W: Write + ?Sized,
{
    match mode {
        InputMode::KeypointFile(path) => {
            debug!("Reading keypoints from {}", path.display());
            source.read_from_file(path)
        }
        InputMode::ParamFile(path) => {
            let params = DetectorParams::from_yaml_file(path)?;
            debug!("Parameters from {}: {params:?}", path.display());
            let start = Instant::now();
            source.compute_and_filter(&params)?;
            writeln!(out, "time elapsed: {}", start.elapsed().as_secs_f64())?;
            Ok(())
        }
        InputMode::CliParams(params) => {
            debug!("Parameters from command line: {params:?}");
            source.compute_and_filter(params)
        }
    }
}

/// Populate keypoints, report their count, render them and hand the rendering to
/// `presenter`. Returns the number of keypoints.
pub fn run<S, P, W>(mode: &InputMode, source: &mut S, presenter: &mut P, out: &mut W) -> Result<usize>
where
    S: FeatureSource + ?Sized,
    P: Presenter + ?Sized,
    W: Write + ?Sized,
{
    populate(mode, source, out)?;
    let count = source.keypoints().len();
    writeln!(out, "number of keypoints: {count}")?;
    out.flush()?;
    let rendered = source.render_keypoints(KEYPOINT_COLOR);
    presenter.present(&rendered)?;
    Ok(count)
}
