use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use surf_tune::cli::{normalize_args, Cli};
use surf_tune::driver::{self, FeatureSource, InputMode, Presenter};
use surf_tune::feature_image::FeatureImage;
use surf_tune::{DetectorParams, Error, KeyPoint, Result};

use clap::Parser;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Detect(DetectorParams),
    Read(PathBuf),
}

/// Records calls and yields a fixed number of keypoints.
#[derive(Default)]
struct StubSource {
    calls: Vec<Call>,
    n_keypoints: usize,
    keypoints: Vec<KeyPoint>,
}

impl StubSource {
    fn with_keypoints(n_keypoints: usize) -> Self {
        StubSource {
            n_keypoints,
            ..Default::default()
        }
    }

    fn fill(&mut self) {
        self.keypoints = (0..self.n_keypoints)
            .map(|i| KeyPoint {
                x: i as f32,
                y: i as f32,
                size: 60.,
                angle: 0.,
                response: 1000.,
                octave: 0,
            })
            .collect();
    }
}

impl FeatureSource for StubSource {
    fn compute_and_filter(&mut self, params: &DetectorParams) -> Result<()> {
        self.calls.push(Call::Detect(*params));
        self.fill();
        Ok(())
    }

    fn read_from_file(&mut self, path: &Path) -> Result<()> {
        self.calls.push(Call::Read(path.to_owned()));
        self.fill();
        Ok(())
    }

    fn keypoints(&self) -> &[KeyPoint] {
        &self.keypoints
    }

    fn render_keypoints(&self, color: Rgb<u8>) -> RgbImage {
        RgbImage::from_pixel(2, 2, color)
    }
}

#[derive(Default)]
struct RecordingPresenter {
    shown: Vec<RgbImage>,
}

impl Presenter for RecordingPresenter {
    fn present(&mut self, rendered: &RgbImage) -> Result<()> {
        self.shown.push(rendered.clone());
        Ok(())
    }
}

fn mode_from_args(args: &[&str]) -> InputMode {
    Cli::try_parse_from(normalize_args(args.iter().copied()))
        .unwrap()
        .input_mode()
}

fn run_stub(mode: &InputMode, source: &mut StubSource) -> (Result<usize>, String, usize) {
    let mut presenter = RecordingPresenter::default();
    let mut out = Vec::new();
    let res = driver::run(mode, source, &mut presenter, &mut out);
    (res, String::from_utf8(out).unwrap(), presenter.shown.len())
}

#[test]
fn defaults_detect_with_default_params() {
    let mode = mode_from_args(&["show", "img.png"]);
    let mut source = StubSource::with_keypoints(3);
    let (res, out, shown) = run_stub(&mode, &mut source);
    assert_eq!(res.unwrap(), 3);
    assert_eq!(
        source.calls,
        vec![Call::Detect(DetectorParams {
            min_hessian: 2000,
            octaves: 8,
            octave_layers: 8,
            min_size: 50,
            min_response: 500.0,
        })]
    );
    assert_eq!(out, "number of keypoints: 3\n");
    assert_eq!(shown, 1);
}

#[test]
fn cli_values_reach_the_detector() {
    let mode = mode_from_args(&[
        "show", "img.png", "-minh", "400", "-o", "4", "-l", "3", "-s", "20", "-r", "100",
    ]);
    let mut source = StubSource::default();
    let (res, out, _) = run_stub(&mode, &mut source);
    assert_eq!(res.unwrap(), 0);
    assert_eq!(
        source.calls,
        vec![Call::Detect(DetectorParams {
            min_hessian: 400,
            octaves: 4,
            octave_layers: 3,
            min_size: 20,
            min_response: 100.0,
        })]
    );
    assert_eq!(out, "number of keypoints: 0\n");
}

#[test]
fn param_file_values_are_used_and_timed() {
    let dir = tempfile::tempdir().unwrap();
    let params = dir.path().join("params.yml");
    fs::write(
        &params,
        "min_hessian: 100\noctaves: 3\nlayers: 3\nmin_size: 0\nmin_response: 0.0\n",
    )
    .unwrap();
    let mode = mode_from_args(&["show", "img.png", "-p", params.to_str().unwrap(), "-o", "7"]);
    let mut source = StubSource::with_keypoints(5);
    let (res, out, shown) = run_stub(&mode, &mut source);
    assert_eq!(res.unwrap(), 5);
    assert_eq!(
        source.calls,
        vec![Call::Detect(DetectorParams {
            min_hessian: 100,
            octaves: 3,
            octave_layers: 3,
            min_size: 0,
            min_response: 0.0,
        })]
    );
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    let secs: f64 = lines[0]
        .strip_prefix("time elapsed: ")
        .unwrap()
        .parse()
        .unwrap();
    assert!(secs >= 0.);
    assert_eq!(lines[1], "number of keypoints: 5");
    assert_eq!(shown, 1);
}

#[test]
fn keypoint_file_never_detects() {
    let mode = mode_from_args(&["show", "img.png", "-k", "kp.yml", "-minh", "1"]);
    let mut source = StubSource::with_keypoints(2);
    let (res, out, _) = run_stub(&mode, &mut source);
    assert_eq!(res.unwrap(), 2);
    assert_eq!(source.calls, vec![Call::Read("kp.yml".into())]);
    assert!(!out.contains("time elapsed"));
}

#[test]
fn keypoint_file_wins_over_param_file() {
    let mode = mode_from_args(&["show", "img.png", "-p", "missing.yml", "-k", "kp.yml"]);
    let mut source = StubSource::default();
    let (res, _, _) = run_stub(&mode, &mut source);
    assert!(res.is_ok());
    assert_eq!(source.calls, vec![Call::Read("kp.yml".into())]);
}

#[test]
fn param_file_missing_key_fails_before_detection() {
    let dir = tempfile::tempdir().unwrap();
    let params = dir.path().join("params.yml");
    fs::write(
        &params,
        "min_hessian: 100\noctaves: 3\nmin_size: 0\nmin_response: 0.0\n",
    )
    .unwrap();
    let mut source = StubSource::with_keypoints(1);
    let (res, out, shown) = run_stub(&InputMode::ParamFile(params), &mut source);
    assert!(matches!(res, Err(Error::Yaml { .. })));
    assert!(source.calls.is_empty());
    assert!(out.is_empty());
    assert_eq!(shown, 0);
}

#[test]
fn unreadable_param_file_fails() {
    let mut source = StubSource::default();
    let (res, out, _) = run_stub(&InputMode::ParamFile("does/not/exist.yml".into()), &mut source);
    assert!(matches!(res, Err(Error::Io { .. })));
    assert!(out.is_empty());
}

#[test]
fn missing_image_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let res = FeatureImage::open(dir.path().join("nope.jpg"));
    assert!(matches!(res, Err(Error::Image { .. })));
}

#[test]
fn feature_image_runs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let img_path = dir.path().join("blobs.png");
    let gray = image::GrayImage::from_fn(128, 128, |x, y| {
        let inside = [(40f32, 40f32), (90., 80.)].iter().any(|(cx, cy)| {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            dx * dx + dy * dy <= 36.
        });
        image::Luma([if inside { 230 } else { 30 }])
    });
    gray.save(&img_path).unwrap();

    let kp_path = dir.path().join("kp.yml");
    let mut image = FeatureImage::open(&img_path).unwrap();
    let mode = InputMode::CliParams(DetectorParams {
        min_hessian: 100,
        octaves: 2,
        octave_layers: 2,
        min_size: 0,
        min_response: 0.,
    });
    let mut presenter = RecordingPresenter::default();
    let mut out = Vec::new();
    let n = driver::run(&mode, &mut image, &mut presenter, &mut out).unwrap();
    assert!(n > 0);
    assert_eq!(
        String::from_utf8(out).unwrap(),
        format!("number of keypoints: {n}\n")
    );
    assert_eq!(presenter.shown[0].dimensions(), (128, 128));
    image.write_to_file(&kp_path).unwrap();

    // the saved file is shown again without detection
    let mut reloaded = FeatureImage::open(&img_path).unwrap();
    let mut out = Vec::new();
    let m = driver::run(
        &InputMode::KeypointFile(kp_path),
        &mut reloaded,
        &mut RecordingPresenter::default(),
        &mut out,
    )
    .unwrap();
    assert_eq!(m, n);
    assert_eq!(reloaded.keypoints(), image.keypoints());
}
