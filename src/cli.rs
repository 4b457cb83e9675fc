//! Command line of the `show` tool.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;
use log::debug;

use crate::driver::InputMode;
use crate::DetectorParams;

/// Show SURF keypoints on an image to tune detector parameters.
///
/// Keypoints are read from a keypoint file if given, otherwise detected with the
/// parameters of a YAML file if given, otherwise with the numeric options.
#[derive(Debug, Clone, Parser)]
#[command(name = "show", version, allow_negative_numbers = true)]
pub struct Cli {
    /// Image to show keypoints on.
    pub image: PathBuf,

    /// Keypoint file to display instead of detecting keypoints.
    #[arg(short = 'k', long = "keypoints", value_name = "FILE")]
    pub keypoints: Option<PathBuf>,

    /// YAML file with `min_hessian`, `octaves`, `layers`, `min_size` and `min_response`.
    #[arg(short = 'p', long = "params", value_name = "FILE")]
    pub params: Option<PathBuf>,

    /// Hessian threshold (also accepted as `-minh`).
    #[arg(long = "minh", default_value_t = 2000)]
    pub min_hessian: i32,

    /// Number of octaves.
    #[arg(short = 'o', long = "octaves", default_value_t = 8)]
    pub octaves: i32,

    /// Number of layers per octave.
    #[arg(short = 'l', long = "layers", default_value_t = 8)]
    pub octave_layers: i32,

    /// Minimum keypoint size.
    #[arg(short = 's', long = "min-size", default_value_t = 50)]
    pub min_size: i32,

    /// Minimum keypoint response.
    #[arg(short = 'r', long = "min-response", default_value_t = 500.0)]
    pub min_response: f32,

    /// Save the rendered image, the format follows the extension.
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Save the displayed keypoints and descriptors as a keypoint file.
    #[arg(long, value_name = "PATH")]
    pub write_keypoints: Option<PathBuf>,

    /// Do not open the viewer window.
    #[arg(long)]
    pub no_window: bool,
}

/// Rewrite the single-dash long flag `-minh` (and `-minh=V`) to `--minh`.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| match arg.to_str() {
            Some("-minh") => OsString::from("--minh"),
            Some(s) if s.starts_with("-minh=") => OsString::from(format!("-{s}")),
            _ => arg,
        })
        .collect()
}

impl Cli {
    pub fn detector_params(&self) -> DetectorParams {
        DetectorParams {
            min_hessian: self.min_hessian,
            octaves: self.octaves,
            octave_layers: self.octave_layers,
            min_size: self.min_size,
            min_response: self.min_response,
        }
    }

    /// The keypoint file wins over the parameter file, which wins over the numeric
    /// options. Options that lose are ignored.
    pub fn input_mode(&self) -> InputMode {
        let cli_params = self.detector_params();
        let custom_cli_params = cli_params != DetectorParams::default();
        match (&self.keypoints, &self.params) {
            (Some(keypoints), params) => {
                if params.is_some() || custom_cli_params {
                    debug!("Keypoint file given, ignoring detector parameters.");
                }
                InputMode::KeypointFile(keypoints.clone())
            }
            (None, Some(params)) => {
                if custom_cli_params {
                    debug!("Parameter file given, ignoring numeric options.");
                }
                InputMode::ParamFile(params.clone())
            }
            (None, None) => InputMode::CliParams(cli_params),
        }
    }
}

#[cfg(test)]
fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
    Cli::try_parse_from(normalize_args(args.iter().copied()))
}

#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
}

#[test]
fn defaults_give_cli_params() {
    let cli = parse(&["show", "img.png"]).unwrap();
    assert_eq!(cli.image, PathBuf::from("img.png"));
    assert_eq!(cli.input_mode(), InputMode::CliParams(DetectorParams::default()));
    assert!(!cli.no_window);
    assert!(cli.output.is_none());
}

#[test]
fn numeric_options_are_parsed() {
    let cli = parse(&[
        "show", "img.png", "-minh", "100", "-o", "3", "-l", "4", "-s", "0", "-r", "0.5",
    ])
    .unwrap();
    assert_eq!(
        cli.input_mode(),
        InputMode::CliParams(DetectorParams {
            min_hessian: 100,
            octaves: 3,
            octave_layers: 4,
            min_size: 0,
            min_response: 0.5,
        })
    );
    let cli = parse(&["show", "img.png", "-minh=300"]).unwrap();
    assert_eq!(cli.min_hessian, 300);
    let cli = parse(&["show", "--minh", "-5", "img.png"]).unwrap();
    assert_eq!(cli.min_hessian, -5);
}

#[test]
fn keypoint_file_beats_param_file() {
    let cli = parse(&["show", "img.png", "-k", "kp.yml", "-p", "params.yml", "-o", "2"]).unwrap();
    assert_eq!(cli.input_mode(), InputMode::KeypointFile("kp.yml".into()));
}

#[test]
fn param_file_beats_numeric_options() {
    let cli = parse(&["show", "img.png", "-p", "params.yml", "-minh", "10"]).unwrap();
    assert_eq!(cli.input_mode(), InputMode::ParamFile("params.yml".into()));
}

#[test]
fn malformed_numbers_are_usage_errors() {
    let err = parse(&["show", "img.png", "-o", "eight"]).unwrap_err();
    assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    assert!(parse(&["show", "img.png", "-r", "fast"]).is_err());
    assert!(parse(&["show"]).is_err());
}

#[test]
fn minh_lookalikes_are_left_alone() {
    let args = normalize_args(["show", "-minhx", "--minh", "minh", "-m"]);
    assert_eq!(args, ["show", "-minhx", "--minh", "minh", "-m"].map(OsString::from));
}
