use std::io;

use anyhow::Context;
use clap::Parser;

use surf_tune::cli::{normalize_args, Cli};
use surf_tune::driver::{self, Presenter};
use surf_tune::feature_image::FeatureImage;
use surf_tune::viewer::FilePresenter;

fn presenters(cli: &Cli) -> Vec<Box<dyn Presenter>> {
    let mut presenters: Vec<Box<dyn Presenter>> = Vec::new();
    if let Some(path) = &cli.output {
        presenters.push(Box::new(FilePresenter::new(path)));
    }
    #[cfg(feature = "viewer")]
    if !cli.no_window {
        presenters.push(Box::new(surf_tune::viewer::WindowPresenter::default()));
    }
    #[cfg(not(feature = "viewer"))]
    if !cli.no_window {
        log::warn!("Built without the viewer feature, not opening a window.");
    }
    presenters
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));

    let mut image = FeatureImage::open(&cli.image)
        .with_context(|| format!("cannot load {}", cli.image.display()))?;
    let mode = cli.input_mode();
    let mut presenters = presenters(&cli);
    let mut stdout = io::stdout().lock();
    driver::run(&mode, &mut image, &mut presenters, &mut stdout)?;

    if let Some(path) = &cli.write_keypoints {
        image
            .write_to_file(path)
            .with_context(|| format!("cannot write keypoints to {}", path.display()))?;
    }
    Ok(())
}
