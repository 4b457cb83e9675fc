//! Presenters for rendered keypoint images.

use std::path::PathBuf;

use image::RgbImage;
use log::info;

use crate::driver::Presenter;
use crate::{Error, Result};

/// Saves the rendering, the image format follows the file extension.
#[derive(Debug, Clone)]
pub struct FilePresenter {
    path: PathBuf,
}

impl FilePresenter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FilePresenter { path: path.into() }
    }
}

impl Presenter for FilePresenter {
    fn present(&mut self, rendered: &RgbImage) -> Result<()> {
        rendered.save(&self.path).map_err(|source| Error::SaveImage {
            path: self.path.clone(),
            source,
        })?;
        info!("Saved rendering to {}", self.path.display());
        Ok(())
    }
}

#[cfg(feature = "viewer")]
pub use window::WindowPresenter;

#[cfg(feature = "viewer")]
mod window {
    use eframe::egui;
    use image::RgbImage;

    use crate::driver::Presenter;
    use crate::{Error, Result};

    /// Opens a window showing the rendering and blocks until a key is pressed in it
    /// or it is closed.
    #[derive(Debug, Clone)]
    pub struct WindowPresenter {
        title: String,
    }

    impl Default for WindowPresenter {
        fn default() -> Self {
            WindowPresenter {
                title: "Image".to_owned(),
            }
        }
    }

    struct ImageApp {
        image: egui::ColorImage,
        texture: Option<egui::TextureHandle>,
    }

    impl eframe::App for ImageApp {
        fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
            let key_pressed = ctx.input(|i| {
                i.events
                    .iter()
                    .any(|e| matches!(e, egui::Event::Key { pressed: true, .. }))
            });
            if key_pressed {
                log::debug!("Key pressed, closing viewer");
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            }

            let texture = self.texture.get_or_insert_with(|| {
                ctx.load_texture("keypoints", self.image.clone(), egui::TextureOptions::default())
            });
            let sized_texture = egui::load::SizedTexture::from_handle(texture);
            egui::CentralPanel::default().show(ctx, |ui| {
                egui::ScrollArea::both().show(ui, |ui| {
                    ui.image(sized_texture);
                });
            });
        }
    }

    impl Presenter for WindowPresenter {
        fn present(&mut self, rendered: &RgbImage) -> Result<()> {
            let (width, height) = rendered.dimensions();
            let image =
                egui::ColorImage::from_rgb([width as usize, height as usize], rendered.as_raw());
            let options = eframe::NativeOptions {
                viewport: egui::ViewportBuilder::default()
                    .with_title(self.title.as_str())
                    .with_inner_size([width as f32, height as f32]),
                ..Default::default()
            };
            eframe::run_native(
                &self.title,
                options,
                Box::new(move |_cc| {
                    Ok(Box::new(ImageApp {
                        image,
                        texture: None,
                    }))
                }),
            )
            .map_err(|e| Error::Viewer(e.to_string()))
        }
    }
}

#[test]
fn file_presenter_writes_png() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.png");
    let img = RgbImage::from_pixel(4, 3, image::Rgb([0, 0, 255]));
    FilePresenter::new(&path).present(&img).unwrap();
    let saved = image::open(&path).unwrap().into_rgb8();
    assert_eq!(saved, img);
}

#[test]
fn file_presenter_reports_bad_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.unknown");
    let err = FilePresenter::new(&path)
        .present(&RgbImage::new(2, 2))
        .unwrap_err();
    assert!(matches!(err, Error::SaveImage { .. }));
}

#[test]
fn presenter_list_presents_to_all() {
    let dir = tempfile::tempdir().unwrap();
    let paths = [dir.path().join("a.png"), dir.path().join("b.png")];
    let mut presenters: Vec<Box<dyn Presenter>> = paths
        .iter()
        .map(|p| Box::new(FilePresenter::new(p)) as Box<dyn Presenter>)
        .collect();
    presenters.present(&RgbImage::new(3, 3)).unwrap();
    assert!(paths.iter().all(|p| p.exists()));
}
