use divan::{black_box, Bencher};
use image::{GrayImage, Luma};
use surf_tune::{filter_keypoints, surf, DetectorParams};

fn main() {
    divan::main();
}

/// Bright discs of growing radius on a dark background.
fn blob_grid(size: u32) -> GrayImage {
    let cell = size / 8;
    GrayImage::from_fn(size, size, |x, y| {
        let (cx, cy) = (x / cell, y / cell);
        let r = 2 + (cx + cy) % 8;
        let dx = (x % cell) as i32 - (cell / 2) as i32;
        let dy = (y % cell) as i32 - (cell / 2) as i32;
        let inside = dx * dx + dy * dy <= (r * r) as i32;
        Luma([if inside { 220 } else { 30 }])
    })
}

#[divan::bench(args = [256, 512])]
fn surf_default_params(bencher: Bencher, size: u32) {
    let img = blob_grid(size);
    let params = DetectorParams::default();
    bencher.bench_local(|| black_box(surf(&img, &params)));
}

#[divan::bench(args = [256, 512])]
fn surf_low_threshold_filtered(bencher: Bencher, size: u32) {
    let img = blob_grid(size);
    let params = DetectorParams {
        min_hessian: 100,
        octaves: 4,
        octave_layers: 3,
        ..Default::default()
    };
    bencher.bench_local(|| {
        let res = surf(&img, &params).unwrap();
        black_box(filter_keypoints(
            res,
            params.min_size as f32,
            params.min_response,
        ))
    });
}
