use std::process::Command;

use image::{Rgba, RgbaImage};
use tempfile::TempDir;

/// A 2x2 grid of uniformly colored 3x3 tiles.
fn tiled_image() -> RgbaImage {
    let shades = [[40u8, 80], [120, 160]];
    RgbaImage::from_fn(6, 6, |x, y| {
        let shade = shades[(y / 3) as usize][(x / 3) as usize];
        Rgba([shade, 255 - shade, 0, 255])
    })
}

#[test]
fn average_box_filters_every_tile() {
    let root = TempDir::new().unwrap();
    let input = root.path().join("tiles.png");
    let output = root.path().join("averaged.png");
    tiled_image().save(&input).unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_dofcam"))
        .env("DOFCAM_CONFIG_DIR", root.path())
        .args(["average", "--views", "2"])
        .arg(&input)
        .arg(&output)
        .status()
        .expect("failed to run dofcam average");
    assert!(status.success());

    let averaged = image::open(&output).unwrap().to_rgba8();
    assert_eq!(averaged.dimensions(), (3, 3));
    for pixel in averaged.pixels() {
        assert_eq!(*pixel, Rgba([100, 155, 0, 255]));
    }
}

#[test]
fn average_rejects_zero_views() {
    let root = TempDir::new().unwrap();
    let input = root.path().join("tiles.png");
    tiled_image().save(&input).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_dofcam"))
        .env("DOFCAM_CONFIG_DIR", root.path())
        .args(["average", "--views", "0"])
        .arg(&input)
        .arg(root.path().join("out.png"))
        .output()
        .expect("failed to run dofcam average");
    assert!(!output.status.success());
}
