//! CPU box filter over a tiled light-field image.
//!
//! Mirrors the averaging shader: output coordinate `(u, v)` reads
//! `((u + i) / views, (v + j) / views)` from every tile, the samples are summed
//! and the sum is divided by `views²` once.

use image::{Rgba, Rgba32FImage};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompositeError {
    #[error("views must be at least 1")]
    ZeroViews,
    #[error("tile image is empty")]
    EmptyInput,
    #[error("output size {width}x{height} is empty")]
    EmptyOutput { width: u32, height: u32 },
}

/// Natural output size: one tile.
pub fn averaged_extent(tiles: &Rgba32FImage, views: u32) -> (u32, u32) {
    let views = views.max(1);
    (tiles.width().div_ceil(views), tiles.height().div_ceil(views))
}

pub fn average_tiles(
    tiles: &Rgba32FImage,
    views: u32,
    width: u32,
    height: u32,
) -> Result<Rgba32FImage, CompositeError> {
    if views == 0 {
        return Err(CompositeError::ZeroViews);
    }
    if tiles.width() == 0 || tiles.height() == 0 {
        return Err(CompositeError::EmptyInput);
    }
    if width == 0 || height == 0 {
        return Err(CompositeError::EmptyOutput { width, height });
    }

    let n = f64::from(views);
    let count = n * n;
    let sample_x = |u: f64, i: u32| nearest(u, i, n, tiles.width());
    let sample_y = |v: f64, j: u32| nearest(v, j, n, tiles.height());

    let mut output = Rgba32FImage::new(width, height);
    for (px, py, pixel) in output.enumerate_pixels_mut() {
        let u = (f64::from(px) + 0.5) / f64::from(width);
        let v = (f64::from(py) + 0.5) / f64::from(height);
        let mut acc = [0.0f64; 4];
        for j in 0..views {
            let sy = sample_y(v, j);
            for i in 0..views {
                let texel = tiles.get_pixel(sample_x(u, i), sy);
                for (sum, channel) in acc.iter_mut().zip(texel.0) {
                    *sum += f64::from(channel);
                }
            }
        }
        *pixel = Rgba(acc.map(|sum| (sum / count) as f32));
    }
    Ok(output)
}

fn nearest(coord: f64, tile: u32, views: f64, size: u32) -> u32 {
    let texel = ((coord + f64::from(tile)) / views * f64::from(size)).floor();
    (texel.max(0.0) as u32).min(size - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(size: u32, color: [f32; 4]) -> Rgba32FImage {
        Rgba32FImage::from_pixel(size, size, Rgba(color))
    }

    #[test]
    fn uniform_input_is_returned_exactly() {
        let color = [0.3, 0.7, 0.123_456_7, 1.0];
        for (views, size) in [(1, 16), (3, 30), (4, 64), (7, 50), (10, 100)] {
            let tiles = filled(size, color);
            let (w, h) = averaged_extent(&tiles, views);
            let averaged = average_tiles(&tiles, views, w, h).expect("average");
            assert!(averaged.pixels().all(|p| p.0 == color), "views={views}");
        }
    }

    #[test]
    fn single_view_is_identity() {
        let mut tiles = Rgba32FImage::new(8, 6);
        for (x, y, pixel) in tiles.enumerate_pixels_mut() {
            *pixel = Rgba([x as f32 * 0.1, y as f32 * 0.25, 0.5, 1.0]);
        }
        let averaged = average_tiles(&tiles, 1, 8, 6).expect("average");
        assert_eq!(averaged, tiles);
    }

    #[test]
    fn distinct_tiles_are_averaged() {
        let colors = [
            [1.0, 0.0, 0.0, 1.0],
            [0.0, 1.0, 0.0, 1.0],
            [0.0, 0.0, 1.0, 1.0],
            [1.0, 1.0, 1.0, 1.0],
        ];
        let mut tiles = Rgba32FImage::new(4, 4);
        for (x, y, pixel) in tiles.enumerate_pixels_mut() {
            let tile = (y / 2 * 2 + x / 2) as usize;
            *pixel = Rgba(colors[tile]);
        }
        let averaged = average_tiles(&tiles, 2, 2, 2).expect("average");
        assert!(averaged.pixels().all(|p| p.0 == [0.5, 0.5, 0.5, 1.0]));
    }

    #[test]
    fn output_pixel_reads_matching_position_in_each_tile() {
        let mut tiles = Rgba32FImage::new(4, 4);
        tiles.put_pixel(1, 0, Rgba([4.0, 0.0, 0.0, 0.0]));
        let averaged = average_tiles(&tiles, 2, 2, 2).expect("average");
        assert_eq!(averaged.get_pixel(1, 0).0, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(averaged.get_pixel(0, 0).0, [0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn rejects_zero_views() {
        let tiles = filled(4, [1.0; 4]);
        assert_eq!(
            average_tiles(&tiles, 0, 2, 2).unwrap_err(),
            CompositeError::ZeroViews
        );
    }
}
