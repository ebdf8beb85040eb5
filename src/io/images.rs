//! Sample image grids and caption dumps

use crate::{Error, Result};
use image::{GrayImage, RgbImage};
use ndarray::{ArrayD, Axis};
use std::fs;
use std::path::{Path, PathBuf};

/// Grid layout for `n` images: `floor(sqrt(n))` rows, enough columns for the rest
pub fn image_manifold_size(n: usize) -> (usize, usize) {
    let rows = ((n as f64).sqrt().floor() as usize).max(1);
    (rows, n.div_ceil(rows))
}

/// Map `[-1, 1]` to `[0, 255]`
fn to_pixel(v: f32) -> u8 {
    (((v + 1.0) * 0.5).clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Tile `[N, H, W, C]` images (values in `[-1, 1]`) row-major into a
/// `rows x cols` grid and write it as PNG
pub fn save_images(images: &ArrayD<f32>, grid: (usize, usize), path: impl AsRef<Path>) -> Result<()> {
    let shape = images.shape();
    if shape.len() != 4 {
        return Err(Error::Image(format!("expected [N, H, W, C] images, got {shape:?}")));
    }
    let (n, h, w, c) = (shape[0], shape[1], shape[2], shape[3]);
    let (rows, cols) = grid;
    if rows * cols < n {
        return Err(Error::Image(format!("{n} images do not fit a {rows}x{cols} grid")));
    }
    let (width, height) = ((w * cols) as u32, (h * rows) as u32);

    let mut canvas = vec![0u8; (width * height) as usize * c];
    for (i, image) in images.axis_iter(Axis(0)).enumerate() {
        let (top, left) = ((i / cols) * h, (i % cols) * w);
        for ((y, x, ch), &v) in image.indexed_iter().map(|(idx, v)| ((idx[0], idx[1], idx[2]), v)) {
            let offset = ((top + y) * width as usize + left + x) * c + ch;
            canvas[offset] = to_pixel(v);
        }
    }

    let path = path.as_ref();
    match c {
        1 => GrayImage::from_raw(width, height, canvas)
            .ok_or_else(|| Error::Image("grayscale buffer size".into()))?
            .save(path)?,
        3 => RgbImage::from_raw(width, height, canvas)
            .ok_or_else(|| Error::Image("rgb buffer size".into()))?
            .save(path)?,
        other => return Err(Error::Image(format!("unsupported channel count {other}"))),
    }
    Ok(())
}

/// Write one line per image, `index: caption | caption ...`, to `dir/captions.txt`
pub fn save_captions(dir: impl AsRef<Path>, captions: &[Vec<String>]) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let path = dir.join("captions.txt");
    let text: String = captions
        .iter()
        .enumerate()
        .map(|(i, caps)| format!("{i}: {}\n", caps.join(" | ")))
        .collect();
    fs::write(&path, text)?;
    Ok(path)
}
