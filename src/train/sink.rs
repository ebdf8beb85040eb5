//! Where sample grids go

use crate::io::{image_manifold_size, save_images};
use crate::Result;
use ndarray::ArrayD;
use std::fs;
use std::path::PathBuf;

/// Receives the sampler output of a sample step
///
/// Errors returned here are reported and counted by the trainer; they never
/// stop training.
pub trait SampleSink {
    fn write(&mut self, images: &ArrayD<f32>, epoch: usize, step: usize) -> Result<()>;
}

/// Writes `train_{epoch:02}_{step:04}.png` grids into a directory
#[derive(Debug, Clone)]
pub struct PngSampleSink {
    dir: PathBuf,
}

impl PngSampleSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, epoch: usize, step: usize) -> PathBuf {
        self.dir.join(format!("train_{epoch:02}_{step:04}.png"))
    }
}

impl SampleSink for PngSampleSink {
    fn write(&mut self, images: &ArrayD<f32>, epoch: usize, step: usize) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let n = images.shape().first().copied().unwrap_or(0);
        save_images(images, image_manifold_size(n), self.path_for(epoch, step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_png_sink_file_name() {
        let dir = TempDir::new().expect("temp dir");
        let mut sink = PngSampleSink::new(dir.path().join("samples"));
        sink.write(&ArrayD::zeros(vec![4, 2, 2, 3]), 3, 100).expect("write");
        assert!(dir.path().join("samples/train_03_0100.png").exists());
    }
}
