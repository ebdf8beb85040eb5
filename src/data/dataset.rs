//! Text/image datasets

use super::batch::{TestBatch, TrainBatch};
use crate::model::ImageShape;
use crate::{Error, Result, Tensor};
use ndarray::{Array2, ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Source of paired images and caption embeddings
pub trait TextImageDataset {
    /// Number of training examples
    fn num_examples(&self) -> usize;

    /// Random training batch; each embedding averages `window` randomly
    /// chosen caption embeddings of its image
    fn next_batch(&mut self, batch_size: usize, window: usize) -> Result<TrainBatch>;

    /// Held-out batch of images `start..start + batch_size` (wrapping), with
    /// embeddings for up to `max_captions` captions per image
    fn next_batch_test(&self, batch_size: usize, start: usize, max_captions: usize) -> Result<TestBatch>;
}

/// One image with its captions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    /// Row-major `H * W * C` pixels in `[-1, 1]`
    pub image: Vec<f32>,
    /// One embedding per caption
    pub embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    pub captions: Vec<String>,
    #[serde(default)]
    pub label: usize,
}

/// On-disk layout of a dataset file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetFile {
    /// `[H, W, C]`
    pub image_shape: [usize; 3],
    pub examples: Vec<Example>,
    /// Held-out examples; the training examples are reused when absent
    #[serde(default)]
    pub test_examples: Vec<Example>,
}

/// Dataset held entirely in memory
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    image_shape: ImageShape,
    embed_dim: usize,
    train: Vec<Example>,
    test: Vec<Example>,
    rng: StdRng,
}

impl InMemoryDataset {
    /// Build and validate a dataset
    pub fn new(image_shape: ImageShape, train: Vec<Example>, test: Vec<Example>, seed: Option<u64>) -> Result<Self> {
        if train.is_empty() {
            return Err(Error::Dataset("dataset has no training examples".into()));
        }
        let embed_dim = train[0].embeddings.first().map(Vec::len).unwrap_or(0);
        if embed_dim == 0 {
            return Err(Error::Dataset("first example has no caption embeddings".into()));
        }
        for (i, example) in train.iter().chain(test.iter()).enumerate() {
            if example.image.len() != image_shape.len() {
                return Err(Error::Dataset(format!(
                    "example {i}: image has {} values, expected {}",
                    example.image.len(),
                    image_shape.len()
                )));
            }
            if example.embeddings.is_empty() || example.embeddings.iter().any(|e| e.len() != embed_dim) {
                return Err(Error::Dataset(format!(
                    "example {i}: every example needs embeddings of length {embed_dim}"
                )));
            }
        }
        let test = if test.is_empty() { train.clone() } else { test };
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self { image_shape, embed_dim, train, test, rng })
    }

    /// Load a JSON dataset file
    pub fn load(path: impl AsRef<Path>, seed: Option<u64>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Dataset(format!("failed to read {}: {e}", path.display())))?;
        let file: DatasetFile = serde_json::from_str(&text)?;
        let [h, w, c] = file.image_shape;
        Self::new(ImageShape { h, w, c }, file.examples, file.test_examples, seed)
    }

    pub fn image_shape(&self) -> ImageShape {
        self.image_shape
    }

    pub fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    fn image_batch<'a>(&self, examples: impl Iterator<Item = &'a Example>, batch: usize) -> Result<Tensor> {
        let shape = self.image_shape;
        let data: Vec<f32> = examples.flat_map(|e| e.image.iter().copied()).collect();
        Tensor::from_shape_vec(&[batch, shape.h, shape.w, shape.c], data, false)
    }

    /// Mean of `window` distinct caption embeddings drawn at random
    fn caption_window(&mut self, example: usize, window: usize) -> (Vec<f32>, String) {
        let embeddings = &self.train[example].embeddings;
        let take = window.clamp(1, embeddings.len());
        let picks = index::sample(&mut self.rng, embeddings.len(), take);
        let mut mean = vec![0.0f32; self.embed_dim];
        for pick in picks.iter() {
            for (m, v) in mean.iter_mut().zip(&embeddings[pick]) {
                *m += v / take as f32;
            }
        }
        let caption = self.train[example]
            .captions
            .get(picks.index(0))
            .cloned()
            .unwrap_or_default();
        (mean, caption)
    }
}

impl TextImageDataset for InMemoryDataset {
    fn num_examples(&self) -> usize {
        self.train.len()
    }

    fn next_batch(&mut self, batch_size: usize, window: usize) -> Result<TrainBatch> {
        if batch_size == 0 {
            return Err(Error::Dataset("batch size must be positive".into()));
        }
        let n = self.train.len();
        let picks: Vec<usize> = (0..batch_size).map(|_| self.rng.random_range(0..n)).collect();
        // any other example; the same one only when there is nothing else
        let wrong: Vec<usize> = picks
            .iter()
            .map(|&i| if n > 1 { (i + self.rng.random_range(1..n)) % n } else { i })
            .collect();

        let mut embeddings = Array2::<f32>::zeros((batch_size, self.embed_dim));
        let mut captions = Vec::with_capacity(batch_size);
        for (row, &i) in picks.iter().enumerate() {
            let (mean, caption) = self.caption_window(i, window);
            embeddings.row_mut(row).assign(&ndarray::Array1::from(mean));
            captions.push(caption);
        }

        Ok(TrainBatch {
            images: self.image_batch(picks.iter().map(|&i| &self.train[i]), batch_size)?,
            wrong_images: self.image_batch(wrong.iter().map(|&i| &self.train[i]), batch_size)?,
            embeddings: Tensor::new(embeddings.into_dyn(), false),
            labels: picks.iter().map(|&i| self.train[i].label).collect(),
            captions,
        })
    }

    fn next_batch_test(&self, batch_size: usize, start: usize, max_captions: usize) -> Result<TestBatch> {
        if batch_size == 0 || max_captions == 0 {
            return Err(Error::Dataset("test batch needs at least one image and one caption".into()));
        }
        let n = self.test.len();
        let rows: Vec<&Example> = (0..batch_size).map(|k| &self.test[(start + k) % n]).collect();

        let embeddings = (0..max_captions)
            .map(|slot| {
                let mut data = ArrayD::<f32>::zeros(IxDyn(&[batch_size, self.embed_dim]));
                for (row, example) in rows.iter().enumerate() {
                    let embedding = &example.embeddings[slot % example.embeddings.len()];
                    for (j, &v) in embedding.iter().enumerate() {
                        data[[row, j]] = v;
                    }
                }
                Tensor::new(data, false)
            })
            .collect();
        let captions = rows
            .iter()
            .map(|e| e.captions.iter().take(max_captions).cloned().collect())
            .collect();

        Ok(TestBatch {
            images: self.image_batch(rows.iter().copied(), batch_size)?,
            embeddings,
            captions,
        })
    }
}
