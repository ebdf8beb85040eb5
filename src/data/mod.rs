//! Training data: paired images and caption embeddings

mod batch;
mod dataset;

pub use batch::{TestBatch, TrainBatch};
pub use dataset::{DatasetFile, Example, InMemoryDataset, TextImageDataset};
