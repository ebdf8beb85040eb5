//! Build the model, dataset and trainer a spec describes

use super::schema::GanSpec;
use crate::data::InMemoryDataset;
use crate::error::{Error, Result};
use crate::model::TextToImageGan;
use crate::train::GanTrainer;

/// Model with weights drawn from the configured seed (or OS entropy)
pub fn build_gan(spec: &GanSpec) -> Result<TextToImageGan> {
    match spec.training.seed {
        Some(seed) => TextToImageGan::with_seed(spec.model.clone(), seed),
        None => TextToImageGan::new(spec.model.clone()),
    }
}

/// Load the dataset and check it fits the model
pub fn build_dataset(spec: &GanSpec) -> Result<InMemoryDataset> {
    let dataset = InMemoryDataset::load(&spec.data.path, spec.training.seed)?;
    if dataset.image_shape() != spec.model.image_shape {
        let model = spec.model.image_shape;
        let data = dataset.image_shape();
        return Err(Error::shape("dataset images", &[model.h, model.w, model.c], &[data.h, data.w, data.c]));
    }
    if dataset.embed_dim() != spec.model.embed_dim {
        return Err(Error::shape("dataset embeddings", &[spec.model.embed_dim], &[dataset.embed_dim()]));
    }
    Ok(dataset)
}

/// Trainer over the configured dataset, writing to the configured directories
pub fn build_trainer(spec: &GanSpec) -> Result<GanTrainer<InMemoryDataset>> {
    let dataset = build_dataset(spec)?;
    let gan = build_gan(spec)?;
    GanTrainer::new(gan, dataset, spec.training.clone(), spec.optimizer)
}
