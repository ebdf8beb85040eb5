//! Training checkpoints
//!
//! A checkpoint is one safetensors file holding every generator and
//! discriminator parameter, the batch-norm running statistics and both
//! optimizers' moment buffers. `checkpoint.json` in the same directory
//! names the newest file and every retained one.

use crate::model::TextToImageGan;
use crate::nn::Module;
use crate::optim::Adam;
use crate::{Error, Result};
use chrono::Utc;
use ndarray::{ArrayD, IxDyn};
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const INDEX_FILE: &str = "checkpoint.json";
const MODEL_NAME: &str = "pintor";

/// Contents of `checkpoint.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointIndex {
    pub latest: Option<String>,
    pub all: Vec<String>,
}

/// Optimizers whose state travels with the model
pub struct Optimizers<'a> {
    pub generator: &'a Adam,
    pub discriminator: &'a Adam,
}

/// Mutable counterpart of [`Optimizers`] for restoring
pub struct OptimizersMut<'a> {
    pub generator: &'a mut Adam,
    pub discriminator: &'a mut Adam,
}

/// Saves, indexes, prunes and restores checkpoints in one directory
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
    max_to_keep: usize,
}

impl CheckpointManager {
    /// `max_to_keep == 0` keeps every checkpoint
    pub fn new(dir: impl Into<PathBuf>, max_to_keep: usize) -> Self {
        Self { dir: dir.into(), max_to_keep }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(step: usize) -> String {
        format!("{MODEL_NAME}-{step}.safetensors")
    }

    /// Read the index; a missing index is an empty one
    pub fn index(&self) -> Result<CheckpointIndex> {
        let path = self.dir.join(INDEX_FILE);
        if !path.exists() {
            return Ok(CheckpointIndex::default());
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    /// Write a checkpoint for `step` and prune old ones
    pub fn save(&self, step: usize, gan: &TextToImageGan, optimizers: Optimizers<'_>) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let mut arrays: Vec<(String, ArrayD<f32>)> = gan
            .named_parameters("")
            .into_iter()
            .map(|(name, tensor)| (name, tensor.data().clone()))
            .collect();
        arrays.extend(gan.buffer_map());
        arrays.extend(moment_arrays(
            "optimizer/generator",
            &gan.generator.named_parameters("generator"),
            optimizers.generator,
        ));
        arrays.extend(moment_arrays(
            "optimizer/discriminator",
            &gan.discriminator.named_parameters("discriminator"),
            optimizers.discriminator,
        ));

        let bytes: Vec<(String, Vec<u8>, Vec<usize>)> = arrays
            .into_iter()
            .map(|(name, array)| {
                let shape = array.shape().to_vec();
                let values: Vec<f32> = array.iter().copied().collect();
                (name, bytemuck::cast_slice(&values).to_vec(), shape)
            })
            .collect();
        let views = bytes
            .iter()
            .map(|(name, data, shape)| Ok((name.clone(), TensorView::new(Dtype::F32, shape.clone(), data)?)))
            .collect::<Result<Vec<_>>>()?;

        let metadata: HashMap<String, String> = [
            ("step".to_string(), step.to_string()),
            ("model".to_string(), MODEL_NAME.to_string()),
            ("created_at".to_string(), Utc::now().to_rfc3339()),
            ("generator_optimizer_steps".to_string(), optimizers.generator.step_count().to_string()),
            ("discriminator_optimizer_steps".to_string(), optimizers.discriminator.step_count().to_string()),
        ]
        .into_iter()
        .collect();
        let serialized = safetensors::serialize(views, &Some(metadata))?;

        let file_name = Self::file_name(step);
        let path = self.dir.join(&file_name);
        fs::write(&path, serialized)?;

        let mut index = self.index()?;
        index.all.retain(|name| name != &file_name);
        index.all.push(file_name.clone());
        index.latest = Some(file_name);
        if self.max_to_keep > 0 {
            while index.all.len() > self.max_to_keep {
                let oldest = index.all.remove(0);
                match fs::remove_file(self.dir.join(&oldest)) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        fs::write(self.dir.join(INDEX_FILE), serde_json::to_string_pretty(&index)?)?;
        Ok(path)
    }

    /// Restore the newest checkpoint
    ///
    /// Returns `Ok(None)` when there is nothing to restore. Every tensor is
    /// checked before any state is touched, so an error leaves `gan` and the
    /// optimizers as they were.
    pub fn load(&self, gan: &mut TextToImageGan, optimizers: OptimizersMut<'_>) -> Result<Option<usize>> {
        let Some(latest) = self.index()?.latest else {
            return Ok(None);
        };
        let data = fs::read(self.dir.join(&latest))?;

        let (_, header) = SafeTensors::read_metadata(&data)?;
        let info = header.metadata().clone().unwrap_or_default();
        let step: usize = info
            .get("step")
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::Checkpoint(format!("{latest}: missing step metadata")))?;
        let counter = |key: &str| info.get(key).and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);

        let tensors = SafeTensors::deserialize(&data)?;
        let mut stored: HashMap<String, ArrayD<f32>> = HashMap::new();
        for name in tensors.names() {
            let view = tensors.tensor(name)?;
            if view.dtype() != Dtype::F32 {
                return Err(Error::Checkpoint(format!("{name}: expected f32, got {:?}", view.dtype())));
            }
            let values: Vec<f32> = bytemuck::pod_collect_to_vec(view.data());
            let array = ArrayD::from_shape_vec(IxDyn(view.shape()), values)
                .map_err(|e| Error::Checkpoint(format!("{name}: {e}")))?;
            stored.insert(name.to_string(), array);
        }

        // validate everything before mutating
        let take = |name: &str, shape: &[usize]| -> Result<ArrayD<f32>> {
            let array = stored
                .get(name)
                .ok_or_else(|| Error::Checkpoint(format!("{latest}: missing tensor {name}")))?;
            if array.shape() != shape {
                return Err(Error::shape(format!("checkpoint tensor {name}"), shape, array.shape()));
            }
            Ok(array.clone())
        };
        let params = gan
            .named_parameters("")
            .into_iter()
            .map(|(name, t)| take(&name, t.shape()))
            .collect::<Result<Vec<_>>>()?;
        let buffers = gan
            .named_buffers("")
            .into_iter()
            .map(|(name, b)| take(&name, &[b.len()]))
            .collect::<Result<Vec<_>>>()?;
        let g_moments = stored_moments("optimizer/generator", &gan.generator.named_parameters("generator"), &stored);
        let d_moments =
            stored_moments("optimizer/discriminator", &gan.discriminator.named_parameters("discriminator"), &stored);

        for ((_, param), value) in gan.named_parameters_mut("").into_iter().zip(params) {
            param.assign(value)?;
            param.zero_grad();
        }
        for ((_, buffer), value) in gan.named_buffers_mut("").into_iter().zip(buffers) {
            let len = value.len();
            *buffer = value
                .into_shape_with_order(len)
                .map_err(|e| Error::Checkpoint(format!("buffer: {e}")))?;
        }
        restore_moments(optimizers.generator, g_moments, counter("generator_optimizer_steps"));
        restore_moments(optimizers.discriminator, d_moments, counter("discriminator_optimizer_steps"));

        Ok(Some(step))
    }
}

/// `{prefix}/{param}/m` and `/v` for every parameter with moments
fn moment_arrays(prefix: &str, params: &[(String, &crate::Tensor)], optimizer: &Adam) -> Vec<(String, ArrayD<f32>)> {
    let mut arrays = Vec::new();
    for (i, (name, _)) in params.iter().enumerate() {
        if let Some(Some(m)) = optimizer.first_moments().get(i) {
            arrays.push((format!("{prefix}/{name}/m"), m.clone()));
        }
        if let Some(Some(v)) = optimizer.second_moments().get(i) {
            arrays.push((format!("{prefix}/{name}/v"), v.clone()));
        }
    }
    arrays
}

type Moments = Vec<(usize, Option<ArrayD<f32>>, Option<ArrayD<f32>>)>;

fn stored_moments(prefix: &str, params: &[(String, &crate::Tensor)], stored: &HashMap<String, ArrayD<f32>>) -> Moments {
    params
        .iter()
        .enumerate()
        .map(|(i, (name, tensor))| {
            let fetch = |suffix: &str| {
                stored
                    .get(&format!("{prefix}/{name}/{suffix}"))
                    .filter(|a| a.shape() == tensor.shape())
                    .cloned()
            };
            (i, fetch("m"), fetch("v"))
        })
        .collect()
}

fn restore_moments(optimizer: &mut Adam, moments: Moments, steps: u64) {
    optimizer.set_step_count(steps);
    for (i, m, v) in moments {
        if let (Some(m), Some(v)) = (m, v) {
            optimizer.set_first_moment(i, m);
            optimizer.set_second_moment(i, v);
        }
    }
}
