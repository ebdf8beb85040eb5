//! Files written and read during training: sample grids, captions, checkpoints

mod checkpoint;
mod images;

pub use checkpoint::{CheckpointIndex, CheckpointManager, Optimizers, OptimizersMut};
pub use images::{image_manifold_size, save_captions, save_images};
