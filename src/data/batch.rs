//! Batch data structures

use crate::Tensor;

/// A training batch: matching images, mismatching images and embeddings
#[derive(Debug, Clone)]
pub struct TrainBatch {
    /// `[batch, H, W, C]`, in `[-1, 1]`
    pub images: Tensor,
    /// Real images of other examples, same shape as `images`
    pub wrong_images: Tensor,
    /// Caption embeddings matching `images`, `[batch, embed_dim]`
    pub embeddings: Tensor,
    pub labels: Vec<usize>,
    /// One caption per image
    pub captions: Vec<String>,
}

impl TrainBatch {
    /// Number of images in the batch
    pub fn size(&self) -> usize {
        self.images.shape().first().copied().unwrap_or(0)
    }
}

/// A held-out batch with several captions per image
#[derive(Debug, Clone)]
pub struct TestBatch {
    pub images: Tensor,
    /// One `[batch, embed_dim]` slice per caption slot
    pub embeddings: Vec<Tensor>,
    /// `captions[i]` holds up to `max_captions` captions of image `i`
    pub captions: Vec<Vec<String>>,
}

impl TestBatch {
    pub fn size(&self) -> usize {
        self.images.shape().first().copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_size_from_leading_axis() {
        let batch = TrainBatch {
            images: Tensor::zeros(&[3, 2, 2, 1], false),
            wrong_images: Tensor::zeros(&[3, 2, 2, 1], false),
            embeddings: Tensor::zeros(&[3, 4], false),
            labels: vec![0, 1, 2],
            captions: vec![String::new(); 3],
        };
        assert_eq!(batch.size(), 3);
    }
}
