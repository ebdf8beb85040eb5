//! Adam optimizer

use super::Optimizer;
use crate::Tensor;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// Adam hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamConfig {
    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
}

impl Default for AdamConfig {
    /// WGAN-GP settings: lr 1e-4, betas (0.5, 0.9)
    fn default() -> Self {
        Self { lr: 1e-4, beta1: 0.5, beta2: 0.9, epsilon: 1e-8 }
    }
}

/// Adam optimizer
///
/// m_t = β1 * m_{t-1} + (1 - β1) * g
/// v_t = β2 * v_{t-1} + (1 - β2) * g²
/// θ_t = θ_{t-1} - lr * √(1 - β2^t) / (1 - β1^t) * m_t / (√v_t + ε)
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: u64,
    m: Vec<Option<ArrayD<f32>>>, // First moment
    v: Vec<Option<ArrayD<f32>>>, // Second moment
}

impl Adam {
    pub fn new(config: AdamConfig) -> Self {
        Self {
            lr: config.lr,
            beta1: config.beta1,
            beta2: config.beta2,
            epsilon: config.epsilon,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Adam with default betas and the given learning rate
    pub fn default_params(lr: f32) -> Self {
        Self::new(AdamConfig { lr, ..AdamConfig::default() })
    }

    // Checkpoint state accessors

    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.t
    }

    pub fn set_step_count(&mut self, t: u64) {
        self.t = t;
    }

    #[must_use]
    pub fn first_moments(&self) -> &[Option<ArrayD<f32>>] {
        &self.m
    }

    #[must_use]
    pub fn second_moments(&self) -> &[Option<ArrayD<f32>>] {
        &self.v
    }

    pub fn set_first_moment(&mut self, idx: usize, data: ArrayD<f32>) {
        if idx >= self.m.len() {
            self.m.resize(idx + 1, None);
        }
        self.m[idx] = Some(data);
    }

    pub fn set_second_moment(&mut self, idx: usize, data: ArrayD<f32>) {
        if idx >= self.v.len() {
            self.v.resize(idx + 1, None);
        }
        self.v[idx] = Some(data);
    }
}

impl Optimizer for Adam {
    fn step_refs(&mut self, params: &mut [&mut Tensor]) {
        if self.m.len() < params.len() {
            self.m.resize(params.len(), None);
            self.v.resize(params.len(), None);
        }
        self.t += 1;

        // Bias correction folded into the step size
        let t = self.t as i32;
        let lr_t = self.lr * ((1.0 - self.beta2.powi(t)).sqrt() / (1.0 - self.beta1.powi(t)));

        for (i, param) in params.iter_mut().enumerate() {
            let Some(grad) = param.grad() else { continue };

            let m_t = match &self.m[i] {
                Some(m) if m.shape() == grad.shape() => m * self.beta1 + &grad * (1.0 - self.beta1),
                _ => &grad * (1.0 - self.beta1),
            };
            let grad_sq = &grad * &grad;
            let v_t = match &self.v[i] {
                Some(v) if v.shape() == grad.shape() => v * self.beta2 + &grad_sq * (1.0 - self.beta2),
                _ => &grad_sq * (1.0 - self.beta2),
            };

            let update = &m_t / &(v_t.mapv(f32::sqrt) + self.epsilon) * lr_t;
            *param.data_mut() -= &update;

            self.m[i] = Some(m_t);
            self.v[i] = Some(v_t);
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}
