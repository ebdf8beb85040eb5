//! Adversarial loss formulations and the gradient penalty

use super::discriminator::{CriticOutput, Discriminator};
use crate::autograd::{add, backward, bce_with_logits, mean, scale, sub, sum};
use crate::nn::{Mode, Module};
use crate::Tensor;
use ndarray::{Array1, ArrayD, Axis, Zip};
use serde::{Deserialize, Serialize};

/// Target length of the largest finite-difference step along `v`
const STEP_LENGTH: f64 = 1e-2;

/// Which adversarial objective the trainer optimizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossKind {
    /// Critic logits as a Wasserstein estimate (WGAN-CLS)
    #[default]
    Wasserstein,
    /// Matching-aware binary cross-entropy (GAN-CLS)
    Cls,
}

/// Critic outputs of one discriminator step
#[derive(Debug, Clone)]
pub struct CriticScores {
    pub fake: CriticOutput,
    pub real: CriticOutput,
    /// Real images paired with captions of other images; `cls` only
    pub mismatch: Option<CriticOutput>,
}

/// Gradient penalty value and the tensor whose parameter gradient equals
/// the penalty's
#[derive(Debug, Clone)]
pub struct GradientPenalty {
    /// `lambda`-free penalty `mean_i (||g_i|| - 1)^2`
    pub value: f32,
    /// Finite-difference surrogate; `None` when the penalty has no
    /// parameter gradient (zero weight or every norm exactly one)
    pub surrogate: Option<Tensor>,
}

impl GradientPenalty {
    pub fn disabled() -> Self {
        Self { value: 0.0, surrogate: None }
    }
}

/// Discriminator objective plus the scalars reported in summaries
#[derive(Debug, Clone)]
pub struct DiscriminatorLoss {
    /// Differentiable objective; backward of this yields every critic gradient
    pub total: Tensor,
    /// Reported loss including `lambda * GP`
    pub value: f32,
    /// Mean real logit (`wasserstein`) or `BCE(real, 1)` (`cls`)
    pub real: f32,
    /// Mean fake logit (`wasserstein`) or `BCE(fake, 0)` (`cls`)
    pub fake: f32,
    pub mismatch: Option<f32>,
    pub gradient_penalty: f32,
}

/// Generator objective plus the scalars reported in summaries
#[derive(Debug, Clone)]
pub struct GeneratorLoss {
    pub total: Tensor,
    pub value: f32,
    pub adversarial: f32,
    pub kl: f32,
}

/// Build the discriminator objective
///
/// `lambda` weights the gradient penalty; the surrogate in `penalty` must
/// already carry that weight (see [`gradient_penalty`]).
pub fn discriminator_loss(
    kind: LossKind,
    scores: &CriticScores,
    penalty: &GradientPenalty,
    lambda: f32,
) -> DiscriminatorLoss {
    let (base, real, fake, mismatch) = match kind {
        LossKind::Wasserstein => {
            let real = mean(&scores.real.logits);
            let fake = mean(&scores.fake.logits);
            let (r, f) = (real.item(), fake.item());
            (sub(&fake, &real), r, f, None)
        }
        LossKind::Cls => {
            let real = bce_with_logits(&scores.real.logits, 1.0);
            let fake = bce_with_logits(&scores.fake.logits, 0.0);
            let (r, f) = (real.item(), fake.item());
            match &scores.mismatch {
                Some(wrong) => {
                    let wrong = bce_with_logits(&wrong.logits, 0.0);
                    let m = wrong.item();
                    (add(&real, &scale(&add(&fake, &wrong), 0.5)), r, f, Some(m))
                }
                None => (add(&real, &fake), r, f, None),
            }
        }
    };

    let value = base.item() + lambda * penalty.value;
    let total = match &penalty.surrogate {
        Some(surrogate) => add(&base, surrogate),
        None => base,
    };
    DiscriminatorLoss { total, value, real, fake, mismatch, gradient_penalty: penalty.value }
}

/// Build the generator objective from the critic's view of the fakes
pub fn generator_loss(kind: LossKind, fake: &CriticOutput, kl: &Tensor, kl_coeff: f32) -> GeneratorLoss {
    let adversarial = match kind {
        LossKind::Wasserstein => scale(&mean(&fake.logits), -1.0),
        LossKind::Cls => bce_with_logits(&fake.logits, 1.0),
    };
    let total = add(&adversarial, &scale(kl, kl_coeff));
    GeneratorLoss {
        value: total.item(),
        adversarial: adversarial.item(),
        kl: kl.item(),
        total,
    }
}

/// `eps_i * real_i + (1 - eps_i) * fake_i` per sample
pub fn interpolate(real: &ArrayD<f32>, fake: &ArrayD<f32>, epsilon: &Array1<f32>) -> ArrayD<f32> {
    let mut mixed = fake.clone();
    for ((mut out, real), &eps) in mixed
        .axis_iter_mut(Axis(0))
        .zip(real.axis_iter(Axis(0)))
        .zip(epsilon.iter())
    {
        Zip::from(&mut out).and(&real).for_each(|f, &r| *f = eps * r + (1.0 - eps) * *f);
    }
    mixed
}

/// Gradient penalty on `x_hat = eps * real + (1 - eps) * fake`
///
/// The input gradient `g = d sum(D(x_hat)) / d x_hat` comes from one
/// backward pass. The parameter gradient of `lambda * GP` is
/// `sum_i v_i . d g_i / d theta` with `v_i = d(lambda * GP) / d g_i`, which
/// equals the directional derivative of `g` along `v`; it is recovered by
/// the central difference
/// `(sum D(x_hat + h v) - sum D(x_hat - h v)) / 2h`, so only first-order
/// backward passes are needed. Critic gradients left by the input-gradient
/// pass are cleared before returning. In [`Mode::Train`] the extra passes
/// run in [`Mode::Frozen`], so batch-norm running statistics never see
/// interpolated samples.
pub fn gradient_penalty(
    critic: &Discriminator,
    real: &Tensor,
    fake: &Tensor,
    phi: &Tensor,
    epsilon: &Array1<f32>,
    lambda: f32,
    mode: Mode,
) -> GradientPenalty {
    let mode = match mode {
        Mode::Train => Mode::Frozen,
        other => other,
    };
    let phi = phi.detach();
    let x_hat = interpolate(real.data(), fake.data(), epsilon);
    let batch = x_hat.shape()[0];

    let input = Tensor::new(x_hat.clone(), true);
    let mut total = sum(&critic.forward(&input, &phi, mode).logits);
    backward(&mut total, None);
    let grad = input.grad().unwrap_or_else(|| ArrayD::zeros(x_hat.raw_dim()));
    critic.zero_grad();

    let norms: Vec<f64> = grad
        .axis_iter(Axis(0))
        .map(|g| g.iter().map(|&v| f64::from(v) * f64::from(v)).sum::<f64>().sqrt())
        .collect();
    let value = norms.iter().map(|n| (n - 1.0).powi(2)).sum::<f64>() / batch.max(1) as f64;

    if lambda == 0.0 {
        return GradientPenalty { value: value as f32, surrogate: None };
    }

    // v_i = lambda * 2 (n_i - 1) / (n_i * B) * g_i
    let weights: Vec<f64> = norms
        .iter()
        .map(|&n| f64::from(lambda) * 2.0 * (n - 1.0) / (n.max(1e-12) * batch as f64))
        .collect();
    let longest = norms
        .iter()
        .zip(&weights)
        .map(|(n, w)| (n * w).abs())
        .fold(0.0f64, f64::max);
    if longest == 0.0 || !longest.is_finite() {
        return GradientPenalty { value: value as f32, surrogate: None };
    }
    let h = STEP_LENGTH / longest;

    let mut direction = grad;
    for (mut g, &w) in direction.axis_iter_mut(Axis(0)).zip(&weights) {
        g.mapv_inplace(|v| (f64::from(v) * w * h) as f32);
    }
    let plus = Tensor::new(&x_hat + &direction, false);
    let minus = Tensor::new(&x_hat - &direction, false);

    let plus_total = sum(&critic.forward(&plus, &phi, mode).logits);
    let minus_total = sum(&critic.forward(&minus, &phi, mode).logits);
    let surrogate = scale(&sub(&plus_total, &minus_total), (0.5 / h) as f32);

    GradientPenalty { value: value as f32, surrogate: Some(surrogate) }
}
