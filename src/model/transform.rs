//! Output transformation for inference.
//!
//! The [`OutputTransform`] enum defines how raw model outputs (margins)
//! are converted to final predictions. This is persisted with the model
//! so that inference doesn't require the original objective.

/// Inference-time output transformation.
///
/// Models persist this instead of the full objective so that prediction
/// can work without knowing training configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputTransform {
    /// No transformation; output = margin.
    /// Used for regression and raw margin outputs.
    #[default]
    Identity,

    /// Logistic sigmoid: output = 1 / (1 + exp(-margin)).
    /// Used for binary classification.
    Sigmoid,

    /// Softmax: output_i = exp(margin_i) / sum(exp(margin_j)).
    /// Used for multiclass classification.
    Softmax,

    /// Exponential: output = exp(margin).
    /// Used for count and gamma/tweedie regression.
    Exp,
}

impl OutputTransform {
    /// Select the transform for an XGBoost objective name.
    ///
    /// Objectives that predict in margin space map to `Identity`.
    pub fn for_objective(objective: &str) -> Self {
        match objective {
            "binary:logistic" | "reg:logistic" => OutputTransform::Sigmoid,
            "multi:softprob" | "multi:softmax" => OutputTransform::Softmax,
            "count:poisson" | "reg:gamma" | "reg:tweedie" => OutputTransform::Exp,
            _ => OutputTransform::Identity,
        }
    }

    /// Map a score from output space back to margin space.
    ///
    /// This is the inverse link applied to a stored base score so that the
    /// evaluator can add it to raw margins. Scores are clamped away from the
    /// poles where the inverse is unbounded.
    pub fn to_margin(&self, score: f32) -> f32 {
        match self {
            OutputTransform::Sigmoid => {
                // logit(p) = log(p / (1 - p))
                let p = score.clamp(1e-7, 1.0 - 1e-7);
                (p / (1.0 - p)).ln()
            }
            OutputTransform::Exp => score.max(1e-7).ln(),
            OutputTransform::Identity | OutputTransform::Softmax => score,
        }
    }

    /// Apply the transformation in-place to a row-major predictions buffer.
    ///
    /// # Arguments
    ///
    /// * `predictions` - Mutable slice of predictions, shape `(n_rows, n_outputs)` in row-major order.
    /// * `n_outputs` - Number of output columns (1 for regression/binary, n_classes for multiclass).
    ///
    /// # Numerical Stability
    ///
    /// - Sigmoid clamps input to [-500, 500] to avoid overflow.
    /// - Softmax subtracts the max per row before exponentiating.
    ///
    /// # Panics
    ///
    /// Panics if `predictions.len()` is not divisible by `n_outputs` or if `n_outputs` is 0.
    #[inline]
    pub fn transform_inplace(&self, predictions: &mut [f32], n_outputs: usize) {
        assert!(n_outputs > 0, "n_outputs must be > 0");
        assert!(
            predictions.len() % n_outputs == 0,
            "predictions.len() must be divisible by n_outputs"
        );

        match self {
            OutputTransform::Identity => {
                // No-op
            }
            OutputTransform::Sigmoid => {
                for x in predictions.iter_mut() {
                    *x = sigmoid(*x);
                }
            }
            OutputTransform::Softmax => {
                let n_rows = predictions.len() / n_outputs;
                for row_idx in 0..n_rows {
                    let start = row_idx * n_outputs;
                    let end = start + n_outputs;
                    let row = &mut predictions[start..end];
                    softmax_inplace(row);
                }
            }
            OutputTransform::Exp => {
                for x in predictions.iter_mut() {
                    *x = x.exp();
                }
            }
        }
    }
}

/// Numerically stable sigmoid.
/// Clamps input to [-500, 500] to prevent overflow.
#[inline]
fn sigmoid(x: f32) -> f32 {
    // Clamp to avoid overflow in exp
    let clamped = x.clamp(-500.0, 500.0);
    if clamped >= 0.0 {
        1.0 / (1.0 + (-clamped).exp())
    } else {
        let e = clamped.exp();
        e / (1.0 + e)
    }
}

/// Numerically stable softmax in-place.
/// Subtracts max before exponentiating to avoid overflow.
#[inline]
fn softmax_inplace(row: &mut [f32]) {
    if row.is_empty() {
        return;
    }

    // Find max for numerical stability
    let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

    // Compute exp(x - max) and sum
    let mut sum = 0.0f32;
    for x in row.iter_mut() {
        *x = (*x - max).exp();
        sum += *x;
    }

    // Normalize
    if sum > 0.0 {
        for x in row.iter_mut() {
            *x /= sum;
        }
    }
}
