//! High-level model types produced by the loaders.

mod transform;

pub use transform::OutputTransform;

use crate::repr::Forest;

/// Scalar parameters attached to a loaded ensemble.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelParams {
    /// Margin added to every raw prediction.
    pub global_bias: f32,
    /// Number of output groups (1 for regression/binary, k for k-class).
    pub n_output_groups: u32,
    /// Number of input features the model was trained on.
    pub n_features: u32,
    /// Whether tree outputs are averaged (random forest) rather than summed.
    pub random_forest: bool,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            global_bias: 0.0,
            n_output_groups: 1,
            n_features: 0,
            random_forest: false,
        }
    }
}

/// A tree-ensemble model.
///
/// Combines the trees with the scalar parameters and the output transform
/// that downstream evaluation or compilation needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    /// The trees, in boosting order.
    pub forest: Forest,
    /// Scalar model parameters.
    pub params: ModelParams,
    /// Output transformation selected from the training objective.
    pub transform: OutputTransform,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params() {
        let params = ModelParams::default();
        assert_eq!(params.n_output_groups, 1);
        assert_eq!(params.n_features, 0);
        assert_eq!(params.global_bias, 0.0);
        assert!(!params.random_forest);
    }

    #[test]
    fn default_model_is_empty_identity() {
        let model = Model::default();
        assert!(model.forest.is_empty());
        assert_eq!(model.transform, OutputTransform::Identity);
    }
}
