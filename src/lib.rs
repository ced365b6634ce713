//! grove: tree-ensemble models for Rust.
//!
//! Provides a canonical in-memory representation for gradient-boosted
//! decision-tree ensembles and a streaming loader for models saved in the
//! XGBoost JSON format.
//!
//! # Key Types
//!
//! - [`Model`] - A loaded ensemble: trees, scalar parameters, output transform
//! - [`repr::Tree`] / [`repr::Forest`] - SoA tree storage and construction API
//! - [`OutputTransform`] - Inference-time output transformation
//!
//! # Loading XGBoost Models
//!
//! The [`compat::xgboost`] module parses the JSON model event-by-event, so a
//! large model file is never materialized as a DOM:
//!
//! ```ignore
//! use grove::compat::xgboost;
//!
//! let model = xgboost::from_file("model.json")?;
//! println!("{} trees, {} features", model.forest.n_trees(), model.params.n_features);
//! ```

pub mod compat;
pub mod model;
pub mod repr;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use model::{Model, ModelParams, OutputTransform};
pub use repr::{Forest, MutableTree, NodeId, Tree};
