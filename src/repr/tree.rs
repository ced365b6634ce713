//! Canonical tree representation (SoA) and mutable construction API.
//!
//! This module provides:
//! - [`Tree`]: Immutable SoA tree storage for efficient traversal
//! - [`MutableTree`]: Builder used by model loaders to construct trees
//!
//! Trees hold numeric splits only: a row goes left when
//! `value < threshold`, and missing values follow the node's default
//! direction.

use super::NodeId;

// ============================================================================
// TreeValidationError
// ============================================================================

/// Structural validation errors for [`Tree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeValidationError {
    /// Tree has no nodes.
    EmptyTree,
    /// A child pointer references an out-of-bounds node.
    ChildOutOfBounds {
        node: NodeId,
        side: &'static str,
        child: NodeId,
        n_nodes: usize,
    },
    /// A node references itself as a child.
    SelfLoop { node: NodeId },
    /// A node was reached by more than one path (DAG) or due to a cycle.
    DuplicateVisit { node: NodeId },
    /// A cycle was detected during traversal.
    CycleDetected { node: NodeId },
    /// A node exists in storage but is unreachable from the root.
    UnreachableNode { node: NodeId },
}

// ============================================================================
// Tree
// ============================================================================

/// Structure-of-Arrays tree storage for efficient traversal.
///
/// Stores tree nodes in flat arrays for cache-friendly traversal.
/// Child indices are local to this tree (0 = root).
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    split_indices: Box<[u32]>,
    split_thresholds: Box<[f32]>,
    left_children: Box<[NodeId]>,
    right_children: Box<[NodeId]>,
    default_left: Box<[bool]>,
    is_leaf: Box<[bool]>,
    leaf_values: Box<[f32]>,
    /// Optional gain at each split node (for explainability).
    gains: Option<Box<[f32]>>,
    /// Optional cover (hessian sum) at each node (for explainability).
    covers: Option<Box<[f32]>>,
}

impl Tree {
    /// Create a new tree from parallel arrays.
    ///
    /// All arrays must have the same length (number of nodes).
    pub fn new(
        split_indices: Vec<u32>,
        split_thresholds: Vec<f32>,
        left_children: Vec<NodeId>,
        right_children: Vec<NodeId>,
        default_left: Vec<bool>,
        is_leaf: Vec<bool>,
        leaf_values: Vec<f32>,
    ) -> Self {
        let num_nodes = split_indices.len();
        debug_assert_eq!(num_nodes, split_thresholds.len());
        debug_assert_eq!(num_nodes, left_children.len());
        debug_assert_eq!(num_nodes, right_children.len());
        debug_assert_eq!(num_nodes, default_left.len());
        debug_assert_eq!(num_nodes, is_leaf.len());
        debug_assert_eq!(num_nodes, leaf_values.len());

        Self {
            split_indices: split_indices.into_boxed_slice(),
            split_thresholds: split_thresholds.into_boxed_slice(),
            left_children: left_children.into_boxed_slice(),
            right_children: right_children.into_boxed_slice(),
            default_left: default_left.into_boxed_slice(),
            is_leaf: is_leaf.into_boxed_slice(),
            leaf_values: leaf_values.into_boxed_slice(),
            gains: None,
            covers: None,
        }
    }

    /// Number of nodes in the tree.
    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    /// Check if a node is a leaf.
    #[inline]
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.is_leaf[node as usize]
    }

    /// Get the feature index for a split node.
    #[inline]
    pub fn split_index(&self, node: NodeId) -> u32 {
        self.split_indices[node as usize]
    }

    /// Get the split threshold for a split node.
    #[inline]
    pub fn split_threshold(&self, node: NodeId) -> f32 {
        self.split_thresholds[node as usize]
    }

    /// Get the left child node index.
    #[inline]
    pub fn left_child(&self, node: NodeId) -> NodeId {
        self.left_children[node as usize]
    }

    /// Get the right child node index.
    #[inline]
    pub fn right_child(&self, node: NodeId) -> NodeId {
        self.right_children[node as usize]
    }

    /// Get the default direction for missing values.
    #[inline]
    pub fn default_left(&self, node: NodeId) -> bool {
        self.default_left[node as usize]
    }

    /// Get the leaf value at a leaf node.
    #[inline]
    pub fn leaf_value(&self, node: NodeId) -> f32 {
        self.leaf_values[node as usize]
    }

    // =========================================================================
    // Explainability: Gains and Covers
    // =========================================================================

    /// Check if this tree has gain statistics.
    #[inline]
    pub fn has_gains(&self) -> bool {
        self.gains.is_some()
    }

    /// Check if this tree has cover statistics.
    #[inline]
    pub fn has_covers(&self) -> bool {
        self.covers.is_some()
    }

    /// Set the gains for this tree (builder pattern).
    pub fn with_gains(mut self, gains: Vec<f32>) -> Self {
        debug_assert_eq!(gains.len(), self.n_nodes());
        self.gains = Some(gains.into_boxed_slice());
        self
    }

    /// Set the covers for this tree (builder pattern).
    pub fn with_covers(mut self, covers: Vec<f32>) -> Self {
        debug_assert_eq!(covers.len(), self.n_nodes());
        self.covers = Some(covers.into_boxed_slice());
        self
    }

    /// Set both gains and covers.
    pub fn with_stats(self, gains: Vec<f32>, covers: Vec<f32>) -> Self {
        self.with_gains(gains).with_covers(covers)
    }

    /// Get read-only access to gains slice.
    ///
    /// Leaf nodes have gain=0, split nodes have the information gain from that split.
    pub fn gains(&self) -> Option<&[f32]> {
        self.gains.as_deref()
    }

    /// Get read-only access to covers slice.
    ///
    /// Cover is the sum of hessians for samples reaching each node.
    pub fn covers(&self) -> Option<&[f32]> {
        self.covers.as_deref()
    }

    /// Validate basic structural invariants for this tree.
    ///
    /// Intended for debug checks and tests (e.g., model loading invariants).
    pub fn validate(&self) -> Result<(), TreeValidationError> {
        let n_nodes = self.n_nodes();
        if n_nodes == 0 {
            return Err(TreeValidationError::EmptyTree);
        }

        // Iterative DFS with color marking.
        // 0 = unvisited, 1 = visiting, 2 = done
        let mut color = vec![0u8; n_nodes];
        let mut stack: Vec<(NodeId, u8)> = vec![(0, 0)];

        while let Some((node, phase)) = stack.pop() {
            let node_usize = node as usize;

            match phase {
                0 => {
                    match color[node_usize] {
                        0 => {}
                        1 => return Err(TreeValidationError::CycleDetected { node }),
                        2 => return Err(TreeValidationError::DuplicateVisit { node }),
                        _ => unreachable!(),
                    }

                    color[node_usize] = 1;
                    stack.push((node, 1));

                    if !self.is_leaf(node) {
                        let left = self.left_child(node);
                        let right = self.right_child(node);

                        if left == node || right == node {
                            return Err(TreeValidationError::SelfLoop { node });
                        }

                        if left as usize >= n_nodes {
                            return Err(TreeValidationError::ChildOutOfBounds {
                                node,
                                side: "left",
                                child: left,
                                n_nodes,
                            });
                        }
                        if right as usize >= n_nodes {
                            return Err(TreeValidationError::ChildOutOfBounds {
                                node,
                                side: "right",
                                child: right,
                                n_nodes,
                            });
                        }

                        // Visit children
                        stack.push((right, 0));
                        stack.push((left, 0));
                    }
                }
                1 => {
                    color[node_usize] = 2;
                }
                _ => unreachable!(),
            }
        }

        for (i, &c) in color.iter().enumerate() {
            if c == 0 {
                return Err(TreeValidationError::UnreachableNode { node: i as u32 });
            }
        }

        Ok(())
    }
}

// =============================================================================
// MutableTree (load-time construction)
// =============================================================================

/// Mutable tree used while a loader assembles a model.
///
/// Nodes are allocated as placeholders and filled in when their split or
/// leaf is determined. Allocation order defines the node ids, so a loader
/// that allocates breadth-first produces a breadth-first id layout.
#[derive(Debug, Clone, Default)]
pub struct MutableTree {
    split_indices: Vec<u32>,
    split_thresholds: Vec<f32>,
    left_children: Vec<NodeId>,
    right_children: Vec<NodeId>,
    default_left: Vec<bool>,
    is_leaf: Vec<bool>,
    leaf_values: Vec<f32>,
    /// Split gains (one per node, 0.0 for leaves).
    gains: Vec<f32>,
    /// Node covers/hessian sums (one per node).
    covers: Vec<f32>,
    next_id: NodeId,
}

impl MutableTree {
    /// Create a new mutable tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tree with capacity hint.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            split_indices: Vec::with_capacity(capacity),
            split_thresholds: Vec::with_capacity(capacity),
            left_children: Vec::with_capacity(capacity),
            right_children: Vec::with_capacity(capacity),
            default_left: Vec::with_capacity(capacity),
            is_leaf: Vec::with_capacity(capacity),
            leaf_values: Vec::with_capacity(capacity),
            gains: Vec::with_capacity(capacity),
            covers: Vec::with_capacity(capacity),
            next_id: 0,
        }
    }

    /// Initialize the root node as a placeholder.
    ///
    /// Returns the root node ID (always 0).
    pub fn init_root(&mut self) -> NodeId {
        debug_assert_eq!(self.next_id, 0, "root must be the first allocation");
        self.allocate_node()
    }

    /// Apply a numeric split to a node, allocating child nodes.
    ///
    /// Returns `(left_id, right_id)`.
    pub fn apply_numeric_split(
        &mut self,
        node: NodeId,
        feature: u32,
        threshold: f32,
        default_left: bool,
    ) -> (NodeId, NodeId) {
        let left_id = self.allocate_node();
        let right_id = self.allocate_node();

        let idx = node as usize;
        self.split_indices[idx] = feature;
        self.split_thresholds[idx] = threshold;
        self.left_children[idx] = left_id;
        self.right_children[idx] = right_id;
        self.default_left[idx] = default_left;
        self.is_leaf[idx] = false;

        (left_id, right_id)
    }

    /// Set a node as a leaf with the given value.
    pub fn make_leaf(&mut self, node: NodeId, value: f32) {
        let idx = node as usize;
        self.is_leaf[idx] = true;
        self.leaf_values[idx] = value;
    }

    /// Set gain and cover for a node (for explainability).
    ///
    /// Should be called after applying a split with the split's gain
    /// and the node's hessian sum (cover).
    #[inline]
    pub fn set_node_stats(&mut self, node: NodeId, gain: f32, cover: f32) {
        if let Some(g) = self.gains.get_mut(node as usize) {
            *g = gain;
        }
        if let Some(c) = self.covers.get_mut(node as usize) {
            *c = cover;
        }
    }

    /// Set only cover for a node (e.g., for leaves).
    #[inline]
    pub fn set_cover(&mut self, node: NodeId, cover: f32) {
        if let Some(c) = self.covers.get_mut(node as usize) {
            *c = cover;
        }
    }

    /// Current number of allocated nodes.
    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.split_indices.len()
    }

    /// Finalize the tree and return immutable storage.
    pub fn freeze(self) -> Tree {
        // Gains/covers are attached only when something populated them;
        // a loader without per-node statistics leaves them all zero.
        let has_stats = self.gains.iter().any(|&g| g != 0.0)
            || self.covers.iter().any(|&c| c != 0.0);

        let mut tree = Tree::new(
            self.split_indices,
            self.split_thresholds,
            self.left_children,
            self.right_children,
            self.default_left,
            self.is_leaf,
            self.leaf_values,
        );

        if has_stats {
            tree = tree.with_stats(self.gains, self.covers);
        }

        tree
    }

    fn allocate_node(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;

        self.split_indices.push(0);
        self.split_thresholds.push(0.0);
        self.left_children.push(0);
        self.right_children.push(0);
        self.default_left.push(false);
        self.is_leaf.push(false);
        self.leaf_values.push(0.0);
        self.gains.push(0.0);
        self.covers.push(0.0);

        id
    }
}
