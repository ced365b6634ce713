//! Schema handlers for the XGBoost JSON model format.
//!
//! The parser is a pushdown machine. The dispatcher owns a stack of
//! handlers, one per open JSON container, and forwards every tokenizer
//! event to the top of the stack. A handler interprets exactly one nesting
//! level of the schema: it remembers the most recent key, matches value
//! events against the keys it recognizes, and opens a child handler for
//! every nested container it accepts. When a container closes, its handler
//! synthesizes a product (a parsed tree, a scalar array, ...) that the
//! parent absorbs.
//!
//! Trees arrive as parallel flat arrays indexed by XGBoost's stored node
//! ids. Once a tree object closes, [`RegTreeHandler`] re-walks those arrays
//! breadth-first and rebuilds the tree through [`MutableTree`], which
//! assigns fresh contiguous ids in visit order.

use std::collections::VecDeque;
use std::mem;

use tracing::{error, warn};

use crate::model::{Model, OutputTransform};
use crate::repr::{MutableTree, NodeId, Tree};

use super::event::Event;
use super::LoadError;

// =============================================================================
// Control flow between handlers and the dispatcher
// =============================================================================

/// What a handler tells the dispatcher to do after an event.
#[derive(Debug)]
pub(super) enum Flow {
    /// The event was absorbed; the current handler stays on top.
    Stay,
    /// A nested container opened; the child handles events until it closes.
    Push(Handler),
    /// The current container closed; deliver the product to the parent.
    Pop(Product),
}

/// Value synthesized by a popped handler and absorbed by its parent.
#[derive(Debug)]
pub(super) enum Product {
    Doubles(Vec<f64>),
    Ints(Vec<i32>),
    Uints(Vec<u32>),
    Bools(Vec<bool>),
    Tree(Tree),
    Trees(Vec<Tree>),
    NumNodes(i32),
    Objective(String),
    /// Produced by handlers that only consume input (ignored subtrees,
    /// handlers that write straight into the model).
    Nothing,
}

// =============================================================================
// Handler
// =============================================================================

/// One schema level of the XGBoost JSON document.
///
/// A closed set, so dispatch is a plain enum match rather than a trait
/// object. Scalar array accumulators are inlined as variants; the larger
/// tree handler is boxed to keep the stack slots small.
#[derive(Debug)]
pub(super) enum Handler {
    /// Consumes an arbitrary subtree without interpreting it.
    Ignore,
    Doubles(Vec<f64>),
    Ints(Vec<i32>),
    Uints(Vec<u32>),
    Bools(Vec<bool>),
    TreeArray(TreeArrayHandler),
    TreeParam(TreeParamHandler),
    RegTree(Box<RegTreeHandler>),
    GbTreeModel(GbTreeModelHandler),
    GradientBooster(GradientBoosterHandler),
    Objective(ObjectiveHandler),
    LearnerParam(LearnerParamHandler),
    Learner(LearnerHandler),
    XgbModel(XgbModelHandler),
    Root,
}

impl Handler {
    fn on_event(&mut self, event: &Event<'_>, model: &mut Model) -> Result<Flow, LoadError> {
        match self {
            Handler::Ignore => Ok(match event {
                Event::StartObject | Event::StartArray => Flow::Push(Handler::Ignore),
                Event::EndObject | Event::EndArray => Flow::Pop(Product::Nothing),
                _ => Flow::Stay,
            }),
            Handler::Doubles(out) => Ok(match *event {
                Event::Double(v) => {
                    out.push(v);
                    Flow::Stay
                }
                Event::Int(v) => {
                    out.push(v as f64);
                    Flow::Stay
                }
                Event::Uint(v) => {
                    out.push(v as f64);
                    Flow::Stay
                }
                Event::EndArray => Flow::Pop(Product::Doubles(mem::take(out))),
                _ => Flow::Stay,
            }),
            Handler::Ints(out) => Ok(match *event {
                Event::Int(v) => {
                    out.push(v as i32);
                    Flow::Stay
                }
                Event::Uint(v) => {
                    out.push(v as i32);
                    Flow::Stay
                }
                Event::EndArray => Flow::Pop(Product::Ints(mem::take(out))),
                _ => Flow::Stay,
            }),
            Handler::Uints(out) => Ok(match *event {
                Event::Uint(v) => {
                    out.push(v as u32);
                    Flow::Stay
                }
                Event::EndArray => Flow::Pop(Product::Uints(mem::take(out))),
                _ => Flow::Stay,
            }),
            Handler::Bools(out) => Ok(match *event {
                Event::Bool(v) => {
                    out.push(v);
                    Flow::Stay
                }
                // Newer dumps store these flags as 0/1 integers.
                Event::Uint(v) => {
                    out.push(v != 0);
                    Flow::Stay
                }
                Event::Int(v) => {
                    out.push(v != 0);
                    Flow::Stay
                }
                Event::EndArray => Flow::Pop(Product::Bools(mem::take(out))),
                _ => Flow::Stay,
            }),
            Handler::TreeArray(h) => h.on_event(event),
            Handler::TreeParam(h) => h.on_event(event),
            Handler::RegTree(h) => h.on_event(event),
            Handler::GbTreeModel(h) => h.on_event(event),
            Handler::GradientBooster(h) => h.on_event(event),
            Handler::Objective(h) => h.on_event(event),
            Handler::LearnerParam(h) => h.on_event(event, model),
            Handler::Learner(h) => h.on_event(event, model),
            Handler::XgbModel(h) => h.on_event(event, model),
            Handler::Root => match event {
                Event::StartObject => Ok(Flow::Push(Handler::XgbModel(XgbModelHandler::default()))),
                _ => Err(LoadError::UnexpectedEvent {
                    context: "document root",
                    event: event.kind(),
                }),
            },
        }
    }

    fn on_child(&mut self, product: Product, model: &mut Model) {
        match self {
            Handler::TreeArray(h) => h.on_child(product),
            Handler::RegTree(h) => h.on_child(product),
            Handler::GbTreeModel(h) => h.on_child(product, model),
            Handler::Learner(h) => h.on_child(product),
            Handler::XgbModel(h) => h.on_child(product),
            // Remaining handlers only ever push ignored subtrees.
            _ => {}
        }
    }
}

// =============================================================================
// Tree-level handlers
// =============================================================================

/// Parses the `tree_param` sub-object of a tree.
///
/// XGBoost stores these integer parameters as decimal strings, not JSON
/// numbers.
#[derive(Default)]
#[derive(Debug)]
pub(super) struct TreeParamHandler {
    cur_key: String,
    num_nodes: i32,
}

impl TreeParamHandler {
    fn on_event(&mut self, event: &Event<'_>) -> Result<Flow, LoadError> {
        match *event {
            Event::Key(k) => {
                self.cur_key = k.to_owned();
                Ok(Flow::Stay)
            }
            Event::Str(s) => match self.cur_key.as_str() {
                "num_nodes" => {
                    self.num_nodes = s.trim().parse().map_err(|_| LoadError::InvalidParam {
                        key: "num_nodes",
                        value: s.to_owned(),
                    })?;
                    Ok(Flow::Stay)
                }
                // `num_deleted` is deprecated but still present in some dumps.
                "num_feature" | "size_leaf_vector" | "num_deleted" => Ok(Flow::Stay),
                _ => Err(LoadError::unexpected_key("tree_param", &self.cur_key)),
            },
            Event::EndObject => Ok(Flow::Pop(Product::NumNodes(self.num_nodes))),
            _ => Ok(Flow::Stay),
        }
    }
}

/// Parses one tree object into its flat arrays, then rebuilds it.
#[derive(Default)]
#[derive(Debug)]
pub(super) struct RegTreeHandler {
    cur_key: String,
    num_nodes: i32,
    loss_changes: Vec<f64>,
    sum_hessian: Vec<f64>,
    base_weights: Vec<f64>,
    leaf_child_counts: Vec<i32>,
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    parents: Vec<i32>,
    split_indices: Vec<i32>,
    split_conditions: Vec<f64>,
    default_left: Vec<bool>,
}

impl RegTreeHandler {
    fn on_event(&mut self, event: &Event<'_>) -> Result<Flow, LoadError> {
        match *event {
            Event::Key(k) => {
                self.cur_key = k.to_owned();
                Ok(Flow::Stay)
            }
            Event::StartArray => match self.cur_key.as_str() {
                "loss_changes" | "sum_hessian" | "base_weights" | "split_conditions" => {
                    Ok(Flow::Push(Handler::Doubles(Vec::new())))
                }
                "leaf_child_counts" | "left_children" | "right_children" | "parents"
                | "split_indices" => Ok(Flow::Push(Handler::Ints(Vec::new()))),
                "default_left" => Ok(Flow::Push(Handler::Bools(Vec::new()))),
                // Reserved for categorical splits, which this loader skips.
                "categories" | "split_type" | "categories_nodes" | "categories_segments"
                | "categories_sizes" => Ok(Flow::Push(Handler::Ignore)),
                _ => Err(LoadError::unexpected_key("tree", &self.cur_key)),
            },
            Event::StartObject => match self.cur_key.as_str() {
                "tree_param" => Ok(Flow::Push(Handler::TreeParam(TreeParamHandler::default()))),
                _ => Err(LoadError::unexpected_key("tree", &self.cur_key)),
            },
            Event::Uint(_) => {
                if self.cur_key == "id" {
                    Ok(Flow::Stay)
                } else {
                    Err(LoadError::unexpected_key("tree", &self.cur_key))
                }
            }
            Event::EndObject => Ok(Flow::Pop(Product::Tree(self.rebuild()?))),
            _ => Ok(Flow::Stay),
        }
    }

    fn on_child(&mut self, product: Product) {
        match (self.cur_key.as_str(), product) {
            ("loss_changes", Product::Doubles(v)) => self.loss_changes = v,
            ("sum_hessian", Product::Doubles(v)) => self.sum_hessian = v,
            ("base_weights", Product::Doubles(v)) => self.base_weights = v,
            ("split_conditions", Product::Doubles(v)) => self.split_conditions = v,
            ("leaf_child_counts", Product::Ints(v)) => self.leaf_child_counts = v,
            ("left_children", Product::Ints(v)) => self.left_children = v,
            ("right_children", Product::Ints(v)) => self.right_children = v,
            ("parents", Product::Ints(v)) => self.parents = v,
            ("split_indices", Product::Ints(v)) => self.split_indices = v,
            ("default_left", Product::Bools(v)) => self.default_left = v,
            ("tree_param", Product::NumNodes(n)) => self.num_nodes = n,
            (_, Product::Nothing) => {}
            _ => unreachable!("tree handler absorbed a product it never requested"),
        }
    }

    /// Rebuild the flat arrays into a [`Tree`] with contiguous BFS ids.
    ///
    /// XGBoost ids may contain gaps from node deletions; anything not
    /// reachable from node 0 is dropped here.
    fn rebuild(&mut self) -> Result<Tree, LoadError> {
        let num_nodes = self.num_nodes.max(0) as usize;
        let lens: [(&'static str, usize); 10] = [
            ("loss_changes", self.loss_changes.len()),
            ("sum_hessian", self.sum_hessian.len()),
            ("base_weights", self.base_weights.len()),
            ("leaf_child_counts", self.leaf_child_counts.len()),
            ("left_children", self.left_children.len()),
            ("right_children", self.right_children.len()),
            ("parents", self.parents.len()),
            ("split_indices", self.split_indices.len()),
            ("split_conditions", self.split_conditions.len()),
            ("default_left", self.default_left.len()),
        ];
        for (field, actual) in lens {
            if actual != num_nodes {
                return Err(LoadError::TreeArrayLength {
                    field,
                    expected: num_nodes,
                    actual,
                });
            }
        }
        if num_nodes == 0 {
            return Err(LoadError::EmptyTree);
        }

        let mut tree = MutableTree::with_capacity(num_nodes);
        tree.init_root();

        // (stored id, rebuilt id) pairs, breadth-first from the root.
        let mut queue: VecDeque<(usize, NodeId)> = VecDeque::new();
        queue.push_back((0, 0));
        while let Some((old_id, new_id)) = queue.pop_front() {
            if self.left_children[old_id] == -1 {
                tree.make_leaf(new_id, self.split_conditions[old_id] as f32);
                tree.set_cover(new_id, self.sum_hessian[old_id] as f32);
            } else {
                let left = check_child(self.left_children[old_id], num_nodes)?;
                let right = check_child(self.right_children[old_id], num_nodes)?;
                let (new_left, new_right) = tree.apply_numeric_split(
                    new_id,
                    self.split_indices[old_id] as u32,
                    self.split_conditions[old_id] as f32,
                    self.default_left[old_id],
                );
                tree.set_node_stats(
                    new_id,
                    self.loss_changes[old_id] as f32,
                    self.sum_hessian[old_id] as f32,
                );
                queue.push_back((left, new_left));
                queue.push_back((right, new_right));
            }
        }

        Ok(tree.freeze())
    }
}

fn check_child(child: i32, num_nodes: usize) -> Result<usize, LoadError> {
    if child < 0 || child as usize >= num_nodes {
        return Err(LoadError::InvalidChildIndex { child, num_nodes });
    }
    Ok(child as usize)
}

/// Accumulates the `trees` array, one [`RegTreeHandler`] per element.
#[derive(Default)]
#[derive(Debug)]
pub(super) struct TreeArrayHandler {
    trees: Vec<Tree>,
}

impl TreeArrayHandler {
    fn on_event(&mut self, event: &Event<'_>) -> Result<Flow, LoadError> {
        match event {
            Event::StartObject => Ok(Flow::Push(Handler::RegTree(Box::default()))),
            Event::EndArray => Ok(Flow::Pop(Product::Trees(mem::take(&mut self.trees)))),
            _ => Ok(Flow::Stay),
        }
    }

    fn on_child(&mut self, product: Product) {
        match product {
            Product::Tree(tree) => self.trees.push(tree),
            Product::Nothing => {}
            _ => unreachable!("tree array absorbed a product it never requested"),
        }
    }
}

// =============================================================================
// Booster-level handlers
// =============================================================================

/// Parses the gbtree `model` sub-object.
#[derive(Default)]
#[derive(Debug)]
pub(super) struct GbTreeModelHandler {
    cur_key: String,
}

impl GbTreeModelHandler {
    fn on_event(&mut self, event: &Event<'_>) -> Result<Flow, LoadError> {
        match *event {
            Event::Key(k) => {
                self.cur_key = k.to_owned();
                Ok(Flow::Stay)
            }
            Event::StartArray => match self.cur_key.as_str() {
                "trees" => Ok(Flow::Push(Handler::TreeArray(TreeArrayHandler::default()))),
                "tree_info" => Ok(Flow::Push(Handler::Ignore)),
                _ => Err(LoadError::unexpected_key("gbtree model", &self.cur_key)),
            },
            Event::StartObject => match self.cur_key.as_str() {
                "gbtree_model_param" => Ok(Flow::Push(Handler::Ignore)),
                _ => Err(LoadError::unexpected_key("gbtree model", &self.cur_key)),
            },
            Event::EndObject => Ok(Flow::Pop(Product::Nothing)),
            _ => Ok(Flow::Stay),
        }
    }

    fn on_child(&mut self, product: Product, model: &mut Model) {
        match product {
            Product::Trees(trees) => {
                for tree in trees {
                    model.forest.push_tree(tree);
                }
            }
            Product::Nothing => {}
            _ => unreachable!("gbtree model absorbed a product it never requested"),
        }
    }
}

/// Parses the `gradient_booster` object and rejects non-tree boosters.
#[derive(Default)]
#[derive(Debug)]
pub(super) struct GradientBoosterHandler {
    cur_key: String,
}

impl GradientBoosterHandler {
    fn on_event(&mut self, event: &Event<'_>) -> Result<Flow, LoadError> {
        match *event {
            Event::Key(k) => {
                self.cur_key = k.to_owned();
                Ok(Flow::Stay)
            }
            Event::Str(name) => {
                if self.cur_key != "name" {
                    return Err(LoadError::unexpected_key("gradient_booster", &self.cur_key));
                }
                if name != "gbtree" {
                    error!(booster = name, "only gbtree-type boosters are currently supported");
                    return Err(LoadError::UnsupportedBooster(name.to_owned()));
                }
                Ok(Flow::Stay)
            }
            Event::StartObject => match self.cur_key.as_str() {
                "model" => Ok(Flow::Push(Handler::GbTreeModel(GbTreeModelHandler::default()))),
                _ => {
                    error!(
                        key = self.cur_key.as_str(),
                        "unrecognized key in gradient_booster; is this a gbtree booster?"
                    );
                    Err(LoadError::unexpected_key("gradient_booster", &self.cur_key))
                }
            },
            Event::EndObject => Ok(Flow::Pop(Product::Nothing)),
            _ => Ok(Flow::Stay),
        }
    }
}

// =============================================================================
// Learner-level handlers
// =============================================================================

/// Extracts the objective name; the family parameter blocks are skipped.
#[derive(Default)]
#[derive(Debug)]
pub(super) struct ObjectiveHandler {
    cur_key: String,
    name: String,
}

impl ObjectiveHandler {
    fn on_event(&mut self, event: &Event<'_>) -> Result<Flow, LoadError> {
        match *event {
            Event::Key(k) => {
                self.cur_key = k.to_owned();
                Ok(Flow::Stay)
            }
            Event::Str(s) => {
                if self.cur_key != "name" {
                    return Err(LoadError::unexpected_key("objective", &self.cur_key));
                }
                self.name = s.to_owned();
                Ok(Flow::Stay)
            }
            // reg_loss_param, softmax_multiclass_param, aft_loss_param, ...
            Event::StartObject => {
                if self.cur_key.ends_with("_param") {
                    Ok(Flow::Push(Handler::Ignore))
                } else {
                    Err(LoadError::unexpected_key("objective", &self.cur_key))
                }
            }
            Event::EndObject => Ok(Flow::Pop(Product::Objective(mem::take(&mut self.name)))),
            _ => Ok(Flow::Stay),
        }
    }
}

/// Parses `learner_model_param`, whose values are all decimal strings.
#[derive(Default)]
#[derive(Debug)]
pub(super) struct LearnerParamHandler {
    cur_key: String,
}

impl LearnerParamHandler {
    fn on_event(&mut self, event: &Event<'_>, model: &mut Model) -> Result<Flow, LoadError> {
        match *event {
            Event::Key(k) => {
                self.cur_key = k.to_owned();
                Ok(Flow::Stay)
            }
            Event::Str(s) => match self.cur_key.as_str() {
                "base_score" => {
                    model.params.global_bias = lenient_f32("base_score", s);
                    Ok(Flow::Stay)
                }
                "num_class" => {
                    model.params.n_output_groups = lenient_i32("num_class", s).max(1) as u32;
                    Ok(Flow::Stay)
                }
                "num_feature" => {
                    model.params.n_features = lenient_i32("num_feature", s).max(0) as u32;
                    Ok(Flow::Stay)
                }
                _ => Err(LoadError::unexpected_key("learner_model_param", &self.cur_key)),
            },
            Event::EndObject => Ok(Flow::Pop(Product::Nothing)),
            _ => Ok(Flow::Stay),
        }
    }
}

fn lenient_f32(key: &'static str, value: &str) -> f32 {
    match value.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(key, value, "unparseable numeric learner parameter, treating as 0");
            0.0
        }
    }
}

fn lenient_i32(key: &'static str, value: &str) -> i32 {
    match value.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(key, value, "unparseable numeric learner parameter, treating as 0");
            0
        }
    }
}

/// Parses the `learner` object and wires the output transform on close.
#[derive(Default)]
#[derive(Debug)]
pub(super) struct LearnerHandler {
    cur_key: String,
    objective: String,
}

impl LearnerHandler {
    fn on_event(&mut self, event: &Event<'_>, model: &mut Model) -> Result<Flow, LoadError> {
        match *event {
            Event::Key(k) => {
                self.cur_key = k.to_owned();
                Ok(Flow::Stay)
            }
            Event::StartObject => match self.cur_key.as_str() {
                "learner_model_param" => {
                    Ok(Flow::Push(Handler::LearnerParam(LearnerParamHandler::default())))
                }
                "gradient_booster" => Ok(Flow::Push(Handler::GradientBooster(
                    GradientBoosterHandler::default(),
                ))),
                "objective" => Ok(Flow::Push(Handler::Objective(ObjectiveHandler::default()))),
                "attributes" => Ok(Flow::Push(Handler::Ignore)),
                _ => Err(LoadError::unexpected_key("learner", &self.cur_key)),
            },
            Event::StartArray => match self.cur_key.as_str() {
                "feature_names" | "feature_types" => Ok(Flow::Push(Handler::Ignore)),
                _ => Err(LoadError::unexpected_key("learner", &self.cur_key)),
            },
            Event::EndObject => {
                model.transform = OutputTransform::for_objective(&self.objective);
                Ok(Flow::Pop(Product::Nothing))
            }
            _ => Ok(Flow::Stay),
        }
    }

    fn on_child(&mut self, product: Product) {
        match product {
            Product::Objective(name) => self.objective = name,
            Product::Nothing => {}
            _ => unreachable!("learner absorbed a product it never requested"),
        }
    }
}

// =============================================================================
// Document-level handlers
// =============================================================================

/// Parses the top-level model object (`version` + `learner`).
#[derive(Default)]
#[derive(Debug)]
pub(super) struct XgbModelHandler {
    cur_key: String,
    members: usize,
    version: Vec<u32>,
}

impl XgbModelHandler {
    fn on_event(&mut self, event: &Event<'_>, model: &mut Model) -> Result<Flow, LoadError> {
        match *event {
            Event::Key(k) => {
                self.cur_key = k.to_owned();
                self.members += 1;
                Ok(Flow::Stay)
            }
            Event::StartArray => match self.cur_key.as_str() {
                "version" => Ok(Flow::Push(Handler::Uints(Vec::new()))),
                _ => Err(LoadError::unexpected_key("model", &self.cur_key)),
            },
            Event::StartObject => match self.cur_key.as_str() {
                "learner" => Ok(Flow::Push(Handler::Learner(LearnerHandler::default()))),
                _ => Err(LoadError::unexpected_key("model", &self.cur_key)),
            },
            Event::EndObject => {
                if self.members != 2 {
                    return Err(LoadError::TopLevelMembers(self.members));
                }
                model.params.random_forest = false;
                // Before XGBoost 1.0 the stored base_score is already a
                // margin; from 1.0 on it is the user-provided value in
                // output space.
                if self.version.first().copied().unwrap_or(0) >= 1 {
                    model.params.global_bias = model.transform.to_margin(model.params.global_bias);
                }
                Ok(Flow::Pop(Product::Nothing))
            }
            _ => Ok(Flow::Stay),
        }
    }

    fn on_child(&mut self, product: Product) {
        match product {
            Product::Uints(version) => self.version = version,
            Product::Nothing => {}
            _ => unreachable!("model absorbed a product it never requested"),
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Routes tokenizer events to the top of the handler stack and applies the
/// resulting stack operations. Owns the model being built; parsing one
/// document consumes one dispatcher.
pub(super) struct Dispatcher {
    stack: Vec<Handler>,
    model: Model,
}

impl Dispatcher {
    pub(super) fn new() -> Self {
        Self {
            stack: vec![Handler::Root],
            model: Model::default(),
        }
    }

    pub(super) fn handle(&mut self, event: &Event<'_>) -> Result<(), LoadError> {
        let top = self.stack.last_mut().expect("root handler never pops");
        match top.on_event(event, &mut self.model)? {
            Flow::Stay => {}
            Flow::Push(child) => self.stack.push(child),
            Flow::Pop(product) => {
                self.stack.pop();
                let parent = self.stack.last_mut().expect("root handler never pops");
                parent.on_child(product, &mut self.model);
            }
        }
        Ok(())
    }

    /// Surrender the populated model.
    pub(super) fn into_model(self) -> Model {
        self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(dispatcher: &mut Dispatcher, events: &[Event<'_>]) -> Result<(), LoadError> {
        for event in events {
            dispatcher.handle(event)?;
        }
        Ok(())
    }

    #[test]
    fn root_rejects_non_object_document() {
        let mut dispatcher = Dispatcher::new();
        let err = dispatcher.handle(&Event::StartArray).unwrap_err();
        assert!(matches!(err, LoadError::UnexpectedEvent { .. }));
    }

    #[test]
    fn tree_param_parses_decimal_string_node_count() {
        let mut h = TreeParamHandler::default();
        h.on_event(&Event::Key("num_nodes")).unwrap();
        h.on_event(&Event::Str("7")).unwrap();
        h.on_event(&Event::Key("num_deleted")).unwrap();
        h.on_event(&Event::Str("0")).unwrap();

        match h.on_event(&Event::EndObject).unwrap() {
            Flow::Pop(Product::NumNodes(n)) => assert_eq!(n, 7),
            _ => panic!("expected pop with node count"),
        }
    }

    #[test]
    fn tree_param_rejects_malformed_node_count() {
        let mut h = TreeParamHandler::default();
        h.on_event(&Event::Key("num_nodes")).unwrap();
        let err = h.on_event(&Event::Str("seven")).unwrap_err();
        assert!(matches!(err, LoadError::InvalidParam { key: "num_nodes", .. }));
    }

    #[test]
    fn tree_param_rejects_unknown_key() {
        let mut h = TreeParamHandler::default();
        h.on_event(&Event::Key("num_pruned")).unwrap();
        let err = h.on_event(&Event::Str("1")).unwrap_err();
        assert!(matches!(err, LoadError::UnexpectedKey { .. }));
    }

    #[test]
    fn bool_array_accepts_integer_flags() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.stack.push(Handler::Bools(Vec::new()));
        drive(
            &mut dispatcher,
            &[Event::Bool(true), Event::Uint(0), Event::Uint(1), Event::Int(0)],
        )
        .unwrap();

        match dispatcher.stack.pop() {
            Some(Handler::Bools(v)) => assert_eq!(v, vec![true, false, true, false]),
            _ => panic!("expected bool accumulator on top"),
        }
    }

    #[test]
    fn rebuild_renumbers_depth_first_ids_breadth_first() {
        // Stored layout is DFS (root, left subtree, right subtree):
        //   0: split f0        left -> 1, right -> 4
        //   1: split f1        left -> 2, right -> 3
        //   2, 3: leaves       4: leaf
        let mut h = RegTreeHandler::default();
        h.num_nodes = 5;
        h.left_children = vec![1, 2, -1, -1, -1];
        h.right_children = vec![4, 3, -1, -1, -1];
        h.split_indices = vec![0, 1, 0, 0, 0];
        h.split_conditions = vec![0.5, 0.25, 10.0, 20.0, 30.0];
        h.default_left = vec![true, false, false, false, false];
        h.loss_changes = vec![0.9, 0.8, 0.0, 0.0, 0.0];
        h.sum_hessian = vec![10.0, 6.0, 3.0, 3.0, 4.0];
        h.base_weights = vec![0.0; 5];
        h.leaf_child_counts = vec![0; 5];
        h.parents = vec![0; 5];

        let tree = h.rebuild().unwrap();
        tree.validate().unwrap();

        // BFS renumbering: 0 -> 0, 1 -> 1, 4 -> 2, 2 -> 3, 3 -> 4.
        assert_eq!(tree.n_nodes(), 5);
        assert_eq!((tree.left_child(0), tree.right_child(0)), (1, 2));
        assert_eq!((tree.left_child(1), tree.right_child(1)), (3, 4));
        assert_eq!(tree.leaf_value(2), 30.0);
        assert_eq!(tree.leaf_value(3), 10.0);
        assert_eq!(tree.leaf_value(4), 20.0);
        assert_eq!(tree.covers().unwrap(), &[10.0, 6.0, 4.0, 3.0, 3.0]);
        assert_eq!(tree.gains().unwrap(), &[0.9, 0.8, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn rebuild_drops_nodes_unreachable_from_root() {
        // Node 3 was deleted by the trainer: nothing points at it.
        let mut h = RegTreeHandler::default();
        h.num_nodes = 4;
        h.left_children = vec![1, -1, -1, -1];
        h.right_children = vec![2, -1, -1, -1];
        h.split_indices = vec![0; 4];
        h.split_conditions = vec![0.5, 1.0, 2.0, 99.0];
        h.default_left = vec![false; 4];
        h.loss_changes = vec![0.0; 4];
        h.sum_hessian = vec![0.0; 4];
        h.base_weights = vec![0.0; 4];
        h.leaf_child_counts = vec![0; 4];
        h.parents = vec![0; 4];

        let tree = h.rebuild().unwrap();
        assert_eq!(tree.n_nodes(), 3);
        tree.validate().unwrap();
    }

    #[test]
    fn rebuild_rejects_length_mismatch() {
        let mut h = RegTreeHandler::default();
        h.num_nodes = 2;
        h.left_children = vec![-1, -1];
        h.right_children = vec![-1, -1];
        h.split_indices = vec![0, 0];
        h.split_conditions = vec![0.5, 0.6];
        h.default_left = vec![false, false];
        h.loss_changes = vec![0.0, 0.0];
        h.sum_hessian = vec![0.0, 0.0, 0.0];
        h.base_weights = vec![0.0, 0.0];
        h.leaf_child_counts = vec![0, 0];
        h.parents = vec![0, 0];

        let err = h.rebuild().unwrap_err();
        assert!(matches!(
            err,
            LoadError::TreeArrayLength { field: "sum_hessian", expected: 2, actual: 3 }
        ));
    }

    #[test]
    fn rebuild_rejects_out_of_range_child() {
        let mut h = RegTreeHandler::default();
        h.num_nodes = 3;
        h.left_children = vec![1, -1, -1];
        h.right_children = vec![9, -1, -1];
        h.split_indices = vec![0; 3];
        h.split_conditions = vec![0.5, 1.0, 2.0];
        h.default_left = vec![false; 3];
        h.loss_changes = vec![0.0; 3];
        h.sum_hessian = vec![0.0; 3];
        h.base_weights = vec![0.0; 3];
        h.leaf_child_counts = vec![0; 3];
        h.parents = vec![0; 3];

        let err = h.rebuild().unwrap_err();
        assert!(matches!(err, LoadError::InvalidChildIndex { child: 9, num_nodes: 3 }));
    }

    #[test]
    fn gradient_booster_rejects_gblinear() {
        let mut h = GradientBoosterHandler::default();
        h.on_event(&Event::Key("name")).unwrap();
        let err = h.on_event(&Event::Str("gblinear")).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedBooster(name) if name == "gblinear"));
    }

    #[test]
    fn objective_skips_any_param_block() {
        let mut h = ObjectiveHandler::default();
        h.on_event(&Event::Key("name")).unwrap();
        h.on_event(&Event::Str("reg:tweedie")).unwrap();
        h.on_event(&Event::Key("tweedie_regression_param")).unwrap();
        assert!(matches!(
            h.on_event(&Event::StartObject).unwrap(),
            Flow::Push(Handler::Ignore)
        ));
        match h.on_event(&Event::EndObject).unwrap() {
            Flow::Pop(Product::Objective(name)) => assert_eq!(name, "reg:tweedie"),
            _ => panic!("expected objective name product"),
        }
    }

    #[test]
    fn learner_param_coerces_num_class_to_at_least_one() {
        let mut model = Model::default();
        let mut h = LearnerParamHandler::default();
        h.on_event(&Event::Key("num_class"), &mut model).unwrap();
        h.on_event(&Event::Str("0"), &mut model).unwrap();
        assert_eq!(model.params.n_output_groups, 1);

        h.on_event(&Event::Key("num_class"), &mut model).unwrap();
        h.on_event(&Event::Str("3"), &mut model).unwrap();
        assert_eq!(model.params.n_output_groups, 3);
    }

    #[test]
    fn learner_param_rejects_unknown_key() {
        let mut model = Model::default();
        let mut h = LearnerParamHandler::default();
        h.on_event(&Event::Key("num_target"), &mut model).unwrap();
        let err = h.on_event(&Event::Str("1"), &mut model).unwrap_err();
        assert!(matches!(err, LoadError::UnexpectedKey { .. }));
    }

    #[test]
    fn lenient_parse_falls_back_to_zero() {
        assert_eq!(lenient_f32("base_score", "not-a-number"), 0.0);
        assert_eq!(lenient_f32("base_score", "0.5"), 0.5);
        assert_eq!(lenient_i32("num_class", ""), 0);
    }

    #[test]
    fn top_level_requires_two_members() {
        let mut model = Model::default();
        let mut h = XgbModelHandler::default();
        h.on_event(&Event::Key("learner"), &mut model).unwrap();
        let err = h.on_event(&Event::EndObject, &mut model).unwrap_err();
        assert!(matches!(err, LoadError::TopLevelMembers(1)));
    }
}
