//! Streaming loader for the XGBoost JSON model format.
//!
//! XGBoost saves a model as one large JSON document:
//!
//! ```text
//! { "version": [u32, u32, u32],
//!   "learner": {
//!     "learner_model_param": { "base_score": "...", "num_class": "...", ... },
//!     "gradient_booster": { "name": "gbtree", "model": { "trees": [...], ... } },
//!     "objective": { "name": "...", ... },
//!     "attributes": { ... } } }
//! ```
//!
//! Instead of deserializing the document into foreign structs, the loader
//! feeds tokenizer events through a stack of schema handlers and builds the
//! native [`Model`] directly, so the tree arrays are the only per-tree
//! state ever held in memory.
//!
//! Only gbtree boosters are supported; gblinear and dart models are
//! rejected. Categorical-split data is recognized and skipped.

mod event;
mod handlers;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use json_event_parser::{
    JsonEvent, JsonParseError, JsonSyntaxError, ReaderJsonParser, SliceJsonParser,
};
use tracing::{debug, error};

use crate::model::Model;

use event::Event;
use handlers::Dispatcher;

/// Errors produced while loading an XGBoost JSON model.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read model: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed JSON: {0}")]
    Json(#[from] JsonParseError),
    #[error("malformed JSON: {0}")]
    JsonSyntax(#[from] JsonSyntaxError),
    #[error("number {0:?} does not fit any supported representation")]
    InvalidNumber(String),
    #[error("unrecognized key {key:?} in {context}")]
    UnexpectedKey { context: &'static str, key: String },
    #[error("unexpected {event} event in {context}")]
    UnexpectedEvent {
        context: &'static str,
        event: &'static str,
    },
    #[error("invalid value {value:?} for {key}")]
    InvalidParam { key: &'static str, value: String },
    #[error("only gbtree-type boosters are currently supported, found {0:?}")]
    UnsupportedBooster(String),
    #[error("tree declares num_nodes={expected} but {field} has {actual} entries")]
    TreeArrayLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("tree has no nodes")]
    EmptyTree,
    #[error("tree child index {child} is out of range for {num_nodes} nodes")]
    InvalidChildIndex { child: i32, num_nodes: usize },
    #[error("expected exactly two top-level members (version, learner), found {0}")]
    TopLevelMembers(usize),
}

impl LoadError {
    fn unexpected_key(context: &'static str, key: &str) -> Self {
        LoadError::UnexpectedKey {
            context,
            key: key.to_owned(),
        }
    }
}

/// Load an XGBoost JSON model from a file on disk.
pub fn from_file(path: impl AsRef<Path>) -> Result<Model, LoadError> {
    let file = File::open(path.as_ref()).inspect_err(|err| {
        error!(path = %path.as_ref().display(), %err, "failed to open XGBoost model file");
    })?;
    from_reader(BufReader::new(file))
}

/// Load an XGBoost JSON model from any byte stream.
pub fn from_reader<R: Read>(reader: R) -> Result<Model, LoadError> {
    parse_tokens(ReaderJsonParser::new(reader))
}

/// Load an XGBoost JSON model from an in-memory buffer.
pub fn from_slice(bytes: &[u8]) -> Result<Model, LoadError> {
    parse_tokens(SliceJsonParser::new(bytes))
}

/// A pull source of JSON tokens; unifies the reader- and slice-backed
/// tokenizers behind the loader loop.
trait TokenSource {
    fn next_token(&mut self) -> Result<JsonEvent<'_>, LoadError>;
}

impl<R: Read> TokenSource for ReaderJsonParser<R> {
    fn next_token(&mut self) -> Result<JsonEvent<'_>, LoadError> {
        self.parse_next().map_err(LoadError::from)
    }
}

impl TokenSource for SliceJsonParser<'_> {
    fn next_token(&mut self) -> Result<JsonEvent<'_>, LoadError> {
        self.parse_next().map_err(LoadError::from)
    }
}

fn parse_tokens<T: TokenSource>(mut tokens: T) -> Result<Model, LoadError> {
    let mut dispatcher = Dispatcher::new();
    loop {
        let token = tokens.next_token().inspect_err(log_failure)?;
        let Some(event) = Event::from_token(&token).inspect_err(log_failure)? else {
            break;
        };
        dispatcher.handle(&event).inspect_err(log_failure)?;
    }

    let model = dispatcher.into_model();
    debug!(
        trees = model.forest.n_trees(),
        features = model.params.n_features,
        groups = model.params.n_output_groups,
        "loaded XGBoost model"
    );
    Ok(model)
}

fn log_failure(err: &LoadError) {
    error!(%err, "could not parse document as an XGBoost model");
}
