use thiserror::Error;

use crate::dsp::graph::NodeId;

/// Top-level engine error.
///
/// Only invalid input and non-recoverable resolution failures are meant to
/// reach the user. Deferred initialization and unavailable assets are logged
/// and degraded in place, so they never show up here from a setter.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid media source '{0}'")]
    InvalidSource(String),
    #[error("invalid value {value} for {name}")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("processing context is closed")]
    ContextClosed,
    #[error("playback rejected: {0}")]
    PlaybackRejected(String),
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),
}

/// Signal graph faults. These indicate a broken invariant, not bad input.
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("node {0:?} does not exist")]
    UnknownNode(NodeId),
    #[error("connecting {from:?} -> {to:?} would create a cycle")]
    Cycle { from: NodeId, to: NodeId },
    #[error("one-shot source {0:?} was already started")]
    AlreadyStarted(NodeId),
    #[error("no active producer is connected")]
    NoActiveProducer,
    #[error("{0} producers feed the mix bus")]
    MultipleProducers(usize),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no asset at '{0}'")]
    NotFound(String),
    #[error("request for '{url}' failed: {reason}")]
    Request { url: String, reason: String },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty input")]
    Empty,
    #[error("unsupported format")]
    Unsupported,
    #[error("wav: {0}")]
    Wav(#[from] hound::Error),
    #[error("mp3: {0}")]
    Mp3(String),
    #[error("decoded stream has no samples")]
    NoSamples,
}

/// Failure reported by the media resolution collaborator.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{0}")]
    Rejected(String),
    #[error("resolver unreachable: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
