//! Error Module: the engine's error taxonomy.
//!
//! Only tree misuse, configuration problems and fatal terminal failures
//! surface as `EngineError`. Layout, paint and decode problems are contained
//! inside the tick that produced them and never reach the caller.

use std::io;

use thiserror::Error;

use crate::tree::NodeId;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid node handle: {0}")]
    InvalidNode(NodeId),

    #[error("node {0} does not accept children")]
    NotAContainer(NodeId),

    #[error("appending {child} under {parent} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },

    #[error("invalid key pattern `{0}`")]
    KeyPattern(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("render loop is {0}")]
    InvalidState(&'static str),

    #[error("stdin/stdout is not a terminal")]
    TtyUnavailable,

    #[error("terminal I/O failed: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    /// Fatal errors must trigger an orderly shutdown before propagating.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io(_) | Self::TtyUnavailable)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
