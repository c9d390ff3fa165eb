/// Error type shared by every graph operation.
///
/// Variants fall into three classes the caller can branch on:
/// - recoverable: the history part is absent, an empty history is a valid fallback
/// - fatal: the container could not be read or decoded, the open must abort
/// - consistency: the graph or its persisted form contradicts itself
///
/// The remaining variants reject a single bad request and leave the graph untouched.
use chrono::{DateTime, Utc};

use crate::edit::EditKind;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("History part `{part}` not found in container")]
    MissingPart { part: String },

    #[error("{context}: {source:#}")]
    Fatal {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Inconsistent revision graph: {0}")]
    Consistency(String),

    #[error("A changeset with timestamp {0} already exists")]
    DuplicateTimestamp(DateTime<Utc>),

    #[error("Payload does not match edit kind {kind:?}")]
    PayloadMismatch { kind: EditKind },

    #[error("Edit kind {kind:?} requires a moved-to position only when it is a move")]
    MovedPositionMismatch { kind: EditKind },

    #[error("No changeset with id {0}")]
    UnknownChangeset(u64),

    #[error("No changeset with timestamp {0}")]
    UnknownTimestamp(DateTime<Utc>),

    #[error("Shape kind `{0}` is not registered in the shape catalog")]
    UnknownShape(String),

    #[error("No more {0} available")]
    Exhausted(&'static str),

    #[error("Commit cancelled after {committed} changeset(s)")]
    Cancelled { committed: usize },
}

impl GraphError {
    pub(crate) fn fatal(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Fatal {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Whether an empty history is an acceptable fallback.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MissingPart { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    pub fn is_consistency(&self) -> bool {
        matches!(self, Self::Consistency(_))
    }
}

pub type Result<T, E = GraphError> = std::result::Result<T, E>;
