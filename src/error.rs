use std::fmt;
use std::io;

use thiserror::Error;

use crate::trace::RunIdentity;

/// Fatal conditions raised while building, merging or emitting a report.
#[derive(Error, Debug)]
pub enum Error {
    /// Two inputs disagree on tick duration, interpreter version or process.
    #[error("inconsistent profile data: report has {expected}, input has {found}")]
    Inconsistency {
        /// The identity the report was fixed to.
        expected: RunIdentity,
        /// The identity of the rejected input.
        found: RunIdentity,
    },

    /// `finalize` was called on a report that had already been finalized.
    #[error("report has already been finalized")]
    DoubleFinalize,

    /// A finalized report was handed to an operation that mutates it.
    #[error("report is finalized and can no longer be modified")]
    Finalized,

    /// An operation that reads the per-file indices ran before `finalize`.
    #[error("report must be finalized first")]
    NotFinalized,

    /// A frame carries no usable file or sub identity.
    #[error("unresolvable frame at depth {depth}: {reason}")]
    UnresolvableFrame {
        /// Position of the frame in its trace, 0 being the sampled frame.
        depth: usize,
        /// What is missing.
        reason: &'static str,
    },

    /// There is no record to build a file report from.
    #[error("no profile data for file '{0}'")]
    UnknownFile(String),

    /// The report never saw a trace, so there is nothing to persist it under.
    #[error("report has no tick duration, interpreter version or process id")]
    MissingIdentity,

    /// Reading or writing persisted data failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Persisted data could not be (de)serialized.
    #[error("malformed persisted report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Which kind of entry a [`Diagnostic::MappingGap`] is about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GapEntry {
    /// A sub defined at the line.
    Sub(String),
    /// A call made from the line.
    CallSite,
}

/// Non-fatal conditions reported alongside a successful result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    /// Data for a logical line that no breakpoint range covers.
    MappingGap {
        /// The logical file.
        file: String,
        /// The logical line.
        line: i64,
        /// What lives at that line.
        entry: GapEntry,
    },

    /// The text of an eval could not be found.
    MissingSource {
        /// Content hash of the eval.
        hash: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MappingGap {
                file,
                line,
                entry: GapEntry::Sub(name),
            } => write!(f, "no mapping for sub {} at {}:{}", name, file, line),
            Diagnostic::MappingGap {
                file,
                line,
                entry: GapEntry::CallSite,
            } => write!(f, "no mapping for call site at {}:{}", file, line),
            Diagnostic::MissingSource { hash } => {
                write!(f, "source for eval:{} is not available", hash)
            }
        }
    }
}
