use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::Diagnostic;

/// Text shown in place of eval source that could not be found.
pub const EVAL_SOURCE_PLACEHOLDER: &str = "<eval source not available>";

/// Resolves eval file names to the content hash of the evaluated code.
pub trait EvalSourceStore {
    /// Content hash of the code `process_id` compiled as `file`, if it was an eval.
    fn hash_for(&self, process_id: &str, file: &str) -> Option<String>;

    /// The source lines of the eval with content hash `hash`.
    fn source_text_for(&self, hash: &str) -> Option<Vec<String>>;
}

/// A point where a physical file's line numbering switches to another logical file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    /// First physical line of the range.
    pub physical_line: i64,
    /// The logical file; `None` means the physical file itself.
    pub logical_file: Option<String>,
    /// Logical line corresponding to `physical_line`.
    pub logical_line: i64,
}

impl Breakpoint {
    /// Physical lines from `physical_line` on map to `logical_file` starting at `logical_line`.
    pub fn new(physical_line: i64, logical_file: Option<&str>, logical_line: i64) -> Self {
        Breakpoint {
            physical_line,
            logical_file: logical_file.map(str::to_string),
            logical_line,
        }
    }
}

/// Knows how logical source files (`#line` directives, evals) map onto physical files.
pub trait LineMappingStore {
    /// The breakpoints of the physical file `file`, ordered by physical line.
    fn breakpoints_for(&self, file: &str) -> Option<Vec<Breakpoint>>;

    /// The physical file the logical file `file` was mapped from.
    fn reverse_mapping_for(&self, file: &str) -> Option<String>;
}

/// The lines of the eval with content hash `hash`.
///
/// Missing source does not fail the report: a single placeholder line is
/// returned together with a [`Diagnostic::MissingSource`].
pub fn source_lines<S>(store: &S, hash: &str) -> (Vec<String>, Option<Diagnostic>)
where
    S: EvalSourceStore + ?Sized,
{
    match store.source_text_for(hash) {
        Some(lines) => (lines, None),
        None => {
            warn!("no source for eval:{}", hash);
            (
                vec![EVAL_SOURCE_PLACEHOLDER.to_string()],
                Some(Diagnostic::MissingSource {
                    hash: hash.to_string(),
                }),
            )
        }
    }
}

/// An in-memory source store, for callers that already hold eval text and line mappings.
#[derive(Clone, Debug, Default)]
pub struct MemorySourceStore {
    evals: HashMap<(String, String), String>,
    texts: HashMap<String, Vec<String>>,
    breakpoints: HashMap<String, Vec<Breakpoint>>,
    reverse: HashMap<String, String>,
}

impl MemorySourceStore {
    /// Register the code `process_id` compiled as `file`, returning its content hash.
    ///
    /// Identical code registered under any name or process gets the same hash.
    pub fn add_eval(&mut self, process_id: &str, file: &str, source: &str) -> String {
        let hash = hex::encode(Sha1::digest(source.as_bytes()));
        self.evals
            .insert((process_id.to_string(), file.to_string()), hash.clone());
        self.texts
            .entry(hash.clone())
            .or_insert_with(|| source.lines().map(str::to_string).collect());
        hash
    }

    /// Register the breakpoints of the physical file `physical`.
    pub fn add_mapping(&mut self, physical: &str, mut breakpoints: Vec<Breakpoint>) {
        breakpoints.sort_by_key(|bp| bp.physical_line);
        for logical in breakpoints.iter().filter_map(|bp| bp.logical_file.as_ref()) {
            if logical != physical {
                self.reverse
                    .entry(logical.clone())
                    .or_insert_with(|| physical.to_string());
            }
        }
        self.breakpoints.insert(physical.to_string(), breakpoints);
    }
}

impl EvalSourceStore for MemorySourceStore {
    fn hash_for(&self, process_id: &str, file: &str) -> Option<String> {
        self.evals
            .get(&(process_id.to_string(), file.to_string()))
            .cloned()
    }

    fn source_text_for(&self, hash: &str) -> Option<Vec<String>> {
        self.texts.get(hash).cloned()
    }
}

impl LineMappingStore for MemorySourceStore {
    fn breakpoints_for(&self, file: &str) -> Option<Vec<Breakpoint>> {
        self.breakpoints.get(file).cloned()
    }

    fn reverse_mapping_for(&self, file: &str) -> Option<String> {
        self.reverse.get(file).cloned()
    }
}
