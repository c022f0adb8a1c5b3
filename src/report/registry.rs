use std::collections::{BTreeMap, HashMap};
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::weight::{LineCounts, Weight};
use crate::trace::{Frame, SubKind};

/// Hash map used for the per-sub graph tables, which are hit for every frame of every trace.
pub type FastMap<K, V> = HashMap<K, V, ahash::RandomState>;

/// Identity of a sub within a report.
///
/// Subs whose identity depends on where they were compiled (program bodies,
/// eval bodies, anonymous subs) carry the defining file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubId {
    /// Fully-qualified name.
    pub name: String,
    /// Defining file, for file-scoped subs.
    pub file: Option<String>,
}

impl SubId {
    /// A named sub.
    pub fn named(name: &str) -> Self {
        SubId {
            name: name.to_string(),
            file: None,
        }
    }

    /// A sub whose identity is tied to `file`.
    pub fn scoped(name: &str, file: &str) -> Self {
        SubId {
            name: name.to_string(),
            file: Some(file.to_string()),
        }
    }

    pub(crate) fn for_frame(frame: &Frame, file: &str) -> Self {
        if frame.is_file_scoped() {
            SubId::scoped(&frame.fq_sub_name, file)
        } else {
            SubId::named(&frame.fq_sub_name)
        }
    }
}

impl fmt::Display for SubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.file {
            Some(ref file) => write!(f, "{}:{}", self.name, file),
            None => f.write_str(&self.name),
        }
    }
}

/// The call instruction a sub was called from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallSiteId {
    /// File of the calling frame.
    pub file: String,
    /// Line of the calling frame.
    pub line: i64,
}

impl CallSiteId {
    /// The call site at `file:line`.
    pub fn new(file: &str, line: i64) -> Self {
        CallSiteId {
            file: file.to_string(),
            line,
        }
    }
}

impl fmt::Display for CallSiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut line = itoa::Buffer::new();
        write!(f, "{}:{}", self.file, line.format(self.line))
    }
}

/// Cost of one caller reaching a sub through one call site.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    /// The calling sub.
    pub caller: SubId,
    /// File of the call instruction.
    pub file: String,
    /// Line of the call instruction.
    pub line: i64,
    /// Weight attributed through this call site.
    pub weight: Weight,
}

/// A `(call line, callee)` pair in a caller's callee table.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CalleeKey {
    /// Line of the call in the caller.
    pub line: i64,
    /// The called sub.
    pub callee: SubId,
}

/// Aggregated cost of one sub.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubRecord {
    /// Registry key.
    pub id: SubId,
    /// Unqualified name, for display.
    pub name: String,
    /// Package the sub lives in.
    pub package: String,
    /// Key of the owning file record.
    pub file: String,
    /// First line of the definition.
    pub start_line: i64,
    /// Regular sub or special block.
    pub kind: SubKind,
    /// Main program body.
    pub is_main: bool,
    /// Eval body.
    pub is_eval: bool,
    /// Total inclusive/exclusive weight.
    pub weight: Weight,
    /// Where this sub was called from.
    #[serde(with = "entries")]
    pub call_sites: FastMap<CallSiteId, CallSite>,
    /// Inclusive weight of every sub this sub called, by call line.
    #[serde(with = "entries")]
    pub callees: FastMap<CalleeKey, u64>,
}

impl SubRecord {
    pub(crate) fn from_frame(id: SubId, frame: &Frame, file: &str) -> Self {
        SubRecord {
            id,
            name: frame.sub_name.clone(),
            package: frame.package.clone(),
            file: file.to_string(),
            start_line: frame.first_line,
            kind: frame.kind,
            is_main: frame.is_main,
            is_eval: frame.is_eval,
            weight: Weight::default(),
            call_sites: FastMap::default(),
            callees: FastMap::default(),
        }
    }

    /// A copy of the descriptive fields with every counter and table empty.
    pub(crate) fn empty_copy(&self) -> Self {
        SubRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            package: self.package.clone(),
            file: self.file.clone(),
            start_line: self.start_line,
            kind: self.kind,
            is_main: self.is_main,
            is_eval: self.is_eval,
            weight: Weight::default(),
            call_sites: FastMap::default(),
            callees: FastMap::default(),
        }
    }

    /// Callees invoked from `line`, with their inclusive weight.
    pub fn callees_at(&self, line: i64) -> impl Iterator<Item = (&SubId, u64)> + '_ {
        self.callees
            .iter()
            .filter(move |(key, _)| key.line == line)
            .map(|(key, &weight)| (&key.callee, weight))
    }
}

/// One entry of a file's per-line callee list, built at finalization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalleeEdge {
    /// The sub making the call.
    pub caller: SubId,
    /// The called sub.
    pub callee: SubId,
    /// Inclusive weight attributed through the call.
    pub inclusive: u64,
}

/// Aggregated cost of one source file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Registry key.
    pub name: String,
    /// Last path component of `name`.
    pub basename: String,
    /// File name of the rendered report for this file.
    pub report: String,
    /// Inclusive weight per line.
    pub lines_inclusive: LineCounts,
    /// Exclusive weight per line.
    pub lines_exclusive: LineCounts,
    /// Sum of the exclusive weight of the subs defined here; set by finalization.
    pub exclusive: u64,
    /// Subs defined in the file, by start line; set by finalization.
    pub subs: BTreeMap<i64, Vec<SubId>>,
    /// Calls made from the file, by line; set by finalization.
    pub callees: BTreeMap<i64, Vec<CalleeEdge>>,
}

impl FileRecord {
    /// An empty record for `name`.
    pub fn new(name: &str) -> Self {
        let basename = name.rsplit('/').next().unwrap_or(name);
        FileRecord {
            name: name.to_string(),
            basename: basename.to_string(),
            report: report_name(name),
            lines_inclusive: LineCounts::default(),
            lines_exclusive: LineCounts::default(),
            exclusive: 0,
            subs: BTreeMap::new(),
            callees: BTreeMap::new(),
        }
    }

    /// A copy of the naming fields with every counter and index empty.
    pub(crate) fn empty_copy(&self) -> Self {
        FileRecord {
            name: self.name.clone(),
            basename: self.basename.clone(),
            report: self.report.clone(),
            ..FileRecord::new(&self.name)
        }
    }
}

// Reports are one HTML page per file, so the name must be a safe file name.
fn report_name(name: &str) -> String {
    let mut report: String = name
        .trim_start_matches('/')
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '-',
        })
        .collect();
    report.push_str(".html");
    report
}

/// Every sub seen by a report.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubRegistry {
    #[serde(with = "entries")]
    subs: IndexMap<SubId, SubRecord>,
}

impl SubRegistry {
    /// The record for `id`, creating it with `make` on first reference.
    pub fn get_or_create<F>(&mut self, id: &SubId, make: F) -> &mut SubRecord
    where
        F: FnOnce(&SubId) -> SubRecord,
    {
        if !self.subs.contains_key(id) {
            let record = make(id);
            self.subs.insert(id.clone(), record);
        }
        &mut self.subs[id]
    }

    /// The record for `id`.
    pub fn get(&self, id: &SubId) -> Option<&SubRecord> {
        self.subs.get(id)
    }

    /// All records, in order of first reference.
    pub fn iter(&self) -> impl Iterator<Item = &SubRecord> + '_ {
        self.subs.values()
    }

    pub(crate) fn drain(&mut self) -> Vec<SubRecord> {
        self.subs.drain(..).map(|(_, sub)| sub).collect()
    }

    /// Number of subs.
    pub fn len(&self) -> usize {
        self.subs.len()
    }

    /// Whether no sub has been seen.
    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }
}

/// Every file seen by a report.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRegistry {
    files: IndexMap<String, FileRecord>,
}

impl FileRegistry {
    /// The record for `key`, creating it with `make` on first reference.
    pub fn get_or_create<F>(&mut self, key: &str, make: F) -> &mut FileRecord
    where
        F: FnOnce(&str) -> FileRecord,
    {
        if !self.files.contains_key(key) {
            let record = make(key);
            self.files.insert(key.to_string(), record);
        }
        &mut self.files[key]
    }

    /// The record for `key`.
    pub fn get(&self, key: &str) -> Option<&FileRecord> {
        self.files.get(key)
    }

    /// All file keys, in order of first reference.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.files.keys().map(String::as_str)
    }

    /// All records, in order of first reference.
    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> + '_ {
        self.files.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut FileRecord> + '_ {
        self.files.values_mut()
    }

    pub(crate) fn drain(&mut self) -> Vec<FileRecord> {
        self.files.drain(..).map(|(_, file)| file).collect()
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no file has been seen.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// (De)serializes maps with structured keys as a sequence of `(key, value)` pairs,
/// since JSON objects only allow string keys.
pub(crate) mod entries {
    use std::collections::HashMap;
    use std::hash::Hash;

    use indexmap::IndexMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(crate) trait Entries {
        type Key;
        type Value;
    }

    impl<K, V, S> Entries for HashMap<K, V, S> {
        type Key = K;
        type Value = V;
    }

    impl<K, V, S> Entries for IndexMap<K, V, S> {
        type Key = K;
        type Value = V;
    }

    pub(crate) fn serialize<'a, M, S>(map: &'a M, serializer: S) -> Result<S::Ok, S::Error>
    where
        &'a M: IntoIterator,
        <&'a M as IntoIterator>::Item: Serialize,
        S: Serializer,
    {
        serializer.collect_seq(map)
    }

    pub(crate) fn deserialize<'de, M, D>(deserializer: D) -> Result<M, D::Error>
    where
        M: Entries + FromIterator<(M::Key, M::Value)>,
        M::Key: Deserialize<'de> + Eq + Hash,
        M::Value: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let pairs = Vec::<(M::Key, M::Value)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}
