mod consistency;
mod eval;
mod ingest;
mod merge;
mod project;
mod reduce;
mod registry;
mod weight;

pub use consistency::ConsistencyChecker;
pub use eval::{Substitution, EVAL_PREFIX};
pub use project::{physical_files, LineRange, Projection};
pub use reduce::{merge_all, DEFAULT_NTHREADS};
pub use registry::{
    CallSite, CallSiteId, CalleeEdge, CalleeKey, FastMap, FileRecord, FileRegistry, SubId,
    SubRecord, SubRegistry,
};
pub use weight::{LineCounts, Weight, MAX_LINE};

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize, Serializer};

use crate::trace::{GenealogyInfo, ParentRef, RunIdentity};
use crate::{Error, Result};

static DEFAULT_SLOW_OPS: Lazy<HashSet<String>> = Lazy::new(|| {
    [
        "match", "subst", "substcont", "qr", "regcomp", "sort", "readline", "print", "say",
        "prtf", "sysread", "syswrite", "open", "close", "require", "sselect",
    ]
    .iter()
    .map(|op| op.to_string())
    .collect()
});

/// Configure how traces are aggregated.
#[derive(Clone, Debug)]
pub struct Options {
    /// Opcodes that get a synthetic `CORE::<op>` leaf frame of their own when sampled,
    /// so their cost shows up separately from the enclosing sub.
    ///
    /// Defaults to regex, sorting and I/O opcodes.
    pub slow_ops: HashSet<String>,

    /// Keep a folded stack map for flame graphs. Default is off.
    pub flamegraph: bool,

    /// Accept traces and reports from different processes. Default is off.
    pub mixed_process: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            slow_ops: DEFAULT_SLOW_OPS.clone(),
            flamegraph: false,
            mixed_process: false,
        }
    }
}

fn default_slow_ops() -> HashSet<String> {
    DEFAULT_SLOW_OPS.clone()
}

// sorted so that saving the same report twice gives the same bytes
fn serialize_slow_ops<S>(
    ops: &HashSet<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut ops: Vec<_> = ops.iter().collect();
    ops.sort();
    ops.serialize(serializer)
}

/// A call stack signature, outermost sub first.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlameKey(pub Vec<SubId>);

impl fmt::Display for FlameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, sub) in self.0.iter().enumerate() {
            if i != 0 {
                f.write_str(";")?;
            }
            // the folded format reserves ';' as the frame separator
            f.write_str(&sub.to_string().replace(';', ":"))?;
        }
        Ok(())
    }
}

/// Sample weight by call stack.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlameMap(#[serde(with = "registry::entries")] FastMap<FlameKey, u64>);

impl FlameMap {
    /// Add `weight` to `stack`.
    pub fn add(&mut self, stack: FlameKey, weight: u64) {
        *self.0.entry(stack).or_insert(0) += weight;
    }

    /// The weight of `stack`.
    pub fn get(&self, stack: &FlameKey) -> u64 {
        self.0.get(stack).copied().unwrap_or(0)
    }

    /// All stacks and their weights, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&FlameKey, u64)> + '_ {
        self.0.iter().map(|(k, &v)| (k, v))
    }

    /// Number of distinct stacks.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no stack has been recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn absorb(&mut self, other: &FlameMap) {
        for (stack, weight) in other.iter() {
            self.add(stack.clone(), weight);
        }
    }

    pub(crate) fn drain(&mut self) -> Vec<(FlameKey, u64)> {
        self.0.drain().collect()
    }
}

/// Which profiled process spawned which: process id → ordinal → parent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Genealogy(BTreeMap<String, BTreeMap<u32, Option<ParentRef>>>);

impl Genealogy {
    /// Record a genealogy fact. Facts are immutable, so an already known
    /// `(process, ordinal)` keeps its first parent.
    pub fn record(&mut self, info: &GenealogyInfo) {
        self.0
            .entry(info.process_id.clone())
            .or_default()
            .entry(info.ordinal)
            .or_insert_with(|| info.parent.clone());
    }

    /// The parent of `(process_id, ordinal)`; `Some(None)` for a known root.
    pub fn parent(&self, process_id: &str, ordinal: u32) -> Option<Option<&ParentRef>> {
        self.0
            .get(process_id)
            .and_then(|ordinals| ordinals.get(&ordinal))
            .map(Option::as_ref)
    }

    /// All known processes.
    pub fn processes(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.keys().map(String::as_str)
    }

    pub(crate) fn absorb(&mut self, other: &Genealogy) {
        for (process_id, ordinals) in &other.0 {
            let target = self.0.entry(process_id.clone()).or_default();
            for (&ordinal, parent) in ordinals {
                target.entry(ordinal).or_insert_with(|| parent.clone());
            }
        }
    }
}

/// The aggregate built from one or more trace streams.
///
/// A report is owned by whichever stage is working on it: ingestion,
/// eval canonicalization and merging all take `&mut Report`. Once
/// [`Report::finalize`] has run the report is read-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Report {
    total: u64,
    subs: SubRegistry,
    files: FileRegistry,
    flames: Option<FlameMap>,
    genealogy: Genealogy,
    consistency: ConsistencyChecker,
    finalized: bool,
    #[serde(default = "default_slow_ops", serialize_with = "serialize_slow_ops")]
    slow_ops: HashSet<String>,
}

impl From<Options> for Report {
    fn from(opt: Options) -> Self {
        Report {
            total: 0,
            subs: SubRegistry::default(),
            files: FileRegistry::default(),
            flames: if opt.flamegraph {
                Some(FlameMap::default())
            } else {
                None
            },
            genealogy: Genealogy::default(),
            consistency: ConsistencyChecker::new(opt.mixed_process),
            finalized: false,
            slow_ops: opt.slow_ops,
        }
    }
}

impl Default for Report {
    fn default() -> Self {
        Options::default().into()
    }
}

impl Report {
    /// An empty report.
    pub fn new(opt: Options) -> Self {
        Report::from(opt)
    }

    /// Total sample weight of every ingested trace.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// The sub registry.
    pub fn subs(&self) -> &SubRegistry {
        &self.subs
    }

    /// The file registry.
    pub fn files(&self) -> &FileRegistry {
        &self.files
    }

    /// Folded stacks, if flame graph tracking is enabled.
    pub fn flames(&self) -> Option<&FlameMap> {
        self.flames.as_ref()
    }

    /// Process tree of the profiled run.
    pub fn genealogy(&self) -> &Genealogy {
        &self.genealogy
    }

    /// Tick duration, interpreter version and process fixed by the first input.
    pub fn identity(&self) -> Option<&RunIdentity> {
        self.consistency.identity()
    }

    /// Whether [`Report::finalize`] has run.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Validate an input's identity against the report, fixing it on first use.
    ///
    /// Must succeed before traces from that input are ingested.
    pub fn check_consistency(&mut self, identity: &RunIdentity) -> Result<()> {
        self.consistency.check(identity)
    }

    /// Accept traces and reports from other processes, as if the report had been
    /// created with [`Options::mixed_process`].
    pub fn allow_mixed_process(&mut self) {
        self.consistency.allow_mixed_process();
    }

    pub(crate) fn ensure_mutable(&self) -> Result<()> {
        if self.finalized {
            Err(Error::Finalized)
        } else {
            Ok(())
        }
    }

    /// Distribute per-sub exclusive weight into the owning files and build the
    /// per-file sub and callee indices.
    ///
    /// May only run once per report.
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Err(Error::DoubleFinalize);
        }
        self.finalized = true;

        let files = &mut self.files;
        for sub in self.subs.iter() {
            let file = files.get_or_create(&sub.file, FileRecord::new);
            file.exclusive += sub.weight.exclusive;
            if !sub.is_main && !sub.is_eval {
                file.subs
                    .entry(sub.start_line)
                    .or_default()
                    .push(sub.id.clone());
            }
            for (key, &inclusive) in &sub.callees {
                file.callees.entry(key.line).or_default().push(CalleeEdge {
                    caller: sub.id.clone(),
                    callee: key.callee.clone(),
                    inclusive,
                });
            }
        }

        for file in files.iter_mut() {
            for subs in file.subs.values_mut() {
                subs.sort();
            }
            for edges in file.callees.values_mut() {
                edges.sort_by(|a, b| (&a.caller, &a.callee).cmp(&(&b.caller, &b.callee)));
            }
        }

        debug!(
            "finalized report: {} subs in {} files, {} samples",
            self.subs.len(),
            self.files.len(),
            self.total
        );
        Ok(())
    }

    /// The `n` subs with the highest exclusive weight.
    pub fn top_subs(&self, n: usize) -> Vec<&SubRecord> {
        let mut subs: Vec<_> = self.subs.iter().collect();
        subs.sort_by(|a, b| {
            b.weight
                .exclusive
                .cmp(&a.weight.exclusive)
                .then_with(|| a.id.cmp(&b.id))
        });
        subs.truncate(n);
        subs
    }

    /// Write the folded stacks as `a;b;c <weight>` lines, sorted.
    ///
    /// Writes nothing if flame graph tracking is disabled.
    pub fn write_folded<W>(&self, mut writer: W) -> io::Result<()>
    where
        W: io::Write,
    {
        let flames = match self.flames {
            Some(ref flames) => flames,
            None => return Ok(()),
        };
        let mut contents: Vec<_> = flames
            .iter()
            .map(|(stack, weight)| (stack.to_string(), weight))
            .collect();
        contents.sort();
        for (stack, weight) in contents {
            writeln!(writer, "{} {}", stack, weight)?;
        }
        Ok(())
    }
}

/// Reports compare equal when their aggregated data does, regardless of which
/// input fixed the identity or what options they were built with.
impl PartialEq for Report {
    fn eq(&self, other: &Self) -> bool {
        self.total == other.total
            && self.subs == other.subs
            && self.files == other.files
            && self.flames == other.flames
            && self.genealogy == other.genealogy
            && self.finalized == other.finalized
    }
}

impl Eq for Report {}
