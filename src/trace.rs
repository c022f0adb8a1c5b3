use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Line number reported for subs implemented outside the interpreter (XS).
pub const XSUB_LINE: i64 = -1;

/// Line number of the synthetic frame standing in for a slow core opcode.
pub const CORE_OP_LINE: i64 = -2;

/// Package of synthetic opcode frames.
pub const CORE_PACKAGE: &str = "CORE";

const ANON_SUFFIX: &str = "__ANON__";

/// Whether a frame belongs to a regular sub or to a special block (`BEGIN`, `END`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SubKind {
    /// A regular named or anonymous sub.
    #[default]
    Sub,
    /// A special compile- or run-phase block.
    Block,
}

/// A single stack frame as produced by the trace decoder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Source file the frame was executing in.
    pub file: String,
    /// Line being executed, or [`XSUB_LINE`] / [`CORE_OP_LINE`].
    pub line: i64,
    /// Package the sub belongs to.
    pub package: String,
    /// Fully-qualified sub name, e.g. `Foo::Bar::baz`.
    pub fq_sub_name: String,
    /// Unqualified sub name, e.g. `baz`.
    pub sub_name: String,
    /// First line of the sub's definition.
    pub first_line: i64,
    /// Regular sub or special block.
    pub kind: SubKind,
    /// The frame is the main program body.
    pub is_main: bool,
    /// The frame is the body of a string eval.
    pub is_eval: bool,
}

impl Frame {
    /// A regular sub frame executing `line` of `file`.
    pub fn sub(file: &str, line: i64, fq_sub_name: &str) -> Self {
        let (package, sub_name) = match fq_sub_name.rfind("::") {
            Some(idx) => (&fq_sub_name[..idx], &fq_sub_name[idx + 2..]),
            None => ("main", fq_sub_name),
        };
        Frame {
            file: file.to_string(),
            line,
            package: package.to_string(),
            fq_sub_name: fq_sub_name.to_string(),
            sub_name: sub_name.to_string(),
            first_line: line,
            kind: SubKind::Sub,
            is_main: false,
            is_eval: false,
        }
    }

    /// The main program body of `file`.
    pub fn main(file: &str, line: i64) -> Self {
        Frame {
            first_line: 1,
            is_main: true,
            ..Frame::sub(file, line, "main::MAIN")
        }
    }

    /// The body of a string eval compiled as `file`.
    pub fn eval(file: &str, line: i64) -> Self {
        Frame {
            first_line: 1,
            is_eval: true,
            ..Frame::sub(file, line, "main::__EVAL__")
        }
    }

    /// A sub implemented in XS.
    pub fn xsub(fq_sub_name: &str) -> Self {
        Frame::sub("", XSUB_LINE, fq_sub_name)
    }

    /// Synthetic leaf frame for a sampled core opcode.
    pub fn core_op(op: &str) -> Self {
        Frame {
            file: String::new(),
            line: CORE_OP_LINE,
            package: CORE_PACKAGE.to_string(),
            fq_sub_name: format!("{}::{}", CORE_PACKAGE, op),
            sub_name: op.to_string(),
            first_line: CORE_OP_LINE,
            kind: SubKind::Sub,
            is_main: false,
            is_eval: false,
        }
    }

    /// Whether the frame's code has no real source location.
    pub fn is_synthetic(&self) -> bool {
        self.line < 0
    }

    /// Whether the sub's identity depends on the file it was compiled in.
    pub(crate) fn is_file_scoped(&self) -> bool {
        self.is_main || self.is_eval || self.fq_sub_name.ends_with(ANON_SUFFIX)
    }

    /// The pseudo-file owning subs of this frame's package that have no source.
    ///
    /// `Foo::Bar` becomes `xs:Foo/Bar.pm`.
    pub(crate) fn pseudo_file(&self) -> String {
        format!("xs:{}.pm", self.package.replace("::", "/"))
    }
}

/// One sampled call stack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    /// Frames, innermost (the sampled point) first.
    pub frames: Vec<Frame>,
    /// Number of ticks attributed to this stack.
    pub weight: u64,
    /// The core opcode executing when the sample was taken, if known.
    pub op_name: Option<String>,
}

impl Trace {
    /// A trace with the given frames and weight and no opcode information.
    pub fn new(frames: Vec<Frame>, weight: u64) -> Self {
        Trace {
            frames,
            weight,
            op_name: None,
        }
    }

    /// Attach the name of the opcode that was executing.
    pub fn with_op(mut self, op: &str) -> Self {
        self.op_name = Some(op.to_string());
        self
    }
}

/// The values every trace merged into one report has to agree on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunIdentity {
    /// Sampling interval, in microseconds.
    pub tick_duration: u64,
    /// Version of the profiled interpreter.
    pub interpreter_version: String,
    /// Identifier of the profiled process.
    pub process_id: String,
}

impl RunIdentity {
    /// Construct a run identity.
    pub fn new(tick_duration: u64, interpreter_version: &str, process_id: &str) -> Self {
        RunIdentity {
            tick_duration,
            interpreter_version: interpreter_version.to_string(),
            process_id: process_id.to_string(),
        }
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tick={}us version={} process={}",
            self.tick_duration, self.interpreter_version, self.process_id
        )
    }
}

/// Where a profiled process sits in the process tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenealogyInfo {
    /// Identifier of the process that produced the trace.
    pub process_id: String,
    /// Incremented each time the process re-opens its trace output (e.g. after `fork`).
    pub ordinal: u32,
    /// The parent process, unless this is a root process.
    pub parent: Option<ParentRef>,
}

impl GenealogyInfo {
    /// A process with no profiled parent.
    pub fn root(process_id: &str) -> Self {
        GenealogyInfo {
            process_id: process_id.to_string(),
            ordinal: 1,
            parent: None,
        }
    }
}

/// Reference to a `(process, ordinal)` pair in the genealogy.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentRef {
    /// Parent process identifier.
    pub process_id: String,
    /// Ordinal of the parent's trace output at the time of the spawn.
    pub ordinal: u32,
}

/// A decoded trace stream.
///
/// Implemented by trace decoders; the report only ever pulls from it.
pub trait TraceSource {
    /// Tick duration, interpreter version and process of the stream.
    fn identity(&self) -> &RunIdentity;

    /// The genealogy of the process that wrote the stream.
    fn genealogy(&self) -> &GenealogyInfo;

    /// The next trace, or `None` once the stream is exhausted.
    fn next_trace(&mut self) -> Result<Option<Trace>>;
}

/// A [`TraceSource`] over traces that are already in memory.
#[derive(Clone, Debug)]
pub struct VecSource {
    identity: RunIdentity,
    genealogy: GenealogyInfo,
    traces: std::vec::IntoIter<Trace>,
}

impl VecSource {
    /// A stream yielding `traces` in order.
    pub fn new(identity: RunIdentity, genealogy: GenealogyInfo, traces: Vec<Trace>) -> Self {
        VecSource {
            identity,
            genealogy,
            traces: traces.into_iter(),
        }
    }
}

impl TraceSource for VecSource {
    fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    fn genealogy(&self) -> &GenealogyInfo {
        &self.genealogy
    }

    fn next_trace(&mut self) -> Result<Option<Trace>> {
        Ok(self.traces.next())
    }
}
