#![allow(dead_code)]

use rand::Rng;
use tallyprof::report::{Options, Report};
use tallyprof::trace::{Frame, GenealogyInfo, RunIdentity, Trace, VecSource};

pub const TICK: u64 = 1000;
pub const VERSION: &str = "5.36.0";

pub fn identity(pid: &str) -> RunIdentity {
    RunIdentity::new(TICK, VERSION, pid)
}

/// A sub frame at `line` of a sub whose definition starts at `first_line`.
pub fn at(file: &str, line: i64, name: &str, first_line: i64) -> Frame {
    Frame {
        first_line,
        ..Frame::sub(file, line, name)
    }
}

pub fn mixed() -> Options {
    Options {
        flamegraph: true,
        mixed_process: true,
        ..Options::default()
    }
}

pub fn build(pid: &str, traces: Vec<Trace>, options: Options) -> Report {
    let mut report = Report::new(options);
    report
        .ingest_source(VecSource::new(
            identity(pid),
            GenealogyInfo::root(pid),
            traces,
        ))
        .unwrap();
    report
}

// (file, sub, first line of the definition)
const SUBS: &[(&str, &str, i64)] = &[
    ("lib/Parser.pm", "Parser::parse", 10),
    ("lib/Parser.pm", "Parser::token", 42),
    ("lib/Parser.pm", "Parser::__ANON__", 77),
    ("lib/Emit.pm", "Emit::render", 5),
    ("lib/Emit.pm", "Emit::flush", 31),
    ("lib/Util.pm", "Util::trim", 3),
];

const XSUBS: &[&str] = &["List::Util::first", "Scalar::Util::blessed"];

const OPS: &[&str] = &["sort", "match", "add", "print"];

/// `n` random traces under the main program of `app.pl`.
pub fn random_traces<R: Rng>(rng: &mut R, n: usize) -> Vec<Trace> {
    (0..n)
        .map(|_| {
            let mut frames = Vec::new();
            if rng.gen_bool(0.2) {
                frames.push(Frame::xsub(XSUBS[rng.gen_range(0..XSUBS.len())]));
            }
            for _ in 0..rng.gen_range(0..4) {
                let (file, name, first) = SUBS[rng.gen_range(0..SUBS.len())];
                frames.push(at(file, first + rng.gen_range(0..6), name, first));
            }
            frames.push(Frame::main("app.pl", rng.gen_range(1..30)));

            let trace = Trace::new(frames, rng.gen_range(1..5));
            if rng.gen_bool(0.3) {
                trace.with_op(OPS[rng.gen_range(0..OPS.len())])
            } else {
                trace
            }
        })
        .collect()
}

/// Merge `reports` one after the other into a fresh mixed-process report.
pub fn fold<I>(reports: I) -> Report
where
    I: IntoIterator<Item = Report>,
{
    let mut merged = Report::new(mixed());
    for report in reports {
        merged.merge(&report).unwrap();
    }
    merged
}
