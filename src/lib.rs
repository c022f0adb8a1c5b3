//! Tallyprof aggregates the call stacks sampled by a statistical profiler into per-sub,
//! per-call-site and per-line cost tables, and merges those tables across threads,
//! processes and profiling runs.
//!
//! The interpreter being profiled is expected to write out a trace stream per process: a
//! header with the tick duration, interpreter version and process id, and then a sequence of
//! sampled stacks, each with a weight (the number of ticks it accounts for) and optionally the
//! core opcode that was running. Decoding that stream is up to the caller; tallyprof consumes
//! already decoded [`trace::Trace`]s through the [`trace::TraceSource`] trait.
//!
//! # Building a report
//!
//! Traces are folded into a [`report::Report`]:
//!
//! ```
//! use tallyprof::report::{Options, Report, SubId};
//! use tallyprof::trace::{Frame, GenealogyInfo, RunIdentity, Trace, VecSource};
//!
//! let identity = RunIdentity::new(1000, "5.36.0", "4242");
//! let traces = vec![Trace::new(
//!     vec![
//!         Frame::sub("lib/Foo.pm", 12, "Foo::work"),
//!         Frame::main("app.pl", 3),
//!     ],
//!     2,
//! )];
//!
//! let mut report = Report::new(Options::default());
//! report.ingest_source(VecSource::new(identity, GenealogyInfo::root("4242"), traces))?;
//! report.finalize()?;
//!
//! let work = report.subs().get(&SubId::named("Foo::work")).unwrap();
//! assert_eq!(work.weight.exclusive, 2);
//! assert_eq!(report.files().get("lib/Foo.pm").unwrap().exclusive, 2);
//! # Ok::<(), tallyprof::Error>(())
//! ```
//!
//! Each trace is attributed inclusively to every sub on the stack and exclusively to the
//! innermost one. Subs without source (XS subs, and the synthetic `CORE::<op>` frames added
//! for slow opcodes) are owned by per-package pseudo files named `xs:Package/Name.pm`.
//!
//! # Combining reports
//!
//! Reports for different processes or shards are built independently and combined with
//! [`report::Report::merge`] or [`report::merge_all`]. Merging is commutative and
//! associative, so the order inputs arrive in does not matter. Every input must agree on
//! the tick duration and interpreter version, and on the process unless the report was
//! created with [`report::Options::mixed_process`].
//!
//! Before merging reports from different processes, code compiled from eval'd strings should
//! be given process-independent names with [`report::Report::canonicalize_evals`], which
//! renames every eval file after the hash of its source text. See the [`source`] module for
//! the stores that supply those hashes.
//!
//! Reports can be persisted with the [`persist`] module, and the `tallyprof-merge` binary
//! merges persisted reports from the command line:
//!
//! ```console
//! $ tallyprof-merge -o merged.json --folded stacks.folded report.*.json
//! ```
//!
//! The folded stacks are in the format expected by flame graph tools such as [inferno].
//!
//! # Rendering
//!
//! Finalized reports are read through [`report::Report::project`], which maps the line
//! numbers of logical source files (`#line` directives, templates, evals) back onto the
//! physical file they were generated into.
//!
//!   [inferno]: https://github.com/jonhoo/inferno

#![deny(missing_docs)]

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

#[macro_use]
extern crate log;

mod error;

pub mod persist;

/// Cost aggregation, merging and line projection.
///
/// See the [crate-level documentation] for details.
///
///   [crate-level documentation]: ../index.html
pub mod report;

/// Eval source and line mapping stores.
pub mod source;

/// The decoded input: frames, traces and the streams they come from.
pub mod trace;

pub use error::{Diagnostic, Error, GapEntry, Result};
