use std::borrow::Cow;

use super::registry::{CallSite, CallSiteId, CalleeKey, FileRecord, SubId, SubRecord};
use super::weight::{Weight, MAX_LINE};
use super::{FlameKey, Report};
use crate::trace::{Frame, GenealogyInfo, Trace, TraceSource};
use crate::{Error, Result};

// The registry keys a frame's sub and owning file are stored under.
struct Resolved {
    sub: SubId,
    file: String,
}

fn resolve(depth: usize, frame: &Frame) -> Result<Resolved> {
    if frame.fq_sub_name.is_empty() {
        return Err(Error::UnresolvableFrame {
            depth,
            reason: "frame has no sub name",
        });
    }

    if frame.line > MAX_LINE || frame.first_line > MAX_LINE {
        return Err(Error::UnresolvableFrame {
            depth,
            reason: "line number out of range",
        });
    }

    let file = if frame.is_synthetic() {
        if frame.package.is_empty() {
            return Err(Error::UnresolvableFrame {
                depth,
                reason: "frame without source has no package",
            });
        }
        frame.pseudo_file()
    } else if frame.file.is_empty() {
        return Err(Error::UnresolvableFrame {
            depth,
            reason: "frame has no file",
        });
    } else {
        frame.file.clone()
    };

    Ok(Resolved {
        sub: SubId::for_frame(frame, &file),
        file,
    })
}

impl Report {
    /// Fold one trace into the report.
    ///
    /// The input the trace came from must have passed
    /// [`Report::check_consistency`]. A malformed frame fails the call before
    /// anything is recorded.
    pub fn ingest(&mut self, trace: &Trace, genealogy: &GenealogyInfo) -> Result<()> {
        self.ensure_mutable()?;

        let frames: Cow<'_, [Frame]> = match trace.op_name {
            Some(ref op) if self.slow_ops.contains(op) => {
                let mut frames = Vec::with_capacity(trace.frames.len() + 1);
                frames.push(Frame::core_op(op));
                frames.extend(trace.frames.iter().cloned());
                Cow::Owned(frames)
            }
            _ => Cow::Borrowed(&trace.frames),
        };

        let resolved = frames
            .iter()
            .enumerate()
            .map(|(depth, frame)| resolve(depth, frame))
            .collect::<Result<Vec<_>>>()?;

        self.genealogy.record(genealogy);
        self.total += trace.weight;
        let weight = trace.weight;

        for (i, frame) in frames.iter().enumerate() {
            let this = &resolved[i];
            let sampled = i == 0;

            let sub = self
                .subs
                .get_or_create(&this.sub, |id| SubRecord::from_frame(id.clone(), frame, &this.file));
            sub.weight.add(weight, sampled);

            if let Some(caller_frame) = frames.get(i + 1) {
                let caller = &resolved[i + 1];
                let site = sub
                    .call_sites
                    .entry(CallSiteId::new(&caller.file, caller_frame.line))
                    .or_insert_with(|| CallSite {
                        caller: caller.sub.clone(),
                        file: caller.file.clone(),
                        line: caller_frame.line,
                        weight: Weight::default(),
                    });
                // only the sampled frame's call site accrues exclusive weight
                site.weight.add(weight, sampled);

                let caller_sub = self.subs.get_or_create(&caller.sub, |id| {
                    SubRecord::from_frame(id.clone(), caller_frame, &caller.file)
                });
                *caller_sub
                    .callees
                    .entry(CalleeKey {
                        line: caller_frame.line,
                        callee: this.sub.clone(),
                    })
                    .or_insert(0) += weight;
            }

            let file = self.files.get_or_create(&this.file, FileRecord::new);
            file.lines_inclusive.add(frame.line, weight);
            if sampled {
                file.lines_exclusive.add(frame.line, weight);
            }
        }

        if let Some(ref mut flames) = self.flames {
            if !resolved.is_empty() {
                let stack = resolved.iter().rev().map(|r| r.sub.clone()).collect();
                flames.add(FlameKey(stack), weight);
            }
        }

        Ok(())
    }

    /// Check a decoded trace stream for consistency, then fold all of its traces
    /// into the report.
    ///
    /// Returns the number of traces ingested.
    pub fn ingest_source<S>(&mut self, mut source: S) -> Result<usize>
    where
        S: TraceSource,
    {
        self.ensure_mutable()?;
        self.check_consistency(source.identity())?;

        let genealogy = source.genealogy().clone();
        let mut ntraces = 0;
        while let Some(trace) = source.next_trace()? {
            self.ingest(&trace, &genealogy)?;
            ntraces += 1;
        }

        debug!(
            "ingested {} traces from process {} ({} samples so far)",
            ntraces, genealogy.process_id, self.total
        );
        Ok(ntraces)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::report::Options;
    use crate::trace::{RunIdentity, CORE_OP_LINE};

    fn report() -> Report {
        let mut report = Report::new(Options {
            flamegraph: true,
            ..Options::default()
        });
        report
            .check_consistency(&RunIdentity::new(1000, "5.36.0", "p1"))
            .unwrap();
        report
    }

    #[test]
    fn simple_stack() {
        let mut report = report();
        let trace = Trace::new(
            vec![
                Frame::sub("file.pl", 10, "main::subA"),
                Frame::sub("file.pl", 5, "main::subB"),
            ],
            3,
        );
        report.ingest(&trace, &GenealogyInfo::root("p1")).unwrap();

        assert_eq!(report.total(), 3);
        let a = report.subs().get(&SubId::named("main::subA")).unwrap();
        let b = report.subs().get(&SubId::named("main::subB")).unwrap();
        assert_eq!(
            a.weight,
            Weight {
                inclusive: 3,
                exclusive: 3
            }
        );
        assert_eq!(
            b.weight,
            Weight {
                inclusive: 3,
                exclusive: 0
            }
        );

        assert_eq!(a.call_sites.len(), 1);
        let site = &a.call_sites[&CallSiteId::new("file.pl", 5)];
        assert_eq!(site.caller, SubId::named("main::subB"));
        assert_eq!(
            site.weight,
            Weight {
                inclusive: 3,
                exclusive: 3
            }
        );
        assert!(b.call_sites.is_empty());
        assert_eq!(b.callees_at(5).collect::<Vec<_>>(), vec![(&a.id, 3)]);

        let file = report.files().get("file.pl").unwrap();
        assert_eq!(file.lines_inclusive.get(10), 3);
        assert_eq!(file.lines_inclusive.get(5), 3);
        assert_eq!(file.lines_exclusive.get(10), 3);
        assert_eq!(file.lines_exclusive.get(5), 0);
    }

    #[test]
    fn slow_op_gets_a_leaf_frame() {
        let mut report = report();
        let trace = Trace::new(
            vec![
                Frame::sub("file.pl", 10, "main::subA"),
                Frame::main("file.pl", 2),
            ],
            4,
        )
        .with_op("sort");
        report.ingest(&trace, &GenealogyInfo::root("p1")).unwrap();

        let op = report.subs().get(&SubId::named("CORE::sort")).unwrap();
        assert_eq!(op.file, "xs:CORE.pm");
        assert_eq!(op.start_line, CORE_OP_LINE);
        assert_eq!(
            op.weight,
            Weight {
                inclusive: 4,
                exclusive: 4
            }
        );
        assert_eq!(
            op.call_sites[&CallSiteId::new("file.pl", 10)].caller,
            SubId::named("main::subA")
        );

        let a = report.subs().get(&SubId::named("main::subA")).unwrap();
        assert_eq!(a.weight.exclusive, 0);
        assert_eq!(a.weight.inclusive, 4);

        let pseudo = report.files().get("xs:CORE.pm").unwrap();
        assert_eq!(pseudo.lines_inclusive.total(), 0);
    }

    #[test]
    fn fast_op_is_not_synthesized() {
        let mut report = report();
        let trace = Trace::new(vec![Frame::sub("file.pl", 10, "main::subA")], 1).with_op("add");
        report.ingest(&trace, &GenealogyInfo::root("p1")).unwrap();
        assert!(report.subs().get(&SubId::named("CORE::add")).is_none());
        assert_eq!(
            report
                .subs()
                .get(&SubId::named("main::subA"))
                .unwrap()
                .weight
                .exclusive,
            1
        );
    }

    #[test]
    fn xsubs_live_in_package_pseudo_files() {
        let mut report = report();
        let trace = Trace::new(
            vec![
                Frame::xsub("List::Util::first"),
                Frame::sub("lib/Foo.pm", 30, "Foo::find"),
            ],
            2,
        );
        report.ingest(&trace, &GenealogyInfo::root("p1")).unwrap();

        let xs = report
            .subs()
            .get(&SubId::named("List::Util::first"))
            .unwrap();
        assert_eq!(xs.file, "xs:List/Util.pm");
        assert!(report.files().get("xs:List/Util.pm").is_some());
        assert_eq!(xs.weight.exclusive, 2);
    }

    #[test]
    fn unresolvable_frame_records_nothing() {
        let mut report = report();
        let mut broken = Frame::sub("file.pl", 3, "main::x");
        broken.file.clear();
        let trace = Trace::new(vec![Frame::sub("file.pl", 10, "main::subA"), broken], 5);

        match report.ingest(&trace, &GenealogyInfo::root("p1")) {
            Err(Error::UnresolvableFrame { depth, .. }) => assert_eq!(depth, 1),
            other => panic!("expected an unresolvable frame, got {:?}", other),
        }
        assert_eq!(report.total(), 0);
        assert!(report.subs().is_empty());
        assert!(report.files().is_empty());
    }

    #[test]
    fn huge_line_is_rejected_up_front() {
        let mut report = report();
        let trace = Trace::new(
            vec![
                Frame::sub("file.pl", 10, "main::subA"),
                Frame::sub("file.pl", i64::MAX, "main::subB"),
            ],
            5,
        );
        match report.ingest(&trace, &GenealogyInfo::root("p1")) {
            Err(Error::UnresolvableFrame { depth, reason }) => {
                assert_eq!(depth, 1);
                assert_eq!(reason, "line number out of range");
            }
            other => panic!("expected an unresolvable frame, got {:?}", other),
        }

        let mut late = Frame::sub("file.pl", 3, "main::late");
        late.first_line = MAX_LINE + 1;
        let trace = Trace::new(vec![late], 1);
        assert!(matches!(
            report.ingest(&trace, &GenealogyInfo::root("p1")),
            Err(Error::UnresolvableFrame { depth: 0, .. })
        ));

        assert_eq!(report.total(), 0);
        assert!(report.subs().is_empty());
        assert!(report.files().is_empty());
    }

    #[test]
    fn flame_signature_is_outermost_first() {
        let mut report = report();
        let trace = Trace::new(
            vec![
                Frame::sub("file.pl", 10, "main::leaf"),
                Frame::sub("file.pl", 20, "main::mid"),
                Frame::main("file.pl", 30),
            ],
            2,
        );
        report.ingest(&trace, &GenealogyInfo::root("p1")).unwrap();
        report.ingest(&trace, &GenealogyInfo::root("p1")).unwrap();

        let flames = report.flames().unwrap();
        assert_eq!(flames.len(), 1);
        let (stack, weight) = flames.iter().next().unwrap();
        assert_eq!(stack.to_string(), "main::MAIN:file.pl;main::mid;main::leaf");
        assert_eq!(weight, 4);
    }

    #[test]
    fn ingest_after_finalize_fails() {
        let mut report = report();
        report.finalize().unwrap();
        let trace = Trace::new(vec![Frame::sub("file.pl", 10, "main::subA")], 1);
        assert!(matches!(
            report.ingest(&trace, &GenealogyInfo::root("p1")),
            Err(Error::Finalized)
        ));
    }
}
