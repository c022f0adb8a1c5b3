use super::registry::{CalleeEdge, FileRecord, SubId, SubRecord};
use super::Report;
use crate::{Error, Result};

impl SubRecord {
    /// Add the counters, call sites and callee edges of `other` into `self`.
    pub(crate) fn absorb(&mut self, other: &SubRecord) {
        self.weight.absorb(&other.weight);
        for (key, site) in &other.call_sites {
            match self.call_sites.get_mut(key) {
                Some(existing) => existing.weight.absorb(&site.weight),
                None => {
                    self.call_sites.insert(key.clone(), site.clone());
                }
            }
        }
        for (key, &inclusive) in &other.callees {
            *self.callees.entry(key.clone()).or_insert(0) += inclusive;
        }
    }
}

impl FileRecord {
    /// Add the per-line counters and indices of `other` into `self`.
    pub(crate) fn absorb(&mut self, other: &FileRecord) {
        self.exclusive += other.exclusive;
        self.lines_inclusive.absorb(&other.lines_inclusive);
        self.lines_exclusive.absorb(&other.lines_exclusive);

        for (&line, subs) in &other.subs {
            absorb_subs(self.subs.entry(line).or_default(), subs);
        }
        for (&line, edges) in &other.callees {
            absorb_edges(self.callees.entry(line).or_default(), edges);
        }
    }
}

pub(super) fn absorb_subs(target: &mut Vec<SubId>, subs: &[SubId]) {
    target.extend(subs.iter().cloned());
    target.sort();
    target.dedup();
}

pub(super) fn absorb_edges(target: &mut Vec<CalleeEdge>, edges: &[CalleeEdge]) {
    for edge in edges {
        match target
            .iter_mut()
            .find(|e| e.caller == edge.caller && e.callee == edge.callee)
        {
            Some(existing) => existing.inclusive += edge.inclusive,
            None => target.push(edge.clone()),
        }
    }
}

impl Report {
    /// Add everything in `other` to this report.
    ///
    /// Merging is commutative and associative, and merging an empty report is a
    /// no-op, so partial reports can be combined in any order. `other` must have
    /// been produced under the same tick duration, interpreter version and
    /// (unless this report is mixed-process) process; on a mismatch nothing is
    /// modified.
    pub fn merge(&mut self, other: &Report) -> Result<()> {
        self.ensure_mutable()?;
        if other.finalized {
            return Err(Error::Finalized);
        }
        if let Some(identity) = other.identity() {
            self.consistency.check(identity)?;
        }

        self.total += other.total;
        self.genealogy.absorb(&other.genealogy);

        for sub in other.subs.iter() {
            self.subs
                .get_or_create(&sub.id, |_| sub.empty_copy())
                .absorb(sub);
        }

        for file in other.files.iter() {
            self.files
                .get_or_create(&file.name, |_| file.empty_copy())
                .absorb(file);
        }

        if let Some(ref theirs) = other.flames {
            match self.flames {
                Some(ref mut ours) => ours.absorb(theirs),
                None => self.flames = Some(theirs.clone()),
            }
        }

        trace!(
            "merged report with {} samples, now at {}",
            other.total,
            self.total
        );
        Ok(())
    }
}
