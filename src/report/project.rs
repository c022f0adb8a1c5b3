use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};

use super::merge::{absorb_edges, absorb_subs};
use super::registry::FileRecord;
use super::weight::MAX_LINE;
use super::Report;
use crate::source::{Breakpoint, LineMappingStore};
use crate::{Diagnostic, Error, GapEntry, Result};

/// A run of logical lines mapped 1:1 onto physical lines. Both ends are inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineRange {
    /// First logical line.
    pub logical_start: i64,
    /// Last logical line.
    pub logical_end: i64,
    /// Physical line of `logical_start`.
    pub physical_start: i64,
    /// Physical line of `logical_end`.
    pub physical_end: i64,
}

impl LineRange {
    fn covers(&self, line: i64) -> bool {
        self.logical_start <= line && line <= self.logical_end
    }

    fn project(&self, line: i64) -> i64 {
        self.physical_start + (line - self.logical_start)
    }
}

/// A file record in physical line coordinates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Projection {
    /// The merged record.
    pub file: FileRecord,
    /// Data that no breakpoint range covered.
    pub diagnostics: Vec<Diagnostic>,
}

// The last line anything was recorded at.
fn last_data_line(file: &FileRecord) -> i64 {
    [
        file.lines_inclusive.last_line(),
        file.lines_exclusive.last_line(),
        file.subs.keys().next_back().copied().unwrap_or(0),
        file.callees.keys().next_back().copied().unwrap_or(0),
    ]
    .iter()
    .copied()
    .max()
    .unwrap_or(0)
}

impl Report {
    fn line_ranges(
        &self,
        physical: &str,
        breakpoints: &[Breakpoint],
    ) -> IndexMap<String, Vec<LineRange>> {
        let mut breakpoints: Vec<_> = breakpoints
            .iter()
            .filter(|bp| bp.physical_line <= MAX_LINE)
            .collect();
        breakpoints.sort_by_key(|bp| bp.physical_line);

        let mut ranges: IndexMap<String, Vec<LineRange>> = IndexMap::new();

        // unless a breakpoint says otherwise, the physical file's own lines
        // before the first breakpoint are its own
        let named = breakpoints
            .iter()
            .any(|bp| bp.logical_file.as_deref().unwrap_or(physical) == physical);
        if let Some(file) = self.files.get(physical).filter(|_| !named) {
            let end = match breakpoints.first() {
                Some(bp) => bp.physical_line.saturating_sub(1),
                None => last_data_line(file),
            };
            let own = ranges.entry(physical.to_string()).or_default();
            if end >= 1 {
                own.push(LineRange {
                    logical_start: 1,
                    logical_end: end,
                    physical_start: 1,
                    physical_end: end,
                });
            }
        }

        for (i, bp) in breakpoints.iter().enumerate() {
            let logical = bp.logical_file.as_deref().unwrap_or(physical);
            let len = match breakpoints.get(i + 1) {
                Some(next) => next.physical_line.saturating_sub(bp.physical_line),
                None => match self.files.get(logical) {
                    Some(file) => last_data_line(file)
                        .saturating_sub(bp.logical_line)
                        .saturating_add(1),
                    None => 0,
                },
            };
            let len = len.min(MAX_LINE.saturating_sub(bp.physical_line).saturating_add(1));
            if len <= 0 {
                continue;
            }
            ranges
                .entry(logical.to_string())
                .or_default()
                .push(LineRange {
                    logical_start: bp.logical_line,
                    logical_end: bp.logical_line.saturating_add(len - 1),
                    physical_start: bp.physical_line,
                    physical_end: bp.physical_line + len - 1,
                });
        }
        ranges
    }

    /// Merge the logical files that `breakpoints` map onto `physical` into one
    /// record in physical line coordinates.
    ///
    /// Line counts are added up, so logical files whose ranges overlap in
    /// physical space both show. Sub start lines and call lines that no range
    /// covers are returned as [`Diagnostic::MappingGap`]s.
    ///
    /// If no breakpoint maps `physical` onto itself, its own data is taken to
    /// run up to the line before the first breakpoint.
    pub fn project(&self, physical: &str, breakpoints: &[Breakpoint]) -> Result<Projection> {
        if !self.finalized {
            return Err(Error::NotFinalized);
        }

        let ranges = self.line_ranges(physical, breakpoints);
        let identity = self
            .files
            .get(physical)
            .or_else(|| ranges.keys().find_map(|logical| self.files.get(logical)))
            .ok_or_else(|| Error::UnknownFile(physical.to_string()))?;

        let mut merged = identity.empty_copy();
        let mut diagnostics = Vec::new();
        for (logical, ranges) in ranges {
            if let Some(source) = self.files.get(&logical) {
                merged.exclusive += source.exclusive;
                project_file(source, ranges, &mut merged, &mut diagnostics);
            }
        }
        for edges in merged.callees.values_mut() {
            edges.sort_by(|a, b| (&a.caller, &a.callee).cmp(&(&b.caller, &b.callee)));
        }

        debug!(
            "projected {} onto {} lines with {} mapping gaps",
            physical,
            merged.lines_inclusive.iter().count(),
            diagnostics.len()
        );
        Ok(Projection {
            file: merged,
            diagnostics,
        })
    }

    /// Like [`Report::project`], with the breakpoints looked up in `store`.
    ///
    /// A file without breakpoints is returned as recorded.
    pub fn project_with<S>(&self, physical: &str, store: &S) -> Result<Projection>
    where
        S: LineMappingStore + ?Sized,
    {
        if let Some(breakpoints) = store.breakpoints_for(physical) {
            return self.project(physical, &breakpoints);
        }
        if !self.finalized {
            return Err(Error::NotFinalized);
        }
        match self.files.get(physical) {
            Some(file) => Ok(Projection {
                file: file.clone(),
                diagnostics: Vec::new(),
            }),
            None => Err(Error::UnknownFile(physical.to_string())),
        }
    }
}

fn gap(diagnostics: &mut Vec<Diagnostic>, file: &str, line: i64, entry: GapEntry) {
    let diagnostic = Diagnostic::MappingGap {
        file: file.to_string(),
        line,
        entry,
    };
    warn!("{}", diagnostic);
    diagnostics.push(diagnostic);
}

fn sub_gaps(diagnostics: &mut Vec<Diagnostic>, source: &FileRecord, line: i64) {
    for id in &source.subs[&line] {
        gap(diagnostics, &source.name, line, GapEntry::Sub(id.to_string()));
    }
}

fn project_file(
    source: &FileRecord,
    mut ranges: Vec<LineRange>,
    merged: &mut FileRecord,
    diagnostics: &mut Vec<Diagnostic>,
) {
    ranges.sort_by_key(|r| (r.logical_end, r.logical_start));

    let sub_lines: Vec<i64> = source.subs.keys().copied().collect();
    let call_lines: Vec<i64> = source.callees.keys().copied().collect();
    let mut next_sub = 0;
    let mut next_call = 0;

    for (i, range) in ranges.iter().enumerate() {
        // a key this range ends after but does not cover may still fall in a
        // later, wider range
        let covering = |line: i64| ranges[i..].iter().find(|r| r.covers(line));

        while let Some(&line) = sub_lines
            .get(next_sub)
            .filter(|&&line| line <= range.logical_end)
        {
            match covering(line) {
                Some(r) => absorb_subs(
                    merged.subs.entry(r.project(line)).or_default(),
                    &source.subs[&line],
                ),
                None => sub_gaps(diagnostics, source, line),
            }
            next_sub += 1;
        }

        while let Some(&line) = call_lines
            .get(next_call)
            .filter(|&&line| line <= range.logical_end)
        {
            match covering(line) {
                Some(r) => absorb_edges(
                    merged.callees.entry(r.project(line)).or_default(),
                    &source.callees[&line],
                ),
                None => gap(diagnostics, &source.name, line, GapEntry::CallSite),
            }
            next_call += 1;
        }

        for (line, weight) in source.lines_inclusive.iter() {
            if range.covers(line) {
                merged.lines_inclusive.add(range.project(line), weight);
            }
        }
        for (line, weight) in source.lines_exclusive.iter() {
            if range.covers(line) {
                merged.lines_exclusive.add(range.project(line), weight);
            }
        }
    }

    for &line in &sub_lines[next_sub..] {
        sub_gaps(diagnostics, source, line);
    }
    for &line in &call_lines[next_call..] {
        gap(diagnostics, &source.name, line, GapEntry::CallSite);
    }
}

/// The physical files a finalized report renders to: every recorded file,
/// with logical files replaced by the physical file they were mapped from.
pub fn physical_files<S>(report: &Report, store: &S) -> Vec<String>
where
    S: LineMappingStore + ?Sized,
{
    let mut physical = IndexSet::new();
    for key in report.files().keys() {
        let mut file = key.to_string();
        let mut seen = HashSet::new();
        while let Some(origin) = store.reverse_mapping_for(&file) {
            if !seen.insert(file.clone()) {
                break;
            }
            file = origin;
        }
        physical.insert(file);
    }
    physical.into_iter().collect()
}
