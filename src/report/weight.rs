use serde::{Deserialize, Serialize};

/// Inclusive and exclusive sample weight of a sub, call site or callee edge.
///
/// Exclusive weight only grows when the owner is the sampled frame, so
/// `inclusive >= exclusive` holds as long as weight is only added through
/// [`Weight::add`] and [`Weight::absorb`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weight {
    /// Ticks spent in the owner or anything it called.
    pub inclusive: u64,
    /// Ticks spent in the owner itself.
    pub exclusive: u64,
}

impl Weight {
    /// Record `weight` ticks; `sampled` marks the owner as the innermost frame.
    pub fn add(&mut self, weight: u64, sampled: bool) {
        self.inclusive += weight;
        if sampled {
            self.exclusive += weight;
        }
    }

    /// Add the counters of `other`.
    pub fn absorb(&mut self, other: &Weight) {
        self.inclusive += other.inclusive;
        self.exclusive += other.exclusive;
    }
}

/// Highest line number a report records. Storage is dense, so frames past it
/// are rejected on ingest.
pub const MAX_LINE: i64 = 1 << 24;

/// Per-line counters of a file, indexed by 1-based line number.
///
/// Storage only grows when a non-zero value lands past the end, and two
/// arrays that differ only in trailing zeros compare equal.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineCounts(Vec<u64>);

impl LineCounts {
    /// The count at `line`; lines never written are zero.
    pub fn get(&self, line: i64) -> u64 {
        if line <= 0 {
            return 0;
        }
        self.0.get(line as usize).copied().unwrap_or(0)
    }

    /// Add `weight` at `line`. Non-positive lines carry no source and are ignored.
    pub fn add(&mut self, line: i64, weight: u64) {
        if line <= 0 || weight == 0 {
            return;
        }
        let idx = line as usize;
        if idx >= self.0.len() {
            self.0.resize(idx + 1, 0);
        }
        self.0[idx] += weight;
    }

    /// Element-wise addition of `other`.
    pub fn absorb(&mut self, other: &LineCounts) {
        for (line, weight) in other.iter() {
            self.add(line, weight);
        }
    }

    /// The highest line with storage allocated.
    pub fn last_line(&self) -> i64 {
        self.0.len().saturating_sub(1) as i64
    }

    /// `(line, count)` for every line with a non-zero count.
    pub fn iter(&self) -> impl Iterator<Item = (i64, u64)> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|&(_, &w)| w != 0)
            .map(|(line, &w)| (line as i64, w))
    }

    /// Sum of all lines.
    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }
}

impl PartialEq for LineCounts {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for LineCounts {}
