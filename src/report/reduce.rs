use std::num::NonZeroUsize;
use std::thread;

use once_cell::sync::Lazy;

use super::Report;
use crate::Result;

/// Default number of threads used by [`merge_all`]: the available parallelism.
pub static DEFAULT_NTHREADS: Lazy<usize> = Lazy::new(|| {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
});

type Pair = (Report, Option<Report>);

fn pairs(reports: Vec<Report>) -> Vec<Pair> {
    let mut reports = reports.into_iter();
    let mut pairs = Vec::with_capacity(reports.len() / 2 + 1);
    while let Some(left) = reports.next() {
        pairs.push((left, reports.next()));
    }
    pairs
}

fn merge_pair((mut left, right): Pair) -> Result<Report> {
    if let Some(right) = right {
        left.merge(&right)?;
    }
    Ok(left)
}

/// Merge `reports` into one by pairwise tree reduction.
///
/// Each level of the tree merges neighbouring pairs, on up to `nthreads`
/// threads when the `multithreaded` feature is enabled. Since merging is
/// commutative and associative, the result does not depend on `nthreads`.
/// The first failing merge aborts the reduction.
pub fn merge_all(mut reports: Vec<Report>, nthreads: usize) -> Result<Report> {
    let ninputs = reports.len();
    let mut levels = 0;
    while reports.len() > 1 {
        reports = merge_level(pairs(reports), nthreads)?;
        levels += 1;
    }
    debug!(
        "merged {} reports in {} levels on up to {} threads",
        ninputs, levels, nthreads
    );
    Ok(reports.pop().unwrap_or_default())
}

#[cfg(feature = "multithreaded")]
fn merge_level(pairs: Vec<Pair>, nthreads: usize) -> Result<Vec<Report>> {
    if nthreads <= 1 || pairs.len() <= 1 {
        return pairs.into_iter().map(merge_pair).collect();
    }

    let per_thread = (pairs.len() + nthreads - 1) / nthreads;
    let mut pairs = pairs.into_iter().peekable();
    let mut chunks = Vec::with_capacity(nthreads);
    while pairs.peek().is_some() {
        chunks.push(pairs.by_ref().take(per_thread).collect::<Vec<_>>());
    }

    crossbeam_utils::thread::scope(|scope| -> Result<Vec<Report>> {
        let handles: Vec<_> = chunks
            .into_iter()
            .map(|chunk| {
                scope.spawn(move |_| {
                    chunk
                        .into_iter()
                        .map(merge_pair)
                        .collect::<Result<Vec<_>>>()
                })
            })
            .collect();

        let mut merged = Vec::new();
        for handle in handles {
            match handle.join() {
                Ok(reports) => merged.extend(reports?),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        Ok(merged)
    })
    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
}

#[cfg(not(feature = "multithreaded"))]
fn merge_level(pairs: Vec<Pair>, _nthreads: usize) -> Result<Vec<Report>> {
    pairs.into_iter().map(merge_pair).collect()
}
