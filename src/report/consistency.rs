use serde::{Deserialize, Serialize};

use crate::trace::RunIdentity;
use crate::{Error, Result};

/// Tracks the tick duration, interpreter version and process every input must share.
///
/// Starts out unset; the first identity checked fixes it. A failed check leaves
/// the recorded identity untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyChecker {
    fixed: Option<RunIdentity>,
    mixed_process: bool,
}

impl ConsistencyChecker {
    /// A checker that compares process ids unless `mixed_process` is set.
    pub fn new(mixed_process: bool) -> Self {
        ConsistencyChecker {
            fixed: None,
            mixed_process,
        }
    }

    /// The identity recorded by the first successful check.
    pub fn identity(&self) -> Option<&RunIdentity> {
        self.fixed.as_ref()
    }

    /// Accept inputs from other processes from now on.
    pub fn allow_mixed_process(&mut self) {
        self.mixed_process = true;
    }

    /// Validate `found` without recording it.
    pub fn verify(&self, found: &RunIdentity) -> Result<()> {
        let expected = match self.fixed {
            Some(ref expected) => expected,
            None => return Ok(()),
        };

        let consistent = expected.tick_duration == found.tick_duration
            && expected.interpreter_version == found.interpreter_version
            && (self.mixed_process || expected.process_id == found.process_id);
        if consistent {
            Ok(())
        } else {
            Err(Error::Inconsistency {
                expected: expected.clone(),
                found: found.clone(),
            })
        }
    }

    /// Validate `found`, fixing it as the reference identity if none was set yet.
    pub fn check(&mut self, found: &RunIdentity) -> Result<()> {
        self.verify(found)?;
        if self.fixed.is_none() {
            debug!("report fixed to {}", found);
            self.fixed = Some(found.clone());
        }
        Ok(())
    }
}
