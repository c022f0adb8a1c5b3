//! Saving and loading reports.
//!
//! A persisted report is the JSON tuple `(tick_duration, interpreter_version,
//! process_id, report)`, so the identity of a file can be checked without
//! looking inside the report.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use crate::report::Report;
use crate::trace::RunIdentity;
use crate::{Error, Result};

/// Write `report` to `writer`.
///
/// Fails with [`Error::MissingIdentity`] if the report never passed a consistency check.
pub fn save<W>(report: &Report, writer: W) -> Result<()>
where
    W: Write,
{
    let identity = report.identity().ok_or(Error::MissingIdentity)?;
    serde_json::to_writer(
        writer,
        &(
            identity.tick_duration,
            &identity.interpreter_version,
            &identity.process_id,
            report,
        ),
    )?;
    Ok(())
}

/// Write `report` to the file at `path`, replacing it.
pub fn save_file<P>(report: &Report, path: P) -> Result<()>
where
    P: AsRef<Path>,
{
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    save(report, &mut writer)?;
    writer.flush()?;
    debug!("saved report to {}", path.as_ref().display());
    Ok(())
}

/// Read a report written by [`save`].
pub fn load<R>(reader: R) -> Result<Report>
where
    R: io::Read,
{
    let (tick_duration, interpreter_version, process_id, mut report): (
        u64,
        String,
        String,
        Report,
    ) = serde_json::from_reader(reader)?;

    report.check_consistency(&RunIdentity {
        tick_duration,
        interpreter_version,
        process_id,
    })?;
    Ok(report)
}

/// Read a report from the file at `path`.
pub fn load_file<P>(path: P) -> Result<Report>
where
    P: AsRef<Path>,
{
    let report = load(BufReader::new(File::open(path.as_ref())?))?;
    debug!(
        "loaded report with {} samples from {}",
        report.total(),
        path.as_ref().display()
    );
    Ok(report)
}
