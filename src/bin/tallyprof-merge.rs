use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use env_logger::Env;
use log::info;
use num_format::Locale;
use once_cell::sync::Lazy;
use tallyprof::persist;
use tallyprof::report::{merge_all, Report, DEFAULT_NTHREADS};

static NTHREADS: Lazy<String> = Lazy::new(|| format!("{}", *DEFAULT_NTHREADS));

#[derive(Debug, Parser)]
#[command(
    name = "tallyprof-merge",
    author = "",
    about = "Merge persisted tallyprof reports into one",
    after_help = "\
All reports must come from runs with the same tick duration and interpreter version.
Reports from different processes are rejected unless --mixed-processes is given;
canonicalize eval files before merging those."
)]
struct Opt {
    // ************* //
    // *** FLAGS *** //
    // ************* //
    /// Accept reports written by different processes
    #[arg(long = "mixed-processes")]
    mixed_processes: bool,

    /// Silence all log output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Verbose logging mode (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    // *************** //
    // *** OPTIONS *** //
    // *************** //
    /// Write the merged report to this file instead of STDOUT
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    output: Option<PathBuf>,

    /// Also write the merged folded stacks to this file
    #[arg(long = "folded", value_name = "PATH")]
    folded: Option<PathBuf>,

    /// Print the N subs with the highest exclusive weight to STDERR
    #[arg(long = "top", value_name = "N")]
    top: Option<usize>,

    /// Number of threads to use
    #[arg(
        short = 'n',
        long = "nthreads",
        default_value = NTHREADS.as_str(),
        value_name = "UINT"
    )]
    nthreads: usize,

    // ************ //
    // *** ARGS *** //
    // ************ //
    /// Persisted reports to merge
    #[arg(value_name = "PATH", required = true)]
    infiles: Vec<PathBuf>,
}

fn write_top(report: &Report, n: usize) -> io::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    let mut exclusive = num_format::Buffer::default();
    let mut inclusive = num_format::Buffer::default();

    writeln!(out, "{:>14} {:>14}  sub", "exclusive", "inclusive")?;
    for sub in report.top_subs(n) {
        exclusive.write_formatted(&sub.weight.exclusive, &Locale::en);
        inclusive.write_formatted(&sub.weight.inclusive, &Locale::en);
        writeln!(
            out,
            "{:>14} {:>14}  {} ({})",
            exclusive.as_str(),
            inclusive.as_str(),
            sub.id,
            sub.file
        )?;
    }
    Ok(())
}

fn main() -> tallyprof::Result<()> {
    let opt = Opt::parse();

    // Initialize logger
    if !opt.quiet {
        env_logger::Builder::from_env(Env::default().default_filter_or(match opt.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }))
        .format_timestamp(None)
        .init();
    }

    let mut reports = Vec::with_capacity(opt.infiles.len());
    for infile in &opt.infiles {
        let mut report = persist::load_file(infile)?;
        if opt.mixed_processes {
            report.allow_mixed_process();
        }
        reports.push(report);
    }

    let merged = merge_all(reports, opt.nthreads)?;
    info!(
        "merged {} reports, {} samples in {} subs",
        opt.infiles.len(),
        merged.total(),
        merged.subs().len()
    );

    match opt.output {
        Some(ref path) => persist::save_file(&merged, path)?,
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            persist::save(&merged, &mut out)?;
            writeln!(out)?;
        }
    }

    if let Some(ref path) = opt.folded {
        let mut writer = BufWriter::new(File::create(path)?);
        merged.write_folded(&mut writer)?;
        writer.flush()?;
    }

    if let Some(n) = opt.top {
        write_top(&merged, n)?;
    }

    Ok(())
}
