mod common;

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use assert_cmd::cargo::CommandCargoExt;
use pretty_assertions::assert_eq;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tallyprof::persist;
use tallyprof::report::{Options, Report};
use tallyprof::trace::{Frame, Trace};

use common::{at, build, fold, random_traces};

fn flames() -> Options {
    Options {
        flamegraph: true,
        ..Options::default()
    }
}

fn inputs(dir: &Path) -> (Vec<Report>, Vec<String>) {
    let mut rng = SmallRng::seed_from_u64(11);
    let mut reports = Vec::new();
    let mut paths = Vec::new();
    for pid in ["p1", "p2", "p3"] {
        let mut traces = random_traces(&mut rng, 30);
        traces.push(Trace::new(
            vec![at("lib/Hot.pm", 8, "Hot::loop", 7), Frame::main("app.pl", 2)],
            1500,
        ));
        let report = build(pid, traces, flames());
        let path = dir.join(format!("{}.json", pid));
        persist::save_file(&report, &path).unwrap();
        reports.push(report);
        paths.push(path.to_string_lossy().into_owned());
    }
    (reports, paths)
}

fn run(args: &[&str]) -> Output {
    Command::cargo_bin("tallyprof-merge")
        .unwrap()
        .args(args)
        .output()
        .expect("failed to execute tallyprof-merge")
}

#[test]
fn merges_persisted_reports() {
    let dir = tempfile::tempdir().unwrap();
    let (reports, paths) = inputs(dir.path());
    let out = dir.path().join("merged.json");
    let folded = dir.path().join("merged.folded");

    let mut args = vec![
        "--mixed-processes",
        "-n",
        "2",
        "-o",
        out.to_str().unwrap(),
        "--folded",
        folded.to_str().unwrap(),
        "--top",
        "2",
    ];
    args.extend(paths.iter().map(String::as_str));
    let output = run(&args);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "{}", stderr);

    let expected = fold(reports);
    let merged = persist::load_file(&out).unwrap();
    assert_eq!(merged, expected);

    let mut expected_folded = Vec::new();
    expected.write_folded(&mut expected_folded).unwrap();
    assert_eq!(
        fs::read_to_string(&folded).unwrap(),
        String::from_utf8(expected_folded).unwrap()
    );

    let hot = stderr
        .lines()
        .find(|line| line.contains("Hot::loop"))
        .unwrap_or_else(|| panic!("no Hot::loop in summary:\n{}", stderr));
    assert!(hot.contains("4,500"), "{}", hot);
}

#[test]
fn writes_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let (reports, paths) = inputs(dir.path());

    let output = run(&["-q", paths[0].as_str()]);
    assert!(output.status.success());
    let merged = persist::load(&output.stdout[..]).unwrap();
    assert_eq!(merged, reports[0]);
}

#[test]
fn rejects_other_processes_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let (_, paths) = inputs(dir.path());
    let out = dir.path().join("merged.json");

    let output = run(&["-o", out.to_str().unwrap(), paths[0].as_str(), paths[1].as_str()]);
    assert!(!output.status.success());
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("Inconsistency"),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(!out.exists());
}

#[test]
fn needs_an_input() {
    let output = run(&[]);
    assert!(!output.status.success());
}
