mod common;

use maplit::hashset;
use pretty_assertions::assert_eq;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tallyprof::report::{merge_all, Options, Report, SubId};
use tallyprof::trace::{Frame, Trace};
use tallyprof::Error;

use common::{at, build, fold, mixed, random_traces};

fn processes(rng: &mut SmallRng, n: usize) -> Vec<Report> {
    (0..n)
        .map(|i| build(&format!("p{}", i), random_traces(rng, 40), mixed()))
        .collect()
}

#[test]
fn merge_order_does_not_matter() {
    let mut rng = SmallRng::seed_from_u64(0x5eed);
    let reports = processes(&mut rng, 6);
    let expected = fold(reports.clone());

    for _ in 0..10 {
        let mut shuffled = reports.clone();
        shuffled.shuffle(&mut rng);
        assert_eq!(fold(shuffled), expected);
    }
}

#[test]
fn merge_is_associative() {
    let mut rng = SmallRng::seed_from_u64(7);
    let reports = processes(&mut rng, 3);
    let (a, b, c) = (&reports[0], &reports[1], &reports[2]);

    let mut left = a.clone();
    left.merge(b).unwrap();
    left.merge(c).unwrap();

    let mut bc = b.clone();
    bc.merge(c).unwrap();
    let mut right = a.clone();
    right.merge(&bc).unwrap();

    assert_eq!(left, right);
}

#[test]
fn merge_all_ignores_thread_count() {
    let mut rng = SmallRng::seed_from_u64(42);
    let reports = processes(&mut rng, 9);
    let expected = fold(reports.clone());

    for nthreads in [1, 2, 3, 8] {
        assert_eq!(
            merge_all(reports.clone(), nthreads).unwrap(),
            expected,
            "nthreads = {}",
            nthreads
        );
    }
}

#[test]
fn merged_counts_add_up() {
    let mut rng = SmallRng::seed_from_u64(1);
    let traces: Vec<Vec<Trace>> = (0..4).map(|_| random_traces(&mut rng, 60)).collect();
    let weight: u64 = traces.iter().flatten().map(|t| t.weight).sum();

    let mut merged = fold(
        traces
            .into_iter()
            .enumerate()
            .map(|(i, traces)| build(&format!("p{}", i), traces, mixed())),
    );
    merged.finalize().unwrap();

    assert_eq!(merged.total(), weight);
    let exclusive: u64 = merged.subs().iter().map(|s| s.weight.exclusive).sum();
    assert_eq!(exclusive, weight);
    for sub in merged.subs().iter() {
        assert!(
            sub.weight.inclusive >= sub.weight.exclusive,
            "{} has more exclusive than inclusive weight",
            sub.id
        );
    }
    for file in merged.files().iter() {
        let owned: u64 = merged
            .subs()
            .iter()
            .filter(|s| s.file == file.name)
            .map(|s| s.weight.exclusive)
            .sum();
        assert_eq!(file.exclusive, owned, "{}", file.name);
    }
    assert_eq!(
        merged.genealogy().processes().collect::<Vec<_>>(),
        ["p0", "p1", "p2", "p3"]
    );
}

#[test]
fn inconsistent_merge_changes_nothing() {
    let traces = vec![Trace::new(
        vec![at("lib/A.pm", 12, "A::f", 10), Frame::main("app.pl", 3)],
        2,
    )];
    let mut a = build("p1", traces.clone(), Options::default());
    let b = build("p2", traces.clone(), Options::default());
    let (a0, b0) = (a.clone(), b.clone());

    let err = a.merge(&b).unwrap_err();
    assert!(matches!(err, Error::Inconsistency { .. }));
    let message = err.to_string();
    assert!(message.contains("process=p1"), "{}", message);
    assert!(message.contains("process=p2"), "{}", message);
    assert_eq!(a, a0);
    assert_eq!(b, b0);

    // the same inputs are fine once the report accepts other processes
    a.allow_mixed_process();
    a.merge(&b).unwrap();
    assert_eq!(a.total(), 4);
    assert_eq!(a.identity().unwrap().process_id, "p1");
}

#[test]
fn custom_slow_ops() {
    let options = Options {
        slow_ops: hashset! {"add".to_string()},
        ..Options::default()
    };
    let traces = vec![
        Trace::new(vec![Frame::main("app.pl", 3)], 1).with_op("add"),
        Trace::new(vec![Frame::main("app.pl", 4)], 1).with_op("sort"),
    ];
    let report = build("p1", traces, options);

    assert!(report.subs().get(&SubId::named("CORE::add")).is_some());
    assert!(report.subs().get(&SubId::named("CORE::sort")).is_none());
    let main = report
        .subs()
        .get(&SubId::scoped("main::MAIN", "app.pl"))
        .unwrap();
    assert_eq!(main.weight.exclusive, 1);
    assert_eq!(main.weight.inclusive, 2);
}
