use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use templar_smt::backends::Z3Backend;
use templar_smt::{ShutdownNotifier, SmtTerm, SolverOptions, SolverService};

fn service() -> SolverService {
    SolverService::with_backends(
        SolverOptions::default(),
        Arc::new(Z3Backend::new(None)),
        None,
        ShutdownNotifier::new(),
    )
}

fn bounded_chain(len: i64) -> SmtTerm {
    let mut conjuncts = Vec::new();
    for i in 0..len {
        let cur = SmtTerm::var(format!("x@{i}"));
        let next = SmtTerm::var(format!("x@{}", i + 1));
        conjuncts.push(next.le(cur.add(SmtTerm::int(1))));
    }
    conjuncts.push(SmtTerm::var("x@0").le(SmtTerm::int(0)));
    conjuncts.push(SmtTerm::var(format!("x@{len}")).gt(SmtTerm::int(len)));
    SmtTerm::and(conjuncts)
}

fn bench_cached_is_unsat(c: &mut Criterion) {
    let service = service();
    let formula = bounded_chain(16);
    assert!(service.is_unsat(&formula).unwrap());
    c.bench_function("is_unsat_cached_chain16", |b| {
        b.iter(|| service.is_unsat(black_box(&formula)).unwrap())
    });
}

fn bench_uncached_is_unsat(c: &mut Criterion) {
    let formula = bounded_chain(16);
    c.bench_function("is_unsat_uncached_chain16", |b| {
        b.iter(|| service().is_unsat(black_box(&formula)).unwrap())
    });
}

fn bench_trivial_implies(c: &mut Criterion) {
    let service = service();
    let a = SmtTerm::var("x").ge(SmtTerm::int(0));
    c.bench_function("implies_syntactic_equal", |b| {
        b.iter(|| service.implies(black_box(&a), black_box(&a)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_cached_is_unsat,
    bench_uncached_is_unsat,
    bench_trivial_implies
);
criterion_main!(benches);
