use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kebap::script::Interpreter;
use kebap::Formula;

const FIB: &str = "int fib(int n) { if (n < 2) return n; return fib(n-1) + fib(n-2); }";

fn interp() -> Interpreter {
    let mut i = Interpreter::new();
    i.capture_output();
    i
}

fn bench_interp(c: &mut Criterion) {
    let mut g = c.benchmark_group("interp");

    let mut fib = interp();
    if let Err(e) = fib.run_source("bench", FIB) {
        panic!("fib: {e}");
    }
    g.bench_function("fib_15", |b| b.iter(|| fib.eval(black_box("fib(15);"))));

    let mut lists = interp();
    if let Err(e) = lists.run_source("bench", "var big = [1:10000];") {
        panic!("range: {e}");
    }
    g.bench_function("broadcast_10k", |b| b.iter(|| lists.eval(black_box("sum(big * 2 + 1);"))));

    g.bench_function("parse_and_run", |b| {
        b.iter(|| {
            let mut i = interp();
            i.run_source("bench", black_box("int s = 0; for (int k = 0; k < 100; k++) s += k * k; s;"))
        })
    });

    g.finish();
}

fn bench_formula(c: &mut Criterion) {
    let mut f = Formula::new("a * x**2 + sin(x) / 2");
    if let Err(e) = f.set_parameter("a", 1.5) {
        panic!("parameter: {e}");
    }
    c.bench_function("formula_evaluate", |b| b.iter(|| f.evaluate(black_box(0.75))));
}

criterion_group!(benches, bench_interp, bench_formula);
criterion_main!(benches);
