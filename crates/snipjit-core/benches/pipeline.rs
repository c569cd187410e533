//! Benchmark suite for the snippet pipeline
//!
//! - compile: front end plus emission, per emission kind
//! - load: compile, link and finalize, per IR emission kind
//! - call: invoking an already loaded entry point

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use snipjit_core::{CompileOptions, EmissionKind, FrontEndDriver, Pipeline, SourceUnit};

const SOURCE: &str = "\
#include <math.h>
static int collatz_step(int n) { return n % 2 ? 3 * n + 1 : n / 2; }
int collatz(int n) {
    int steps = 0;
    while (n != 1) { n = collatz_step(n); steps++; }
    return steps;
}
double wave(double x) { return sin(x) * cos(x / 2) + sqrt(fabs(x)); }
";

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    for emission in EmissionKind::ALL {
        let driver = FrontEndDriver::new(CompileOptions::default().with_emission(emission));
        group.bench_with_input(BenchmarkId::from_parameter(emission), &driver, |b, driver| {
            b.iter(|| black_box(driver.compile(SourceUnit::c(SOURCE)).unwrap()));
        });
    }

    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");

    for emission in EmissionKind::ALL.into_iter().filter(|e| e.produces_module()) {
        let pipeline = Pipeline::new(CompileOptions::default().with_emission(emission));
        group.bench_with_input(BenchmarkId::from_parameter(emission), &pipeline, |b, pipeline| {
            b.iter(|| black_box(pipeline.load(SourceUnit::c(SOURCE)).unwrap()));
        });
    }

    group.finish();
}

fn bench_call(c: &mut Criterion) {
    let program = Pipeline::default().load(SourceUnit::c(SOURCE)).unwrap();
    let collatz = program.lookup("collatz").unwrap();

    c.bench_function("call/collatz_27", |b| {
        b.iter(|| black_box(collatz.invoke::<_, i32>((black_box(27_i32),)).unwrap()));
    });
}

criterion_group!(benches, bench_compile, bench_load, bench_call);
criterion_main!(benches);
