//! Benchmarks for the normalizer + formula-builder hot path (components C
//! and D), which run once per call site across the whole corpus.
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use eh_miner::formula;
use eh_miner::model::{CallSite, TOKEN_SEP};
use eh_miner::normalize::{self, normalize_for_formula};

fn sample_site(arg_count: usize) -> CallSite {
    let call_args: Vec<String> = (0..arg_count).map(|i| format!("arg{i}")).collect();
    let call_arg = if call_args.is_empty() {
        "-".to_string()
    } else {
        call_args.join(TOKEN_SEP)
    };

    // The guard itself only ever tests the return slot against the first
    // argument (`ret == arg0`, or `ret == 0` with no arguments); `arg_count`
    // only grows the `call_arg` list the normalizer has to scan per token,
    // which is what these benchmarks are meant to stress.
    let rhs = call_args.first().cloned().unwrap_or_else(|| "0".to_string());
    let tokens = vec!["ret".to_string(), rhs, "BO_13_==".to_string()];
    let expr_tokens = tokens.join(TOKEN_SEP);
    let expr_tokens_count = tokens.len() as i64;

    CallSite {
        id: 1,
        branch_id: 1,
        domain: "bench".into(),
        project: "bench".into(),
        call_name: "do_work".into(),
        call_def_loc: "bench.c".into(),
        call_id: "c1".into(),
        call_str: "do_work()".into(),
        call_ret: "ret".into(),
        call_arg,
        call_arg_count: arg_count as i64,
        expr_tokens,
        expr_tokens_count,
        path_number_vec: "-".into(),
        log_name: "log_error".into(),
        log_def_loc: "bench.c".into(),
        log_id: "l1".into(),
        log_str: "log_error()".into(),
    }
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    for arg_count in [0usize, 4, 16] {
        let site = sample_site(arg_count);
        group.throughput(Throughput::Elements(site.expr_tokens_count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(arg_count), &site, |b, site| {
            b.iter(|| normalize::normalize(site));
        });
    }
    group.finish();
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("formula_build");
    for arg_count in [0usize, 4, 16] {
        let site = sample_site(arg_count);
        let inputs = normalize_for_formula(&site).expect("sample site is always usable");
        group.bench_with_input(BenchmarkId::from_parameter(arg_count), &inputs, |b, inputs| {
            b.iter(|| formula::build(inputs, &site.call_name));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_normalize, bench_build);
criterion_main!(benches);
