use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rampart::{
    and, or, rule, CacheMode, Evaluator, FieldRequest, RequestScope, Rule, RuleInput, RuleTree,
    RuleRegistry,
};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

/// `n` distinct leaves that all allow, combined with `combine`.
fn build_rule(n: usize, mode: CacheMode, combine: fn(Vec<Rule<u64>>) -> Rule<u64>) -> Rule<u64> {
    let leaves = (0..n)
        .map(|i| {
            rule(&format!("r{i}"))
                .cache(mode)
                .check_sync(|input: &RuleInput<u64>| *input.context() > 0)
        })
        .collect();
    combine(leaves)
}

fn bench_evaluate(c: &mut Criterion) {
    let rt = runtime();
    let field = FieldRequest::new("Query", "feed");
    let mut group = c.benchmark_group("single_eval");

    for &n in &[5, 20, 50] {
        let all = build_rule(n, CacheMode::None, |v| and(v));
        group.bench_function(format!("{n}_leaves_and"), |b| {
            b.iter(|| {
                let scope = RequestScope::new(1_u64);
                rt.block_on(Evaluator::new().evaluate(black_box(&all), &field, &scope))
            });
        });

        let any = build_rule(n, CacheMode::None, |v| or(v));
        group.bench_function(format!("{n}_leaves_or"), |b| {
            b.iter(|| {
                let scope = RequestScope::new(1_u64);
                rt.block_on(Evaluator::new().evaluate(black_box(&any), &field, &scope))
            });
        });
    }

    group.finish();
}

fn bench_cache_modes(c: &mut Criterion) {
    let rt = runtime();
    let field = FieldRequest::new("Post", "body")
        .parent(serde_json::json!({ "id": 17, "author": "ada" }))
        .args(serde_json::json!({ "format": "html" }));
    let mut group = c.benchmark_group("cache_hit");

    for (label, mode) in [
        ("contextual", CacheMode::Contextual),
        ("strict", CacheMode::Strict),
        ("none", CacheMode::None),
    ] {
        let r = build_rule(20, mode, |v| and(v));
        let scope = RequestScope::new(1_u64);
        let _ = rt.block_on(Evaluator::new().evaluate(&r, &field, &scope));

        group.bench_function(label, |b| {
            b.iter(|| rt.block_on(Evaluator::new().evaluate(black_box(&r), &field, &scope)));
        });
    }

    group.finish();
}

fn bench_compilation(c: &mut Criterion) {
    let mut group = c.benchmark_group("compilation");

    for &n in &[5, 20, 50] {
        let mut registry = RuleRegistry::new();
        let mut policy = String::from("default deny\n");
        for i in 0..n {
            registry = registry.register(rule(&format!("r{i}")).check_sync(|_: &RuleInput<u64>| true));
            policy.push_str(&format!("Query.f{i}: r{i} AND NOT r{}\n", (i + 1) % n));
        }

        group.bench_function(format!("{n}_fields_dsl"), |b| {
            b.iter(|| RuleTree::from_dsl(black_box(&policy), &registry).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_evaluate, bench_cache_modes, bench_compilation);
criterion_main!(benches);
