// Benchmarks for the policy rule evaluator (C5).
// Run: cargo bench --package identity_service_core --bench policy_eval_benchmarks

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use identity_service_core::model::{Effect, Policy, PolicyRule};
use identity_service_core::policy_eval::{evaluate, EvalContext};
use shared_types::{Principal, Scope};
use uuid::Uuid;

fn make_policy(priority: i32, allow: bool) -> Policy {
    let now = Utc::now();
    Policy {
        id: Uuid::new_v4(),
        tenant_id: Some(Uuid::new_v4()),
        role: "user".to_string(),
        rule: sqlx::types::Json(PolicyRule {
            actions: vec!["read".to_string(), "write".to_string()],
            resource: "memory".to_string(),
            effect: if allow { Effect::Allow } else { Effect::Deny },
            conditions: None,
        }),
        description: None,
        priority,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_evaluate");
    let principal = Principal {
        identity_id: Uuid::new_v4(),
        scope: Scope::Tenant(Uuid::new_v4()),
        role: "user".to_string(),
        claims: serde_json::Value::Null,
    };
    let ctx = EvalContext::default();
    let now = Utc::now();

    for size in [1usize, 10, 100] {
        let policies: Vec<Policy> = (0..size).map(|i| make_policy(i as i32, i == size - 1)).collect();
        group.bench_with_input(BenchmarkId::new("ruleset_size", size), &policies, |b, policies| {
            b.iter(|| evaluate(black_box(policies), &principal, "write", "memory", &ctx, now));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_evaluate);
criterion_main!(benches);
