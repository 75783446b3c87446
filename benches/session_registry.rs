//! Benchmarks for the per-request hot paths
//!
//! Covers session lookup and recording, the expiry sweep scan, and the two
//! cheap synchronous helpers every request touches (label coercion and
//! chunk hashing).

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use support_router::agents::Supervisor;
use support_router::config::SessionConfig;
use support_router::retrieval::{ChunkCategory, ContextChunk};
use support_router::session::{SessionRegistry, TurnRole};

fn registry_with_sessions(count: usize) -> (SessionRegistry, Vec<String>) {
    let registry = SessionRegistry::new(&SessionConfig::default());
    let ids = (0..count)
        .map(|_| registry.resolve(None, None).0.id.clone())
        .collect();
    (registry, ids)
}

fn bench_resolve_known_id(c: &mut Criterion) {
    let (registry, ids) = registry_with_sessions(10_000);
    let id = ids[ids.len() / 2].clone();

    c.bench_function("resolve_known_id_10k_sessions", |bench| {
        bench.iter(|| {
            let (handle, is_new) = registry.resolve(Some(black_box(&id)), None);
            assert!(!is_new);
            black_box(handle);
        });
    });
}

fn bench_record_exchange_at_window(c: &mut Criterion) {
    let registry = SessionRegistry::new(&SessionConfig::default());
    let (handle, _) = registry.resolve(None, None);
    let mut state = handle.state.try_lock().unwrap();

    // fill to the window so every further push also drains
    for i in 0..10 {
        registry.record_exchange(&mut state, TurnRole::User, &format!("warm {i}"));
    }

    c.bench_function("record_exchange_full_window", |bench| {
        bench.iter(|| {
            registry.record_exchange(
                &mut state,
                TurnRole::User,
                black_box("how do I update my payment method?"),
            );
        });
    });
}

fn bench_sweep_scan_no_expiry(c: &mut Criterion) {
    let (registry, _ids) = registry_with_sessions(10_000);

    c.bench_function("sweep_scan_10k_live_sessions", |bench| {
        bench.iter(|| {
            let removed = registry.sweep_expired(chrono::Duration::minutes(30));
            assert_eq!(removed, 0);
        });
    });
}

fn bench_coerce_label(c: &mut Criterion) {
    c.bench_function("coerce_decorated_label", |bench| {
        bench.iter(|| Supervisor::coerce_label(black_box("  \"Billing Support\".  ")));
    });

    c.bench_function("coerce_free_text_label", |bench| {
        bench.iter(|| {
            Supervisor::coerce_label(black_box(
                "Based on the question, this should go to Technical Support.",
            ))
        });
    });
}

fn bench_chunk_content_hash(c: &mut Criterion) {
    let chunk = ContextChunk::new(
        "kb/billing_faq.md",
        "Refunds are processed within 14 business days of approval. \
         Annual plans are refunded pro rata for the unused months."
            .repeat(8),
        ChunkCategory::Policy,
    );

    c.bench_function("chunk_content_hash", |bench| {
        bench.iter(|| black_box(&chunk).content_hash());
    });
}

criterion_group!(
    benches,
    bench_resolve_known_id,
    bench_record_exchange_at_window,
    bench_sweep_scan_no_expiry,
    bench_coerce_label,
    bench_chunk_content_hash,
);
criterion_main!(benches);
