//! Benchmarks for the vector index and scope engine.
//!
//! Run with: cargo bench -p mnemo-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mnemo_core::embeddings::cosine_similarity;
use mnemo_core::scope;
use mnemo_core::vector::{VectorIndex, VectorIndexConfig};

fn unit_vector(seed: f32, dim: usize) -> Vec<f32> {
    let raw: Vec<f32> = (0..dim).map(|i| ((i as f32 + seed) / dim as f32).sin()).collect();
    let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    raw.iter().map(|x| x / norm.max(1e-9)).collect()
}

fn bench_vector_query(c: &mut Criterion) {
    let dim = 256;
    let mut index = VectorIndex::with_config(VectorIndexConfig::new(dim)).unwrap();
    for i in 0..2000 {
        let vector = unit_vector(i as f32, dim);
        index.upsert(&format!("mem-{i}"), &vector, "work/notes").unwrap();
    }
    let query = unit_vector(42.0, dim);
    let filter = scope::ScopeFilter::Any;

    c.bench_function("vector_index_query_any_2000", |b| {
        b.iter(|| {
            black_box(index.query(&query, 10, &filter).unwrap());
        })
    });
}

fn bench_vector_query_prefix_filtered(c: &mut Criterion) {
    let dim = 256;
    let mut index = VectorIndex::with_config(VectorIndexConfig::new(dim)).unwrap();
    for i in 0..2000 {
        let vector = unit_vector(i as f32, dim);
        let scope = if i % 10 == 0 { "work/keep".to_string() } else { "session/tmp".to_string() };
        index.upsert(&format!("mem-{i}"), &vector, &scope).unwrap();
    }
    let query = unit_vector(42.0, dim);
    let filter = scope::ScopeFilter::Prefix(scope::parse("work").unwrap());

    c.bench_function("vector_index_query_prefix_10pct_match", |b| {
        b.iter(|| {
            black_box(index.query(&query, 10, &filter).unwrap());
        })
    });
}

fn bench_cosine_similarity(c: &mut Criterion) {
    let a = unit_vector(1.0, 256);
    let b = unit_vector(2.0, 256);
    c.bench_function("cosine_similarity_256d", |bencher| {
        bencher.iter(|| black_box(cosine_similarity(&a, &b)));
    });
}

fn bench_scope_canonicalisation(c: &mut Criterion) {
    c.bench_function("scope_canonical", |b| {
        b.iter(|| black_box(scope::canonical("/work/notes/2026/").unwrap()));
    });
}

criterion_group!(
    benches,
    bench_vector_query,
    bench_vector_query_prefix_filtered,
    bench_cosine_similarity,
    bench_scope_canonicalisation,
);
criterion_main!(benches);
