//! Performance benchmarks for entity extraction and classification, the two
//! pure functions on the hot ingestion path.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use memgraph::classify::classify;
use memgraph::extract::extract;

const SHORT_TEXT: &str = "Yesterday we decided to use FastAPI for the new service";
const LONG_TEXT: &str = "Mr. John Smith and Jane Doe met yesterday at Acme Corp in San Francisco \
    to discuss the #project-apollo migration. We decided to use Rust, PostgreSQL, and Docker, \
    and agreed that Jane would always prefer tabs over spaces. The plan feels solid so far: \
    first provision the database, then deploy the API, then roll out Kubernetes.";

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");
    group.throughput(Throughput::Bytes(SHORT_TEXT.len() as u64));
    group.bench_function("short_text", |b| b.iter(|| black_box(extract(SHORT_TEXT))));

    group.throughput(Throughput::Bytes(LONG_TEXT.len() as u64));
    group.bench_function("long_text", |b| b.iter(|| black_box(extract(LONG_TEXT))));
    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    group.throughput(Throughput::Bytes(SHORT_TEXT.len() as u64));
    group.bench_function("short_text", |b| b.iter(|| black_box(classify(SHORT_TEXT))));

    group.throughput(Throughput::Bytes(LONG_TEXT.len() as u64));
    group.bench_function("long_text", |b| b.iter(|| black_box(classify(LONG_TEXT))));
    group.finish();
}

criterion_group!(benches, bench_extract, bench_classify);
criterion_main!(benches);
