use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use checklist_filter::item::{Item, LexicalFeatures};
use checklist_filter::prelude::*;
use checklist_filter::scorer::{DEFAULT_THRESHOLD, SerializableItem, score};

const PREFIXES: [&str; 8] = ["North", "South", "East", "West", "New", "Old", "Port", "Lake"];
const STEMS: [&str; 8] = ["spring", "shelby", "ogden", "brock", "haver", "cypress", "capital", "ridge"];
const SUFFIXES: [&str; 4] = ["field", "ville", "ton", " City"];

fn labels(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            format!(
                "{} {}{} {}",
                PREFIXES[i % PREFIXES.len()],
                STEMS[(i / PREFIXES.len()) % STEMS.len()],
                SUFFIXES[i % SUFFIXES.len()],
                i
            )
        })
        .collect()
}

fn items(count: usize) -> Vec<SerializableItem> {
    labels(count)
        .iter()
        .map(|label| Item::new(label.as_str(), LexicalFeatures::new(label, false)).to_serializable())
        .collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    let corpus = items(10_000);
    c.bench_function("substring", |b| {
        b.iter(|| score(black_box(&corpus), black_box("ville"), DEFAULT_THRESHOLD))
    });
    c.bench_function("multi-word", |b| {
        b.iter(|| score(black_box(&corpus), black_box("north spring"), DEFAULT_THRESHOLD))
    });
    c.bench_function("typo", |b| {
        b.iter(|| score(black_box(&corpus), black_box("sprnigfeld"), DEFAULT_THRESHOLD))
    });
    c.bench_function("features", |b| {
        let labels = labels(1_000);
        b.iter(|| {
            labels
                .iter()
                .map(|label| LexicalFeatures::new(black_box(label), true))
                .count()
        })
    });
    c.bench_function("pool", |b| {
        let pool = checklist_filter::pool::WorkerPool::new(4).unwrap();
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        b.iter_batched(
            || ScoreRequest {
                items: corpus.clone(),
                search_term: String::from("ville"),
                score_threshold: DEFAULT_THRESHOLD,
            },
            |request| rt.block_on(pool.submit(request)),
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
