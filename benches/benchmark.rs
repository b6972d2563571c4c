use std::hint::black_box;

use chrono::Utc;
use criterion::{criterion_group, criterion_main, Criterion};

use msgsearch::engine::Engine;
use msgsearch::functor::Notice;
use msgsearch::lattice::{LatticeBuilder, LatticeConfig};

// every tenth message mentions "needle", so most windows are mixed
fn engine(count: u64) -> Engine {
    let engine = Engine::new(LatticeConfig::default());
    for number in 1..=count {
        let text = if number % 10 == 0 { "needle in hay" } else { "only hay" };
        engine.notify(&Notice::MessagePosted {
            number,
            bout: number % 100 + 1,
            author: format!("urn:test:{}", number % 7),
            text: text.to_string(),
            date: Utc::now(),
        });
    }
    engine
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let config = LatticeConfig::default();
    for count in [1_000u64, 100_000, 1_000_000] {
        let numbers: Vec<u64> = (1..=count).rev().step_by(3).collect();
        c.bench_function(&format!("fill {}", count), |b| {
            b.iter(|| LatticeBuilder::new(config).fill(black_box(&numbers)).build())
        });
    }

    let engine = engine(20_000);
    c.bench_function("matches 20k", |b| {
        b.iter(|| engine.search(black_box(r#"(matches "needle")"#)))
    });
    c.bench_function("limit and not 20k", |b| {
        b.iter(|| {
            engine.search(black_box(
                r#"(limit 20 (and (not (matches "needle")) (equal $author.name "urn:test:3")))"#,
            ))
        })
    });
    c.bench_function("bundled 20k", |b| {
        b.iter(|| engine.search(black_box("(bundled)")))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
