use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use pricepilot_analytics::{ForecastPolicy, PriceAnalysis, ScoringPolicy, forecast, propose};
use pricepilot_catalog::{Product, SalesTotals};
use pricepilot_core::{Money, ProductId};

/// A catalog slice with a spread of stock runways and trends.
fn catalog(n: usize) -> Vec<PriceAnalysis> {
    let policy = ForecastPolicy::default();
    (0..n)
        .map(|i| {
            let i = i as i64;
            let product = Product::new(
                ProductId::new(i),
                format!("SKU-{i}"),
                format!("Product {i}"),
                Money::from_major(300 + (i % 50) * 97),
                Money::from_major(150 + (i % 30) * 20),
            )
            .expect("valid product");
            let sold = (i * 7) % 120;
            let f = forecast(&product, (i * 13) % 400, sold, &policy);
            let trend = ((i % 17) as f64 - 8.0) * 9.0;
            PriceAnalysis::new(&product, &f, SalesTotals { quantity: sold, revenue: Money::ZERO }, trend)
        })
        .collect()
}

fn bench_propose_batch(c: &mut Criterion) {
    let policy = ScoringPolicy::default();
    let mut group = c.benchmark_group("propose_batch");

    for size in [100usize, 1_000, 10_000] {
        let analyses = catalog(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &analyses, |b, analyses| {
            b.iter(|| {
                let emitted = analyses
                    .iter()
                    .filter_map(|a| propose(black_box(a), &policy))
                    .count();
                black_box(emitted)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_propose_batch);
criterion_main!(benches);
