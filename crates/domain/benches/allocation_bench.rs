use chrono::NaiveDate;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use domain::{Batch, OrderLine, Product};

fn product_with_batches(count: usize) -> Product {
    let batches = (0..count)
        .map(|i| {
            let eta = NaiveDate::from_ymd_opt(2025, 1, 1)
                .and_then(|d| d.checked_add_days(chrono::Days::new(i as u64)));
            Batch::new(format!("batch-{i:04}"), "BENCH-SKU", 1_000_000, eta)
        })
        .collect();
    Product::new("BENCH-SKU", batches)
}

fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("domain/allocate");
    for count in [1, 10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut product = product_with_batches(count);
            let mut n = 0u64;
            b.iter(|| {
                n += 1;
                product.allocate(OrderLine::new(format!("order-{n}"), "BENCH-SKU", 1));
                product.take_messages();
            });
        });
    }
    group.finish();
}

fn bench_out_of_stock(c: &mut Criterion) {
    let mut product = product_with_batches(50);
    c.bench_function("domain/allocate_out_of_stock", |b| {
        b.iter(|| {
            product.allocate(OrderLine::new("order", "BENCH-SKU", 2_000_000));
            product.take_messages();
        });
    });
}

fn bench_change_batch_quantity(c: &mut Criterion) {
    c.bench_function("domain/change_batch_quantity_bump_100", |b| {
        b.iter_batched(
            || {
                let mut product = Product::new(
                    "BENCH-SKU",
                    vec![Batch::new("batch-0000", "BENCH-SKU", 100, None)],
                );
                for i in 0..100 {
                    product.allocate(OrderLine::new(format!("order-{i}"), "BENCH-SKU", 1));
                }
                product.take_messages();
                product
            },
            |mut product| {
                product
                    .change_batch_quantity(&"batch-0000".into(), 0)
                    .unwrap();
                product
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_allocate,
    bench_out_of_stock,
    bench_change_batch_quantity,
);
criterion_main!(benches);
