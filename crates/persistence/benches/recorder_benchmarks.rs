use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chronicle_core::AggregateId;
use chronicle_persistence::{
    AggregateRecorder, ApplicationRecorder, EventSelect, InMemoryApplicationRecorder, StoredItem,
};

fn item(id: AggregateId, version: u64) -> StoredItem {
    StoredItem {
        originator_id: id,
        originator_version: version,
        topic: "bench.event".to_string(),
        state: br#"{"amount":10,"currency":"EUR"}"#.to_vec(),
    }
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_events");
    for batch_size in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &batch_size| {
                b.iter_batched(
                    || {
                        let id = AggregateId::new();
                        (1..=batch_size as u64).map(|v| item(id, v)).collect::<Vec<_>>()
                    },
                    |items| {
                        let recorder = InMemoryApplicationRecorder::new();
                        recorder.insert_events(black_box(&items)).unwrap()
                    },
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }
    group.finish();
}

fn bench_select(c: &mut Criterion) {
    let recorder = InMemoryApplicationRecorder::new();
    let id = AggregateId::new();
    let items: Vec<StoredItem> = (1..=1000).map(|v| item(id, v)).collect();
    recorder.insert_events(&items).unwrap();

    c.bench_function("select_events_full_stream", |b| {
        b.iter(|| {
            recorder
                .select_events(black_box(id), &EventSelect::all())
                .unwrap()
        })
    });

    c.bench_function("select_notifications_section", |b| {
        b.iter(|| recorder.select_notifications(black_box(500), 10).unwrap())
    });
}

criterion_group!(benches, bench_insert, bench_select);
criterion_main!(benches);
