use criterion::{Criterion, criterion_group, criterion_main};
use messaging::{Event, EventBus, InMemoryBus};

fn sample_event() -> Event {
    Event::initiate(
        "order.created",
        "order-service",
        [("customer", "sample-customer"), ("amount", "99.99")],
    )
}

fn bench_encode(c: &mut Criterion) {
    let event = sample_event();

    c.bench_function("event/encode", |b| {
        b.iter(|| event.encode().unwrap());
    });
}

fn bench_decode(c: &mut Criterion) {
    let bytes = sample_event().encode().unwrap();

    c.bench_function("event/decode", |b| {
        b.iter(|| Event::decode(&bytes).unwrap());
    });
}

fn bench_in_memory_publish(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bus = InMemoryBus::new();
    let event = sample_event();

    c.bench_function("bus/in_memory_publish", |b| {
        b.iter(|| {
            rt.block_on(async {
                bus.publish("order.created", &event).await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_in_memory_publish);
criterion_main!(benches);
