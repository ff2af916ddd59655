use chrono::Utc;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{ItemStatus, ItemType, LineItem, Order, derive_order_status};
use serde_json::json;

const PHYSICAL_PATH: [ItemStatus; 6] = [
    ItemStatus::PaymentConfirmed,
    ItemStatus::Preparing,
    ItemStatus::ReadyToShip,
    ItemStatus::Shipped,
    ItemStatus::OutForDelivery,
    ItemStatus::Delivered,
];

fn bench_single_transition(c: &mut Criterion) {
    let item = LineItem::new(common::OrderId::new(), ItemType::Physical);
    let now = Utc::now();

    c.bench_function("domain/single_transition", |b| {
        b.iter(|| {
            item.transition(ItemStatus::PaymentConfirmed, "bench", None, json!({}), now)
                .unwrap()
        });
    });
}

fn bench_full_physical_path(c: &mut Criterion) {
    let now = Utc::now();

    c.bench_function("domain/full_physical_path", |b| {
        b.iter(|| {
            let mut item = LineItem::new(common::OrderId::new(), ItemType::Physical);
            for step in PHYSICAL_PATH {
                item = item.transition(step, "bench", None, json!({}), now).unwrap();
            }
            item
        });
    });
}

fn bench_order_status_derivation(c: &mut Criterion) {
    let now = Utc::now();
    let mut order = Order::new(
        vec![ItemType::Physical, ItemType::Digital, ItemType::Service],
        now,
    );
    let moved = order.items[0]
        .transition(ItemStatus::PaymentConfirmed, "bench", None, json!({}), now)
        .unwrap();
    order.replace_item(moved);

    c.bench_function("domain/derive_order_status", |b| {
        b.iter(|| derive_order_status(&order.items));
    });
}

criterion_group!(
    benches,
    bench_single_transition,
    bench_full_physical_path,
    bench_order_status_derivation
);
criterion_main!(benches);
