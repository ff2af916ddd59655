//! End-to-end walks through the fulfillment service over the in-memory
//! store: full lifecycles, policy rejections, and revision conflicts.

use domain::{FulfillmentData, FulfillmentError, ItemStatus, ItemType, OrderStatus, PaymentStatus};
use engine::{EngineError, FulfillmentService, PlaceOrder, TransitionRequest};
use outbox::InMemoryLifecycleStore;

fn service() -> FulfillmentService<InMemoryLifecycleStore> {
    FulfillmentService::new(InMemoryLifecycleStore::new())
}

async fn move_item(
    service: &FulfillmentService<InMemoryLifecycleStore>,
    item_id: common::LineItemId,
    to: ItemStatus,
) -> domain::Order {
    service
        .request_transition(TransitionRequest::new(item_id, to, "lifecycle-test"))
        .await
        .unwrap()
}

#[tokio::test]
async fn full_physical_lifecycle_with_refund() {
    let service = service();
    let order = service
        .place_order(PlaceOrder::new(vec![ItemType::Physical]))
        .await
        .unwrap();
    let item_id = order.items[0].id;
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);

    let order = move_item(&service, item_id, ItemStatus::PaymentConfirmed).await;
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.payment_status, PaymentStatus::Paid);

    for step in [
        ItemStatus::Preparing,
        ItemStatus::ReadyToShip,
    ] {
        let order = move_item(&service, item_id, step).await;
        assert_eq!(order.status, OrderStatus::Confirmed);
    }

    let order = service
        .request_transition(
            TransitionRequest::new(item_id, ItemStatus::Shipped, "warehouse")
                .with_fulfillment_data(FulfillmentData::Tracking {
                    carrier: "DHL".to_string(),
                    tracking_number: "JD014600003".to_string(),
                }),
        )
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert!(matches!(
        order.items[0].fulfillment_data,
        Some(FulfillmentData::Tracking { .. })
    ));

    let order = move_item(&service, item_id, ItemStatus::OutForDelivery).await;
    assert_eq!(order.status, OrderStatus::Confirmed);

    let order = move_item(&service, item_id, ItemStatus::Delivered).await;
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.payment_status, PaymentStatus::Paid);

    // A refund request pulls the order back out of Completed until the
    // refund settles.
    let order = move_item(&service, item_id, ItemStatus::RefundRequested).await;
    assert_eq!(order.status, OrderStatus::Confirmed);

    let order = move_item(&service, item_id, ItemStatus::Refunded).await;
    assert_eq!(order.status, OrderStatus::Refunded);
    assert_eq!(order.payment_status, PaymentStatus::Refunded);

    let item_log = service.item_history(item_id).await.unwrap();
    assert_eq!(item_log.len(), 8);
    assert_eq!(item_log[0].from_status, "pending");
    assert_eq!(item_log[7].to_status, "refunded");
    for pair in item_log.windows(2) {
        assert_eq!(pair[0].to_status, pair[1].from_status);
    }

    let order_log = service.order_history(order.id).await.unwrap();
    let order_moves: Vec<(&str, &str)> = order_log
        .iter()
        .map(|row| (row.from_status.as_str(), row.to_status.as_str()))
        .collect();
    assert_eq!(
        order_moves,
        vec![
            ("pending", "confirmed"),
            ("confirmed", "completed"),
            ("completed", "confirmed"),
            ("confirmed", "refunded"),
        ]
    );

    // OrderPlaced, eight item events, four order status events.
    assert_eq!(service.store().event_count().await, 13);
}

#[tokio::test]
async fn digital_item_cannot_cancel_after_access() {
    let service = service();
    let order = service
        .place_order(PlaceOrder::new(vec![ItemType::Digital]))
        .await
        .unwrap();
    let item_id = order.items[0].id;

    move_item(&service, item_id, ItemStatus::PaymentConfirmed).await;
    let order = move_item(&service, item_id, ItemStatus::AccessGranted).await;
    assert_eq!(order.status, OrderStatus::Completed);

    let events_before = service.store().event_count().await;
    let result = service
        .request_transition(TransitionRequest::new(
            item_id,
            ItemStatus::Cancelled,
            "support",
        ))
        .await;
    assert!(matches!(
        result,
        Err(EngineError::Fulfillment(FulfillmentError::InvalidTransition {
            item_type: ItemType::Digital,
            from: ItemStatus::AccessGranted,
            to: ItemStatus::Cancelled,
        }))
    ));

    let reloaded = service.get_order(order.id).await.unwrap();
    assert_eq!(reloaded.status, OrderStatus::Completed);
    assert_eq!(reloaded.items[0].status, ItemStatus::AccessGranted);
    assert_eq!(service.store().event_count().await, events_before);
    assert_eq!(service.item_history(item_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn stale_writer_gets_a_conflict_and_retries() {
    let service = service();
    let order = service
        .place_order(PlaceOrder::new(vec![ItemType::Physical]))
        .await
        .unwrap();
    let item_id = order.items[0].id;

    service.store().inject_commit_conflict();
    let request = TransitionRequest::new(item_id, ItemStatus::PaymentConfirmed, "payments");
    let err = service
        .request_transition(request.clone())
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    // Nothing was written by the losing attempt.
    let item = service.get_line_item(item_id).await.unwrap();
    assert_eq!(item.status, ItemStatus::Pending);
    assert!(service.item_history(item_id).await.unwrap().is_empty());
    assert_eq!(service.store().event_count().await, 1);

    // A retry from a fresh read goes through.
    let order = service.request_transition(request).await.unwrap();
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.items[0].status, ItemStatus::PaymentConfirmed);
}

#[tokio::test]
async fn mixed_order_status_coordination() {
    let service = service();
    let order = service
        .place_order(PlaceOrder::new(vec![
            ItemType::Physical,
            ItemType::Digital,
            ItemType::Service,
        ]))
        .await
        .unwrap();
    let physical = order.items[0].id;
    let digital = order.items[1].id;
    let service_item = order.items[2].id;

    // One item moving puts the order in Processing; it stays there until no
    // item is still pending.
    let order = move_item(&service, physical, ItemStatus::PaymentConfirmed).await;
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.payment_status, PaymentStatus::Pending);

    let order = move_item(&service, digital, ItemStatus::PaymentConfirmed).await;
    assert_eq!(order.status, OrderStatus::Processing);

    let order = move_item(&service, service_item, ItemStatus::PaymentConfirmed).await;
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.payment_status, PaymentStatus::Paid);

    // A move that leaves the order status alone writes the item audit row
    // and event but no order-level row.
    let order_rows = service.order_history(order.id).await.unwrap().len();
    let events = service.store().event_count().await;
    let order = move_item(&service, physical, ItemStatus::Preparing).await;
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(service.order_history(order.id).await.unwrap().len(), order_rows);
    assert_eq!(service.store().event_count().await, events + 1);

    for step in [
        ItemStatus::ReadyToShip,
        ItemStatus::Shipped,
        ItemStatus::OutForDelivery,
        ItemStatus::Delivered,
    ] {
        move_item(&service, physical, step).await;
    }
    let order = move_item(&service, digital, ItemStatus::AccessGranted).await;
    assert_eq!(order.status, OrderStatus::Confirmed);

    for step in [
        ItemStatus::BookingConfirmed,
        ItemStatus::ReminderSent,
        ItemStatus::InProgress,
    ] {
        move_item(&service, service_item, step).await;
    }
    let order = move_item(&service, service_item, ItemStatus::Completed).await;
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.payment_status, PaymentStatus::Paid);

    // Refunding one of three items leaves the rest fulfilled and marks the
    // order and payment partially refunded.
    move_item(&service, physical, ItemStatus::RefundRequested).await;
    let order = move_item(&service, physical, ItemStatus::Refunded).await;
    assert_eq!(order.status, OrderStatus::PartiallyRefunded);
    assert_eq!(order.payment_status, PaymentStatus::PartiallyRefunded);

    let order_log = service.order_history(order.id).await.unwrap();
    let order_moves: Vec<(&str, &str)> = order_log
        .iter()
        .map(|row| (row.from_status.as_str(), row.to_status.as_str()))
        .collect();
    assert_eq!(
        order_moves,
        vec![
            ("pending", "processing"),
            ("processing", "confirmed"),
            ("confirmed", "completed"),
            ("completed", "confirmed"),
            ("confirmed", "partially_refunded"),
        ]
    );
}

#[tokio::test]
async fn empty_order_stays_pending() {
    let service = service();
    let order = service.place_order(PlaceOrder::new(vec![])).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(order.items.is_empty());

    let loaded = service.get_order(order.id).await.unwrap();
    assert_eq!(loaded.status, OrderStatus::Pending);
    assert_eq!(service.store().event_count().await, 1);
}
