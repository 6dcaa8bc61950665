//! Engine-level tests against the in-memory backend.
//!
//! These cover the cross-component properties: allocation atomicity under
//! concurrency, sequencer uniqueness, payment reconciliation, and
//! all-or-nothing order creation.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;

use printdesk_core::{ClientId, EngineError, Length, Money, OrderId};
use printdesk_orders::{
    AllocationPolicies, CostComponent, LineItem, NewOrder, OrderLedger, OrderStatus,
    ReceiptSequencer, WorkType,
};
use printdesk_payments::{
    NewPayment, PartialPayment, PaymentMethod, PaymentReconciler, PaymentStatus,
};
use printdesk_rolls::{
    AllocationRequest, InstallRoll, MaterialType, RollAllocator, RollStore, UsageKind,
};

use crate::memory::InMemoryEngine;

fn engine() -> Arc<InMemoryEngine> {
    Arc::new(InMemoryEngine::new(
        AllocationPolicies::print_shop_defaults().unwrap(),
    ))
}

fn dtf() -> MaterialType {
    MaterialType::new("DTF").unwrap()
}

async fn install_roll(engine: &InMemoryEngine, number: u32, total_hundredths: i64) {
    engine
        .install(InstallRoll {
            material_type: dtf(),
            roll_number: number,
            total_length: Length::from_hundredths(total_hundredths),
            notes: None,
            recorded_by: "operator".to_string(),
        })
        .await
        .unwrap();
}

fn allocation_request(required_hundredths: i64) -> AllocationRequest {
    AllocationRequest {
        material_type: dtf(),
        required_length: Length::from_hundredths(required_hundredths),
        order_id: None,
        recorded_by: "operator".to_string(),
        notes: None,
    }
}

fn line(total_cents: i64, material_hundredths: Option<i64>) -> LineItem {
    LineItem {
        description: "print run".to_string(),
        print: Some(CostComponent {
            quantity: 1,
            unit_cost: Money::from_hundredths(total_cents),
        }),
        pressing: None,
        badge: None,
        material_length: material_hundredths.map(Length::from_hundredths),
    }
}

fn order_for(work_type: &str, items: Vec<LineItem>) -> NewOrder {
    NewOrder {
        client_id: ClientId::new(),
        client_name: "Club Atlético".to_string(),
        work_type: WorkType::new(work_type).unwrap(),
        items,
        mark_paid: false,
        initial_payment_method: None,
        requested_roll: None,
        notes: None,
        created_by: "front-desk".to_string(),
    }
}

async fn pay(engine: &InMemoryEngine, order_id: OrderId, cents: i64) -> PartialPayment {
    engine
        .record_payment(NewPayment {
            order_id,
            amount: Money::from_hundredths(cents),
            method: PaymentMethod::Cash,
            bank: None,
            receipt_reference: None,
            notes: None,
            recorded_by: "cashier".to_string(),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn fifo_allocation_deducts_from_lowest_numbered_roll() {
    let engine = engine();
    install_roll(&engine, 1, 200).await;
    install_roll(&engine, 2, 5_000).await;
    install_roll(&engine, 3, 5_000).await;

    let allocation = engine.allocate(allocation_request(200)).await.unwrap();
    assert_eq!(allocation.roll_number, 1);
    assert_eq!(allocation.remaining, Length::ZERO);

    let roll2 = RollStore::get(engine.as_ref(), &dtf(), 2).await.unwrap();
    assert_eq!(roll2.available_length, Length::from_hundredths(5_000));
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_allocations_never_double_spend() {
    let engine = engine();
    install_roll(&engine, 1, 1_000).await;

    let a = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.allocate(allocation_request(600)).await })
    };
    let b = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.allocate(allocation_request(600)).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one allocation must win");
    assert!(results.iter().any(|r| matches!(
        r,
        Err(EngineError::InsufficientStock { .. })
    )));

    let roll = RollStore::get(engine.as_ref(), &dtf(), 1).await.unwrap();
    assert_eq!(roll.available_length, Length::from_hundredths(400));
    assert!(roll.bounds_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_receipt_numbers_are_distinct() {
    let engine = engine();
    let day = NaiveDate::from_ymd_opt(2025, 4, 17).unwrap();

    let mut handles = Vec::new();
    for _ in 0..1_000 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move { engine.next(day).await.unwrap() }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        let receipt = handle.await.unwrap();
        assert!(receipt.as_str().starts_with("250417"));
        assert!(seen.insert(receipt), "duplicate receipt number issued");
    }
    assert_eq!(seen.len(), 1_000);
}

#[tokio::test]
async fn sequence_resets_when_the_date_prefix_changes() {
    let engine = engine();
    let day1 = NaiveDate::from_ymd_opt(2025, 4, 17).unwrap();
    let day2 = NaiveDate::from_ymd_opt(2025, 4, 18).unwrap();

    assert_eq!(engine.next(day1).await.unwrap().as_str(), "2504170001");
    assert_eq!(engine.next(day1).await.unwrap().as_str(), "2504170002");
    assert_eq!(engine.next(day2).await.unwrap().as_str(), "2504180001");
}

#[tokio::test]
async fn reversal_restores_partial_status() {
    let engine = engine();
    let order = engine
        .create_order(order_for("EMBROIDERY", vec![line(10_000, None)]))
        .await
        .unwrap();

    pay(&engine, order.id, 3_000).await;
    let forty = pay(&engine, order.id, 4_000).await;
    pay(&engine, order.id, 3_000).await;

    let order = engine.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.amount_paid, Money::from_hundredths(10_000));

    engine.reverse_payment(forty.id).await.unwrap();

    let order = engine.get_order(order.id).await.unwrap();
    assert_eq!(order.amount_paid, Money::from_hundredths(6_000));
    assert_eq!(order.payment_status, PaymentStatus::Partial);
    assert_eq!(engine.payments_for_order(order.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn overpayment_is_rejected_with_the_maximum() {
    let engine = engine();
    let order = engine
        .create_order(order_for("EMBROIDERY", vec![line(10_000, None)]))
        .await
        .unwrap();
    pay(&engine, order.id, 8_000).await;

    let err = engine
        .record_payment(NewPayment {
            order_id: order.id,
            amount: Money::from_hundredths(3_000),
            method: PaymentMethod::Card,
            bank: None,
            receipt_reference: None,
            notes: None,
            recorded_by: "cashier".to_string(),
        })
        .await
        .unwrap_err();

    assert_eq!(
        err,
        EngineError::Overpayment {
            max_acceptable: Money::from_hundredths(2_000)
        }
    );

    let order = engine.get_order(order.id).await.unwrap();
    assert_eq!(order.amount_paid, Money::from_hundredths(8_000));
}

#[tokio::test]
async fn amount_paid_always_equals_the_sum_of_surviving_payments() {
    let engine = engine();
    let order = engine
        .create_order(order_for("EMBROIDERY", vec![line(20_000, None)]))
        .await
        .unwrap();

    let p1 = pay(&engine, order.id, 5_000).await;
    pay(&engine, order.id, 2_500).await;
    engine.reverse_payment(p1.id).await.unwrap();
    pay(&engine, order.id, 1_000).await;

    let order = engine.get_order(order.id).await.unwrap();
    let payments = engine.payments_for_order(order.id).await.unwrap();
    let sum: i64 = payments.iter().map(|p| p.amount.hundredths()).sum();
    assert_eq!(order.amount_paid.hundredths(), sum);
    assert_eq!(
        order.payment_status,
        PaymentStatus::classify(order.amount_paid, order.total)
    );
}

#[tokio::test]
async fn install_after_depletion_resets_but_keeps_history() {
    let engine = engine();
    install_roll(&engine, 1, 1_000).await;
    engine.allocate(allocation_request(1_000)).await.unwrap();

    install_roll(&engine, 1, 10_000).await;

    let roll = RollStore::get(engine.as_ref(), &dtf(), 1).await.unwrap();
    assert_eq!(roll.available_length, Length::from_hundredths(10_000));
    assert_eq!(roll.used_length(), Length::ZERO);

    let history = engine.usage_history(&dtf(), 1).await.unwrap();
    let kinds: Vec<UsageKind> = history.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![UsageKind::Install, UsageKind::Consumption, UsageKind::Install]
    );
    assert_eq!(history[1].amount, Length::from_hundredths(1_000));
}

#[tokio::test]
async fn reset_requires_an_existing_roll() {
    let engine = engine();
    let err = engine
        .reset(InstallRoll {
            material_type: dtf(),
            roll_number: 9,
            total_length: Length::from_hundredths(100),
            notes: None,
            recorded_by: "operator".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn failed_allocation_leaves_no_order_behind() {
    let engine = engine();
    install_roll(&engine, 1, 100).await;

    let err = engine
        .create_order(order_for("DTF_PRINT", vec![line(10_000, Some(500))]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientStock { .. }));

    assert!(engine.list_orders().await.unwrap().is_empty());
    let roll = RollStore::get(engine.as_ref(), &dtf(), 1).await.unwrap();
    assert_eq!(roll.available_length, Length::from_hundredths(100));
}

#[tokio::test]
async fn order_creation_consumes_material_and_records_initial_payment() {
    let engine = engine();
    install_roll(&engine, 1, 1_000).await;

    let mut new_order = order_for("DTF_PRINT", vec![line(15_000, Some(300))]);
    new_order.mark_paid = true;
    new_order.initial_payment_method = Some(PaymentMethod::Transfer);

    let order = engine.create_order(new_order).await.unwrap();
    assert_eq!(order.total, Money::from_hundredths(15_000));
    assert_eq!(order.amount_paid, Money::from_hundredths(15_000));
    assert_eq!(order.payment_status, PaymentStatus::Paid);

    let payments = engine.payments_for_order(order.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].method, PaymentMethod::Transfer);

    let roll = RollStore::get(engine.as_ref(), &dtf(), 1).await.unwrap();
    assert_eq!(roll.available_length, Length::from_hundredths(700));

    let history = engine.usage_history(&dtf(), 1).await.unwrap();
    assert_eq!(history.last().unwrap().order_id, Some(order.id));
}

#[tokio::test]
async fn operator_selected_material_requires_a_roll_number() {
    let engine = engine();
    engine
        .install(InstallRoll {
            material_type: MaterialType::new("SUBLIM").unwrap(),
            roll_number: 4,
            total_length: Length::from_hundredths(2_000),
            notes: None,
            recorded_by: "operator".to_string(),
        })
        .await
        .unwrap();

    let without_roll = order_for("SUBLIMATION", vec![line(5_000, Some(400))]);
    let err = engine.create_order(without_roll).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let mut with_roll = order_for("SUBLIMATION", vec![line(5_000, Some(400))]);
    with_roll.requested_roll = Some(4);
    engine.create_order(with_roll).await.unwrap();

    let roll = RollStore::get(engine.as_ref(), &MaterialType::new("SUBLIM").unwrap(), 4)
        .await
        .unwrap();
    assert_eq!(roll.available_length, Length::from_hundredths(1_600));
}

#[tokio::test]
async fn editing_items_recomputes_total_but_not_payment_fields() {
    let engine = engine();
    let order = engine
        .create_order(order_for("EMBROIDERY", vec![line(10_000, None)]))
        .await
        .unwrap();
    pay(&engine, order.id, 5_000).await;

    let updated = engine
        .update_items(order.id, vec![line(20_000, None)])
        .await
        .unwrap();
    assert_eq!(updated.total, Money::from_hundredths(20_000));
    assert_eq!(updated.amount_paid, Money::from_hundredths(5_000));
    assert_eq!(updated.payment_status, PaymentStatus::Partial);
}

#[tokio::test]
async fn cancelled_orders_reject_payments_but_allow_reversal() {
    let engine = engine();
    let order = engine
        .create_order(order_for("EMBROIDERY", vec![line(10_000, None)]))
        .await
        .unwrap();
    let payment = pay(&engine, order.id, 4_000).await;

    let cancelled = engine.cancel_order(order.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    let err = engine
        .record_payment(NewPayment {
            order_id: order.id,
            amount: Money::from_hundredths(1_000),
            method: PaymentMethod::Cash,
            bank: None,
            receipt_reference: None,
            notes: None,
            recorded_by: "cashier".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    engine.reverse_payment(payment.id).await.unwrap();
    let order = engine.get_order(order.id).await.unwrap();
    assert_eq!(order.amount_paid, Money::ZERO);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn completed_orders_still_accept_payments_but_not_edits() {
    let engine = engine();
    let order = engine
        .create_order(order_for("EMBROIDERY", vec![line(10_000, None)]))
        .await
        .unwrap();
    pay(&engine, order.id, 4_000).await;

    let completed = engine.complete_order(order.id).await.unwrap();
    assert_eq!(completed.status, OrderStatus::Completed);

    // Outstanding balance can still be collected after production is done.
    pay(&engine, order.id, 6_000).await;
    let order = engine.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);

    let err = engine
        .update_items(order.id, vec![line(5_000, None)])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn cancelling_twice_is_rejected() {
    let engine = engine();
    let order = engine
        .create_order(order_for("EMBROIDERY", vec![line(1_000, None)]))
        .await
        .unwrap();
    engine.cancel_order(order.id).await.unwrap();
    assert!(engine.cancel_order(order.id).await.is_err());
}

#[tokio::test]
async fn availability_check_is_advisory_only() {
    let engine = engine();
    install_roll(&engine, 1, 500).await;

    let check = engine
        .check_availability(&dtf(), 1, Length::from_hundredths(400))
        .await
        .unwrap();
    assert!(check.sufficient);

    // A racing allocation can invalidate the answer before the caller acts.
    engine.allocate(allocation_request(300)).await.unwrap();
    let err = engine
        .allocate_from_roll(1, allocation_request(400))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientStock { .. }));
}
