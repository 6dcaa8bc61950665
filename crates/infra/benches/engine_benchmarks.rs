//! Benchmarks for the hot pure paths: FIFO candidate selection and the
//! payment-status classification called on every payment write.

use chrono::Utc;
use criterion::{Criterion, black_box, criterion_group, criterion_main};

use printdesk_core::{Length, Money};
use printdesk_payments::PaymentStatus;
use printdesk_rolls::{InstallRoll, MaterialType, Roll, pick_fifo};

fn build_rolls(count: u32) -> Vec<Roll> {
    let material_type = MaterialType::new("DTF").unwrap();
    (1..=count)
        .map(|number| {
            let spec = InstallRoll {
                material_type: material_type.clone(),
                roll_number: number,
                // Staggered capacities so the pick has to skip candidates.
                total_length: Length::from_hundredths(i64::from(number % 50) * 100),
                notes: None,
                recorded_by: "bench".to_string(),
            };
            Roll::install(&spec, Utc::now())
        })
        .collect()
}

fn bench_pick_fifo(c: &mut Criterion) {
    let rolls = build_rolls(500);
    let required = Length::from_hundredths(2_500);

    c.bench_function("pick_fifo_500_rolls", |b| {
        b.iter(|| pick_fifo(black_box(&rolls), black_box(required)))
    });
}

fn bench_classify(c: &mut Criterion) {
    let total = Money::from_hundredths(125_000);

    c.bench_function("payment_status_classify", |b| {
        b.iter(|| {
            let mut paid = Money::ZERO;
            for step in 0..100i64 {
                paid = Money::from_hundredths(step * 1_250);
                black_box(PaymentStatus::classify(paid, total));
            }
            paid
        })
    });
}

criterion_group!(benches, bench_pick_fifo, bench_classify);
criterion_main!(benches);
