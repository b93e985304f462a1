//! Performance benchmarks for winner selection and batch chunking

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use cyclepay::core::chunking::build_chunks;
use cyclepay::core::selection::{select_winners, SelectionRequest, TierSettings};
use cyclepay::model::{BatchId, EligibleMember, SelectionMode, Tier, UserId};
use cyclepay::testing::fixtures::sealed_selection;
use std::hint::black_box;
use std::time::Duration;

/// Members spread across the three tiers with varied points
fn create_members(size: usize) -> Vec<EligibleMember> {
    (0..size)
        .map(|i| EligibleMember {
            user_id: UserId::new(format!("user-{:06}", i)),
            tier: Tier::ALL[i % Tier::ALL.len()],
            points: ((i * 7919) % 5000) as u64,
            destination: Some(format!("user-{:06}@example.com", i)),
        })
        .collect()
}

fn request(mode: SelectionMode) -> SelectionRequest {
    Tier::ALL.iter().fold(SelectionRequest::new(mode), |req, tier| {
        req.with_tier(
            *tier,
            TierSettings {
                winner_percentage: Some(10.0),
                tier_pool_size: 1_000_000,
                payout_percentage: 1.0,
                ..Default::default()
            },
        )
    })
}

fn bench_select_winners(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_winners");
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(5));

    for size in [100, 1_000, 10_000].iter() {
        let members = create_members(*size);
        for mode in [
            SelectionMode::TopPerformers,
            SelectionMode::Random,
            SelectionMode::WeightedRandom,
        ] {
            let req = request(mode);
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", mode), size),
                &members,
                |b, members| b.iter(|| select_winners(black_box(members), &req, 42)),
            );
        }
    }

    group.finish();
}

fn bench_build_chunks(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_chunks");
    let batch_id = BatchId::new("bench-batch");

    for size in [100, 1_000, 5_000].iter() {
        let selection = sealed_selection("bench", *size);
        group.bench_with_input(
            BenchmarkId::from_parameter(size),
            &selection.winners,
            |b, winners| b.iter(|| build_chunks(&batch_id, black_box(winners), 50)),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_select_winners, bench_build_chunks);
criterion_main!(benches);
