// Ledger benchmarks for the Tidepool protocol.
//
// Covers unit pricing, deposits routed across strategies, queue watermark
// bookkeeping, and claim validation over growing pending lists.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use parking_lot::RwLock;

use tidepool_protocol::vault::{AllocationEntry, WithdrawalQueue};
use tidepool_protocol::{
    AssetTransfer, InMemoryAsset, ManualClock, RedeemableStrategy, Strategy, StrategyError,
    Vault, VaultConfig,
};

/// 1:1 share vault; enough to exercise routing.
struct Passthrough {
    address: String,
    asset: Arc<InMemoryAsset>,
    units: RwLock<HashMap<String, u64>>,
}

impl RedeemableStrategy for Passthrough {
    fn address(&self) -> &str {
        &self.address
    }

    fn deposit(&self, value: u64, depositor: &str) -> Result<u64, StrategyError> {
        self.asset.transfer(depositor, &self.address, value)?;
        *self.units.write().entry(depositor.to_string()).or_insert(0) += value;
        Ok(value)
    }

    fn redeem(&self, units: u64, owner: &str) -> Result<u64, StrategyError> {
        self.asset.transfer(&self.address, owner, units)?;
        *self.units.write().entry(owner.to_string()).or_insert(0) -= units;
        Ok(units)
    }

    fn preview_withdraw(&self, value: u64) -> u64 {
        value
    }

    fn balance_of(&self, holder: &str) -> u64 {
        self.units.read().get(holder).copied().unwrap_or(0)
    }

    fn convert_to_assets(&self, units: u64) -> u64 {
        units
    }
}

fn vault_with_strategies(count: usize) -> (Arc<InMemoryAsset>, Vault) {
    let asset = Arc::new(InMemoryAsset::new());
    let clock = Arc::new(ManualClock::starting_now());
    let mut vault = Vault::new("vault", asset.clone(), VaultConfig::default(), clock).unwrap();

    if count > 0 {
        let weight = (10_000 / count) as u16;
        let entries = (0..count)
            .map(|i| {
                let strategy = Arc::new(Passthrough {
                    address: format!("strategy-{i}"),
                    asset: Arc::clone(&asset),
                    units: RwLock::new(HashMap::new()),
                });
                let weight = if i == 0 {
                    10_000 - weight * (count as u16 - 1)
                } else {
                    weight
                };
                AllocationEntry::new(Strategy::redeemable(strategy), weight)
            })
            .collect();
        vault.set_allocations(entries).unwrap();
    }
    (asset, vault)
}

fn bench_preview_issue(c: &mut Criterion) {
    let (asset, mut vault) = vault_with_strategies(2);
    asset.mint("seed", 1_000_000).unwrap();
    vault.deposit("seed", 1_000_000).unwrap();

    c.bench_function("vault/preview_issue", |b| {
        b.iter(|| vault.preview_issue(12_345).unwrap());
    });
}

fn bench_deposit(c: &mut Criterion) {
    let mut group = c.benchmark_group("vault/deposit");

    for strategies in [2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(strategies),
            &strategies,
            |b, &strategies| {
                let (asset, mut vault) = vault_with_strategies(strategies);
                asset.mint("alice", u64::MAX / 2).unwrap();
                b.iter(|| vault.deposit("alice", 1_000).unwrap());
            },
        );
    }

    group.finish();
}

fn bench_queue_enqueue_and_fill(c: &mut Criterion) {
    let now = Utc::now();
    let later = now + Duration::days(5);

    c.bench_function("queue/enqueue_then_fill", |b| {
        b.iter(|| {
            let mut queue = WithdrawalQueue::new();
            for i in 0..100u64 {
                queue
                    .enqueue("alice", i + 1, i + 1, i / 2, now, later)
                    .unwrap();
            }
            queue.apply_fill(u64::MAX).unwrap()
        });
    });
}

fn bench_validate_claim(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue/validate_claim");
    let now = Utc::now();
    let later = now + Duration::days(5);

    for size in [10usize, 100, 1_000] {
        let mut queue = WithdrawalQueue::new();
        for _ in 0..size {
            queue.enqueue("alice", 10, 10, u64::MAX, now, later).unwrap();
        }
        let indexes: Vec<usize> = (0..size).collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &indexes, |b, indexes| {
            b.iter(|| queue.validate_claim("alice", indexes, later).unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_preview_issue,
    bench_deposit,
    bench_queue_enqueue_and_fill,
    bench_validate_claim,
);
criterion_main!(benches);
