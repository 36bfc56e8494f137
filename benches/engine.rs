// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Benchmarks for the purchase engine.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Price computation and identifier generation
//! - Ledger debits, single-threaded and contended
//! - Full purchases, on the success and the refund path

use async_trait::async_trait;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use topup_engine::{
    Customer, MarkupKind, MemoryLedger, PricingRule, PricingTable, ProductType, ProviderAdapter,
    ProviderRouter, PurchaseIntent, PurchaseOrchestrator, TransId, UserId, VendorError,
    VendorOrder, VendorReceipt, pricing,
};

// =============================================================================
// Helper Functions
// =============================================================================

struct Instant {
    fail: bool,
}

#[async_trait]
impl ProviderAdapter for Instant {
    fn name(&self) -> &str {
        "instant"
    }

    async fn purchase(&self, _order: &VendorOrder) -> Result<VendorReceipt, VendorError> {
        if self.fail {
            return Err(VendorError::Rejected("declined".to_string()));
        }
        Ok(VendorReceipt::from_message("ok"))
    }
}

fn make_engine(ledger: &Arc<MemoryLedger>, fail: bool) -> PurchaseOrchestrator {
    let pricing: PricingTable = [PricingRule::new(
        "airtime-mtn",
        MarkupKind::Percentage,
        dec!(3),
    )]
    .into_iter()
    .collect();
    let router = ProviderRouter::builder()
        .generic(Arc::new(Instant { fail }))
        .build();
    PurchaseOrchestrator::new(ledger.clone(), Arc::new(pricing), router)
}

fn make_airtime(amount: i64) -> PurchaseIntent {
    PurchaseIntent::Airtime {
        network: "mtn".to_string(),
        phone_number: "08030000000".to_string(),
        amount: Decimal::new(amount, 2),
    }
}

// =============================================================================
// Pricing and Identifiers
// =============================================================================

fn bench_pricing(c: &mut Criterion) {
    let fixed = PricingRule::new("data-glo", MarkupKind::Fixed, dec!(50));
    let percent = PricingRule::new("airtime-mtn", MarkupKind::Percentage, dec!(2.5));

    c.bench_function("compute_fixed", |b| {
        b.iter(|| pricing::compute(black_box(dec!(1234.56)), Some(&fixed)))
    });
    c.bench_function("compute_percentage", |b| {
        b.iter(|| pricing::compute(black_box(dec!(1234.56)), Some(&percent)))
    });
    c.bench_function("service_identifier", |b| {
        b.iter(|| pricing::service_identifier(ProductType::Electricity, black_box(" EEDC ")))
    });
}

fn bench_trans_id(c: &mut Criterion) {
    c.bench_function("trans_id_generate", |b| b.iter(TransId::generate));
}

// =============================================================================
// Ledger
// =============================================================================

fn bench_debit(c: &mut Criterion) {
    let ledger = MemoryLedger::new();
    let wallet = ledger.open_wallet(UserId(1), Decimal::MAX).unwrap();

    c.bench_function("single_debit", |b| {
        b.iter(|| ledger.debit(wallet, black_box(dec!(0.01))))
    });
}

fn bench_parallel_debits(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_debits");

    for wallets in [1u64, 16, 1_024].iter() {
        let count = 10_000u64;
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(wallets), wallets, |b, &wallets| {
            b.iter(|| {
                let ledger = MemoryLedger::new();
                let ids: Vec<_> = (1..=wallets)
                    .map(|u| ledger.open_wallet(UserId(u), dec!(1000000)).unwrap())
                    .collect();

                (0..count).into_par_iter().for_each(|i| {
                    let wallet = ids[(i % wallets) as usize];
                    let _ = ledger.debit(wallet, dec!(1));
                });

                black_box(&ledger);
            })
        });
    }
    group.finish();
}

// =============================================================================
// Purchases
// =============================================================================

fn bench_purchase(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("purchase");

    for (label, fail) in [("success", false), ("refund", true)] {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.open_wallet(UserId(1), Decimal::MAX).unwrap();
        let engine = make_engine(&ledger, fail);
        let customer = Customer::new(UserId(1), "bench@example.com");

        group.bench_function(label, |b| {
            b.iter(|| {
                let result = runtime.block_on(engine.purchase(&customer, make_airtime(10_000)));
                black_box(result)
            })
        });
    }
    group.finish();
}

fn bench_concurrent_purchases(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("concurrent_purchases");

    for users in [1u64, 64].iter() {
        let count = 1_000u64;
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(users), users, |b, &users| {
            b.iter(|| {
                let ledger = Arc::new(MemoryLedger::new());
                for u in 1..=users {
                    ledger.open_wallet(UserId(u), dec!(1000000)).unwrap();
                }
                let engine = Arc::new(make_engine(&ledger, false));

                runtime.block_on(async {
                    let tasks: Vec<_> = (0..count)
                        .map(|i| {
                            let engine = engine.clone();
                            let customer = Customer::new(UserId(i % users + 1), "bench@example.com");
                            tokio::spawn(async move {
                                engine.purchase(&customer, make_airtime(500)).await
                            })
                        })
                        .collect();
                    for task in tasks {
                        let _ = task.await;
                    }
                });

                black_box(&ledger);
            })
        });
    }
    group.finish();
}

// =============================================================================
// Criterion Groups
// =============================================================================

criterion_group!(primitives, bench_pricing, bench_trans_id,);

criterion_group!(ledger, bench_debit, bench_parallel_debits,);

criterion_group!(purchases, bench_purchase, bench_concurrent_purchases,);

criterion_main!(primitives, ledger, purchases);
