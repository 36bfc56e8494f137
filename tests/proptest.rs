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

//! Property-based tests for pricing, identifiers and the ledger.
//!
//! These tests verify invariants that should hold for any input.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rust_decimal::Decimal;
use topup_engine::{
    LedgerError, MarkupKind, MemoryLedger, PricingRule, ProductType, TransId, TransactionStatus,
    UserId, WalletAccount, WalletId, pricing,
};

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Generate a positive amount (0.0001 to 1000000 with 4 decimal places).
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=10_000_000_000i64).prop_map(|units| Decimal::new(units, 4))
}

/// Generate a non-negative markup value with 2 decimal places.
fn arb_markup() -> impl Strategy<Value = Decimal> {
    (0i64..=100_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn arb_kind() -> impl Strategy<Value = MarkupKind> {
    prop_oneof![
        Just(MarkupKind::Fixed),
        Just(MarkupKind::Percentage),
        Just(MarkupKind::Unknown),
    ]
}

fn arb_product() -> impl Strategy<Value = ProductType> {
    prop_oneof![
        Just(ProductType::Airtime),
        Just(ProductType::Data),
        Just(ProductType::Electricity),
        Just(ProductType::Tv),
    ]
}

#[derive(Debug, Clone)]
enum Op {
    Debit(Decimal),
    Credit(Decimal),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        arb_amount().prop_map(Op::Debit),
        arb_amount().prop_map(Op::Credit),
    ]
}

// =============================================================================
// Pricing Laws
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Selling price always splits into cost plus profit.
    #[test]
    fn selling_is_cost_plus_profit(cost in arb_amount(), kind in arb_kind(), value in arb_markup()) {
        let rule = PricingRule::new("airtime-mtn", kind, value);
        let quote = pricing::compute(cost, Some(&rule));
        prop_assert_eq!(quote.cost, cost);
        prop_assert_eq!(quote.selling, quote.cost + quote.profit);
        prop_assert!(quote.selling >= cost);
    }

    /// A fixed markup adds exactly its value, whatever the cost.
    #[test]
    fn fixed_profit_is_independent_of_cost(cost in arb_amount(), value in arb_markup()) {
        let rule = PricingRule::new("data-glo", MarkupKind::Fixed, value);
        prop_assert_eq!(pricing::compute(cost, Some(&rule)).profit, value);
    }

    /// A percentage markup is proportional to the cost.
    #[test]
    fn percentage_profit_is_proportional(cost in arb_amount(), value in arb_markup()) {
        let rule = PricingRule::new("electricity-eedc", MarkupKind::Percentage, value);
        let quote = pricing::compute(cost, Some(&rule));
        prop_assert_eq!(quote.profit, cost * value / Decimal::ONE_HUNDRED);
    }

    /// No rule and unknown rules both sell at cost.
    #[test]
    fn absent_and_unknown_rules_sell_at_cost(cost in arb_amount(), value in arb_markup()) {
        let unknown = PricingRule::new("tv-startimes", MarkupKind::Unknown, value);
        for quote in [pricing::compute(cost, None), pricing::compute(cost, Some(&unknown))] {
            prop_assert_eq!(quote.selling, cost);
            prop_assert_eq!(quote.profit, Decimal::ZERO);
        }
    }

    /// Identifiers are lowercase and prefixed by the product.
    #[test]
    fn service_identifiers_are_normalized(product in arb_product(), provider in "[A-Za-z][A-Za-z0-9-]{0,15}") {
        let id = pricing::service_identifier(product, &provider);
        prop_assert_eq!(id.clone(), id.to_lowercase());
        let prefix = format!("{}-", product.as_str());
        prop_assert!(id.starts_with(&prefix));
    }
}

// =============================================================================
// Identifier Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Every generated id is exactly 15 characters of A-Z0-9 and starts with
    /// its timestamp.
    #[test]
    fn trans_id_shape(secs in 946_684_800i64..4_102_444_799i64, seed in any::<u64>()) {
        let at = Utc.timestamp_opt(secs, 0).unwrap();
        let id = TransId::generate_at(at, &mut StdRng::seed_from_u64(seed));

        prop_assert_eq!(id.as_str().len(), TransId::MAX_LEN);
        let expected_stamp = at.format("%y%m%d%H%M%S").to_string();
        prop_assert!(id.as_str().starts_with(&expected_stamp));
        prop_assert!(id.as_str().chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        prop_assert_eq!(TransId::parse(id.as_str()), Some(id.clone()));
    }
}

/// Ids drawn within one second share a timestamp and differ only in the
/// 3-symbol suffix (36^3 = 46,656 values), so collisions are expected.
const SUFFIX_SPACE: f64 = 46_656.0;
const DRAWS: usize = 2_000;

/// Number of draws that repeat an earlier id, plus per-symbol suffix counts.
fn draw_same_second(seed: u64) -> (usize, std::collections::HashMap<char, usize>) {
    let at = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seen = std::collections::HashSet::new();
    let mut symbols = std::collections::HashMap::new();
    let mut repeats = 0;

    for _ in 0..DRAWS {
        let id = TransId::generate_at(at, &mut rng);
        for c in id.as_str()[12..].chars() {
            *symbols.entry(c).or_insert(0) += 1;
        }
        if !seen.insert(id) {
            repeats += 1;
        }
    }
    (repeats, symbols)
}

/// Expected repeats among `DRAWS` uniform picks (birthday bound).
fn expected_repeats() -> f64 {
    let n = DRAWS as f64;
    n - SUFFIX_SPACE * (1.0 - (1.0 - 1.0 / SUFFIX_SPACE).powf(n))
}

#[test]
fn same_second_ids_collide_at_the_birthday_rate() {
    let expected = expected_repeats();
    assert!((40.0..45.0).contains(&expected));

    let (repeats, symbols) = draw_same_second(7);

    // Roughly 4 standard deviations either side of ~42.
    assert!(repeats >= 15, "too few collisions: {}", repeats);
    assert!(repeats <= 80, "too many collisions: {}", repeats);

    assert_eq!(symbols.len(), 36);
    for c in ('A'..='Z').chain('0'..='9') {
        let count = symbols.get(&c).copied().unwrap_or(0);
        // 6,000 symbol draws, ~167 per symbol.
        assert!((100..=240).contains(&count), "symbol {} drawn {} times", c, count);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// For any seed the collision count stays within the birthday bound and
    /// is never zero.
    #[test]
    fn collision_rate_holds_for_any_seed(seed in any::<u64>()) {
        let (repeats, symbols) = draw_same_second(seed);
        prop_assert!((15..=80).contains(&repeats), "repeats = {}", repeats);
        prop_assert_eq!(symbols.len(), 36);
    }
}

// =============================================================================
// Ledger Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// The balance never goes negative and always equals the opening
    /// balance plus applied credits minus applied debits.
    #[test]
    fn wallet_balance_never_negative(opening in arb_amount(), ops in prop::collection::vec(arb_op(), 0..40)) {
        let wallet = WalletAccount::new(WalletId(1), UserId(1), opening);
        let mut expected = opening;

        for op in ops {
            match op {
                Op::Debit(amount) => match wallet.try_debit(amount) {
                    Ok(balance) => {
                        expected -= amount;
                        prop_assert_eq!(balance, expected);
                    }
                    Err(e) => {
                        prop_assert_eq!(e, LedgerError::InsufficientFunds);
                        prop_assert!(amount > expected);
                    }
                },
                Op::Credit(amount) => {
                    expected += amount;
                    prop_assert_eq!(wallet.credit(amount).unwrap(), expected);
                }
            }
            prop_assert!(wallet.balance() >= Decimal::ZERO);
        }
        prop_assert_eq!(wallet.balance(), expected);
    }

    /// Opening a second wallet for the same user always fails.
    #[test]
    fn one_wallet_per_user(users in prop::collection::vec(1u64..20, 1..50)) {
        let ledger = MemoryLedger::new();
        let mut seen = std::collections::HashSet::new();
        for user in users {
            let result = ledger.open_wallet(UserId(user), Decimal::ZERO);
            if seen.insert(user) {
                prop_assert!(result.is_ok());
            } else {
                prop_assert_eq!(result, Err(LedgerError::WalletExists));
            }
        }
        prop_assert_eq!(ledger.wallets().len(), seen.len());
    }

    /// Terminal statuses accept no further transition.
    #[test]
    fn terminal_statuses_are_final(first in prop_oneof![Just(TransactionStatus::Success), Just(TransactionStatus::Failed)],
                                   next in prop_oneof![Just(TransactionStatus::Processing), Just(TransactionStatus::Success), Just(TransactionStatus::Failed)]) {
        prop_assert!(TransactionStatus::Processing.can_transition_to(first));
        prop_assert!(first.is_terminal());
        prop_assert!(!first.can_transition_to(next));
    }
}
