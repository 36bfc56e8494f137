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

//! Selling price computation.
//!
//! The platform sells at cost plus a markup. Markups are configured per
//! service identifier (`"<product>-<provider>"`, lowercase) and are either a
//! fixed amount or a percentage of the cost price.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use topup_engine::pricing::{self, MarkupKind, PricingRule};
//!
//! let rule = PricingRule::new("airtime-mtn", MarkupKind::Percentage, dec!(2));
//! let quote = pricing::compute(dec!(500), Some(&rule));
//! assert_eq!(quote.profit, dec!(10));
//! assert_eq!(quote.selling, dec!(510));
//! ```

use crate::intent::ProductType;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a rule's value is applied to the cost price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkupKind {
    Fixed,
    Percentage,
    /// Any kind this build does not know. Priced as if no rule existed.
    #[serde(other)]
    Unknown,
}

/// Markup configured for one service identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRule {
    pub service_identifier: String,
    pub kind: MarkupKind,
    pub value: Decimal,
}

impl PricingRule {
    pub fn new(service_identifier: impl Into<String>, kind: MarkupKind, value: Decimal) -> Self {
        Self {
            service_identifier: service_identifier.into().to_lowercase(),
            kind,
            value,
        }
    }
}

/// Result of pricing one purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    /// Forwarded to the vendor.
    pub cost: Decimal,
    /// Platform margin, recorded on the debit transaction.
    pub profit: Decimal,
    /// Debited from the wallet.
    pub selling: Decimal,
}

/// Computes the selling price for `cost` under an optional rule.
///
/// Never fails: a quote that does not fit in a [`Decimal`] saturates. Use
/// [`checked_compute`] to reject such amounts instead.
pub fn compute(cost: Decimal, rule: Option<&PricingRule>) -> Quote {
    checked_compute(cost, rule).unwrap_or_else(|| {
        let profit = match rule.map(|r| (r.kind, r.value)) {
            Some((MarkupKind::Fixed, value)) => value,
            Some((MarkupKind::Percentage, value)) => {
                cost.saturating_mul(value) / Decimal::ONE_HUNDRED
            }
            Some((MarkupKind::Unknown, _)) | None => Decimal::ZERO,
        };
        Quote {
            cost,
            profit,
            selling: cost.saturating_add(profit),
        }
    })
}

/// Like [`compute`], but returns `None` when the quote overflows.
pub fn checked_compute(cost: Decimal, rule: Option<&PricingRule>) -> Option<Quote> {
    let profit = match rule.map(|r| (r.kind, r.value)) {
        Some((MarkupKind::Fixed, value)) => value,
        Some((MarkupKind::Percentage, value)) => {
            cost.checked_mul(value)?.checked_div(Decimal::ONE_HUNDRED)?
        }
        Some((MarkupKind::Unknown, _)) | None => Decimal::ZERO,
    };
    Some(Quote {
        cost,
        profit,
        selling: cost.checked_add(profit)?,
    })
}

/// Builds the lookup key for a product sold through `provider`.
pub fn service_identifier(product: ProductType, provider: &str) -> String {
    format!("{}-{}", product.as_str(), provider.trim()).to_lowercase()
}

/// Read-only view of the pricing rules.
pub trait PricingSource: Send + Sync {
    fn rule(&self, service_identifier: &str) -> Option<PricingRule>;
}

/// Concurrent in-memory rule table keyed by service identifier.
#[derive(Debug, Default)]
pub struct PricingTable {
    rules: DashMap<String, PricingRule>,
}

impl PricingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, rule: PricingRule) {
        let key = rule.service_identifier.to_lowercase();
        self.rules.insert(key, rule);
    }

    pub fn remove(&self, service_identifier: &str) -> Option<PricingRule> {
        self.rules
            .remove(&service_identifier.to_lowercase())
            .map(|(_, rule)| rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<PricingRule> for PricingTable {
    fn from_iter<I: IntoIterator<Item = PricingRule>>(iter: I) -> Self {
        let table = PricingTable::new();
        for rule in iter {
            table.insert(rule);
        }
        table
    }
}

impl PricingSource for PricingTable {
    fn rule(&self, service_identifier: &str) -> Option<PricingRule> {
        self.rules
            .get(service_identifier)
            .map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn absent_rule_sells_at_cost() {
        let quote = compute(dec!(50), None);
        assert_eq!(quote.selling, dec!(50));
        assert_eq!(quote.profit, Decimal::ZERO);
    }

    #[test]
    fn fixed_rule_adds_value() {
        let rule = PricingRule::new("data-glo", MarkupKind::Fixed, dec!(25));
        let quote = compute(dec!(1000), Some(&rule));
        assert_eq!(quote.cost, dec!(1000));
        assert_eq!(quote.profit, dec!(25));
        assert_eq!(quote.selling, dec!(1025));
    }

    #[test]
    fn percentage_rule_scales_with_cost() {
        let rule = PricingRule::new("electricity-aedc", MarkupKind::Percentage, dec!(1.5));
        let quote = compute(dec!(2000), Some(&rule));
        assert_eq!(quote.profit, dec!(30));
        assert_eq!(quote.selling, dec!(2030));
    }

    #[test]
    fn unknown_kind_is_treated_as_absent() {
        let rule: PricingRule = serde_json::from_str(
            r#"{"service_identifier":"airtime-mtn","kind":"tiered","value":"9"}"#,
        )
        .unwrap();
        assert_eq!(rule.kind, MarkupKind::Unknown);
        assert_eq!(compute(dec!(100), Some(&rule)).selling, dec!(100));
    }

    #[test]
    fn overflowing_quotes_saturate() {
        let percent = PricingRule::new("airtime-mtn", MarkupKind::Percentage, dec!(5));
        let fixed = PricingRule::new("airtime-glo", MarkupKind::Fixed, dec!(1));

        assert_eq!(checked_compute(Decimal::MAX, Some(&percent)), None);
        assert_eq!(checked_compute(Decimal::MAX, Some(&fixed)), None);
        assert_eq!(
            checked_compute(Decimal::MAX, None).map(|q| q.selling),
            Some(Decimal::MAX)
        );

        let quote = compute(Decimal::MAX, Some(&percent));
        assert_eq!(quote.selling, Decimal::MAX);
        assert_eq!(compute(Decimal::MAX, Some(&fixed)).selling, Decimal::MAX);
    }

    #[test]
    fn checked_compute_matches_compute_in_range() {
        let rule = PricingRule::new("data-mtn", MarkupKind::Percentage, dec!(2.5));
        assert_eq!(
            checked_compute(dec!(400), Some(&rule)),
            Some(compute(dec!(400), Some(&rule)))
        );
    }

    #[test]
    fn service_identifier_is_lowercased() {
        assert_eq!(
            service_identifier(ProductType::Airtime, "MTN"),
            "airtime-mtn"
        );
        assert_eq!(
            service_identifier(ProductType::Electricity, " Enugu-Electric "),
            "electricity-enugu-electric"
        );
    }

    #[test]
    fn table_lookup_is_exact_match() {
        let table: PricingTable = [
            PricingRule::new("Airtime-MTN", MarkupKind::Fixed, dec!(5)),
            PricingRule::new("data-mtn", MarkupKind::Percentage, dec!(10)),
        ]
        .into_iter()
        .collect();

        assert_eq!(table.len(), 2);
        assert_eq!(table.rule("airtime-mtn").unwrap().value, dec!(5));
        assert!(table.rule("airtime-mtn-extra").is_none());
        assert!(table.remove("DATA-MTN").is_some());
        assert!(table.rule("data-mtn").is_none());
    }
}
