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

//! # Top-up Engine
//!
//! Wallet-funded purchases of airtime, mobile data, electricity tokens and TV
//! subscriptions, fulfilled by external vendors, with automatic refunds when
//! fulfillment fails.
//!
//! ## Core Components
//!
//! - [`PurchaseOrchestrator`]: price, admit, debit, dispatch, then settle or refund
//! - [`LedgerPort`] / [`MemoryLedger`]: wallets, atomic conditional debit, transaction log
//! - [`ProviderAdapter`]: uniform contract over HTTP and browser-driven vendors
//! - [`ProviderRouter`]: product and provider alias to adapter
//! - [`pricing`]: markup rules and the selling price
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use rust_decimal_macros::dec;
//! use topup_engine::{
//!     Customer, MemoryLedger, PricingTable, ProviderAdapter, ProviderRouter, PurchaseIntent,
//!     PurchaseOrchestrator, UserId, VendorError, VendorOrder, VendorReceipt,
//! };
//!
//! struct Instant;
//!
//! #[async_trait]
//! impl ProviderAdapter for Instant {
//!     fn name(&self) -> &str {
//!         "instant"
//!     }
//!
//!     async fn purchase(&self, _order: &VendorOrder) -> Result<VendorReceipt, VendorError> {
//!         Ok(VendorReceipt::from_message("delivered"))
//!     }
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let ledger = Arc::new(MemoryLedger::new());
//! ledger.open_wallet(UserId(1), dec!(500)).unwrap();
//!
//! let router = ProviderRouter::builder().generic(Arc::new(Instant)).build();
//! let engine = PurchaseOrchestrator::new(ledger.clone(), Arc::new(PricingTable::new()), router);
//!
//! let customer = Customer::new(UserId(1), "ada@example.com");
//! let intent = PurchaseIntent::Airtime {
//!     network: "mtn".into(),
//!     phone_number: "08030000000".into(),
//!     amount: dec!(200),
//! };
//! let receipt = engine.purchase(&customer, intent).await.unwrap();
//!
//! assert_eq!(receipt.amount, dec!(200));
//! assert_eq!(ledger.wallet_of(UserId(1)).unwrap().balance, dec!(300));
//! # });
//! ```
//!
//! ## Thread Safety
//!
//! The orchestrator is stateless and shared behind an `Arc`. The only
//! cross-request critical section is the per-wallet debit; vendor calls run
//! concurrently except on the browser adapter, which owns a single session.

mod base;
pub mod config;
pub mod error;
mod identifier;
mod intent;
mod ledger;
pub mod notify;
mod orchestrator;
pub mod pricing;
pub mod provider;
mod router;
mod transaction;
mod transaction_log;
pub mod wallet;

pub use base::{TransactionId, UserId, WalletId};
pub use config::{EngineConfig, LoggingConfig};
pub use error::{ConfigError, LedgerError, PurchaseError, VendorError};
pub use identifier::{ClockIdSource, TransId, TransIdSource};
pub use intent::{Customer, ElectricityVerify, MeterType, ProductType, PurchaseIntent};
pub use ledger::{LedgerPort, MemoryLedger};
pub use notify::{Event, Notifier, NotifierRegistry};
pub use orchestrator::{OrchestratorSettings, PurchaseOrchestrator, PurchaseReceipt};
pub use pricing::{MarkupKind, PricingRule, PricingSource, PricingTable, Quote};
pub use provider::{
    CustomerCheck, ProviderAdapter, VendorOrder, VendorReceipt, Verification,
};
pub use router::{ENUGU_ELECTRIC, ProviderRouter, ProviderRouterBuilder, Route, canonical_electricity};
pub use transaction::{
    AuditEvent, AuditStage, Direction, NewTransaction, ServiceType, Transaction,
    TransactionStatus, TransactionUpdate,
};
pub use transaction_log::TransactionLog;
pub use wallet::{Wallet, WalletAccount};
