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

//! The purchase state machine.
//!
//! ```text
//! ADMITTED ──debit──► DEBITED ──vendor──► DISPATCHED ──ok──► SUCCESS
//!    │                   │                    │
//!    │ not found /       │ ledger fault       └──err──► failed + refund ──► REFUNDED
//!    │ insufficient      └──► restore balance, LedgerInconsistency
//!    ▼
//!  error, no side effects
//! ```
//!
//! # Invariants
//!
//! - Nothing is written before the atomic debit succeeds.
//! - Every debit ends `success`, or `failed` with a `REFUND-{id}` credit of
//!   the same amount recorded before the error is returned.
//! - The vendor is charged the cost price; the wallet is charged the selling price.

use crate::base::{TransactionId, WalletId};
use crate::error::{LedgerError, PurchaseError, VendorError};
use crate::identifier::{ClockIdSource, TransId, TransIdSource};
use crate::intent::{Customer, ElectricityVerify, ProductType, PurchaseIntent};
use crate::ledger::LedgerPort;
use crate::notify::{Event, NotifierRegistry, PurchaseNotice};
use crate::pricing::{self, PricingSource, Quote};
use crate::provider::{CustomerCheck, VendorOrder, VendorReceipt, Verification};
use crate::router::{ProviderRouter, Route};
use crate::transaction::{
    AuditEvent, AuditStage, Direction, NewTransaction, ServiceType, Transaction,
    TransactionStatus, TransactionUpdate,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Span, error, info, instrument, warn};

/// Returned to the caller of a successful purchase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseReceipt {
    pub message: String,
    pub transaction_id: TransactionId,
    pub trans_id: TransId,
    /// Selling price charged to the wallet.
    pub amount: Decimal,
    /// Electricity token, if one was issued.
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Upper bound on verification plus vendor purchase.
    pub vendor_timeout: Duration,
    /// Trans id draws before a collision is treated as a ledger fault.
    pub trans_id_attempts: u32,
    /// Vendor name used in the TV pricing identifier.
    pub tv_vendor: String,
    /// Cost price per TV plan selector.
    pub tv_plans: HashMap<u32, Decimal>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            vendor_timeout: Duration::from_secs(60),
            trans_id_attempts: 3,
            tv_vendor: "tv".to_string(),
            tv_plans: HashMap::new(),
        }
    }
}

enum DispatchFailure {
    Verification(String),
    Vendor(VendorError),
}

impl DispatchFailure {
    fn reason(&self) -> String {
        match self {
            DispatchFailure::Verification(reason) => reason.clone(),
            DispatchFailure::Vendor(err) => err.to_string(),
        }
    }
}

fn ledger_fault(context: &str, err: LedgerError) -> PurchaseError {
    PurchaseError::LedgerInconsistency(format!("{}: {}", context, err))
}

fn customer_check(intent: &PurchaseIntent, service_key: &str) -> Option<CustomerCheck> {
    match intent {
        PurchaseIntent::Electricity {
            meter_number,
            meter_type,
            ..
        } => Some(CustomerCheck {
            service_key: service_key.to_string(),
            customer_id: meter_number.clone(),
            meter_type: *meter_type,
        }),
        _ => None,
    }
}

fn success_message(product: ProductType, receipt: &VendorReceipt) -> String {
    match product {
        ProductType::Airtime => "Airtime purchase successful".to_string(),
        ProductType::Data => "Data purchase successful".to_string(),
        ProductType::Electricity => "Electricity purchase successful".to_string(),
        ProductType::Tv => receipt
            .message
            .clone()
            .unwrap_or_else(|| "TV subscription successful".to_string()),
    }
}

/// Runs purchases from intent to settled transaction.
///
/// Holds no per-request state; share it behind an `Arc` and call it
/// concurrently.
pub struct PurchaseOrchestrator {
    ledger: Arc<dyn LedgerPort>,
    pricing: Arc<dyn PricingSource>,
    router: ProviderRouter,
    notifiers: NotifierRegistry,
    ids: Arc<dyn TransIdSource>,
    settings: OrchestratorSettings,
}

impl PurchaseOrchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerPort>,
        pricing: Arc<dyn PricingSource>,
        router: ProviderRouter,
    ) -> Self {
        Self {
            ledger,
            pricing,
            router,
            notifiers: NotifierRegistry::new(),
            ids: Arc::new(ClockIdSource),
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn with_notifiers(mut self, notifiers: NotifierRegistry) -> Self {
        self.notifiers = notifiers;
        self
    }

    pub fn with_id_source(mut self, ids: Arc<dyn TransIdSource>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Cost price before markup.
    fn cost_price(&self, intent: &PurchaseIntent) -> Result<Decimal, PurchaseError> {
        match intent {
            PurchaseIntent::Tv { value, .. } => {
                self.settings.tv_plans.get(value).copied().ok_or_else(|| {
                    PurchaseError::InvalidRequest(format!("unknown tv plan {}", value))
                })
            }
            other => other
                .requested_amount()
                .ok_or_else(|| PurchaseError::InvalidRequest("amount is required".to_string())),
        }
    }

    pub fn quote(&self, intent: &PurchaseIntent) -> Result<Quote, PurchaseError> {
        let cost = self.cost_price(intent)?;
        let provider = intent.provider().unwrap_or(&self.settings.tv_vendor);
        let rule = self
            .pricing
            .rule(&pricing::service_identifier(intent.product(), provider));
        pricing::checked_compute(cost, rule.as_ref()).ok_or_else(|| {
            PurchaseError::InvalidRequest(format!("amount {} is too large to price", cost))
        })
    }

    /// Buys one product for `customer`.
    ///
    /// On `Err`, any debit that was taken has already been refunded, except
    /// for [`PurchaseError::LedgerInconsistency`] which needs reconciliation.
    #[instrument(
        name = "purchase",
        skip_all,
        fields(user = %customer.user_id, product = %intent.product(), trans_id = tracing::field::Empty)
    )]
    pub async fn purchase(
        &self,
        customer: &Customer,
        intent: PurchaseIntent,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        // ADMITTED
        intent.validate()?;
        let quote = self.quote(&intent)?;

        let wallet = self
            .ledger
            .get_wallet(customer.user_id)
            .await
            .map_err(|e| ledger_fault("wallet lookup failed", e))?
            .ok_or(PurchaseError::NotFound)?;
        if wallet.balance < quote.selling {
            info!(balance = %wallet.balance, price = %quote.selling, "insufficient funds");
            return Err(PurchaseError::InsufficientFunds);
        }
        let route = self.router.route(&intent)?;

        // DEBITED
        match self.ledger.try_debit(wallet.id, quote.selling).await {
            Ok(_) => {}
            Err(LedgerError::InsufficientFunds) => return Err(PurchaseError::InsufficientFunds),
            Err(LedgerError::WalletNotFound) => return Err(PurchaseError::NotFound),
            Err(e) => return Err(ledger_fault("debit failed", e)),
        }

        let debit = match self.record_debit(customer, wallet.id, &intent, &quote).await {
            Ok(debit) => debit,
            Err(e) => {
                self.restore(wallet.id, quote.selling).await;
                return Err(ledger_fault("could not record debit", e));
            }
        };
        Span::current().record("trans_id", debit.trans_id.as_str());
        info!(
            transaction = %debit.id,
            selling = %quote.selling,
            cost = %quote.cost,
            adapter = route.adapter.name(),
            "wallet debited"
        );

        // DISPATCHED
        let order = VendorOrder {
            trans_id: debit.trans_id.clone(),
            service_key: route.service_key.clone(),
            amount: quote.cost,
            intent,
            customer: customer.clone(),
        };
        let mut trail = Vec::new();
        let outcome = self.dispatch(&route, &order, &mut trail).await;

        let notice = PurchaseNotice {
            email: customer.email.clone(),
            name: customer.display_name().to_string(),
            service: order.intent.description(),
            amount: quote.selling,
            reference: debit.reference.clone(),
        };

        match outcome {
            Ok(receipt) => self.settle(&debit, &order, receipt, trail, notice).await,
            Err(failure) => Err(self.compensate(&debit, failure, trail, notice).await),
        }
    }

    async fn record_debit(
        &self,
        customer: &Customer,
        wallet_id: WalletId,
        intent: &PurchaseIntent,
        quote: &Quote,
    ) -> Result<Transaction, LedgerError> {
        let reference = intent.reference(wallet_id);
        let created = AuditEvent::new(
            AuditStage::Created,
            json!({
                "details": intent.summary(),
                "cost": quote.cost,
                "selling": quote.selling,
            }),
        );
        self.create_with_fresh_id(|trans_id| NewTransaction {
            wallet_id,
            user_id: customer.user_id,
            trans_id,
            amount: quote.selling,
            direction: Direction::Debit,
            status: TransactionStatus::Processing,
            reference: reference.clone(),
            service_type: intent.product().into(),
            audit: vec![created.clone()],
            profit: quote.profit,
        })
        .await
    }

    /// Creates a transaction, drawing a new trans id on each collision.
    async fn create_with_fresh_id<F>(&self, build: F) -> Result<Transaction, LedgerError>
    where
        F: Fn(TransId) -> NewTransaction + Send + Sync,
    {
        let attempts = self.settings.trans_id_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            let trans_id = self.ids.next_id();
            match self.ledger.create_transaction(build(trans_id)).await {
                Err(LedgerError::DuplicateTransId(id)) => {
                    warn!(attempt, %id, "trans id collision, redrawing");
                    last_error = Some(LedgerError::DuplicateTransId(id));
                }
                other => return other,
            }
        }
        Err(last_error
            .unwrap_or_else(|| LedgerError::Unavailable("no trans id attempts".to_string())))
    }

    /// Verification (when the adapter requires it) then purchase, bounded by
    /// the vendor timeout.
    async fn dispatch(
        &self,
        route: &Route,
        order: &VendorOrder,
        trail: &mut Vec<AuditEvent>,
    ) -> Result<VendorReceipt, DispatchFailure> {
        let work = async {
            if route.adapter.verifies() {
                if let Some(check) = customer_check(&order.intent, &route.service_key) {
                    let verification = route
                        .adapter
                        .verify(&check)
                        .await
                        .map_err(|e| DispatchFailure::Verification(e.to_string()))?;
                    trail.push(AuditEvent::new(
                        AuditStage::Verification,
                        serde_json::to_value(&verification).unwrap_or_default(),
                    ));
                    if !verification.success {
                        return Err(DispatchFailure::Verification(verification.reason()));
                    }
                }
            }
            route
                .adapter
                .purchase(order)
                .await
                .map_err(DispatchFailure::Vendor)
        };

        match tokio::time::timeout(self.settings.vendor_timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.settings.vendor_timeout, "vendor dispatch timed out");
                Err(DispatchFailure::Vendor(VendorError::Timeout))
            }
        }
    }

    async fn settle(
        &self,
        debit: &Transaction,
        order: &VendorOrder,
        receipt: VendorReceipt,
        mut trail: Vec<AuditEvent>,
        notice: PurchaseNotice,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        trail.push(AuditEvent::new(
            AuditStage::VendorResponse,
            receipt.payload.clone(),
        ));
        let update = TransactionUpdate {
            status: Some(TransactionStatus::Success),
            audit: trail,
        };
        if let Err(e) = self.ledger.update_transaction(debit.id, update).await {
            // Delivered: the debit stands even though its record is stale.
            error!(transaction = %debit.id, error = %e, "delivered purchase could not be marked successful");
            return Err(ledger_fault("could not mark transaction successful", e));
        }

        info!(transaction = %debit.id, "purchase successful");
        self.notifiers.notify_all(Event::PurchaseSucceeded {
            notice,
            recipient: order.intent.recipient().to_string(),
        });

        Ok(PurchaseReceipt {
            message: success_message(order.intent.product(), &receipt),
            transaction_id: debit.id,
            trans_id: debit.trans_id.clone(),
            amount: debit.amount,
            token: receipt.token,
        })
    }

    /// Marks the debit failed, refunds it and reports why.
    async fn compensate(
        &self,
        debit: &Transaction,
        failure: DispatchFailure,
        mut trail: Vec<AuditEvent>,
        notice: PurchaseNotice,
    ) -> PurchaseError {
        let reason = failure.reason();
        warn!(transaction = %debit.id, %reason, "purchase failed, refunding");

        trail.push(AuditEvent::new(
            AuditStage::VendorError,
            json!({ "error": reason }),
        ));
        let update = TransactionUpdate {
            status: Some(TransactionStatus::Failed),
            audit: trail,
        };
        let marked = self.ledger.update_transaction(debit.id, update).await;

        self.notifiers.notify_all(Event::PurchaseFailed {
            notice: notice.clone(),
            reason: reason.clone(),
        });

        if let Err(e) = self.ledger.credit(debit.wallet_id, debit.amount).await {
            error!(transaction = %debit.id, amount = %debit.amount, error = %e, "refund credit failed");
            return ledger_fault("refund credit failed", e);
        }

        let refund_reference = debit.refund_reference();
        let refund_event = AuditEvent::new(
            AuditStage::Refund,
            json!({ "refunded": debit.trans_id, "reason": reason }),
        );
        let refund = self
            .create_with_fresh_id(|trans_id| NewTransaction {
                wallet_id: debit.wallet_id,
                user_id: debit.user_id,
                trans_id,
                amount: debit.amount,
                direction: Direction::Credit,
                status: TransactionStatus::Success,
                reference: refund_reference.clone(),
                service_type: ServiceType::Refund,
                audit: vec![refund_event.clone()],
                profit: Decimal::ZERO,
            })
            .await;
        if let Err(e) = refund {
            error!(transaction = %debit.id, error = %e, "refund credited but not recorded");
            return ledger_fault("refund record failed", e);
        }
        if let Err(e) = marked {
            error!(transaction = %debit.id, error = %e, "refunded debit could not be marked failed");
            return ledger_fault("could not mark transaction failed", e);
        }

        info!(transaction = %debit.id, reference = %refund_reference, "refund processed");
        self.notifiers.notify_all(Event::Refunded {
            notice: PurchaseNotice {
                reference: refund_reference,
                ..notice
            },
        });

        match failure {
            DispatchFailure::Verification(reason) => PurchaseError::VerificationFailed {
                transaction_id: Some(debit.id),
                reason,
            },
            DispatchFailure::Vendor(source) => PurchaseError::Vendor {
                transaction_id: debit.id,
                source,
            },
        }
    }

    /// Best-effort credit after a debit whose record could not be written.
    async fn restore(&self, wallet_id: WalletId, amount: Decimal) {
        match self.ledger.credit(wallet_id, amount).await {
            Ok(balance) => warn!(wallet = %wallet_id, %amount, %balance, "debit reversed"),
            Err(e) => error!(wallet = %wallet_id, %amount, error = %e, "debit could not be reversed"),
        }
    }

    /// Checks a meter with its vendor without touching any wallet.
    #[instrument(skip_all, fields(provider = %request.provider, meter = %request.meter_number))]
    pub async fn verify_electricity(
        &self,
        request: &ElectricityVerify,
    ) -> Result<Verification, PurchaseError> {
        if request.meter_number.trim().is_empty() {
            return Err(PurchaseError::InvalidRequest(
                "meter number is required".to_string(),
            ));
        }
        let (adapter, check) = self.router.route_verify(request)?;
        if !adapter.verifies() {
            return Ok(Verification::skipped());
        }

        let verification = tokio::time::timeout(self.settings.vendor_timeout, adapter.verify(&check))
            .await
            .unwrap_or(Err(VendorError::Timeout))
            .map_err(PurchaseError::Provider)?;
        if !verification.success {
            return Err(PurchaseError::VerificationFailed {
                transaction_id: None,
                reason: verification.reason(),
            });
        }
        Ok(verification)
    }

    /// Re-sends the active subscription to a decoder. Not billed.
    #[instrument(skip(self))]
    pub async fn refresh_tv(&self, smart_card_number: &str) -> Result<String, PurchaseError> {
        let card = smart_card(smart_card_number)?;
        let adapter = self.router.tv()?;
        let receipt = tokio::time::timeout(self.settings.vendor_timeout, adapter.refresh(card))
            .await
            .unwrap_or(Err(VendorError::Timeout))
            .map_err(PurchaseError::Provider)?;
        Ok(receipt
            .message
            .unwrap_or_else(|| "Refresh successful".to_string()))
    }

    /// Fetches subscriber details for a smart card. Not billed.
    #[instrument(skip(self))]
    pub async fn lookup_tv(
        &self,
        smart_card_number: &str,
    ) -> Result<serde_json::Value, PurchaseError> {
        let card = smart_card(smart_card_number)?;
        let adapter = self.router.tv()?;
        let details = tokio::time::timeout(self.settings.vendor_timeout, adapter.lookup(card))
            .await
            .unwrap_or(Err(VendorError::Timeout))
            .map_err(PurchaseError::Provider)?;

        let empty = match &details {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if empty {
            return Err(PurchaseError::Provider(VendorError::Rejected(
                "could not retrieve details, check the smart card number".to_string(),
            )));
        }
        Ok(details)
    }
}

fn smart_card(raw: &str) -> Result<&str, PurchaseError> {
    let card = raw.trim();
    if card.is_empty() {
        return Err(PurchaseError::InvalidRequest(
            "smart card number is required".to_string(),
        ));
    }
    Ok(card)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::UserId;
    use crate::ledger::MemoryLedger;
    use crate::pricing::{MarkupKind, PricingRule, PricingTable};
    use crate::provider::ProviderAdapter;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    struct Accepting;

    #[async_trait]
    impl ProviderAdapter for Accepting {
        fn name(&self) -> &str {
            "accepting"
        }

        async fn purchase(&self, _order: &VendorOrder) -> Result<VendorReceipt, VendorError> {
            Ok(VendorReceipt::from_message("ok"))
        }
    }

    /// Replays a fixed list of ids, then falls back to the clock.
    struct Scripted(Mutex<Vec<&'static str>>);

    impl TransIdSource for Scripted {
        fn next_id(&self) -> TransId {
            match self.0.lock().pop() {
                Some(id) => TransId::parse(id).unwrap(),
                None => TransId::generate(),
            }
        }
    }

    fn airtime(amount: Decimal) -> PurchaseIntent {
        PurchaseIntent::Airtime {
            network: "mtn".to_string(),
            phone_number: "08030000000".to_string(),
            amount,
        }
    }

    fn setup(balance: Decimal) -> (Arc<MemoryLedger>, PurchaseOrchestrator, Customer) {
        let ledger = Arc::new(MemoryLedger::new());
        let user = UserId(1);
        ledger.open_wallet(user, balance).unwrap();
        let pricing: PricingTable = [PricingRule::new(
            "airtime-mtn",
            MarkupKind::Percentage,
            dec!(5),
        )]
        .into_iter()
        .collect();
        let router = ProviderRouter::builder()
            .generic(Arc::new(Accepting))
            .build();
        let orchestrator = PurchaseOrchestrator::new(ledger.clone(), Arc::new(pricing), router);
        (ledger, orchestrator, Customer::new(user, "ada@example.com"))
    }

    #[test]
    fn quote_uses_tv_plan_table() {
        let (_, orchestrator, _) = setup(dec!(0));
        let orchestrator = orchestrator.with_settings(OrchestratorSettings {
            tv_plans: HashMap::from([(2, dec!(4500))]),
            ..OrchestratorSettings::default()
        });
        let quote = orchestrator
            .quote(&PurchaseIntent::Tv {
                smart_card_number: "7023".to_string(),
                value: 2,
            })
            .unwrap();
        assert_eq!(quote.selling, dec!(4500));

        let unknown = orchestrator.quote(&PurchaseIntent::Tv {
            smart_card_number: "7023".to_string(),
            value: 9,
        });
        assert!(matches!(unknown, Err(PurchaseError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn colliding_trans_id_is_redrawn() {
        let (ledger, orchestrator, customer) = setup(dec!(1000));
        // Popped from the back: first purchase gets A, second collides on A then gets B.
        let ids = Scripted(Mutex::new(vec![
            "250101120000BBB",
            "250101120000AAA",
            "250101120000AAA",
        ]));
        let orchestrator = orchestrator.with_id_source(Arc::new(ids));

        let first = orchestrator.purchase(&customer, airtime(dec!(100))).await.unwrap();
        let second = orchestrator.purchase(&customer, airtime(dec!(100))).await.unwrap();

        assert_eq!(first.trans_id.as_str(), "250101120000AAA");
        assert_eq!(second.trans_id.as_str(), "250101120000BBB");
        assert_eq!(ledger.transaction_count(), 2);
        assert_eq!(ledger.wallet_of(customer.user_id).unwrap().balance, dec!(790));
    }

    #[tokio::test]
    async fn exhausted_redraws_restore_the_balance() {
        let (ledger, orchestrator, customer) = setup(dec!(1000));
        let ids = Scripted(Mutex::new(vec!["250101120000AAA"; 4]));
        let orchestrator = orchestrator.with_id_source(Arc::new(ids));

        orchestrator.purchase(&customer, airtime(dec!(100))).await.unwrap();
        let result = orchestrator.purchase(&customer, airtime(dec!(100))).await;

        assert!(matches!(result, Err(PurchaseError::LedgerInconsistency(_))));
        assert_eq!(ledger.wallet_of(customer.user_id).unwrap().balance, dec!(895));
        assert_eq!(ledger.transaction_count(), 1);
    }

    #[tokio::test]
    async fn invalid_intent_touches_nothing() {
        let (ledger, orchestrator, customer) = setup(dec!(1000));
        let result = orchestrator.purchase(&customer, airtime(dec!(0))).await;
        assert!(matches!(result, Err(PurchaseError::InvalidRequest(_))));
        assert_eq!(ledger.transaction_count(), 0);
    }

    #[tokio::test]
    async fn unpriceable_amount_is_rejected() {
        let (ledger, orchestrator, customer) = setup(Decimal::MAX);

        let handle = tokio::spawn(async move {
            orchestrator.purchase(&customer, airtime(Decimal::MAX)).await
        });
        let result = handle.await.unwrap();

        assert!(matches!(result, Err(PurchaseError::InvalidRequest(_))));
        assert_eq!(ledger.transaction_count(), 0);
        assert_eq!(ledger.wallet_of(UserId(1)).unwrap().balance, Decimal::MAX);
    }

    #[tokio::test]
    async fn tv_operations_need_a_tv_adapter() {
        let (_, orchestrator, _) = setup(dec!(0));
        assert_eq!(
            orchestrator.refresh_tv("7023").await,
            Err(PurchaseError::Unavailable(ProductType::Tv))
        );
        assert!(matches!(
            orchestrator.lookup_tv("  ").await,
            Err(PurchaseError::InvalidRequest(_))
        ));
    }
}
