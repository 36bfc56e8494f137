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

//! Ledger collaborator contract and the in-memory reference ledger.
//!
//! The orchestrator never assigns a balance. It asks the ledger to debit
//! (atomically with the balance check) or credit, and to create or update
//! transaction records.

use crate::base::{TransactionId, UserId, WalletId};
use crate::error::LedgerError;
use crate::transaction::{NewTransaction, Transaction, TransactionUpdate};
use crate::transaction_log::TransactionLog;
use crate::wallet::{Wallet, WalletAccount};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};

/// Operations the purchase engine requires from wallet/transaction storage.
#[async_trait]
pub trait LedgerPort: Send + Sync {
    /// Returns the wallet owned by `user_id`, if any.
    async fn get_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, LedgerError>;

    /// Debits `amount` only if the balance covers it, as one atomic step.
    ///
    /// Returns the new balance, or [`LedgerError::InsufficientFunds`].
    async fn try_debit(&self, wallet_id: WalletId, amount: Decimal)
    -> Result<Decimal, LedgerError>;

    /// Credits `amount`. Returns the new balance.
    async fn credit(&self, wallet_id: WalletId, amount: Decimal) -> Result<Decimal, LedgerError>;

    async fn create_transaction(&self, new: NewTransaction) -> Result<Transaction, LedgerError>;

    /// Changes status and appends audit events.
    async fn update_transaction(
        &self,
        id: TransactionId,
        update: TransactionUpdate,
    ) -> Result<(), LedgerError>;
}

/// Concurrent in-memory ledger.
///
/// Wallets live in a [`DashMap`], each behind its own mutex, so debits on the
/// same wallet serialize while different wallets proceed in parallel.
#[derive(Debug)]
pub struct MemoryLedger {
    wallets: DashMap<WalletId, WalletAccount>,
    /// Owner index; one wallet per user.
    owners: DashMap<UserId, WalletId>,
    transactions: TransactionLog,
    next_wallet: AtomicU64,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            wallets: DashMap::new(),
            owners: DashMap::new(),
            transactions: TransactionLog::new(),
            next_wallet: AtomicU64::new(1),
        }
    }

    /// Opens the single wallet of `user_id`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::WalletExists`] if the user already has one.
    pub fn open_wallet(
        &self,
        user_id: UserId,
        opening_balance: Decimal,
    ) -> Result<WalletId, LedgerError> {
        match self.owners.entry(user_id) {
            Entry::Occupied(_) => Err(LedgerError::WalletExists),
            Entry::Vacant(entry) => {
                let id = WalletId(self.next_wallet.fetch_add(1, Ordering::SeqCst));
                self.wallets
                    .insert(id, WalletAccount::new(id, user_id, opening_balance));
                entry.insert(id);
                Ok(id)
            }
        }
    }

    pub fn wallet(&self, wallet_id: WalletId) -> Option<Wallet> {
        self.wallets.get(&wallet_id).map(|w| w.snapshot())
    }

    pub fn wallet_of(&self, user_id: UserId) -> Option<Wallet> {
        let wallet_id = *self.owners.get(&user_id)?;
        self.wallet(wallet_id)
    }

    pub fn balance(&self, wallet_id: WalletId) -> Option<Decimal> {
        self.wallets.get(&wallet_id).map(|w| w.balance())
    }

    /// All wallets ordered by id.
    pub fn wallets(&self) -> Vec<Wallet> {
        let mut all: Vec<Wallet> = self.wallets.iter().map(|w| w.snapshot()).collect();
        all.sort_by_key(|w| w.id);
        all
    }

    pub fn debit(&self, wallet_id: WalletId, amount: Decimal) -> Result<Decimal, LedgerError> {
        self.wallets
            .get(&wallet_id)
            .ok_or(LedgerError::WalletNotFound)?
            .try_debit(amount)
    }

    pub fn deposit(&self, wallet_id: WalletId, amount: Decimal) -> Result<Decimal, LedgerError> {
        self.wallets
            .get(&wallet_id)
            .ok_or(LedgerError::WalletNotFound)?
            .credit(amount)
    }

    pub fn transaction(&self, id: TransactionId) -> Option<Transaction> {
        self.transactions.get(id)
    }

    /// Every transaction in creation order.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.transactions.snapshot()
    }

    pub fn transactions_for(&self, wallet_id: WalletId) -> Vec<Transaction> {
        self.transactions
            .snapshot()
            .into_iter()
            .filter(|tx| tx.wallet_id == wallet_id)
            .collect()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerPort for MemoryLedger {
    async fn get_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, LedgerError> {
        Ok(self.wallet_of(user_id))
    }

    async fn try_debit(
        &self,
        wallet_id: WalletId,
        amount: Decimal,
    ) -> Result<Decimal, LedgerError> {
        self.debit(wallet_id, amount)
    }

    async fn credit(&self, wallet_id: WalletId, amount: Decimal) -> Result<Decimal, LedgerError> {
        self.deposit(wallet_id, amount)
    }

    async fn create_transaction(&self, new: NewTransaction) -> Result<Transaction, LedgerError> {
        if !self.wallets.contains_key(&new.wallet_id) {
            return Err(LedgerError::WalletNotFound);
        }
        self.transactions.push(new)
    }

    async fn update_transaction(
        &self,
        id: TransactionId,
        update: TransactionUpdate,
    ) -> Result<(), LedgerError> {
        self.transactions.update(id, update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn one_wallet_per_user() {
        let ledger = MemoryLedger::new();
        let id = ledger.open_wallet(UserId(1), dec!(100)).unwrap();
        assert_eq!(
            ledger.open_wallet(UserId(1), dec!(5)),
            Err(LedgerError::WalletExists)
        );
        assert_eq!(ledger.wallet_of(UserId(1)).unwrap().id, id);
        assert_eq!(ledger.balance(id), Some(dec!(100)));
    }

    #[test]
    fn debit_unknown_wallet_fails() {
        let ledger = MemoryLedger::new();
        assert_eq!(
            ledger.debit(WalletId(42), dec!(1)),
            Err(LedgerError::WalletNotFound)
        );
    }

    #[tokio::test]
    async fn port_debit_is_conditional() {
        let ledger = MemoryLedger::new();
        let id = ledger.open_wallet(UserId(1), dec!(30)).unwrap();

        assert_eq!(ledger.try_debit(id, dec!(20)).await, Ok(dec!(10)));
        assert_eq!(
            ledger.try_debit(id, dec!(20)).await,
            Err(LedgerError::InsufficientFunds)
        );
        assert_eq!(ledger.credit(id, dec!(20)).await, Ok(dec!(30)));
    }

    #[tokio::test]
    async fn missing_user_has_no_wallet() {
        let ledger = MemoryLedger::new();
        assert_eq!(ledger.get_wallet(UserId(9)).await, Ok(None));
    }
}
