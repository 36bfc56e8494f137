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

//! Thread-safe transaction log with correlation-id deduplication.

use crate::base::TransactionId;
use crate::error::LedgerError;
use crate::identifier::TransId;
use crate::transaction::{NewTransaction, Transaction, TransactionUpdate};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stores transactions by ledger id and rejects reused correlation ids.
///
/// Ledger ids are assigned from a monotonic counter, so sorting by id
/// recovers insertion order.
#[derive(Debug)]
pub struct TransactionLog {
    /// Transactions indexed by ledger id.
    transactions: DashMap<TransactionId, Transaction>,

    /// Correlation id to ledger id, for O(1) duplicate detection.
    trans_ids: DashMap<TransId, TransactionId>,

    next_id: AtomicU64,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self {
            transactions: DashMap::new(),
            trans_ids: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Records a new transaction and assigns its ledger id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateTransId`] if the correlation id is
    /// already in use.
    pub fn push(&self, new: NewTransaction) -> Result<Transaction, LedgerError> {
        // Entry API keeps check-and-insert atomic per correlation id
        match self.trans_ids.entry(new.trans_id.clone()) {
            Entry::Occupied(entry) => Err(LedgerError::DuplicateTransId(entry.key().to_string())),
            Entry::Vacant(entry) => {
                let id = TransactionId(self.next_id.fetch_add(1, Ordering::SeqCst));
                let transaction = Transaction::from_new(id, new);
                self.transactions.insert(id, transaction.clone());
                entry.insert(id);
                Ok(transaction)
            }
        }
    }

    pub fn update(&self, id: TransactionId, update: TransactionUpdate) -> Result<(), LedgerError> {
        let mut transaction = self
            .transactions
            .get_mut(&id)
            .ok_or(LedgerError::TransactionNotFound)?;
        transaction.apply(update)
    }

    pub fn get(&self, id: TransactionId) -> Option<Transaction> {
        self.transactions.get(&id).map(|entry| entry.value().clone())
    }

    pub fn find_by_trans_id(&self, trans_id: &TransId) -> Option<Transaction> {
        let id = *self.trans_ids.get(trans_id)?;
        self.get(id)
    }

    /// All transactions in insertion order.
    pub fn snapshot(&self) -> Vec<Transaction> {
        let mut all: Vec<Transaction> = self
            .transactions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|tx| tx.id);
        all
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

impl Default for TransactionLog {
    fn default() -> Self {
        Self::new()
    }
}
