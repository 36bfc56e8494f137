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

//! Wallet balances.
//!
//! A [`WalletAccount`] guards its balance with a mutex so that the balance
//! check and the debit happen as one step. Two debits racing on the same
//! wallet are serialized; debits on different wallets never contend.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use topup_engine::{UserId, WalletAccount, WalletId};
//!
//! let wallet = WalletAccount::new(WalletId(1), UserId(1), dec!(100));
//! wallet.try_debit(dec!(40)).unwrap();
//! assert_eq!(wallet.balance(), dec!(60));
//! ```

use crate::base::{UserId, WalletId};
use crate::error::LedgerError;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Point-in-time view of a wallet, handed to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub balance: Decimal,
}

#[derive(Debug)]
struct WalletData {
    id: WalletId,
    user_id: UserId,
    balance: Decimal,
}

impl WalletData {
    fn assert_invariants(&self) {
        debug_assert!(
            self.balance >= Decimal::ZERO,
            "Invariant violated: wallet {} balance went negative: {}",
            self.id,
            self.balance
        );
    }

    /// Decreases the balance if it covers `amount`.
    fn debit(&mut self, amount: Decimal) -> Result<Decimal, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        if self.balance < amount {
            return Err(LedgerError::InsufficientFunds);
        }
        self.balance -= amount;
        self.assert_invariants();
        Ok(self.balance)
    }

    /// Increases the balance. A credit that would overflow is refused.
    fn credit(&mut self, amount: Decimal) -> Result<Decimal, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::InvalidAmount)?;
        self.assert_invariants();
        Ok(self.balance)
    }
}

/// Ledger-side wallet with an atomically guarded balance.
#[derive(Debug)]
pub struct WalletAccount {
    inner: Mutex<WalletData>,
}

impl WalletAccount {
    const DECIMAL_PRECISION: u32 = 4;

    /// Opens a wallet. Negative opening balances are clamped to zero.
    pub fn new(id: WalletId, user_id: UserId, opening_balance: Decimal) -> Self {
        Self {
            inner: Mutex::new(WalletData {
                id,
                user_id,
                balance: opening_balance.max(Decimal::ZERO),
            }),
        }
    }

    pub fn id(&self) -> WalletId {
        self.inner.lock().id
    }

    pub fn user_id(&self) -> UserId {
        self.inner.lock().user_id
    }

    pub fn balance(&self) -> Decimal {
        self.inner.lock().balance
    }

    pub fn snapshot(&self) -> Wallet {
        let data = self.inner.lock();
        Wallet {
            id: data.id,
            user_id: data.user_id,
            balance: data.balance,
        }
    }

    /// Debits `amount` if and only if the balance covers it.
    ///
    /// Returns the new balance.
    pub fn try_debit(&self, amount: Decimal) -> Result<Decimal, LedgerError> {
        self.inner.lock().debit(amount)
    }

    /// Credits `amount`. Returns the new balance.
    pub fn credit(&self, amount: Decimal) -> Result<Decimal, LedgerError> {
        self.inner.lock().credit(amount)
    }
}

impl Serialize for WalletAccount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self.inner.lock();
        let mut state = serializer.serialize_struct("Wallet", 3)?;
        state.serialize_field("wallet", &data.id)?;
        state.serialize_field("user", &data.user_id)?;
        state.serialize_field(
            "balance",
            &data.balance.round_dp(WalletAccount::DECIMAL_PRECISION),
        )?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn data(balance: Decimal) -> WalletData {
        WalletData {
            id: WalletId(1),
            user_id: UserId(1),
            balance,
        }
    }

    #[test]
    fn wallet_data_debit_and_credit() {
        let mut data = data(dec!(100));
        assert_eq!(data.debit(dec!(30)).unwrap(), dec!(70));
        assert_eq!(data.credit(dec!(30)).unwrap(), dec!(100));
    }

    #[test]
    fn debit_of_exact_balance_reaches_zero() {
        let mut data = data(dec!(50));
        assert_eq!(data.debit(dec!(50)).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn debit_insufficient_leaves_balance() {
        let mut data = data(dec!(10));
        assert_eq!(data.debit(dec!(50)), Err(LedgerError::InsufficientFunds));
        assert_eq!(data.balance, dec!(10));
    }

    #[test]
    fn non_positive_amounts_rejected() {
        let mut data = data(dec!(10));
        assert_eq!(data.debit(Decimal::ZERO), Err(LedgerError::InvalidAmount));
        assert_eq!(data.credit(dec!(-1)), Err(LedgerError::InvalidAmount));
    }

    #[test]
    fn overflowing_credit_is_refused() {
        let mut data = data(Decimal::MAX);
        assert_eq!(data.credit(dec!(1)), Err(LedgerError::InvalidAmount));
        assert_eq!(data.balance, Decimal::MAX);
    }

    #[test]
    fn negative_opening_balance_is_clamped() {
        let wallet = WalletAccount::new(WalletId(2), UserId(2), dec!(-5));
        assert_eq!(wallet.balance(), Decimal::ZERO);
    }

    #[test]
    fn snapshot_reflects_current_state() {
        let wallet = WalletAccount::new(WalletId(3), UserId(7), dec!(20));
        wallet.try_debit(dec!(5)).unwrap();
        assert_eq!(
            wallet.snapshot(),
            Wallet {
                id: WalletId(3),
                user_id: UserId(7),
                balance: dec!(15)
            }
        );
    }

    #[test]
    fn serializer_rounds_to_four_decimal_places() {
        let wallet = WalletAccount::new(WalletId(1), UserId(1), dec!(123.456789));

        let json = serde_json::to_string(&wallet).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["wallet"], 1);
        assert_eq!(parsed["user"], 1);
        assert_eq!(parsed["balance"].as_str().unwrap(), "123.4568");
    }
}
