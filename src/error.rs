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

//! Error types for purchase processing.
//!
//! Three layers of failure are kept apart:
//!
//! - [`LedgerError`]: the wallet/transaction store refused or failed an operation.
//! - [`VendorError`]: a fulfillment provider failed, timed out or answered ambiguously.
//! - [`PurchaseError`]: what the caller of the orchestrator sees.
//!
//! [`ConfigError`] covers loading the engine configuration.

use crate::base::TransactionId;
use crate::intent::ProductType;
use thiserror::Error;

/// Ledger collaborator errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// No wallet with the given id or owner
    #[error("wallet not found")]
    WalletNotFound,

    /// The user already owns a wallet
    #[error("user already has a wallet")]
    WalletExists,

    /// Debit would take the balance below zero
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Amount is zero or negative
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Referenced transaction does not exist
    #[error("transaction not found")]
    TransactionNotFound,

    /// Correlation id already used by another transaction
    #[error("duplicate trans id {0}")]
    DuplicateTransId(String),

    /// Status change not allowed from the current status
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Backing store failed
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Fulfillment provider errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VendorError {
    #[error("vendor call timed out")]
    Timeout,

    #[error("vendor returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The vendor answered but reported a non-success outcome
    #[error("vendor rejected the request: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid vendor response: {0}")]
    Decode(String),

    #[error("automation failed: {0}")]
    Automation(String),

    #[error("{0} does not support this operation")]
    Unsupported(String),
}

impl From<reqwest::Error> for VendorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VendorError::Timeout
        } else if err.is_decode() {
            VendorError::Decode(err.to_string())
        } else {
            VendorError::Transport(err.to_string())
        }
    }
}

/// Errors returned to the caller of a purchase.
///
/// When a variant carries a `transaction_id`, the debit was recorded under
/// that id and has already been refunded by the time the error is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PurchaseError {
    /// Intent failed field validation; nothing was touched
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The user has no wallet; nothing was touched
    #[error("wallet not found")]
    NotFound,

    /// Balance below the selling price; nothing was touched
    #[error("insufficient funds")]
    InsufficientFunds,

    /// No adapter is registered for the product
    #[error("no provider available for {0}")]
    Unavailable(ProductType),

    /// Pre-purchase verification rejected the customer
    #[error("verification failed: {reason}")]
    VerificationFailed {
        transaction_id: Option<TransactionId>,
        reason: String,
    },

    /// The vendor failed to deliver
    #[error("transaction failed: {source}")]
    Vendor {
        transaction_id: TransactionId,
        source: VendorError,
    },

    /// A vendor call outside a purchase (refresh, lookup, verify) failed
    #[error("provider error: {0}")]
    Provider(VendorError),

    /// A debit or credit could not be completed; needs out-of-band reconciliation
    #[error("ledger inconsistency: {0}")]
    LedgerInconsistency(String),
}

impl PurchaseError {
    /// Whether the failure was caused by the request rather than by a
    /// provider or ledger fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PurchaseError::InvalidRequest(_)
                | PurchaseError::NotFound
                | PurchaseError::InsufficientFunds
                | PurchaseError::VerificationFailed { .. }
        )
    }

    /// Id of the refunded debit transaction, if the attempt got that far.
    pub fn transaction_id(&self) -> Option<TransactionId> {
        match self {
            PurchaseError::VerificationFailed { transaction_id, .. } => *transaction_id,
            PurchaseError::Vendor { transaction_id, .. } => Some(*transaction_id),
            _ => None,
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        assert_eq!(PurchaseError::NotFound.to_string(), "wallet not found");
        assert_eq!(
            PurchaseError::InsufficientFunds.to_string(),
            "insufficient funds"
        );
        assert_eq!(
            PurchaseError::Vendor {
                transaction_id: TransactionId(7),
                source: VendorError::Timeout,
            }
            .to_string(),
            "transaction failed: vendor call timed out"
        );
        assert_eq!(
            PurchaseError::VerificationFailed {
                transaction_id: None,
                reason: "meter not found".to_string(),
            }
            .to_string(),
            "verification failed: meter not found"
        );
        assert_eq!(
            LedgerError::DuplicateTransId("250101120000ABC".to_string()).to_string(),
            "duplicate trans id 250101120000ABC"
        );
        assert_eq!(
            VendorError::Status {
                status: 502,
                body: "bad gateway".to_string()
            }
            .to_string(),
            "vendor returned HTTP 502: bad gateway"
        );
    }

    #[test]
    fn admission_failures_are_client_errors() {
        assert!(PurchaseError::NotFound.is_client_error());
        assert!(PurchaseError::InsufficientFunds.is_client_error());
        assert!(PurchaseError::InvalidRequest("amount".into()).is_client_error());
        assert!(
            PurchaseError::VerificationFailed {
                transaction_id: Some(TransactionId(1)),
                reason: "x".into()
            }
            .is_client_error()
        );
    }

    #[test]
    fn provider_and_ledger_faults_are_server_errors() {
        let vendor = PurchaseError::Vendor {
            transaction_id: TransactionId(3),
            source: VendorError::Rejected("out of stock".into()),
        };
        assert!(!vendor.is_client_error());
        assert_eq!(vendor.transaction_id(), Some(TransactionId(3)));
        assert!(!PurchaseError::LedgerInconsistency("credit failed".into()).is_client_error());
        assert!(!PurchaseError::Unavailable(ProductType::Tv).is_client_error());
        assert!(!PurchaseError::Provider(VendorError::Timeout).is_client_error());
        assert_eq!(PurchaseError::NotFound.transaction_id(), None);
    }

    #[test]
    fn errors_are_cloneable() {
        let error = PurchaseError::InsufficientFunds;
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }
}
