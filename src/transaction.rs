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

//! Transaction records.
//!
//! A purchase attempt produces one debit record. Its status follows:
//!
//! ```text
//! Processing ──vendor ok──► Success
//!      │
//!      └──vendor/verification error──► Failed  (+ one Credit record, Success, "REFUND-{id}")
//! ```
//!
//! Only the status and the append-only audit trail ever change after creation.

use crate::base::{TransactionId, UserId, WalletId};
use crate::error::LedgerError;
use crate::identifier::TransId;
use crate::intent::ProductType;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Debit,
    Credit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Processing,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Processing)
    }

    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Processing, TransactionStatus::Success)
                | (TransactionStatus::Processing, TransactionStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Processing => "processing",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a transaction was for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Airtime,
    Data,
    Electricity,
    Tv,
    Refund,
}

impl From<ProductType> for ServiceType {
    fn from(product: ProductType) -> Self {
        match product {
            ProductType::Airtime => ServiceType::Airtime,
            ProductType::Data => ServiceType::Data,
            ProductType::Electricity => ServiceType::Electricity,
            ProductType::Tv => ServiceType::Tv,
        }
    }
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Airtime => "airtime",
            ServiceType::Data => "data",
            ServiceType::Electricity => "electricity",
            ServiceType::Tv => "tv",
            ServiceType::Refund => "refund",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditStage {
    Created,
    Verification,
    VendorResponse,
    VendorError,
    Refund,
}

/// One entry of a transaction's audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub at: DateTime<Utc>,
    pub stage: AuditStage,
    pub payload: serde_json::Value,
}

impl AuditEvent {
    pub fn new(stage: AuditStage, payload: serde_json::Value) -> Self {
        Self {
            at: Utc::now(),
            stage,
            payload,
        }
    }

    pub fn note(stage: AuditStage, text: impl Into<String>) -> Self {
        Self::new(stage, serde_json::Value::String(text.into()))
    }
}

/// Fields supplied when recording a new transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub wallet_id: WalletId,
    pub user_id: UserId,
    pub trans_id: TransId,
    pub amount: Decimal,
    pub direction: Direction,
    pub status: TransactionStatus,
    pub reference: String,
    pub service_type: ServiceType,
    pub audit: Vec<AuditEvent>,
    pub profit: Decimal,
}

/// Change applied to an existing transaction.
#[derive(Debug, Clone, Default)]
pub struct TransactionUpdate {
    pub status: Option<TransactionStatus>,
    /// Appended in order; never replaces existing events.
    pub audit: Vec<AuditEvent>,
}

impl TransactionUpdate {
    pub fn status(status: TransactionStatus) -> Self {
        Self {
            status: Some(status),
            audit: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: AuditEvent) -> Self {
        self.audit.push(event);
        self
    }
}

/// A stored transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub user_id: UserId,
    pub trans_id: TransId,
    pub amount: Decimal,
    pub direction: Direction,
    pub status: TransactionStatus,
    pub reference: String,
    pub service_type: ServiceType,
    pub audit: Vec<AuditEvent>,
    pub profit: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn from_new(id: TransactionId, new: NewTransaction) -> Self {
        let now = Utc::now();
        Self {
            id,
            wallet_id: new.wallet_id,
            user_id: new.user_id,
            trans_id: new.trans_id,
            amount: new.amount,
            direction: new.direction,
            status: new.status,
            reference: new.reference,
            service_type: new.service_type,
            audit: new.audit,
            profit: new.profit,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies an update, rejecting transitions out of a terminal status.
    pub fn apply(&mut self, update: TransactionUpdate) -> Result<(), LedgerError> {
        if let Some(next) = update.status {
            if next != self.status && !self.status.can_transition_to(next) {
                return Err(LedgerError::InvalidTransition {
                    from: self.status.to_string(),
                    to: next.to_string(),
                });
            }
            self.status = next;
        }
        self.audit.extend(update.audit);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Reference used by the compensating credit of this transaction.
    pub fn refund_reference(&self) -> String {
        format!("REFUND-{}", self.id)
    }
}
