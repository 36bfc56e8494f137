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

//! Fulfillment provider adapters.
//!
//! Every vendor integration implements [`ProviderAdapter`]. Adapters only
//! talk to their vendor: they never touch the ledger or notifications, and
//! they report failure as a [`VendorError`] value, never by panicking.
//!
//! | Adapter | Verification | Transport |
//! |---------|--------------|-----------|
//! | [`GenericVendorAdapter`] | no | HTTP JSON |
//! | [`VerifyingVendorAdapter`] | yes, gates purchase | HTTP JSON |
//! | [`BrowserAutomationAdapter`] | no | serialized browser session |

mod browser;
mod generic;
mod verifying;

pub use browser::{
    AutomationError, AutomationSession, BrowserAutomationAdapter, Credentials, SessionFactory,
};
pub use generic::{GenericVendorAdapter, GenericVendorConfig};
pub use verifying::{VerifyingVendorAdapter, VerifyingVendorConfig};

use crate::error::VendorError;
use crate::identifier::TransId;
use crate::intent::{Customer, MeterType, PurchaseIntent};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A purchase as forwarded to a vendor.
#[derive(Debug, Clone)]
pub struct VendorOrder {
    pub trans_id: TransId,
    /// Vendor's own identifier for the product (network, plan or disco).
    pub service_key: String,
    /// Cost price. The platform markup is never forwarded.
    pub amount: Decimal,
    pub intent: PurchaseIntent,
    pub customer: Customer,
}

/// Successful vendor answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorReceipt {
    /// Vendor response, stored verbatim in the audit trail.
    pub payload: serde_json::Value,
    pub message: Option<String>,
    /// Electricity token, when the vendor issues one.
    pub token: Option<String>,
}

impl VendorReceipt {
    pub fn from_payload(payload: serde_json::Value) -> Self {
        let message = payload
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string);
        Self {
            payload,
            message,
            token: None,
        }
    }

    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            payload: serde_json::json!({ "message": message }),
            message: Some(message),
            token: None,
        }
    }
}

/// Customer lookup performed before an electricity purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerCheck {
    pub service_key: String,
    pub customer_id: String,
    pub meter_type: MeterType,
}

/// Outcome of a customer verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub success: bool,
    pub message: Option<String>,
    pub customer_name: Option<String>,
    pub data: serde_json::Value,
}

impl Verification {
    /// Returned for providers that have no verification step.
    pub fn skipped() -> Self {
        Self {
            success: true,
            message: Some("Verification skipped for this provider".to_string()),
            customer_name: None,
            data: serde_json::Value::Null,
        }
    }

    pub fn reason(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "customer could not be verified".to_string())
    }
}

/// Uniform contract over heterogeneous vendor integrations.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Whether [`verify`](Self::verify) must run before every purchase.
    fn verifies(&self) -> bool {
        false
    }

    async fn verify(&self, _check: &CustomerCheck) -> Result<Verification, VendorError> {
        Err(VendorError::Unsupported(self.name().to_string()))
    }

    async fn purchase(&self, order: &VendorOrder) -> Result<VendorReceipt, VendorError>;

    /// Re-sends the current subscription to a TV decoder.
    async fn refresh(&self, _account: &str) -> Result<VendorReceipt, VendorError> {
        Err(VendorError::Unsupported(self.name().to_string()))
    }

    /// Fetches subscriber details for a TV smart card.
    async fn lookup(&self, _account: &str) -> Result<serde_json::Value, VendorError> {
        Err(VendorError::Unsupported(self.name().to_string()))
    }
}

/// Reads a vendor status code that may arrive as a string or a number.
pub(crate) fn code_field(payload: &serde_json::Value, field: &str) -> Option<String> {
    match payload.get(field)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
