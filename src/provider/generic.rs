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

//! Single-call HTTP vendor used for airtime, data and most electricity discos.

use super::{ProviderAdapter, VendorOrder, VendorReceipt, code_field};
use crate::error::VendorError;
use crate::intent::PurchaseIntent;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

const SUCCESS_CODE: &str = "200";
const DEFAULT_PHONE: &str = "08000000000";
const DEFAULT_ADDRESS: &str = "Nigeria";

fn default_timeout_secs() -> u64 {
    30
}

/// Connection settings for the generic vendor.
#[derive(Debug, Clone, Deserialize)]
pub struct GenericVendorConfig {
    pub base_url: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Vendor with a single `purchase` call and no verification step.
#[derive(Debug, Clone)]
pub struct GenericVendorAdapter {
    name: String,
    client: Client,
    config: GenericVendorConfig,
}

impl GenericVendorAdapter {
    pub fn new(name: impl Into<String>, config: GenericVendorConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            name: name.into(),
            client,
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/services/", self.config.base_url.trim_end_matches('/'))
    }

    /// Builds the product-specific request body.
    fn payload(order: &VendorOrder) -> Result<Value, VendorError> {
        let customer = &order.customer;
        let name = customer.full_name.clone().unwrap_or_default();
        let address = customer.address.clone().unwrap_or_default();

        let body = match &order.intent {
            PurchaseIntent::Airtime { phone_number, .. } => json!({
                "service_id": order.service_key,
                "phoneNumber": phone_number,
                "amount": order.amount,
                "trans_id": order.trans_id,
                "email": customer.email,
                "customerName": name,
                "address": address,
            }),
            // Plan id determines the price on the vendor side
            PurchaseIntent::Data { phone_number, .. } => json!({
                "service_id": order.service_key,
                "phoneNumber": phone_number,
                "trans_id": order.trans_id,
                "email": customer.email,
                "customerName": name,
                "address": address,
            }),
            PurchaseIntent::Electricity {
                meter_number,
                meter_type,
                ..
            } => json!({
                "service_id": order.service_key,
                "meterNumber": meter_number,
                "amount": order.amount,
                "trans_id": order.trans_id,
                "phoneNumber": customer.phone_number.as_deref().unwrap_or(DEFAULT_PHONE),
                "customerDtNumber": "0000",
                "customerAddress": customer.address.as_deref().unwrap_or(DEFAULT_ADDRESS),
                "customerAccountType": meter_type.as_str().to_uppercase(),
                "contactType": "LANDLORD",
                "email": customer.email,
                "customerName": name,
                "address": address,
            }),
            PurchaseIntent::Tv { .. } => {
                return Err(VendorError::Unsupported(
                    "generic vendor (tv subscriptions)".to_string(),
                ));
            }
        };
        Ok(body)
    }
}

#[async_trait]
impl ProviderAdapter for GenericVendorAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn purchase(&self, order: &VendorOrder) -> Result<VendorReceipt, VendorError> {
        let body = Self::payload(order)?;
        debug!(vendor = %self.name, trans_id = %order.trans_id, "sending purchase");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.secret_key)
            .header("X-Public-Key", &self.config.public_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(vendor = %self.name, status = status.as_u16(), "vendor returned error status");
            return Err(VendorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await?;
        match code_field(&payload, "statusCode") {
            Some(code) if code != SUCCESS_CODE => {
                let reason = payload
                    .get("message")
                    .or_else(|| payload.get("details"))
                    .map(|m| m.as_str().map(str::to_string).unwrap_or_else(|| m.to_string()))
                    .unwrap_or_else(|| format!("status code {}", code));
                Err(VendorError::Rejected(reason))
            }
            _ => Ok(VendorReceipt::from_payload(payload)),
        }
    }
}
