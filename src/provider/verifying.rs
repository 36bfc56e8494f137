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

//! HTTP vendor that requires a customer verification before each purchase.
//!
//! Both calls answer with `{"code": "...", "message": "...", "data": {...}}`;
//! anything other than `code == "success"` is a refusal.

use super::{CustomerCheck, ProviderAdapter, Verification, VendorOrder, VendorReceipt, code_field};
use crate::error::VendorError;
use crate::intent::PurchaseIntent;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

const SUCCESS_CODE: &str = "success";

fn default_timeout_secs() -> u64 {
    30
}

/// Connection settings for the verifying vendor.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyingVendorConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct VerifyingVendorAdapter {
    name: String,
    client: Client,
    config: VerifyingVendorConfig,
}

impl VerifyingVendorAdapter {
    pub fn new(name: impl Into<String>, config: VerifyingVendorConfig) -> Self {
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

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, VendorError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VendorError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

fn message_of(payload: &Value) -> Option<String> {
    payload
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

#[async_trait]
impl ProviderAdapter for VerifyingVendorAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn verifies(&self) -> bool {
        true
    }

    async fn verify(&self, check: &CustomerCheck) -> Result<Verification, VendorError> {
        debug!(vendor = %self.name, customer = %check.customer_id, "verifying customer");
        let payload = self
            .post(
                "verify-customer",
                &json!({
                    "customer_id": check.customer_id,
                    "service_id": check.service_key,
                    "variation_id": check.meter_type.as_str(),
                }),
            )
            .await?;

        let success = code_field(&payload, "code").as_deref() == Some(SUCCESS_CODE);
        let data = payload.get("data").cloned().unwrap_or(Value::Null);
        let customer_name = data
            .get("customer_name")
            .and_then(|n| n.as_str())
            .map(str::to_string);

        Ok(Verification {
            success,
            message: message_of(&payload),
            customer_name,
            data,
        })
    }

    async fn purchase(&self, order: &VendorOrder) -> Result<VendorReceipt, VendorError> {
        let PurchaseIntent::Electricity {
            meter_number,
            meter_type,
            ..
        } = &order.intent
        else {
            return Err(VendorError::Unsupported(format!(
                "{} ({})",
                self.name,
                order.intent.product()
            )));
        };

        let payload = self
            .post(
                "electricity",
                &json!({
                    "request_id": order.trans_id,
                    "customer_id": meter_number,
                    "service_id": order.service_key,
                    "variation_id": meter_type.as_str(),
                    "amount": order.amount,
                }),
            )
            .await?;

        if code_field(&payload, "code").as_deref() != Some(SUCCESS_CODE) {
            let reason = message_of(&payload).unwrap_or_else(|| "Unknown error".to_string());
            return Err(VendorError::Rejected(reason));
        }

        let token = payload
            .get("data")
            .and_then(|d| d.get("token"))
            .and_then(|t| t.as_str())
            .map(str::to_string);
        if token.is_some() {
            info!(vendor = %self.name, trans_id = %order.trans_id, "token issued");
        }

        let mut receipt = VendorReceipt::from_payload(payload);
        receipt.token = token;
        Ok(receipt)
    }
}
