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

//! Purchase intents.
//!
//! An intent is the transient, product-specific description of what a user
//! wants to buy. It is never stored; its fields are reflected into the
//! transaction's reference, audit trail and the vendor payload.

use crate::base::{UserId, WalletId};
use crate::error::PurchaseError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Product families the engine can sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Airtime,
    Data,
    Electricity,
    Tv,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Airtime => "airtime",
            ProductType::Data => "data",
            ProductType::Electricity => "electricity",
            ProductType::Tv => "tv",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Electricity meter billing type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeterType {
    #[default]
    Prepaid,
    Postpaid,
}

impl MeterType {
    /// Lenient parse: anything other than "postpaid" is prepaid.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("postpaid") {
            MeterType::Postpaid
        } else {
            MeterType::Prepaid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MeterType::Prepaid => "prepaid",
            MeterType::Postpaid => "postpaid",
        }
    }
}

impl fmt::Display for MeterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated buyer, as handed over by the identity service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub user_id: UserId,
    pub email: String,
    pub full_name: Option<String>,
    pub address: Option<String>,
    pub phone_number: Option<String>,
}

impl Customer {
    pub fn new(user_id: UserId, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            ..Self::default()
        }
    }

    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or("Valued User")
    }
}

/// A request to buy one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "product", rename_all = "lowercase")]
pub enum PurchaseIntent {
    Airtime {
        network: String,
        phone_number: String,
        amount: Decimal,
    },
    Data {
        network: String,
        phone_number: String,
        plan_id: String,
        amount: Decimal,
    },
    Electricity {
        provider: String,
        meter_number: String,
        meter_type: MeterType,
        amount: Decimal,
    },
    Tv {
        smart_card_number: String,
        /// Plan selector on the vendor's recharge screen.
        value: u32,
    },
}

impl PurchaseIntent {
    pub fn product(&self) -> ProductType {
        match self {
            Self::Airtime { .. } => ProductType::Airtime,
            Self::Data { .. } => ProductType::Data,
            Self::Electricity { .. } => ProductType::Electricity,
            Self::Tv { .. } => ProductType::Tv,
        }
    }

    /// Phone, meter or smart card number the product is delivered to.
    pub fn recipient(&self) -> &str {
        match self {
            Self::Airtime { phone_number, .. } | Self::Data { phone_number, .. } => phone_number,
            Self::Electricity { meter_number, .. } => meter_number,
            Self::Tv {
                smart_card_number, ..
            } => smart_card_number,
        }
    }

    /// Provider string as supplied by the caller.
    ///
    /// TV has a single vendor, named by configuration.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Airtime { network, .. } | Self::Data { network, .. } => Some(network),
            Self::Electricity { provider, .. } => Some(provider),
            Self::Tv { .. } => None,
        }
    }

    /// Amount requested by the caller, when the product is priced by amount.
    pub fn requested_amount(&self) -> Option<Decimal> {
        match self {
            Self::Airtime { amount, .. }
            | Self::Data { amount, .. }
            | Self::Electricity { amount, .. } => Some(*amount),
            Self::Tv { .. } => None,
        }
    }

    /// Checks the fields that must hold before any price or balance work.
    pub fn validate(&self) -> Result<(), PurchaseError> {
        if self.recipient().trim().is_empty() {
            return Err(PurchaseError::InvalidRequest(format!(
                "{} recipient is required",
                self.product()
            )));
        }
        if let Some(provider) = self.provider() {
            if provider.trim().is_empty() {
                return Err(PurchaseError::InvalidRequest(
                    "provider is required".to_string(),
                ));
            }
        }
        if let Some(amount) = self.requested_amount() {
            if amount <= Decimal::ZERO {
                return Err(PurchaseError::InvalidRequest(
                    "amount must be positive".to_string(),
                ));
            }
        }
        if let Self::Data { plan_id, .. } = self {
            if plan_id.trim().is_empty() {
                return Err(PurchaseError::InvalidRequest(
                    "plan id is required".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Product-specific reference stored on the debit transaction.
    pub fn reference(&self, wallet_id: WalletId) -> String {
        let prefix = match self.product() {
            ProductType::Airtime => "AIRTIME",
            ProductType::Data => "DATA",
            ProductType::Electricity => "ELEC",
            ProductType::Tv => "TV",
        };
        format!("{}-{}-{}", prefix, wallet_id, self.recipient())
    }

    /// Short human description used in notifications.
    pub fn description(&self) -> String {
        match self {
            Self::Airtime {
                network, amount, ..
            } => format!("Airtime {} {}", network, amount),
            Self::Data {
                network, plan_id, ..
            } => format!("Data {} {}", network, plan_id),
            Self::Electricity {
                provider, amount, ..
            } => format!("Electricity {} {}", provider, amount),
            Self::Tv { value, .. } => format!("TV plan {}", value),
        }
    }

    /// Free-form detail recorded in the first audit event.
    pub fn summary(&self) -> String {
        match self {
            Self::Airtime { network, .. } => format!("Network: {}", network),
            Self::Data { plan_id, .. } => format!("Plan: {}", plan_id),
            Self::Electricity {
                provider,
                meter_type,
                ..
            } => format!("Provider: {}, Type: {}", provider, meter_type),
            Self::Tv { value, .. } => format!("Plan: {}", value),
        }
    }
}

/// Pre-purchase customer check for an electricity meter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectricityVerify {
    pub provider: String,
    pub meter_number: String,
    pub meter_type: MeterType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn airtime(amount: Decimal) -> PurchaseIntent {
        PurchaseIntent::Airtime {
            network: "MTN".to_string(),
            phone_number: "08031234567".to_string(),
            amount,
        }
    }

    #[test]
    fn references_are_product_prefixed() {
        let wallet = WalletId(9);
        assert_eq!(airtime(dec!(50)).reference(wallet), "AIRTIME-9-08031234567");

        let elec = PurchaseIntent::Electricity {
            provider: "EEDC".to_string(),
            meter_number: "45012345678".to_string(),
            meter_type: MeterType::Prepaid,
            amount: dec!(1000),
        };
        assert_eq!(elec.reference(wallet), "ELEC-9-45012345678");

        let tv = PurchaseIntent::Tv {
            smart_card_number: "7023456789".to_string(),
            value: 1,
        };
        assert_eq!(tv.reference(wallet), "TV-9-7023456789");
    }

    #[test]
    fn validate_rejects_non_positive_amount() {
        assert_eq!(
            airtime(dec!(0)).validate(),
            Err(PurchaseError::InvalidRequest(
                "amount must be positive".to_string()
            ))
        );
        assert!(airtime(dec!(-5)).validate().is_err());
        assert!(airtime(dec!(0.01)).validate().is_ok());
    }

    #[test]
    fn validate_rejects_blank_recipient_and_plan() {
        let blank = PurchaseIntent::Airtime {
            network: "glo".to_string(),
            phone_number: "  ".to_string(),
            amount: dec!(10),
        };
        assert!(blank.validate().is_err());

        let no_plan = PurchaseIntent::Data {
            network: "glo".to_string(),
            phone_number: "0805".to_string(),
            plan_id: String::new(),
            amount: dec!(10),
        };
        assert!(no_plan.validate().is_err());
    }

    #[test]
    fn meter_type_parse_is_lenient() {
        assert_eq!(MeterType::parse("POSTPAID"), MeterType::Postpaid);
        assert_eq!(MeterType::parse("prepaid"), MeterType::Prepaid);
        assert_eq!(MeterType::parse("whatever"), MeterType::Prepaid);
    }

    #[test]
    fn intent_deserializes_from_tagged_json() {
        let json = r#"{"product":"electricity","provider":"eedc","meter_number":"123","meter_type":"postpaid","amount":"2500"}"#;
        let intent: PurchaseIntent = serde_json::from_str(json).unwrap();
        assert_eq!(intent.product(), ProductType::Electricity);
        assert_eq!(intent.requested_amount(), Some(dec!(2500)));
    }
}
