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

//! Provider selection.
//!
//! The router maps a purchase intent to the adapter that fulfils it and to
//! the vendor's service key. It never rejects an unknown provider string:
//! those are forwarded to the generic adapter and fail at the vendor.

use crate::error::PurchaseError;
use crate::intent::{ElectricityVerify, ProductType, PurchaseIntent};
use crate::provider::{CustomerCheck, ProviderAdapter};
use std::sync::Arc;

/// Canonical service key of the distribution company served by the
/// verifying vendor.
pub const ENUGU_ELECTRIC: &str = "enugu-electric";

const ENUGU_ALIASES: [&str; 3] = ["eedc", "eddc", ENUGU_ELECTRIC];

/// Maps a caller-supplied electricity provider to the canonical key of the
/// verifying vendor, if it is one of its aliases.
pub fn canonical_electricity(provider: &str) -> Option<&'static str> {
    let provider = provider.trim();
    ENUGU_ALIASES
        .iter()
        .any(|alias| provider.eq_ignore_ascii_case(alias))
        .then_some(ENUGU_ELECTRIC)
}

/// Adapter chosen for one intent.
#[derive(Clone)]
pub struct Route {
    pub adapter: Arc<dyn ProviderAdapter>,
    pub service_key: String,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("adapter", &self.adapter.name())
            .field("service_key", &self.service_key)
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct ProviderRouter {
    airtime: Option<Arc<dyn ProviderAdapter>>,
    data: Option<Arc<dyn ProviderAdapter>>,
    electricity: Option<Arc<dyn ProviderAdapter>>,
    enugu_electric: Option<Arc<dyn ProviderAdapter>>,
    tv: Option<Arc<dyn ProviderAdapter>>,
}

impl ProviderRouter {
    pub fn builder() -> ProviderRouterBuilder {
        ProviderRouterBuilder::default()
    }

    pub fn route(&self, intent: &PurchaseIntent) -> Result<Route, PurchaseError> {
        let (slot, service_key) = match intent {
            PurchaseIntent::Airtime { network, .. } => (&self.airtime, network.to_lowercase()),
            PurchaseIntent::Data { plan_id, .. } => (&self.data, plan_id.clone()),
            PurchaseIntent::Electricity { provider, .. } => match canonical_electricity(provider) {
                Some(key) => (&self.enugu_electric, key.to_string()),
                None => (&self.electricity, provider.clone()),
            },
            PurchaseIntent::Tv { value, .. } => (&self.tv, value.to_string()),
        };

        let adapter = slot
            .clone()
            .ok_or(PurchaseError::Unavailable(intent.product()))?;
        Ok(Route {
            adapter,
            service_key,
        })
    }

    /// Routes a standalone meter check; returns the adapter and the check to
    /// run against it.
    pub fn route_verify(
        &self,
        request: &ElectricityVerify,
    ) -> Result<(Arc<dyn ProviderAdapter>, CustomerCheck), PurchaseError> {
        let (slot, service_key) = match canonical_electricity(&request.provider) {
            Some(key) => (&self.enugu_electric, key.to_string()),
            None => (&self.electricity, request.provider.clone()),
        };
        let adapter = slot
            .clone()
            .ok_or(PurchaseError::Unavailable(ProductType::Electricity))?;
        Ok((
            adapter,
            CustomerCheck {
                service_key,
                customer_id: request.meter_number.clone(),
                meter_type: request.meter_type,
            },
        ))
    }

    pub fn tv(&self) -> Result<Arc<dyn ProviderAdapter>, PurchaseError> {
        self.tv.clone().ok_or(PurchaseError::Unavailable(ProductType::Tv))
    }
}

#[derive(Default)]
pub struct ProviderRouterBuilder {
    router: ProviderRouter,
}

impl ProviderRouterBuilder {
    pub fn airtime(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.router.airtime = Some(adapter);
        self
    }

    pub fn data(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.router.data = Some(adapter);
        self
    }

    /// Fallback for every electricity provider outside the verifying vendor.
    pub fn electricity(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.router.electricity = Some(adapter);
        self
    }

    pub fn enugu_electric(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.router.enugu_electric = Some(adapter);
        self
    }

    pub fn tv(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.router.tv = Some(adapter);
        self
    }

    /// Registers one adapter for airtime, data and generic electricity.
    pub fn generic(self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.airtime(Arc::clone(&adapter))
            .data(Arc::clone(&adapter))
            .electricity(adapter)
    }

    pub fn build(self) -> ProviderRouter {
        self.router
    }
}
