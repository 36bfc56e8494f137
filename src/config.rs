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

//! Engine configuration.
//!
//! Loaded from a TOML file; secrets may instead come from the environment
//! (the binary loads a `.env` file first):
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `TOPUP_GENERIC_PUBLIC_KEY` | `vendors.generic.public_key` |
//! | `TOPUP_GENERIC_SECRET_KEY` | `vendors.generic.secret_key` |
//! | `TOPUP_VERIFYING_API_KEY` | `vendors.verifying.api_key` |
//! | `TOPUP_TV_PASSWORD` | `tv.credentials.password` |
//! | `TOPUP_MAIL_API_KEY` | `mail.api_key` |
//! | `TOPUP_MAIL_API_SECRET` | `mail.api_secret` |

use crate::error::ConfigError;
use crate::notify::{LogNotifier, MailConfig, MailNotifier, NotifierRegistry};
use crate::orchestrator::OrchestratorSettings;
use crate::pricing::{PricingRule, PricingTable};
use crate::provider::{
    BrowserAutomationAdapter, Credentials, GenericVendorAdapter, GenericVendorConfig,
    SessionFactory, VerifyingVendorAdapter, VerifyingVendorConfig,
};
use crate::router::{ProviderRouter, ProviderRouterBuilder};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
}

impl LoggingConfig {
    /// Installs the global tracing subscriber. `RUST_LOG` wins over `level`.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.format.as_str() {
            "json" => fmt().json().with_env_filter(filter).init(),
            _ => fmt().with_env_filter(filter).init(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

fn default_vendor_timeout() -> u64 {
    60
}

fn default_trans_id_attempts() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_vendor_timeout")]
    pub vendor_timeout_secs: u64,
    #[serde(default = "default_trans_id_attempts")]
    pub trans_id_attempts: u32,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            vendor_timeout_secs: default_vendor_timeout(),
            trans_id_attempts: default_trans_id_attempts(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VendorsConfig {
    pub generic: Option<GenericVendorConfig>,
    pub verifying: Option<VerifyingVendorConfig>,
}

fn default_tv_vendor() -> String {
    "tv".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TvConfig {
    /// Name used in the `tv-{vendor}` pricing identifier.
    #[serde(default = "default_tv_vendor")]
    pub vendor: String,
    /// Cost price per plan selector, keyed by the selector as a string.
    #[serde(default)]
    pub plans: BTreeMap<String, Decimal>,
    #[serde(default)]
    pub credentials: Credentials,
}

impl Default for TvConfig {
    fn default() -> Self {
        Self {
            vendor: default_tv_vendor(),
            plans: BTreeMap::new(),
            credentials: Credentials::default(),
        }
    }
}

impl TvConfig {
    /// Plan table with parsed selectors.
    pub fn plan_prices(&self) -> Result<HashMap<u32, Decimal>, ConfigError> {
        self.plans
            .iter()
            .map(|(key, price)| {
                let selector = key.trim().parse::<u32>().map_err(|_| ConfigError::InvalidValue {
                    field: "tv.plans",
                    reason: format!("plan selector {:?} is not a number", key),
                })?;
                if *price <= Decimal::ZERO {
                    return Err(ConfigError::InvalidValue {
                        field: "tv.plans",
                        reason: format!("plan {} must have a positive price", selector),
                    });
                }
                Ok((selector, *price))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub vendors: VendorsConfig,
    #[serde(default)]
    pub tv: TvConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub pricing: Vec<PricingRule>,
}

fn env_override(target: &mut String, var: &str) {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            *target = value;
        }
    }
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Parses, applies environment overrides, then validates.
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(generic) = self.vendors.generic.as_mut() {
            env_override(&mut generic.public_key, "TOPUP_GENERIC_PUBLIC_KEY");
            env_override(&mut generic.secret_key, "TOPUP_GENERIC_SECRET_KEY");
        }
        if let Some(verifying) = self.vendors.verifying.as_mut() {
            env_override(&mut verifying.api_key, "TOPUP_VERIFYING_API_KEY");
        }
        env_override(&mut self.tv.credentials.password, "TOPUP_TV_PASSWORD");
        env_override(&mut self.mail.api_key, "TOPUP_MAIL_API_KEY");
        env_override(&mut self.mail.api_secret, "TOPUP_MAIL_API_SECRET");
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.vendor_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "vendor_timeout_secs",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.engine.trans_id_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "trans_id_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(generic) = &self.vendors.generic {
            if generic.base_url.is_empty() {
                return Err(ConfigError::MissingField {
                    field: "vendors.generic.base_url",
                });
            }
        }
        if let Some(verifying) = &self.vendors.verifying {
            if verifying.base_url.is_empty() {
                return Err(ConfigError::MissingField {
                    field: "vendors.verifying.base_url",
                });
            }
        }
        if self.mail.enabled {
            if self.mail.api_url.is_empty() {
                return Err(ConfigError::MissingField {
                    field: "mail.api_url",
                });
            }
            if self.mail.from.is_empty() {
                return Err(ConfigError::MissingField { field: "mail.from" });
            }
        }
        if let Some(rule) = self.pricing.iter().find(|r| r.value < Decimal::ZERO) {
            return Err(ConfigError::InvalidValue {
                field: "pricing",
                reason: format!("{} has a negative markup", rule.service_identifier),
            });
        }
        self.tv.plan_prices()?;
        Ok(())
    }

    pub fn settings(&self) -> Result<OrchestratorSettings, ConfigError> {
        Ok(OrchestratorSettings {
            vendor_timeout: Duration::from_secs(self.engine.vendor_timeout_secs),
            trans_id_attempts: self.engine.trans_id_attempts,
            tv_vendor: self.tv.vendor.clone(),
            tv_plans: self.tv.plan_prices()?,
        })
    }

    pub fn pricing_table(&self) -> PricingTable {
        self.pricing
            .iter()
            .map(|rule| PricingRule::new(&rule.service_identifier, rule.kind, rule.value))
            .collect()
    }

    /// Router over the HTTP vendors. A TV adapter needs a session factory;
    /// add one with [`browser_adapter`](Self::browser_adapter).
    pub fn router_builder(&self) -> ProviderRouterBuilder {
        let mut builder = ProviderRouter::builder();
        if let Some(generic) = &self.vendors.generic {
            builder = builder.generic(Arc::new(GenericVendorAdapter::new(
                "generic",
                generic.clone(),
            )));
        }
        if let Some(verifying) = &self.vendors.verifying {
            builder = builder.enugu_electric(Arc::new(VerifyingVendorAdapter::new(
                "verifying",
                verifying.clone(),
            )));
        }
        builder
    }

    /// TV adapter logged in with `[tv.credentials]`, named after `tv.vendor`.
    ///
    /// The session factory (the browser driver) is supplied by the caller.
    pub fn browser_adapter(&self, factory: Arc<dyn SessionFactory>) -> BrowserAutomationAdapter {
        BrowserAutomationAdapter::new(&self.tv.vendor, self.tv.credentials.clone(), factory)
    }

    /// Log notifier, plus mail when enabled. Call inside a tokio runtime.
    pub fn notifiers(&self) -> NotifierRegistry {
        let mut registry = NotifierRegistry::new();
        registry.register(Box::new(LogNotifier));
        if self.mail.enabled {
            registry.register(Box::new(MailNotifier::new(self.mail.clone())));
        }
        registry
    }
}
