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

//! Adapter around a browser-driven vendor portal.
//!
//! The portal is driven through one exclusive [`AutomationSession`]. The
//! adapter owns that session in a slot with an explicit lifecycle:
//!
//! ```text
//! acquire ──► health check ──alive──► login + act ──► keep for next call
//!                  │                        │
//!                  └──dead──► rebuild       └──SessionLost──► discard, retry once
//! ```
//!
//! Every call holds the slot's mutex for its whole duration, so portal
//! operations are strictly serialized. Session work is blocking and runs on
//! the blocking thread pool.
//!
//! Blocking work cannot be cancelled. If the caller stops waiting (for
//! example when the orchestrator's vendor timeout fires and the purchase is
//! refunded), the portal operation still runs to completion and keeps the
//! session lock until then. Such late outcomes are logged at `warn` with the
//! operation and trans id, and counted by
//! [`BrowserAutomationAdapter::unclaimed_results`], so a recharge that
//! landed after its refund can be reconciled.

use super::{ProviderAdapter, VendorOrder, VendorReceipt};
use crate::error::VendorError;
use crate::intent::PurchaseIntent;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Total attempts per operation: the first try plus one retry on session loss.
const MAX_ATTEMPTS: u32 = 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AutomationError {
    /// The browser crashed or the session id became invalid
    #[error("session lost: {0}")]
    SessionLost(String),

    /// The portal flow itself failed (element missing, rejected recharge, ...)
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// One live browser session on the vendor portal.
pub trait AutomationSession: Send {
    /// Cheap liveness check.
    fn is_alive(&mut self) -> bool;

    /// Clears cookies and other state left by the previous operation.
    fn reset(&mut self) -> Result<(), AutomationError>;

    fn login(&mut self, credentials: &Credentials) -> Result<(), AutomationError>;

    /// Buys `plan` for the smart card and returns the portal's confirmation.
    fn recharge(&mut self, smart_card: &str, plan: u32) -> Result<String, AutomationError>;

    fn refresh(&mut self, smart_card: &str) -> Result<String, AutomationError>;

    fn lookup(&mut self, smart_card: &str) -> Result<BTreeMap<String, String>, AutomationError>;

    fn quit(&mut self);
}

/// Builds new sessions when the slot is empty or its session died.
pub trait SessionFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn AutomationSession>, AutomationError>;
}

struct SessionSlot {
    factory: Arc<dyn SessionFactory>,
    session: Option<Box<dyn AutomationSession>>,
    opened: u64,
}

impl SessionSlot {
    /// Returns a healthy session, rebuilding it if needed.
    fn acquire(&mut self) -> Result<&mut Box<dyn AutomationSession>, AutomationError> {
        let healthy = self.session.as_mut().is_some_and(|s| s.is_alive());
        if !healthy {
            self.discard();
            let fresh = self.factory.open()?;
            self.opened += 1;
            info!(opened = self.opened, "automation session started");
            return Ok(self.session.insert(fresh));
        }
        self.session
            .as_mut()
            .ok_or_else(|| AutomationError::SessionLost("session slot empty".to_string()))
    }

    fn discard(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.quit();
        }
    }

    /// Runs login-and-act, rebuilding the session and retrying once on loss.
    fn run<T>(
        &mut self,
        credentials: &Credentials,
        op: &dyn Fn(&mut dyn AutomationSession) -> Result<T, AutomationError>,
    ) -> Result<T, AutomationError> {
        let mut last_error = AutomationError::SessionLost("no attempt made".to_string());
        for attempt in 1..=MAX_ATTEMPTS {
            let outcome = self.acquire().and_then(|session| {
                session.reset()?;
                session.login(credentials)?;
                op(session.as_mut())
            });

            match outcome {
                Ok(value) => return Ok(value),
                Err(AutomationError::SessionLost(reason)) => {
                    warn!(attempt, max = MAX_ATTEMPTS, %reason, "automation session lost");
                    self.discard();
                    last_error = AutomationError::SessionLost(reason);
                }
                Err(other) => return Err(other),
            }
        }
        Err(last_error)
    }
}

/// TV vendor adapter backed by a serialized browser session.
///
/// A timed-out call is not cancelled: see the module docs.
#[derive(Clone)]
pub struct BrowserAutomationAdapter {
    name: String,
    credentials: Arc<Credentials>,
    slot: Arc<Mutex<SessionSlot>>,
    unclaimed: Arc<AtomicU64>,
}

impl BrowserAutomationAdapter {
    pub fn new(
        name: impl Into<String>,
        credentials: Credentials,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        Self {
            name: name.into(),
            credentials: Arc::new(credentials),
            slot: Arc::new(Mutex::new(SessionSlot {
                factory,
                session: None,
                opened: 0,
            })),
            unclaimed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of sessions opened so far, rebuilds included.
    pub fn sessions_opened(&self) -> u64 {
        self.slot.lock().opened
    }

    /// Closes the current session. The next call opens a new one.
    pub fn release(&self) {
        self.slot.lock().discard();
    }

    /// Operations that finished after their caller had stopped waiting.
    pub fn unclaimed_results(&self) -> u64 {
        self.unclaimed.load(Ordering::SeqCst)
    }

    /// Runs `op` on the blocking pool while holding the session lock.
    async fn execute<T, F>(&self, operation: String, op: F) -> Result<T, VendorError>
    where
        T: Send + 'static,
        F: Fn(&mut dyn AutomationSession) -> Result<T, AutomationError> + Send + 'static,
    {
        let slot = Arc::clone(&self.slot);
        let credentials = Arc::clone(&self.credentials);
        let unclaimed = Arc::clone(&self.unclaimed);
        let vendor = self.name.clone();
        let (tx, rx) = oneshot::channel();

        tokio::task::spawn_blocking(move || {
            let mut slot = slot.lock();
            let result = slot.run(&credentials, &op);
            if let Err(result) = tx.send(result) {
                unclaimed.fetch_add(1, Ordering::SeqCst);
                match result {
                    Ok(_) => warn!(
                        %vendor,
                        %operation,
                        "automation completed after the caller gave up, vendor may have delivered"
                    ),
                    Err(err) => warn!(
                        %vendor,
                        %operation,
                        error = %err,
                        "automation failed after the caller gave up"
                    ),
                }
            }
        });

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(VendorError::Automation(err.to_string())),
            Err(_) => Err(VendorError::Automation(
                "automation worker stopped without a result".to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for BrowserAutomationAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserAutomationAdapter")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProviderAdapter for BrowserAutomationAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn purchase(&self, order: &VendorOrder) -> Result<VendorReceipt, VendorError> {
        let PurchaseIntent::Tv {
            smart_card_number,
            value,
        } = &order.intent
        else {
            return Err(VendorError::Unsupported(format!(
                "{} ({})",
                self.name,
                order.intent.product()
            )));
        };

        let card = smart_card_number.clone();
        let plan = *value;
        let operation = format!("recharge {}", order.trans_id);
        let message = self
            .execute(operation, move |session| session.recharge(&card, plan))
            .await?;
        info!(vendor = %self.name, trans_id = %order.trans_id, %message, "tv recharge complete");
        Ok(VendorReceipt::from_message(message))
    }

    async fn refresh(&self, account: &str) -> Result<VendorReceipt, VendorError> {
        let card = account.to_string();
        let message = self
            .execute(format!("refresh {}", account), move |session| {
                session.refresh(&card)
            })
            .await?;
        Ok(VendorReceipt::from_message(message))
    }

    async fn lookup(&self, account: &str) -> Result<serde_json::Value, VendorError> {
        let card = account.to_string();
        let details = self
            .execute(format!("lookup {}", account), move |session| {
                session.lookup(&card)
            })
            .await?;
        serde_json::to_value(details).map_err(|e| VendorError::Decode(e.to_string()))
    }
}
