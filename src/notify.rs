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

//! Purchase notifications.
//!
//! Notifications are fire-and-forget: [`Notifier::notify`] returns
//! immediately and delivery failures are logged, never surfaced to the
//! purchase that raised the event.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Fields common to every purchase event.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseNotice {
    pub email: String,
    pub name: String,
    /// Human product description, e.g. "Airtime mtn 100".
    pub service: String,
    pub amount: Decimal,
    /// Correlation id of the debit.
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    PurchaseSucceeded {
        notice: PurchaseNotice,
        recipient: String,
    },
    PurchaseFailed {
        notice: PurchaseNotice,
        reason: String,
    },
    Refunded {
        notice: PurchaseNotice,
    },
}

impl Event {
    pub fn notice(&self) -> &PurchaseNotice {
        match self {
            Event::PurchaseSucceeded { notice, .. }
            | Event::PurchaseFailed { notice, .. }
            | Event::Refunded { notice } => notice,
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Event::PurchaseSucceeded { notice, .. } => {
                format!("Purchase Successful: {}", notice.service)
            }
            Event::PurchaseFailed { notice, .. } => format!("Purchase Failed: {}", notice.service),
            Event::Refunded { .. } => "Refund Processed".to_string(),
        }
    }

    /// Plain-text body for mail delivery.
    pub fn body(&self) -> String {
        let notice = self.notice();
        let mut text = format!(
            "Hello {},\n\nService: {}\nAmount: {}\nReference: {}\n",
            notice.name, notice.service, notice.amount, notice.reference
        );
        match self {
            Event::PurchaseSucceeded { recipient, .. } => {
                text.push_str(&format!("Recipient: {}\n", recipient));
            }
            Event::PurchaseFailed { reason, .. } => {
                text.push_str(&format!("Reason: {}\n", reason));
            }
            Event::Refunded { .. } => {
                text.push_str("The amount has been returned to your wallet.\n");
            }
        }
        text
    }
}

/// Receives purchase events.
///
/// `notify` must return quickly; slow delivery belongs on a spawned task.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: Event);
}

/// Broadcasts events to every registered notifier.
#[derive(Default)]
pub struct NotifierRegistry {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn notify_all(&self, event: Event) {
        for notifier in &self.notifiers {
            notifier.notify(event.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

/// Writes every event as a structured log line.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: Event) {
        match &event {
            Event::PurchaseSucceeded { notice, recipient } => info!(
                email = %notice.email,
                service = %notice.service,
                amount = %notice.amount,
                reference = %notice.reference,
                %recipient,
                "purchase succeeded"
            ),
            Event::PurchaseFailed { notice, reason } => warn!(
                email = %notice.email,
                service = %notice.service,
                amount = %notice.amount,
                reference = %notice.reference,
                %reason,
                "purchase failed"
            ),
            Event::Refunded { notice } => info!(
                email = %notice.email,
                amount = %notice.amount,
                reference = %notice.reference,
                "refund processed"
            ),
        }
    }
}

fn default_mail_timeout() -> u64 {
    10
}

/// Transactional mail API settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub from_name: String,
    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,
}

/// Sends each event as a transactional email.
///
/// Events are queued to a background task which posts them one at a time.
/// Must be constructed inside a tokio runtime.
pub struct MailNotifier {
    sender: mpsc::UnboundedSender<Event>,
}

impl MailNotifier {
    pub fn new(config: MailConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(mail_worker(config, receiver));
        Self { sender }
    }
}

impl Notifier for MailNotifier {
    fn notify(&self, event: Event) {
        if self.sender.send(event).is_err() {
            warn!("mail notifier channel closed");
        }
    }
}

/// Request body in the Mailjet v3.1 send format.
pub fn mail_message(config: &MailConfig, event: &Event) -> serde_json::Value {
    let notice = event.notice();
    let subject = event.subject();
    json!({
        "Messages": [{
            "From": { "Email": config.from, "Name": config.from_name },
            "To": [{ "Email": notice.email, "Name": notice.name }],
            "Subject": subject,
            "TextPart": event.body(),
        }]
    })
}

async fn mail_worker(config: MailConfig, mut receiver: mpsc::UnboundedReceiver<Event>) {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .unwrap_or_default();

    while let Some(event) = receiver.recv().await {
        let email = event.notice().email.clone();
        let result = client
            .post(&config.api_url)
            .basic_auth(&config.api_key, Some(&config.api_secret))
            .json(&mail_message(&config, &event))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!(%email, subject = %event.subject(), "notification mail sent");
            }
            Ok(response) => {
                warn!(%email, status = response.status().as_u16(), "notification mail rejected");
            }
            Err(e) => error!(%email, error = %e, "notification mail failed"),
        }
    }
}
