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

use anyhow::Context;
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use topup_engine::{
    Customer, EngineConfig, MemoryLedger, MeterType, PurchaseIntent, PurchaseOrchestrator,
    Transaction, UserId,
};
use tracing::{debug, info, warn};

/// Top-up Engine - run a batch of wallet purchases
///
/// Seeds wallets from a CSV file, runs every purchase row through the
/// engine, and writes the resulting transaction log to stdout.
#[derive(Parser, Debug)]
#[command(name = "topup-engine")]
#[command(about = "Runs wallet-funded top-up purchases from CSV", long_about = None)]
struct Args {
    /// Engine configuration (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Opening balances
    ///
    /// Expected format: user,balance
    #[arg(long, value_name = "FILE")]
    wallets: PathBuf,

    /// Purchases to run, in order
    ///
    /// Expected format: user,product,provider,recipient,amount,plan,meter_type
    /// Example: topup-engine --wallets wallets.csv purchases.csv > transactions.csv
    #[arg(value_name = "FILE")]
    purchases: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config '{}'", path.display()))?,
        None => EngineConfig::default(),
    };
    config.logging.init();

    let ledger = Arc::new(MemoryLedger::new());
    let wallets = File::open(&args.wallets)
        .with_context(|| format!("opening wallets '{}'", args.wallets.display()))?;
    let opened = load_wallets(&ledger, BufReader::new(wallets))?;
    info!(wallets = opened, "wallets loaded");

    let orchestrator = PurchaseOrchestrator::new(
        ledger.clone(),
        Arc::new(config.pricing_table()),
        config.router_builder().build(),
    )
    .with_notifiers(config.notifiers())
    .with_settings(config.settings()?);

    let purchases = File::open(&args.purchases)
        .with_context(|| format!("opening purchases '{}'", args.purchases.display()))?;
    let (succeeded, failed) = run_purchases(&orchestrator, BufReader::new(purchases)).await?;
    info!(succeeded, failed, "batch complete");

    write_transactions(&ledger.transactions(), std::io::stdout())?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct WalletRecord {
    user: u64,
    balance: Decimal,
}

/// Opens one wallet per row. Malformed rows and repeated users are skipped.
fn load_wallets<R: Read>(ledger: &MemoryLedger, reader: R) -> Result<usize, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(reader);

    let mut opened = 0;
    for result in rdr.deserialize::<WalletRecord>() {
        match result {
            Ok(record) => match ledger.open_wallet(UserId(record.user), record.balance) {
                Ok(_) => opened += 1,
                Err(e) => warn!(user = record.user, error = %e, "skipping wallet"),
            },
            Err(e) => debug!(error = %e, "skipping malformed wallet row"),
        }
    }
    Ok(opened)
}

/// Raw purchase row.
///
/// Fields: `user, product, provider, recipient, amount, plan, meter_type[, email]`
#[derive(Debug, Deserialize)]
struct PurchaseRecord {
    user: u64,
    product: String,
    #[serde(default)]
    provider: String,
    recipient: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(default)]
    plan: String,
    #[serde(default)]
    meter_type: String,
    email: Option<String>,
}

impl PurchaseRecord {
    fn customer(&self) -> Customer {
        let email = self.email.clone().unwrap_or_default();
        Customer::new(UserId(self.user), email)
    }

    /// Returns `None` for unknown products or missing required fields.
    fn into_intent(self) -> Option<PurchaseIntent> {
        match self.product.to_lowercase().as_str() {
            "airtime" => Some(PurchaseIntent::Airtime {
                network: self.provider,
                phone_number: self.recipient,
                amount: self.amount?,
            }),
            "data" => Some(PurchaseIntent::Data {
                network: self.provider,
                phone_number: self.recipient,
                plan_id: self.plan,
                amount: self.amount?,
            }),
            "electricity" => Some(PurchaseIntent::Electricity {
                provider: self.provider,
                meter_number: self.recipient,
                meter_type: MeterType::parse(&self.meter_type),
                amount: self.amount?,
            }),
            "tv" => Some(PurchaseIntent::Tv {
                smart_card_number: self.recipient,
                value: self.plan.parse().ok()?,
            }),
            _ => None,
        }
    }
}

/// Runs purchases one by one in file order.
///
/// Returns the number of successful and failed purchases. Malformed rows are
/// skipped and counted as neither.
async fn run_purchases<R: Read>(
    orchestrator: &PurchaseOrchestrator,
    reader: R,
) -> Result<(usize, usize), csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let (mut succeeded, mut failed) = (0, 0);
    for result in rdr.deserialize::<PurchaseRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                debug!(error = %e, "skipping malformed purchase row");
                continue;
            }
        };
        let customer = record.customer();
        let Some(intent) = record.into_intent() else {
            debug!(user = %customer.user_id, "skipping invalid purchase row");
            continue;
        };

        match orchestrator.purchase(&customer, intent).await {
            Ok(receipt) => {
                succeeded += 1;
                debug!(trans_id = %receipt.trans_id, message = %receipt.message, "purchase ok");
            }
            Err(e) => {
                failed += 1;
                warn!(user = %customer.user_id, error = %e, client = e.is_client_error(), "purchase failed");
            }
        }
    }
    Ok((succeeded, failed))
}

/// One output line per transaction, amounts at 4 decimal places.
#[derive(Debug, Serialize)]
struct TransactionRow<'a> {
    id: u64,
    wallet: u64,
    user: u64,
    trans_id: &'a str,
    direction: &'static str,
    service: &'static str,
    status: &'static str,
    amount: String,
    profit: String,
    reference: &'a str,
}

impl<'a> From<&'a Transaction> for TransactionRow<'a> {
    fn from(tx: &'a Transaction) -> Self {
        Self {
            id: tx.id.0,
            wallet: tx.wallet_id.0,
            user: tx.user_id.0,
            trans_id: tx.trans_id.as_str(),
            direction: match tx.direction {
                topup_engine::Direction::Debit => "debit",
                topup_engine::Direction::Credit => "credit",
            },
            service: tx.service_type.as_str(),
            status: tx.status.as_str(),
            amount: format!("{:.4}", tx.amount),
            profit: format!("{:.4}", tx.profit),
            reference: &tx.reference,
        }
    }
}

fn write_transactions<W: Write>(transactions: &[Transaction], writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for tx in transactions {
        wtr.serialize(TransactionRow::from(tx))?;
    }
    wtr.flush()?;
    Ok(())
}
