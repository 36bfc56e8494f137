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

//! Short correlation ids forwarded to vendors.
//!
//! Layout: `YYMMDDHHMMSS` (UTC) followed by three symbols drawn uniformly
//! from `A-Z0-9`, for exactly 15 characters. That is the longest id the
//! strictest vendor accepts. Ids are sortable by creation second but only
//! 46,656 exist per second, so uniqueness is enforced by the ledger, not
//! assumed here.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SUFFIX_LEN: usize = 3;

/// Vendor-facing transaction correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransId(String);

impl TransId {
    /// Maximum length accepted by downstream vendors.
    pub const MAX_LEN: usize = 15;

    /// Generates an id stamped with the current time.
    pub fn generate() -> Self {
        Self::generate_at(Utc::now(), &mut rand::thread_rng())
    }

    /// Generates an id for a given instant and random source.
    pub fn generate_at<R: Rng + ?Sized>(at: DateTime<Utc>, rng: &mut R) -> Self {
        let mut id = at.format("%y%m%d%H%M%S").to_string();
        for _ in 0..SUFFIX_LEN {
            let idx = rng.gen_range(0..ALPHABET.len());
            id.push(ALPHABET[idx] as char);
        }
        TransId(id)
    }

    /// Accepts an externally supplied id if it fits the vendor constraints.
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= Self::MAX_LEN
            && raw.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
        valid.then(|| TransId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Supplies fresh correlation ids to the orchestrator.
pub trait TransIdSource: Send + Sync {
    fn next_id(&self) -> TransId;
}

/// Clock-and-random id source used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockIdSource;

impl TransIdSource for ClockIdSource {
    fn next_id(&self) -> TransId {
        TransId::generate()
    }
}
