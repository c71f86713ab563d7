//! Core types for the wallet ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money)
//! - Append-only audit (LedgerEntry is immutable once written)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// ISO 4217 currency code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Currency {
    /// US Dollar
    USD,
    /// Euro
    EUR,
    /// British Pound
    GBP,
    /// Brazilian Real
    BRL,
    /// Mexican Peso
    MXN,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::BRL => "BRL",
            Currency::MXN => "MXN",
        }
    }

    /// Parse from ISO 4217 code
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "GBP" => Some(Currency::GBP),
            "BRL" => Some(Currency::BRL),
            "MXN" => Some(Currency::MXN),
            _ => None,
        }
    }

    /// Default wallet currency for a participant's profile country
    /// (ISO 3166-1 alpha-2). Unknown countries fall back to USD.
    pub fn for_country(country: &str) -> Self {
        match country {
            "GB" => Currency::GBP,
            "BR" => Currency::BRL,
            "MX" => Currency::MXN,
            "DE" | "FR" | "ES" | "IT" | "PT" | "NL" | "AT" | "IE" => Currency::EUR,
            _ => Currency::USD,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Reason code for a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryKind {
    /// Deposit confirmed by a payment provider
    Topup = 1,
    /// Withdrawal to an external destination
    Withdrawal = 2,
    /// Casino stake placed
    BetPlace = 3,
    /// Casino win credited
    BetWin = 4,
    /// Platform fee
    Fee = 5,
    /// Direct referral bonus
    DirectBonus = 6,
    /// Binary matching bonus
    BinaryBonus = 7,
    /// Rank achievement bonus
    RankBonus = 8,
    /// Residual (unilevel) bonus
    ResidualBonus = 9,
    /// Manual adjustment (ops tooling)
    Adjustment = 10,
}

impl EntryKind {
    /// Stable reason code string (used in metadata and reporting)
    pub fn code(&self) -> &'static str {
        match self {
            EntryKind::Topup => "TOPUP",
            EntryKind::Withdrawal => "WITHDRAWAL",
            EntryKind::BetPlace => "BET_PLACE",
            EntryKind::BetWin => "BET_WIN",
            EntryKind::Fee => "FEE",
            EntryKind::DirectBonus => "DIRECT_BONUS",
            EntryKind::BinaryBonus => "BINARY_BONUS",
            EntryKind::RankBonus => "RANK_BONUS",
            EntryKind::ResidualBonus => "RESIDUAL_BONUS",
            EntryKind::Adjustment => "ADJUSTMENT",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A participant's wallet in one currency
///
/// Created lazily on first mutation, never deleted. The balance is the
/// prefix sum of all entry amounts and must equal the `balance_after`
/// of the most recent entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Unique wallet ID
    pub wallet_id: Uuid,

    /// Owning participant
    pub participant_id: Uuid,

    /// Wallet currency (at most one wallet per participant per currency)
    pub currency: Currency,

    /// Current balance (exact decimal, never negative)
    pub balance: Decimal,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create a fresh zero-balance wallet
    pub fn new(participant_id: Uuid, currency: Currency) -> Self {
        let now = Utc::now();
        Self {
            wallet_id: Uuid::now_v7(),
            participant_id,
            currency,
            balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Immutable financial fact
///
/// Entries ordered by creation time form a prefix-sum sequence whose last
/// value equals the wallet's current balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (UUIDv7 for time-ordering)
    pub entry_id: Uuid,

    /// Wallet this entry belongs to
    pub wallet_id: Uuid,

    /// Owning participant (denormalized for reporting)
    pub participant_id: Uuid,

    /// Currency
    pub currency: Currency,

    /// Reason code
    pub kind: EntryKind,

    /// Signed amount (positive = credit, negative = debit)
    pub amount: Decimal,

    /// Balance snapshot after applying this entry
    pub balance_after: Decimal,

    /// Idempotency key (unique per wallet; replays return the prior result)
    pub idempotency_key: Option<String>,

    /// External transaction ID (provider reference, also replay-checked)
    pub external_tx_id: Option<String>,

    /// Free-form context
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}
