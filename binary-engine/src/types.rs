//! Core types for the binary compensation network
//!
//! The compensation tree is strictly binary: each participant has at most
//! one left and one right child. The sponsor (referral) chain is a separate
//! structure walked for residual bonuses and reporting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

/// Side of a binary parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    /// Left leg
    Left,
    /// Right leg
    Right,
}

impl Position {
    /// The other leg
    pub fn opposite(&self) -> Self {
        match self {
            Position::Left => Position::Right,
            Position::Right => Position::Left,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Left => write!(f, "left"),
            Position::Right => write!(f, "right"),
        }
    }
}

/// Qualification tier, ordered lowest to highest
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Rank {
    /// Entry tier (every active participant)
    Affiliate = 0,
    /// Bronze
    Bronze = 1,
    /// Silver
    Silver = 2,
    /// Gold
    Gold = 3,
    /// Platinum
    Platinum = 4,
    /// Diamond
    Diamond = 5,
    /// Crown
    Crown = 6,
}

impl Rank {
    /// All ranks, lowest first
    pub fn all() -> [Rank; 7] {
        [
            Rank::Affiliate,
            Rank::Bronze,
            Rank::Silver,
            Rank::Gold,
            Rank::Platinum,
            Rank::Diamond,
            Rank::Crown,
        ]
    }

    /// The next tier up, if any
    pub fn next(&self) -> Option<Rank> {
        let all = Rank::all();
        let idx = *self as usize;
        all.get(idx + 1).copied()
    }

    /// Tier order (0 = lowest)
    pub fn order(&self) -> u8 {
        *self as u8
    }

    /// Human-readable tier name
    pub fn name(&self) -> &'static str {
        match self {
            Rank::Affiliate => "Affiliate",
            Rank::Bronze => "Bronze",
            Rank::Silver => "Silver",
            Rank::Gold => "Gold",
            Rank::Platinum => "Platinum",
            Rank::Diamond => "Diamond",
            Rank::Crown => "Crown",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Bonus category
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum BondType {
    /// Direct referral bonus on membership sales
    Direct,
    /// Binary matching bonus on consumed point pairs
    Binary,
    /// One-time rank achievement bonus
    Rank,
    /// Residual bonus up the sponsor chain
    Residual,
}

impl BondType {
    /// Stable code string for reporting
    pub fn code(&self) -> &'static str {
        match self {
            BondType::Direct => "DIRECT",
            BondType::Binary => "BINARY",
            BondType::Rank => "RANK",
            BondType::Residual => "RESIDUAL",
        }
    }
}

impl fmt::Display for BondType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Cumulative and pending totals for one bond category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BondCounters {
    /// Credited lifetime total
    pub balance: Decimal,
    /// Accrued but not yet credited
    pub pending: Decimal,
}

/// A network participant (tree node)
///
/// Binary placement fields are written exactly once; rank and cap fields
/// mutate continuously. Participants are never deleted, only deactivated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Unique participant ID
    pub participant_id: Uuid,

    /// Who referred them (sponsor chain, distinct from tree position)
    pub sponsor_id: Option<Uuid>,

    /// Profile country (ISO 3166-1 alpha-2), drives wallet currency
    pub country: String,

    /// Binary parent (set at placement)
    pub parent_binary_id: Option<Uuid>,

    /// Left child in the binary tree
    pub left_child_id: Option<Uuid>,

    /// Right child in the binary tree
    pub right_child_id: Option<Uuid>,

    /// Side under the binary parent (set at placement)
    pub position: Option<Position>,

    /// Derived from membership state; inactive participants earn nothing
    pub is_active: bool,

    /// Set when the earnings cap is exhausted
    pub membership_expired: bool,

    /// Current qualification tier
    pub rank: Rank,

    /// Highest tier ever achieved (rank bonuses pay once per tier)
    pub max_rank: Rank,

    /// Directly sponsored participants
    pub direct_count: u32,

    /// Per-category bonus totals
    #[serde(default)]
    pub bond_totals: BTreeMap<BondType, BondCounters>,

    /// Earnings cap for the current membership cycle (≤ 0 = uncapped)
    pub cap_limit: Decimal,

    /// Earnings accrued against the cap this cycle
    pub cap_current: Decimal,

    /// Registration timestamp
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    /// Create an unplaced, inactive participant under a sponsor
    pub fn new(participant_id: Uuid, sponsor_id: Option<Uuid>, country: impl Into<String>) -> Self {
        Self {
            participant_id,
            sponsor_id,
            country: country.into(),
            parent_binary_id: None,
            left_child_id: None,
            right_child_id: None,
            position: None,
            is_active: false,
            membership_expired: false,
            rank: Rank::Affiliate,
            max_rank: Rank::Affiliate,
            direct_count: 0,
            bond_totals: BTreeMap::new(),
            cap_limit: Decimal::ZERO,
            cap_current: Decimal::ZERO,
            joined_at: Utc::now(),
        }
    }

    /// Whether binary placement has happened
    pub fn is_placed(&self) -> bool {
        self.parent_binary_id.is_some()
    }

    /// Child pointer for a side
    pub fn child(&self, side: Position) -> Option<Uuid> {
        match side {
            Position::Left => self.left_child_id,
            Position::Right => self.right_child_id,
        }
    }

    /// Set a child pointer
    pub fn set_child(&mut self, side: Position, child: Uuid) {
        match side {
            Position::Left => self.left_child_id = Some(child),
            Position::Right => self.right_child_id = Some(child),
        }
    }

    /// Counters for a bond category (zeroed if absent)
    pub fn bond_counters(&mut self, bond_type: BondType) -> &mut BondCounters {
        self.bond_totals.entry(bond_type).or_default()
    }
}

/// An expiring quantity of volume points on one leg of one participant
///
/// Consumed oldest-first during matching; lots past `expires_at` are purged
/// and forfeited on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointLot {
    /// Unique lot ID (UUIDv7 for time-ordering)
    pub lot_id: Uuid,

    /// Owning participant
    pub participant_id: Uuid,

    /// Leg the volume was credited to
    pub side: Position,

    /// Remaining points in this lot
    pub points: Decimal,

    /// Event key of the triggering financial event
    pub source_event: String,

    /// Creation timestamp (FIFO order)
    pub created_at: DateTime<Utc>,

    /// Forfeiture deadline
    pub expires_at: DateTime<Utc>,
}

impl PointLot {
    /// Whether the lot is past its forfeiture deadline
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Append-only audit record of a bonus event
///
/// Distinct from the financial ledger entry; `credited + lost == gross`
/// always holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondLedgerEntry {
    /// Unique bond event ID (UUIDv7)
    pub bond_id: Uuid,

    /// Receiving participant
    pub participant_id: Uuid,

    /// Bonus category
    pub bond_type: BondType,

    /// Amount before cap (rounded to 2 dp)
    pub gross: Decimal,

    /// Amount actually credited to the wallet
    pub credited: Decimal,

    /// Amount forfeited (cap exceeded or inactive participant)
    pub lost: Decimal,

    /// Participant whose activity triggered the bonus
    pub triggered_by: Option<Uuid>,

    /// Deterministic key of the triggering event; a second distribution
    /// under the same key returns this entry instead of paying again
    #[serde(default)]
    pub source_key: Option<String>,

    /// Free-form context
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Matched volume whose binary bond has not been paid yet
///
/// Written in the same atomic commit that consumes the lots, deleted once
/// the bond settles. A crash between the two leaves the obligation behind
/// for the next matching run to settle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchObligation {
    /// Unique match ID (UUIDv7)
    pub match_id: Uuid,

    /// Participant whose legs were matched
    pub participant_id: Uuid,

    /// Points consumed from each leg
    pub matched_points: Decimal,

    /// Match timestamp
    pub created_at: DateTime<Utc>,
}

/// Sponsor-chain reporting index row, written at placement time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescendantEntry {
    /// Ancestor on the sponsor chain
    pub ancestor_id: Uuid,

    /// Newly placed descendant
    pub descendant_id: Uuid,

    /// Levels between them (1 = direct)
    pub depth: u32,

    /// Placement timestamp
    pub created_at: DateTime<Utc>,
}

/// Result of a rank evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankEvaluation {
    /// Highest qualifying tier
    pub rank: Rank,

    /// Next tier up, if any
    pub next_rank: Option<Rank>,

    /// Smaller-leg points still missing for the next tier
    pub missing_points: Decimal,

    /// Tier order of the qualifying rank
    pub order: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_opposite() {
        assert_eq!(Position::Left.opposite(), Position::Right);
        assert_eq!(Position::Right.opposite(), Position::Left);
    }

    #[test]
    fn test_rank_ordering() {
        assert!(Rank::Crown > Rank::Diamond);
        assert!(Rank::Bronze > Rank::Affiliate);
        assert_eq!(Rank::Gold.next(), Some(Rank::Platinum));
        assert_eq!(Rank::Crown.next(), None);
    }

    #[test]
    fn test_new_participant_unplaced() {
        let p = Participant::new(Uuid::new_v4(), Some(Uuid::new_v4()), "BR");
        assert!(!p.is_placed());
        assert!(!p.is_active);
        assert_eq!(p.rank, Rank::Affiliate);
        assert_eq!(p.cap_current, Decimal::ZERO);
    }

    #[test]
    fn test_child_pointers() {
        let mut p = Participant::new(Uuid::new_v4(), None, "US");
        let child = Uuid::new_v4();

        assert_eq!(p.child(Position::Left), None);
        p.set_child(Position::Left, child);
        assert_eq!(p.child(Position::Left), Some(child));
        assert_eq!(p.child(Position::Right), None);
    }

    #[test]
    fn test_lot_expiry() {
        let now = Utc::now();
        let lot = PointLot {
            lot_id: Uuid::now_v7(),
            participant_id: Uuid::new_v4(),
            side: Position::Left,
            points: Decimal::from(100),
            source_event: "deposit:tx-1".to_string(),
            created_at: now,
            expires_at: now + chrono::Duration::days(60),
        };

        assert!(!lot.is_expired(now));
        assert!(lot.is_expired(now + chrono::Duration::days(61)));
    }
}
