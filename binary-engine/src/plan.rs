//! Compensation plan configuration
//!
//! All percent tables, rank thresholds and bonus amounts live in one
//! injected struct so the bond and rank engines carry no scattered
//! constants. Deployments load overrides from TOML.

use crate::{
    error::{Error, Result},
    types::Rank,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Qualification and payout parameters for one rank tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankTier {
    /// The tier
    pub rank: Rank,

    /// Binary matching payout percent at this tier
    pub binary_percent: Decimal,

    /// One-time achievement bonus
    pub rank_bonus: Decimal,

    /// Minimum smaller-leg points this period
    pub points_threshold: Decimal,

    /// Minimum ranks that must be present on the two legs, in either
    /// orientation (legs are unordered)
    pub leg_requirement: Option<(Rank, Rank)>,
}

/// The full compensation plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationPlan {
    /// Direct bonus percent of the membership price
    pub direct_percent: Decimal,

    /// Residual percents per sponsor-chain level (level 1 first)
    pub residual_percents: Vec<Decimal>,

    /// Point lot lifetime before forfeiture
    pub point_expiry_days: i64,

    /// Earnings cap as a multiple of the membership price
    pub cap_multiplier: Decimal,

    /// Volume points credited per unit of qualifying spend
    pub points_per_unit: Decimal,

    /// Tier table, one entry per rank
    pub tiers: Vec<RankTier>,
}

impl Default for CompensationPlan {
    fn default() -> Self {
        let pct = |n: i64, scale: u32| Decimal::new(n, scale);

        Self {
            direct_percent: pct(10, 2), // 10%
            residual_percents: vec![
                pct(5, 2),  // level 1: 5%
                pct(4, 2),  // level 2: 4%
                pct(3, 2),  // level 3: 3%
                pct(2, 2),  // level 4: 2%
                pct(1, 2),  // level 5: 1%
                pct(1, 2),  // level 6: 1%
                pct(5, 3),  // level 7: 0.5%
                pct(5, 3),  // level 8: 0.5%
                pct(5, 3),  // level 9: 0.5%
                pct(25, 4), // level 10: 0.25%
                pct(25, 4), // level 11: 0.25%
                pct(25, 4), // level 12: 0.25%
            ],
            point_expiry_days: 60,
            cap_multiplier: Decimal::from(3),
            points_per_unit: Decimal::ONE,
            tiers: vec![
                RankTier {
                    rank: Rank::Affiliate,
                    binary_percent: pct(5, 2),
                    rank_bonus: Decimal::ZERO,
                    points_threshold: Decimal::ZERO,
                    leg_requirement: None,
                },
                RankTier {
                    rank: Rank::Bronze,
                    binary_percent: pct(6, 2),
                    rank_bonus: Decimal::from(50),
                    points_threshold: Decimal::from(500),
                    leg_requirement: None,
                },
                RankTier {
                    rank: Rank::Silver,
                    binary_percent: pct(7, 2),
                    rank_bonus: Decimal::from(150),
                    points_threshold: Decimal::from(2_000),
                    leg_requirement: None,
                },
                RankTier {
                    rank: Rank::Gold,
                    binary_percent: pct(8, 2),
                    rank_bonus: Decimal::from(500),
                    points_threshold: Decimal::from(5_000),
                    leg_requirement: Some((Rank::Bronze, Rank::Bronze)),
                },
                RankTier {
                    rank: Rank::Platinum,
                    binary_percent: pct(9, 2),
                    rank_bonus: Decimal::from(1_500),
                    points_threshold: Decimal::from(20_000),
                    leg_requirement: Some((Rank::Gold, Rank::Silver)),
                },
                RankTier {
                    rank: Rank::Diamond,
                    binary_percent: pct(10, 2),
                    rank_bonus: Decimal::from(5_000),
                    points_threshold: Decimal::from(50_000),
                    leg_requirement: Some((Rank::Gold, Rank::Gold)),
                },
                RankTier {
                    rank: Rank::Crown,
                    binary_percent: pct(12, 2),
                    rank_bonus: Decimal::from(20_000),
                    points_threshold: Decimal::from(150_000),
                    leg_requirement: Some((Rank::Diamond, Rank::Platinum)),
                },
            ],
        }
    }
}

impl CompensationPlan {
    /// Tier parameters for a rank
    pub fn tier(&self, rank: Rank) -> Result<&RankTier> {
        self.tiers
            .iter()
            .find(|t| t.rank == rank)
            .ok_or_else(|| Error::Config(format!("No tier configured for rank {}", rank)))
    }

    /// Binary matching percent for a rank
    pub fn binary_percent(&self, rank: Rank) -> Result<Decimal> {
        Ok(self.tier(rank)?.binary_percent)
    }

    /// One-time achievement bonus for a rank
    pub fn rank_bonus(&self, rank: Rank) -> Result<Decimal> {
        Ok(self.tier(rank)?.rank_bonus)
    }

    /// Tiers from highest to lowest (evaluation order)
    pub fn tiers_descending(&self) -> Vec<&RankTier> {
        let mut tiers: Vec<&RankTier> = self.tiers.iter().collect();
        tiers.sort_by(|a, b| b.rank.cmp(&a.rank));
        tiers
    }

    /// Residual levels paid (bounded walk up the sponsor chain)
    pub fn residual_levels(&self) -> usize {
        self.residual_percents.len()
    }

    /// Load from TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let plan: CompensationPlan = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse plan: {}", e)))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Sanity-check the table
    pub fn validate(&self) -> Result<()> {
        for rank in Rank::all() {
            self.tier(rank)?;
        }
        if self.residual_percents.is_empty() {
            return Err(Error::Config("residual_percents must not be empty".into()));
        }
        if self.point_expiry_days <= 0 {
            return Err(Error::Config("point_expiry_days must be positive".into()));
        }
        Ok(())
    }
}
