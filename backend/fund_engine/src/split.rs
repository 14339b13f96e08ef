//! Team / mentor / lab split of an allocation's total.
//!
//! This is a pure function module: [`split`] is the only place bucket amounts
//! are computed, and it is called identically when an allocation is created,
//! when its percentages change and when its amounts are recalculated.
//!
//! ## Rounding
//!
//! The mentor and lab buckets are `total × pct / 100` rounded half-up to the
//! cent.  The team bucket takes whatever is left, so the three buckets always
//! reconcile to the total exactly:
//!
//! ```text
//! total 100.01 @ 70/20/10
//!   mentor = 20.002 → 20.00
//!   lab    = 10.001 → 10.00
//!   team   = 100.01 − 20.00 − 10.00 = 70.01
//! ```
//!
//! If half-up rounding of the two smaller buckets ever overshoots the total
//! (only possible with a team share close to zero), the overshoot is taken
//! back from the lab bucket first, then from the mentor bucket.

use serde::{Deserialize, Serialize};

use crate::errors::{FundError, Result};
use crate::money::{Money, Percentage};

/// Bucket percentages of an allocation.  Always sums to exactly 100.00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPercentages")]
pub struct Percentages {
    team: Percentage,
    mentor: Percentage,
    lab: Percentage,
}

#[derive(Deserialize)]
struct RawPercentages {
    team: Percentage,
    mentor: Percentage,
    lab: Percentage,
}

impl TryFrom<RawPercentages> for Percentages {
    type Error = FundError;

    fn try_from(raw: RawPercentages) -> Result<Self> {
        Percentages::new(raw.team, raw.mentor, raw.lab)
    }
}

impl Default for Percentages {
    /// The standard 70 / 20 / 10 split.
    fn default() -> Self {
        Percentages {
            team: Percentage::from_percent(70),
            mentor: Percentage::from_percent(20),
            lab: Percentage::from_percent(10),
        }
    }
}

impl Percentages {
    pub fn new(team: Percentage, mentor: Percentage, lab: Percentage) -> Result<Self> {
        for (name, pct) in [("team", team), ("mentor", mentor), ("lab", lab)] {
            if pct < Percentage::ZERO || pct > Percentage::HUNDRED {
                return Err(FundError::Validation(format!(
                    "{name} percentage {pct} must be between 0.00 and 100.00"
                )));
            }
        }
        let total = team + mentor + lab;
        if total != Percentage::HUNDRED {
            return Err(FundError::Validation(format!(
                "percentages must sum to 100.00, got {total}"
            )));
        }
        Ok(Percentages { team, mentor, lab })
    }

    pub fn team(&self) -> Percentage {
        self.team
    }

    pub fn mentor(&self) -> Percentage {
        self.mentor
    }

    pub fn lab(&self) -> Percentage {
        self.lab
    }
}

/// The three bucket amounts of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BucketSplit {
    pub team: Money,
    pub mentor: Money,
    pub lab: Money,
}

impl BucketSplit {
    pub fn total(&self) -> Money {
        self.team + self.mentor + self.lab
    }
}

/// Split `total` across the three buckets.
pub fn split(total: Money, percentages: &Percentages) -> BucketSplit {
    let mut mentor = percentages.mentor.apply(total);
    let mut lab = percentages.lab.apply(total);
    let mut team = total - mentor - lab;

    if team < Money::ZERO {
        let mut overshoot = Money::ZERO - team;
        let from_lab = overshoot.min(lab);
        lab = lab - from_lab;
        overshoot = overshoot - from_lab;
        mentor = mentor - overshoot.min(mentor);
        team = total - mentor - lab;
    }

    BucketSplit { team, mentor, lab }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
